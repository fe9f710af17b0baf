use std::collections::BTreeSet;

use anyhow::{Result, bail};

use crate::collapse::{ConsolidatedRow, WEAPON_COLLAPSE, collapse_dimension};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::format::{FormatConfig, mask_zero_cells, unique_join};
use crate::grouping::group_rows;
use crate::layout::{build_layout, layout_scope};
use crate::record::{
    ATK_FIRE, ATK_HOLY, ATK_LTNG, ATK_MAG, ATK_PHYS, DMG_MV, DMG_TYPE, FOLLOW_UP, HAND,
    MAX_STEP, OVERWRITE_SCALING, PART, Record, SERIES_COLUMNS, SKILL, STANCE_DMG, STATUS_MV, STEP,
    SUB_CATEGORIES, SUB_CATEGORY_SUM, Table, WEAPON, WEAPON_BUFF_MV, WEAPON_SOURCE, WEP_STATUS,
};
use crate::series::collect_series;
use crate::stage2::StageOutput;

pub const KEY_FIELDS: [&str; 7] = [SKILL, FOLLOW_UP, HAND, PART, WEAPON, DMG_TYPE, WEP_STATUS];

pub const OUTPUT_COLUMNS: [&str; 19] = [
    SKILL,
    FOLLOW_UP,
    HAND,
    PART,
    WEAPON_SOURCE,
    WEAPON,
    DMG_TYPE,
    DMG_MV,
    STATUS_MV,
    WEP_STATUS,
    WEAPON_BUFF_MV,
    STANCE_DMG,
    ATK_PHYS,
    ATK_MAG,
    ATK_FIRE,
    ATK_LTNG,
    ATK_HOLY,
    OVERWRITE_SCALING,
    SUB_CATEGORY_SUM,
];

const CARRIED_FIELDS: [&str; 8] = [
    SKILL,
    FOLLOW_UP,
    HAND,
    PART,
    WEAPON_SOURCE,
    WEAPON,
    DMG_TYPE,
    WEP_STATUS,
];

const EMPTY_OVERWRITE: &str = "null";

/// Folds stage-2 rows into one row per key with slot series, then merges
/// weapons and masks all-zero cells.
///
/// Weapon base columns, the poise range and the gem-attribute flag do not
/// survive this stage; the output uses [`OUTPUT_COLUMNS`]. A table without
/// a `Dmg MV` column is rejected.
pub fn transform(input: &Table, format: &FormatConfig) -> Result<StageOutput> {
    if !input.has_column(DMG_MV) {
        bail!("missing required column '{DMG_MV}'");
    }
    let mut diagnostics = Diagnostics::new();
    for row in input.rows.iter().filter(|row| row.step_out_of_range()) {
        diagnostics.push(
            DiagnosticKind::InvalidStep,
            format!(
                "Step '{}' above {MAX_STEP} for {} read as 1",
                row.get_trimmed(STEP),
                row.key(&KEY_FIELDS).display()
            ),
        );
    }
    let layouts = build_layout(&input.rows, layout_scope);
    let groups = group_rows(&input.rows, &KEY_FIELDS);
    tracing::debug!(
        rows = input.rows.len(),
        groups = groups.len(),
        scopes = layouts.len(),
        "grouped stage 3 rows"
    );

    let mut consolidated = Vec::with_capacity(groups.len());
    for rows in groups.values() {
        let Some(base) = rows.first() else {
            continue;
        };
        let layout = layouts
            .get(&layout_scope(base))
            .copied()
            .unwrap_or_default();

        let mut record = Record::new();
        for field in CARRIED_FIELDS {
            record.set(field, base.get(field));
        }
        for field in SERIES_COLUMNS {
            let series = collect_series(rows, field, &mut diagnostics);
            record.set(field, series.render(&layout));
        }
        let overwrite = unique_join(rows.iter().map(|row| row.get(OVERWRITE_SCALING)), ", ");
        record.set(
            OVERWRITE_SCALING,
            if overwrite.is_empty() {
                EMPTY_OVERWRITE.to_string()
            } else {
                overwrite
            },
        );
        record.set(
            SUB_CATEGORY_SUM,
            unique_join(
                rows.iter()
                    .flat_map(|row| SUB_CATEGORIES.iter().map(move |field| row.get(field))),
                " | ",
            ),
        );

        consolidated.push(ConsolidatedRow {
            record,
            coverage: rows.iter().map(Record::slot).collect::<BTreeSet<_>>(),
        });
    }

    let columns = OUTPUT_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .collect::<Vec<_>>();
    let merged = collapse_dimension(consolidated, &WEAPON_COLLAPSE, &mut diagnostics);
    let rows = merged
        .into_iter()
        .map(|row| {
            let mut record = row.record.project(&columns);
            mask_zero_cells(&mut record, &SERIES_COLUMNS, &format.zero_sentinel);
            record
        })
        .collect();

    Ok(StageOutput {
        table: Table::new(columns, rows),
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CHARGED, FP};

    fn row(weapon: &str, fp: &str, step: &str, dmg_mv: &str, status: &str) -> Record {
        Record::from_pairs([
            (SKILL, "Wild Strikes"),
            (FOLLOW_UP, "-"),
            (HAND, "2h"),
            (PART, ""),
            (FP, fp),
            (CHARGED, "0"),
            (STEP, step),
            (WEAPON_SOURCE, "category"),
            (WEAPON, weapon),
            (DMG_TYPE, "Phys"),
            (DMG_MV, dmg_mv),
            (STATUS_MV, status),
            (WEP_STATUS, "-"),
            (OVERWRITE_SCALING, ""),
            ("subCategory1", "Spin"),
            ("subCategory2", "-"),
        ])
    }

    fn table(rows: Vec<Record>) -> Table {
        let columns = rows
            .first()
            .map(|row| row.columns().map(str::to_string).collect())
            .unwrap_or_default();
        Table::new(columns, rows)
    }

    #[test]
    fn symmetric_weapons_collapse_into_one_row() {
        let input = table(vec![
            row("Greatsword", "1", "1", "1.5", "0"),
            row("Greatsword", "1", "2", "2", "0"),
            row("Colossal Axe", "1", "1", "1.2", "0"),
            row("Colossal Axe", "1", "2", "2.4", "0"),
        ]);
        let output = transform(&input, &FormatConfig::default()).expect("transform");
        assert_eq!(output.table.columns.len(), OUTPUT_COLUMNS.len());
        assert_eq!(output.table.rows.len(), 1);
        let merged = &output.table.rows[0];
        assert_eq!(merged.get(WEAPON), "Colossal Axe | Greatsword");
        assert_eq!(merged.get(DMG_MV), "1.2-1.5, 2-2.4");
        assert_eq!(merged.get(STATUS_MV), "-");
        assert_eq!(merged.get(ATK_PHYS), "-");
        assert_eq!(merged.get(OVERWRITE_SCALING), "null");
        assert_eq!(merged.get(SUB_CATEGORY_SUM), "Spin");
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn uneven_step_coverage_keeps_weapons_apart() {
        let input = table(vec![
            row("Sword", "1", "1", "5", "0"),
            row("Axe", "1", "1", "5", "0"),
            row("Axe", "1", "2", "5", "0"),
        ]);
        let output = transform(&input, &FormatConfig::default()).expect("transform");
        assert_eq!(output.table.rows.len(), 2);
        assert_eq!(output.table.rows[0].get(DMG_MV), "5");
        assert_eq!(output.table.rows[1].get(DMG_MV), "5, 5");
    }

    #[test]
    fn fp_blocks_render_with_brackets() {
        let input = table(vec![
            row("Sword", "1", "1", "1", "0"),
            row("Sword", "0", "1", "0.5", "30"),
        ]);
        let output = transform(&input, &FormatConfig::default()).expect("transform");
        assert_eq!(output.table.rows.len(), 1);
        assert_eq!(output.table.rows[0].get(DMG_MV), "1 [0.5]");
        assert_eq!(output.table.rows[0].get(STATUS_MV), "0 [30]");
    }

    #[test]
    fn missing_dmg_mv_is_fatal() {
        let input = Table::new(
            vec![SKILL.to_string(), WEAPON.to_string()],
            vec![Record::from_pairs([(SKILL, "Quickstep"), (WEAPON, "Dagger")])],
        );
        let error = transform(&input, &FormatConfig::default()).expect_err("must fail");
        assert_eq!(error.to_string(), "missing required column 'Dmg MV'");
    }

    #[test]
    fn oversized_step_is_reported_and_not_laid_out() {
        let input = table(vec![
            row("Sword", "1", "1", "1", "0"),
            row("Sword", "1", "4000000000", "2", "0"),
        ]);
        let output = transform(&input, &FormatConfig::default()).expect("transform");
        assert_eq!(output.diagnostics.count(DiagnosticKind::InvalidStep), 1);
        assert_eq!(output.table.rows.len(), 1);
        assert_eq!(output.table.rows[0].get(DMG_MV), "3");
    }
}
