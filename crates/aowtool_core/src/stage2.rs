use anyhow::{Result, bail};

use crate::diagnostics::Diagnostics;
use crate::format::{FormatConfig, summarize_range};
use crate::grouping::{fold_group, group_with_overrides};
use crate::metrics::{ElementValues, classify_damage_type, stance_damage, zero_for_disabled};
use crate::overrides::Overrides;
use crate::record::{
    ATK_FIRE, ATK_HOLY, ATK_ID, ATK_LTNG, ATK_MAG, ATK_PHYS, ATK_SUPER_ARMOR, BULLET, CHARGED,
    DMG_MV, DMG_TYPE, FIRE_MV, FOLLOW_UP, FP, HAND, HOLY_MV, IS_ADD_BASE_ATK, LTNG_MV, MAGIC_MV,
    NAME, OVERWRITE_SCALING, PART, PHYS_ATK_ATTRIBUTE, PHYS_MV, POISE_DMG_MV, SKILL, STANCE_DMG,
    STATUS_MV, STEP, TICK, Table, WEAPON, WEAPON_BUFF_MV, WEAPON_POISE, WEP_POISE_RANGE,
};
use crate::tokens::{Precision, fmt_number, parse_scalar};

/// Sibling rows sharing every one of these fields, slot coordinates included,
/// fold into one row.
pub const KEY_FIELDS: [&str; 12] = [
    SKILL,
    FOLLOW_UP,
    HAND,
    PART,
    FP,
    CHARGED,
    STEP,
    BULLET,
    WEAPON,
    PHYS_ATK_ATTRIBUTE,
    IS_ADD_BASE_ATK,
    OVERWRITE_SCALING,
];

pub const SUMMED_COLUMNS: [&str; 14] = [
    PHYS_MV,
    MAGIC_MV,
    FIRE_MV,
    LTNG_MV,
    HOLY_MV,
    STATUS_MV,
    WEAPON_BUFF_MV,
    POISE_DMG_MV,
    ATK_PHYS,
    ATK_MAG,
    ATK_FIRE,
    ATK_LTNG,
    ATK_HOLY,
    ATK_SUPER_ARMOR,
];

const DROPPED_COLUMNS: [&str; 3] = [NAME, TICK, ATK_ID];

#[derive(Debug)]
pub struct StageOutput {
    pub table: Table,
    pub diagnostics: Diagnostics,
}

pub fn output_columns(input: &[String]) -> Vec<String> {
    let derived = [DMG_TYPE, DMG_MV, STANCE_DMG, WEP_POISE_RANGE];
    let mut columns = input
        .iter()
        .filter(|column| {
            !DROPPED_COLUMNS.contains(&column.as_str()) && !derived.contains(&column.as_str())
        })
        .cloned()
        .collect::<Vec<_>>();

    if let Some(bullet) = columns.iter().position(|column| column == BULLET)
        && columns.iter().any(|column| column == STEP)
    {
        let bullet = columns.remove(bullet);
        insert_after(&mut columns, STEP, &[bullet.as_str()]);
    }
    match columns.iter().position(|column| column == WEAPON_POISE) {
        Some(index) => columns[index] = WEP_POISE_RANGE.to_string(),
        None => insert_after(&mut columns, WEAPON, &[WEP_POISE_RANGE]),
    }
    insert_after(&mut columns, HOLY_MV, &[DMG_TYPE, DMG_MV]);
    insert_after(&mut columns, POISE_DMG_MV, &[STANCE_DMG]);
    columns
}

/// Inserts `new` right after `anchor`, or at the end when `anchor` is absent.
fn insert_after(columns: &mut Vec<String>, anchor: &str, new: &[&str]) {
    let at = columns
        .iter()
        .position(|column| column == anchor)
        .map_or(columns.len(), |index| index + 1);
    for (offset, column) in new.iter().enumerate() {
        columns.insert(at + offset, column.to_string());
    }
}

/// Collapses extracted attack rows into one row per key and slot.
pub fn transform(input: &Table, overrides: &Overrides, format: &FormatConfig) -> Result<StageOutput> {
    if !input.has_column(PHYS_MV) {
        bail!("missing required column '{PHYS_MV}'");
    }
    let columns = output_columns(&input.columns);
    let fold_columns = input
        .columns
        .iter()
        .filter(|column| !DROPPED_COLUMNS.contains(&column.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    let mut diagnostics = Diagnostics::new();

    let mut rows = input.rows.clone();
    let blanked = rows
        .iter_mut()
        .map(|row| overrides.apply_blacklist(row))
        .sum::<usize>();
    if blanked > 0 {
        tracing::debug!(blanked, "blanked blacklisted values");
    }

    let groups = group_with_overrides(&rows, &KEY_FIELDS, overrides);
    tracing::debug!(rows = rows.len(), groups = groups.len(), "grouped stage 2 rows");

    let mut output = Vec::with_capacity(groups.len());
    for group in groups.values() {
        let mut folded = fold_group(group, &fold_columns, &SUMMED_COLUMNS, &mut diagnostics);
        zero_for_disabled(&mut folded);

        let damage = classify_damage_type(
            &ElementValues::from_record(&folded),
            folded.get(PHYS_ATK_ATTRIBUTE),
            format.show_phys_attribute,
        );
        let (poise_text, poise) = summarize_range(folded.get(WEAPON_POISE));
        let stance = stance_damage(
            poise,
            folded.scalar(POISE_DMG_MV),
            folded.scalar(ATK_SUPER_ARMOR),
        );

        for column in SUMMED_COLUMNS {
            if !folded.contains(column) {
                continue;
            }
            if let Some(value) = parse_scalar(folded.get(column)) {
                folded.set(column, fmt_number(value, Precision::Tenths));
            }
        }
        folded.set(DMG_TYPE, damage.label.clone());
        folded.set(DMG_MV, damage.mv_text());
        folded.set(WEP_POISE_RANGE, poise_text);
        folded.set(STANCE_DMG, stance);
        output.push(folded.project(&columns));
    }

    Ok(StageOutput {
        table: Table::new(columns, output),
        diagnostics,
    })
}
