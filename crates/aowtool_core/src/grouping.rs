use indexmap::IndexMap;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::overrides::{ForcedGroup, Overrides};
use crate::record::{GroupKey, NAME, Record};
use crate::series::fold_cell;

/// Rows sharing a key, plus the force-collapse entry that produced the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: GroupKey,
    pub rows: Vec<Record>,
    pub forced: Option<ForcedGroup>,
}

pub fn group_rows(rows: &[Record], key_fields: &[&str]) -> IndexMap<GroupKey, Vec<Record>> {
    let mut groups: IndexMap<GroupKey, Vec<Record>> = IndexMap::new();
    for row in rows {
        groups
            .entry(row.key(key_fields))
            .or_default()
            .push(row.clone());
    }
    groups
}

/// Groups by `key_fields`, except rows named in a force-collapse entry, which
/// land in one synthetic group keyed by the entry id.
pub fn group_with_overrides(
    rows: &[Record],
    key_fields: &[&str],
    overrides: &Overrides,
) -> IndexMap<GroupKey, Group> {
    let mut groups: IndexMap<GroupKey, Group> = IndexMap::new();
    for row in rows {
        let forced = overrides.group_for(row.get_trimmed(NAME));
        let key = match forced {
            Some(forced) => GroupKey(vec![forced.id.clone()]),
            None => row.key(key_fields),
        };
        groups
            .entry(key.clone())
            .or_insert_with(|| Group {
                key,
                rows: Vec::new(),
                forced: forced.cloned(),
            })
            .rows
            .push(row.clone());
    }
    groups
}

/// Folds a group into one row over `columns`.
///
/// Columns listed in `numeric` are summed cell by cell. Every other column
/// keeps its first non-empty value; later conflicting values are reported.
/// Force-collapse override values replace whatever the fold produced.
pub fn fold_group(
    group: &Group,
    columns: &[String],
    numeric: &[&str],
    diagnostics: &mut Diagnostics,
) -> Record {
    let key_text = group.key.display();
    let overridden = |column: &str| {
        group
            .forced
            .as_ref()
            .is_some_and(|forced| forced.overrides.contains_key(column))
    };

    let Some((first, rest)) = group.rows.split_first() else {
        return Record::new();
    };
    let mut folded = first.project(columns);
    for row in rest {
        for column in columns {
            if overridden(column) {
                continue;
            }
            let incoming = row.get(column);
            if numeric.contains(&column.as_str()) {
                let existing = folded.get(column).to_string();
                match fold_cell(&existing, incoming) {
                    Ok(sum) => folded.set(column, sum),
                    Err(mismatch) => diagnostics.push(
                        DiagnosticKind::ShapeMismatch,
                        format!(
                            "column '{column}' for key {key_text}: keeping '{existing}', dropped '{incoming}' ({mismatch})"
                        ),
                    ),
                }
                continue;
            }

            let existing = folded.get(column);
            if existing.is_empty() && !incoming.is_empty() {
                folded.set(column, incoming);
            } else if existing != incoming && !incoming.is_empty() {
                if group.forced.is_some() {
                    diagnostics.push(
                        DiagnosticKind::ForcedMergeConflict,
                        format!(
                            "Forced group {key_text} disagrees on column '{column}': keeping '{existing}', saw '{incoming}'"
                        ),
                    );
                } else {
                    diagnostics.disagreement(column, &key_text, existing, incoming);
                }
            }
        }
    }

    if let Some(forced) = &group.forced {
        for (column, value) in &forced.overrides {
            if columns.iter().any(|name| name == column) {
                folded.set(column, value.clone());
            }
        }
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PART, PHYS_MV, SKILL, WEAPON};

    fn row(name: &str, skill: &str, part: &str, phys: &str) -> Record {
        Record::from_pairs([
            (NAME, name),
            (SKILL, skill),
            (PART, part),
            (WEAPON, "Dagger"),
            (PHYS_MV, phys),
        ])
    }

    fn columns() -> Vec<String> {
        [SKILL, PART, WEAPON, PHYS_MV]
            .iter()
            .map(|column| column.to_string())
            .collect()
    }

    #[test]
    fn group_rows_preserves_first_seen_order() {
        let rows = vec![
            row("a", "Quickstep", "", "0"),
            row("b", "Bloodhound's Step", "", "0"),
            row("c", "Quickstep", "", "0"),
        ];
        let groups = group_rows(&rows, &[SKILL]);
        let keys = groups.keys().map(GroupKey::display).collect::<Vec<_>>();
        assert_eq!(keys, vec!["Quickstep", "Bloodhound's Step"]);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn fold_sums_numeric_and_keeps_first_categorical() {
        let rows = vec![
            row("a", "Storm Blade", "", "100"),
            row("b", "Storm Blade", "Wave", "25.5"),
            row("c", "Storm Blade", "Other", "-"),
        ];
        let groups = group_with_overrides(&rows, &[SKILL], &Overrides::default());
        let mut diagnostics = Diagnostics::new();
        let folded = fold_group(&groups[0], &columns(), &[PHYS_MV], &mut diagnostics);
        assert_eq!(folded.get(PHYS_MV), "125.5");
        assert_eq!(folded.get(PART), "Wave");
        assert_eq!(diagnostics.count(DiagnosticKind::FieldDisagreement), 1);
        assert!(diagnostics.messages(DiagnosticKind::FieldDisagreement)[0]
            .contains("keeping 'Wave', saw 'Other'"));
    }

    #[test]
    fn forced_group_ignores_natural_key_and_applies_overrides() {
        let overrides = Overrides::parse(
            r#"{"force_collapse": [{"names": ["x", "y"], "overrides": {"Part": "Combo"}}]}"#,
        )
        .expect("parse");
        let rows = vec![
            row("x", "Spinning Slash", "First", "50"),
            row("y", "Spinning Slash (Follow)", "Second", "60"),
            row("z", "Spinning Slash", "First", "10"),
        ];
        let groups = group_with_overrides(&rows, &[SKILL, PART], &overrides);
        assert_eq!(groups.len(), 2);

        let forced = &groups[0];
        assert_eq!(forced.key.display(), "x | y");
        let mut diagnostics = Diagnostics::new();
        let folded = fold_group(forced, &columns(), &[PHYS_MV], &mut diagnostics);
        assert_eq!(folded.get(PART), "Combo");
        assert_eq!(folded.get(PHYS_MV), "110");
        assert_eq!(folded.get(SKILL), "Spinning Slash");
        assert_eq!(diagnostics.count(DiagnosticKind::ForcedMergeConflict), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::FieldDisagreement), 0);
    }
}
