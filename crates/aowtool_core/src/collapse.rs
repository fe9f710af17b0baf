use std::collections::{BTreeSet, HashSet};
use std::fmt;

use indexmap::IndexMap;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::format::join_dimension;
use crate::record::{
    DMG_TYPE, FOLLOW_UP, GroupKey, HAND, OVERWRITE_SCALING, PART, Record, SERIES_COLUMNS, SKILL,
    SUB_CATEGORY_SUM, SlotCoord, WEAPON, WEAPON_SOURCE, WEP_STATUS,
};
use crate::tokens::{Shape, shape, union_ranges};

/// A consolidated row together with the slots its series actually cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedRow {
    pub record: Record,
    pub coverage: BTreeSet<SlotCoord>,
}

/// A field whose unset values match any concrete value.
#[derive(Debug, Clone, Copy)]
pub struct Wildcard {
    pub field: &'static str,
    pub jokers: &'static [&'static str],
    /// Written back when no contributor has a concrete value.
    pub placeholder: &'static str,
}

impl Wildcard {
    fn concrete(&self, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() || self.jokers.contains(&value) {
            None
        } else {
            Some(value.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollapseRule {
    pub dimension: &'static str,
    pub cluster_fields: &'static [&'static str],
    pub wildcards: &'static [Wildcard],
    pub numeric_fields: &'static [&'static str],
    /// Sub-category tag field normalised against `Hand` before comparison.
    pub tag_field: Option<&'static str>,
}

pub const WEAPON_COLLAPSE: CollapseRule = CollapseRule {
    dimension: WEAPON,
    cluster_fields: &[
        SKILL,
        FOLLOW_UP,
        HAND,
        PART,
        WEAPON_SOURCE,
        DMG_TYPE,
        WEP_STATUS,
        OVERWRITE_SCALING,
        SUB_CATEGORY_SUM,
    ],
    wildcards: &[
        Wildcard {
            field: DMG_TYPE,
            jokers: &["-"],
            placeholder: "-",
        },
        Wildcard {
            field: OVERWRITE_SCALING,
            jokers: &["-", "null"],
            placeholder: "null",
        },
    ],
    numeric_fields: &SERIES_COLUMNS,
    tag_field: Some(SUB_CATEGORY_SUM),
};

impl CollapseRule {
    fn is_wildcard(&self, field: &str) -> bool {
        self.wildcards.iter().any(|wildcard| wildcard.field == field)
    }

    fn is_signature_field(&self, field: &str) -> bool {
        field != self.dimension && !self.numeric_fields.contains(&field) && !self.is_wildcard(field)
    }

    fn field_value(&self, record: &Record, field: &str) -> String {
        if self.tag_field == Some(field) {
            normalize_tags(record.get(field), record.get_trimmed(HAND))
        } else {
            record.get_trimmed(field).to_string()
        }
    }
}

/// Drops the hand-implied attack tag (`"2h Attack"` on a `2h` row).
pub fn normalize_tags(tags: &str, hand: &str) -> String {
    let implied = match hand {
        "2h" => Some("2h Attack"),
        "1h" => Some("1h Attack"),
        _ => None,
    };
    tags.split(" | ")
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && Some(*tag) != implied)
        .collect::<Vec<_>>()
        .join(" | ")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClusterKey {
    base: GroupKey,
    wild: Vec<Option<String>>,
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base.display())?;
        for value in &self.wild {
            write!(f, " | {}", value.as_deref().unwrap_or("*"))?;
        }
        Ok(())
    }
}

/// Numeric shapes plus slot coverage; rows may only merge with equal fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Fingerprint {
    shapes: Vec<Shape>,
    coverage: BTreeSet<SlotCoord>,
}

impl Fingerprint {
    fn of(row: &ConsolidatedRow, rule: &CollapseRule) -> Self {
        Self {
            shapes: rule
                .numeric_fields
                .iter()
                .map(|field| shape(row.record.get_trimmed(field)))
                .collect(),
            coverage: row.coverage.clone(),
        }
    }
}

/// Merges rows that differ only in `rule.dimension`.
///
/// A cluster merges only when every dimension value shows the same set of
/// fingerprints; within a fingerprint bucket each value must contribute one
/// row and all signature fields must agree. Refused clusters and buckets are
/// emitted unchanged and reported.
pub fn collapse_dimension(
    rows: Vec<ConsolidatedRow>,
    rule: &CollapseRule,
    diagnostics: &mut Diagnostics,
) -> Vec<ConsolidatedRow> {
    let mut output = Vec::with_capacity(rows.len());
    for (key, cluster) in cluster_rows(rows, rule) {
        collapse_cluster(&key, cluster, rule, diagnostics, &mut output);
    }
    output
}

fn cluster_rows(
    rows: Vec<ConsolidatedRow>,
    rule: &CollapseRule,
) -> IndexMap<ClusterKey, Vec<ConsolidatedRow>> {
    let keyed = rows
        .into_iter()
        .map(|row| {
            let base = GroupKey(
                rule.cluster_fields
                    .iter()
                    .filter(|field| !rule.is_wildcard(field))
                    .map(|field| rule.field_value(&row.record, field))
                    .collect(),
            );
            let wild = rule
                .wildcards
                .iter()
                .map(|wildcard| wildcard.concrete(row.record.get(wildcard.field)))
                .collect::<Vec<_>>();
            (base, wild, row)
        })
        .collect::<Vec<_>>();

    let mut concrete: IndexMap<GroupKey, Vec<BTreeSet<String>>> = IndexMap::new();
    for (base, wild, _) in &keyed {
        let sets = concrete
            .entry(base.clone())
            .or_insert_with(|| vec![BTreeSet::new(); rule.wildcards.len()]);
        for (set, value) in sets.iter_mut().zip(wild) {
            if let Some(value) = value {
                set.insert(value.clone());
            }
        }
    }

    let mut clusters: IndexMap<ClusterKey, Vec<ConsolidatedRow>> = IndexMap::new();
    for (base, wild, row) in keyed {
        let sets = &concrete[&base];
        let wild = wild
            .into_iter()
            .zip(sets)
            .map(|(value, set)| match value {
                Some(value) => Some(value),
                None if set.len() == 1 => set.iter().next().cloned(),
                None => None,
            })
            .collect();
        clusters
            .entry(ClusterKey { base, wild })
            .or_default()
            .push(row);
    }
    clusters
}

fn collapse_cluster(
    key: &ClusterKey,
    rows: Vec<ConsolidatedRow>,
    rule: &CollapseRule,
    diagnostics: &mut Diagnostics,
    output: &mut Vec<ConsolidatedRow>,
) {
    let fingerprints = rows
        .iter()
        .map(|row| Fingerprint::of(row, rule))
        .collect::<Vec<_>>();

    let mut sets_by_value: IndexMap<String, BTreeSet<&Fingerprint>> = IndexMap::new();
    let mut buckets: IndexMap<&Fingerprint, Vec<usize>> = IndexMap::new();
    for (index, (row, fingerprint)) in rows.iter().zip(&fingerprints).enumerate() {
        sets_by_value
            .entry(row.record.get_trimmed(rule.dimension).to_string())
            .or_default()
            .insert(fingerprint);
        buckets.entry(fingerprint).or_default().push(index);
    }

    if sets_by_value.len() < 2 {
        output.extend(rows);
        return;
    }

    let mut sets = sets_by_value.values();
    if let Some(first) = sets.next()
        && sets.any(|set| set != first)
    {
        diagnostics.push(
            DiagnosticKind::CollapseAborted,
            format!(
                "cluster {key}: {} values have different fingerprints; kept {} rows",
                rule.dimension,
                rows.len()
            ),
        );
        output.extend(rows);
        return;
    }

    for indices in buckets.values() {
        let contributors = indices.iter().map(|index| &rows[*index]).collect::<Vec<_>>();
        match merge_bucket(&contributors, rule) {
            Ok(merged) => output.push(merged),
            Err(reason) => {
                diagnostics.push(
                    DiagnosticKind::CollapseAborted,
                    format!("cluster {key}: {reason}; kept {} rows", contributors.len()),
                );
                output.extend(contributors.into_iter().cloned());
            }
        }
    }
}

fn merge_bucket(contributors: &[&ConsolidatedRow], rule: &CollapseRule) -> Result<ConsolidatedRow, String> {
    let Some(first) = contributors.first() else {
        return Err("empty bucket".to_string());
    };

    let mut seen = HashSet::new();
    for row in contributors {
        let value = row.record.get_trimmed(rule.dimension);
        if !seen.insert(value) {
            return Err(format!("{} '{value}' contributes more than one row", rule.dimension));
        }
    }

    let signature = |record: &Record| {
        record
            .columns()
            .filter(|field| rule.is_signature_field(field))
            .map(|field| (field.to_string(), rule.field_value(record, field)))
            .collect::<Vec<_>>()
    };
    let base_signature = signature(&first.record);
    for row in &contributors[1..] {
        let row_signature = signature(&row.record);
        if row_signature.len() != base_signature.len() {
            return Err("signature mismatch on column set".to_string());
        }
        if let Some((field, value)) = row_signature
            .into_iter()
            .zip(&base_signature)
            .find_map(|(seen, expected)| (seen != *expected).then_some(seen))
        {
            return Err(format!("signature mismatch on '{field}' ('{value}')"));
        }
    }

    let mut merged = first.record.clone();
    for wildcard in rule.wildcards {
        let values = contributors
            .iter()
            .filter_map(|row| wildcard.concrete(row.record.get(wildcard.field)))
            .collect::<BTreeSet<_>>();
        let mut values = values.into_iter();
        match (values.next(), values.next()) {
            (Some(a), Some(b)) => {
                return Err(format!("conflicting {} values '{a}' and '{b}'", wildcard.field));
            }
            (Some(value), None) => merged.set(wildcard.field, value),
            (None, _) => merged.set(wildcard.field, wildcard.placeholder),
        }
    }

    for field in rule.numeric_fields {
        if !merged.contains(field) {
            continue;
        }
        let mut value = first.record.get_trimmed(field).to_string();
        for row in &contributors[1..] {
            value = union_ranges(&value, row.record.get_trimmed(field))
                .map_err(|mismatch| format!("column '{field}': {mismatch}"))?;
        }
        merged.set(field, value);
    }

    if let Some(tag_field) = rule.tag_field
        && merged.contains(tag_field)
        && contributors
            .iter()
            .any(|row| row.record.get(tag_field) != first.record.get(tag_field))
    {
        let normalized = rule.field_value(&first.record, tag_field);
        merged.set(tag_field, normalized);
    }

    merged.set(
        rule.dimension,
        join_dimension(contributors.iter().map(|row| row.record.get(rule.dimension))),
    );
    tracing::debug!(
        dimension = rule.dimension,
        merged = merged.get(rule.dimension),
        "collapsed bucket"
    );
    Ok(ConsolidatedRow {
        record: merged,
        coverage: first.coverage.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ATK_PHYS, DMG_MV};

    fn coverage(steps: &[u32]) -> BTreeSet<SlotCoord> {
        steps.iter().map(|step| SlotCoord::new(1, 0, *step)).collect()
    }

    fn consolidated(weapon: &str, dmg_type: &str, dmg_mv: &str, steps: &[u32]) -> ConsolidatedRow {
        let mut record = Record::new();
        for field in WEAPON_COLLAPSE.cluster_fields {
            record.set(field, "");
        }
        for field in SERIES_COLUMNS {
            record.set(field, "-");
        }
        record.set(SKILL, "Wild Strikes");
        record.set(HAND, "2h");
        record.set(WEAPON_SOURCE, "category");
        record.set(OVERWRITE_SCALING, "null");
        record.set(SUB_CATEGORY_SUM, "Spin | 2h Attack");
        record.set(WEAPON, weapon);
        record.set(DMG_TYPE, dmg_type);
        record.set(DMG_MV, dmg_mv);
        ConsolidatedRow {
            record,
            coverage: coverage(steps),
        }
    }

    #[test]
    fn symmetric_cluster_merges_with_union_ranges() {
        let rows = vec![
            consolidated("Sword", "Phys", "5, 10", &[1, 2]),
            consolidated("Axe", "Phys", "7, 8", &[1, 2]),
        ];
        let mut diagnostics = Diagnostics::new();
        let merged = collapse_dimension(rows, &WEAPON_COLLAPSE, &mut diagnostics);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].record.get(WEAPON), "Axe | Sword");
        assert_eq!(merged[0].record.get(DMG_MV), "5-7, 8-10");
        assert_eq!(merged[0].record.get(ATK_PHYS), "-");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn differing_slot_coverage_refuses_merge() {
        let rows = vec![
            consolidated("Sword", "Phys", "5, 0", &[1]),
            consolidated("Axe", "Phys", "5, 5", &[1, 2]),
        ];
        let mut diagnostics = Diagnostics::new();
        let output = collapse_dimension(rows.clone(), &WEAPON_COLLAPSE, &mut diagnostics);
        assert_eq!(output, rows);
        assert_eq!(diagnostics.count(DiagnosticKind::CollapseAborted), 1);
    }

    #[test]
    fn asymmetric_fingerprint_sets_leave_whole_cluster_unmerged() {
        let rows = vec![
            consolidated("Sword", "Phys", "5", &[1]),
            consolidated("Sword", "Phys", "1, 2", &[1, 2]),
            consolidated("Axe", "Phys", "6", &[1]),
        ];
        let mut diagnostics = Diagnostics::new();
        let output = collapse_dimension(rows.clone(), &WEAPON_COLLAPSE, &mut diagnostics);
        assert_eq!(output, rows);
    }

    #[test]
    fn wildcard_joins_single_concrete_cluster() {
        let rows = vec![
            consolidated("Sword", "Phys", "5", &[1]),
            consolidated("Axe", "-", "6", &[1]),
        ];
        let mut diagnostics = Diagnostics::new();
        let merged = collapse_dimension(rows, &WEAPON_COLLAPSE, &mut diagnostics);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].record.get(DMG_TYPE), "Phys");
        assert_eq!(merged[0].record.get(OVERWRITE_SCALING), "null");
        assert_eq!(merged[0].record.get(DMG_MV), "5-6");
    }

    #[test]
    fn wildcard_with_several_concrete_values_stays_apart() {
        let rows = vec![
            consolidated("Sword", "Phys", "5", &[1]),
            consolidated("Axe", "Magic", "6", &[1]),
            consolidated("Spear", "-", "7", &[1]),
        ];
        let mut diagnostics = Diagnostics::new();
        let output = collapse_dimension(rows.clone(), &WEAPON_COLLAPSE, &mut diagnostics);
        assert_eq!(output.len(), 3);
        assert!(output.iter().any(|row| row.record.get(DMG_TYPE) == "-"));
    }

    #[test]
    fn duplicate_contribution_aborts_bucket() {
        let rows = vec![
            consolidated("Sword", "Phys", "5", &[1]),
            consolidated("Sword", "Phys", "4", &[1]),
            consolidated("Axe", "Phys", "6", &[1]),
        ];
        let mut diagnostics = Diagnostics::new();
        let output = collapse_dimension(rows, &WEAPON_COLLAPSE, &mut diagnostics);
        assert_eq!(output.len(), 3);
        assert!(diagnostics.messages(DiagnosticKind::CollapseAborted)[0]
            .contains("contributes more than one row"));
    }

    #[test]
    fn hand_implied_tag_is_ignored_for_clustering() {
        let mut axe = consolidated("Axe", "Phys", "6", &[1]);
        axe.record.set(SUB_CATEGORY_SUM, "Spin");
        let rows = vec![consolidated("Sword", "Phys", "5", &[1]), axe];
        let mut diagnostics = Diagnostics::new();
        let merged = collapse_dimension(rows, &WEAPON_COLLAPSE, &mut diagnostics);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].record.get(SUB_CATEGORY_SUM), "Spin");
        assert_eq!(normalize_tags("Spin | 1h Attack", "2h"), "Spin | 1h Attack");
    }

    #[test]
    fn already_joined_dimension_values_are_split_before_joining() {
        let rows = vec![
            consolidated("Sword | dagger", "Phys", "5", &[1]),
            consolidated("Axe", "Phys", "6", &[1]),
        ];
        let mut diagnostics = Diagnostics::new();
        let merged = collapse_dimension(rows, &WEAPON_COLLAPSE, &mut diagnostics);
        assert_eq!(merged[0].record.get(WEAPON), "Axe | dagger | Sword");
    }
}
