use std::collections::{BTreeMap, BTreeSet};

use similar::{ChangeTag, TextDiff};

use crate::record::{Record, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaOptions {
    pub label: String,
    pub max_list: usize,
    pub align_columns: bool,
    pub verbose: bool,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            label: "Row".to_string(),
            max_list: 50,
            align_columns: true,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaReport {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub lines: Vec<String>,
}

impl DeltaReport {
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0
    }
}

type Key = Vec<String>;

/// Compares the previous table with freshly built rows, keyed by `key_fields`.
///
/// Rows are compared by their values over `after.columns`. Without a previous
/// table there is nothing to compare and the report is empty.
pub fn report_row_deltas(
    before: Option<&Table>,
    after: &Table,
    key_fields: &[&str],
    options: &DeltaOptions,
) -> DeltaReport {
    let Some(before) = before else {
        return DeltaReport::default();
    };

    let before_map = rows_by_key(&before.rows, key_fields);
    let after_map = rows_by_key(&after.rows, key_fields);
    let all_keys = before_map
        .keys()
        .chain(after_map.keys())
        .cloned()
        .collect::<BTreeSet<_>>();

    let mut added_entries: Vec<(Key, usize)> = Vec::new();
    let mut removed_entries: Vec<(Key, usize)> = Vec::new();
    let mut changed_keys: Vec<Key> = Vec::new();
    let mut details: Vec<(Key, Vec<String>)> = Vec::new();
    let empty = Vec::new();

    for key in all_keys {
        let before_rows = before_map.get(&key).unwrap_or(&empty);
        let after_rows = after_map.get(&key).unwrap_or(&empty);
        if before_rows.is_empty() {
            added_entries.push((key, after_rows.len()));
            continue;
        }
        if after_rows.is_empty() {
            removed_entries.push((key, before_rows.len()));
            continue;
        }

        let before_counts = count_rows(before_rows, &after.columns);
        let after_counts = count_rows(after_rows, &after.columns);
        if before_counts == after_counts {
            continue;
        }
        let delta_added = surplus(&after_counts, &before_counts);
        let delta_removed = surplus(&before_counts, &after_counts);
        if delta_added > 0 {
            added_entries.push((key.clone(), delta_added));
        }
        if delta_removed > 0 {
            removed_entries.push((key.clone(), delta_removed));
        }
        if options.verbose && before_rows.len() == 1 && after_rows.len() == 1 {
            details.push((
                key.clone(),
                row_diff(before_rows[0], after_rows[0], &after.columns),
            ));
        }
        changed_keys.push(key);
    }

    let widths = if options.align_columns {
        column_widths(
            added_entries
                .iter()
                .map(|(key, _)| key)
                .chain(removed_entries.iter().map(|(key, _)| key))
                .chain(changed_keys.iter()),
        )
    } else {
        None
    };
    let format_entry = |(key, count): &(Key, usize)| {
        let label = format_key(key, widths.as_deref());
        if *count > 1 {
            format!("{label} (x{count})")
        } else {
            label
        }
    };

    let mut added = added_entries.iter().map(format_entry).collect::<Vec<_>>();
    let mut removed = removed_entries.iter().map(format_entry).collect::<Vec<_>>();
    let mut changed = changed_keys
        .iter()
        .map(|key| format_key(key, widths.as_deref()))
        .collect::<Vec<_>>();
    let mut report = DeltaReport {
        added: added.len(),
        removed: removed.len(),
        changed: changed.len(),
        lines: Vec::new(),
    };

    let total = report.added + report.removed + report.changed;
    if total == 0 {
        report
            .lines
            .push("No row content changes detected.".to_string());
        return report;
    }
    report.lines.push(format!(
        "{} deltas: added={}, removed={}, changed={}",
        options.label, report.added, report.removed, report.changed
    ));
    if total > options.max_list {
        return report;
    }
    for (title, entries) in [
        ("Added", &mut added),
        ("Removed", &mut removed),
        ("Changed", &mut changed),
    ] {
        if entries.is_empty() {
            continue;
        }
        entries.sort();
        report.lines.push(format!("  {title}:"));
        report
            .lines
            .extend(entries.iter().map(|entry| format!("    - {entry}")));
    }
    for (key, lines) in details {
        report
            .lines
            .push(format!("  Diff {}:", format_key(&key, None)));
        report.lines.extend(lines);
    }
    report
}

fn rows_by_key<'a>(rows: &'a [Record], key_fields: &[&str]) -> BTreeMap<Key, Vec<&'a Record>> {
    let mut map: BTreeMap<Key, Vec<&Record>> = BTreeMap::new();
    for row in rows {
        map.entry(row.key(key_fields).0).or_default().push(row);
    }
    map
}

fn count_rows(rows: &[&Record], columns: &[String]) -> BTreeMap<Vec<String>, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        let values = columns
            .iter()
            .map(|column| row.get(column).to_string())
            .collect::<Vec<_>>();
        *counts.entry(values).or_insert(0) += 1;
    }
    counts
}

/// Multiset difference size `|left - right|`.
fn surplus(left: &BTreeMap<Vec<String>, usize>, right: &BTreeMap<Vec<String>, usize>) -> usize {
    left.iter()
        .map(|(values, count)| count.saturating_sub(right.get(values).copied().unwrap_or(0)))
        .sum()
}

fn column_widths<'a>(keys: impl Iterator<Item = &'a Key>) -> Option<Vec<usize>> {
    let mut widths: Vec<usize> = Vec::new();
    for key in keys {
        if widths.len() < key.len() {
            widths.resize(key.len(), 0);
        }
        for (width, part) in widths.iter_mut().zip(key) {
            *width = (*width).max(part.chars().count());
        }
    }
    (!widths.is_empty()).then_some(widths)
}

fn format_key(key: &[String], widths: Option<&[usize]>) -> String {
    if let Some(widths) = widths {
        let padded = key
            .iter()
            .enumerate()
            .map(|(index, part)| {
                let width = widths.get(index).copied().unwrap_or(0);
                format!("{part:<width$}")
            })
            .collect::<Vec<_>>();
        return padded.join(" | ").trim_end().to_string();
    }
    let text = key
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" | ");
    if text.is_empty() {
        "<empty>".to_string()
    } else {
        text
    }
}

fn row_diff(before: &Record, after: &Record, columns: &[String]) -> Vec<String> {
    let render = |row: &Record| {
        columns
            .iter()
            .map(|column| format!("{column}: {}\n", row.get(column)))
            .collect::<String>()
    };
    let old = render(before);
    let new = render(after);
    let diff = TextDiff::from_lines(&old, &new);
    diff.iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => return None,
            };
            Some(format!("      {sign} {}", change.value().trim_end()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &str, &str)]) -> Table {
        Table::new(
            vec!["Skill".to_string(), "Part".to_string(), "Dmg MV".to_string()],
            rows.iter()
                .map(|(skill, part, mv)| {
                    Record::from_pairs([("Skill", *skill), ("Part", *part), ("Dmg MV", *mv)])
                })
                .collect(),
        )
    }

    #[test]
    fn missing_previous_table_reports_nothing() {
        let after = table(&[("Quickstep", "", "0")]);
        let report = report_row_deltas(None, &after, &["Skill"], &DeltaOptions::default());
        assert!(report.lines.is_empty());
        assert!(report.is_unchanged());
    }

    #[test]
    fn identical_tables_report_no_changes() {
        let before = table(&[("Quickstep", "", "0")]);
        let report =
            report_row_deltas(Some(&before), &before, &["Skill"], &DeltaOptions::default());
        assert_eq!(report.lines, vec!["No row content changes detected."]);
    }

    #[test]
    fn counts_added_removed_and_changed_keys() {
        let before = table(&[
            ("Storm Blade", "Wave", "1"),
            ("Lion's Claw", "", "2"),
            ("Lion's Claw", "", "2"),
        ]);
        let after = table(&[
            ("Storm Blade", "Wave", "1.5"),
            ("Glintblade Phalanx", "Blade", "0.5"),
        ]);
        let options = DeltaOptions {
            verbose: true,
            ..DeltaOptions::default()
        };
        let report = report_row_deltas(Some(&before), &after, &["Skill", "Part"], &options);
        assert_eq!((report.added, report.removed, report.changed), (2, 2, 1));
        assert_eq!(report.lines[0], "Row deltas: added=2, removed=2, changed=1");
        assert!(report.lines.contains(&"  Added:".to_string()));
        assert!(report.lines.iter().any(|line| line.contains("Lion's Claw") && line.ends_with("(x2)")));
        assert!(report.lines.iter().any(|line| line == "      - Dmg MV: 1"));
        assert!(report.lines.iter().any(|line| line == "      + Dmg MV: 1.5"));
    }

    #[test]
    fn long_lists_collapse_to_counts() {
        let before = table(&[("A", "", "1"), ("B", "", "1")]);
        let after = table(&[("C", "", "1"), ("D", "", "1")]);
        let options = DeltaOptions {
            max_list: 3,
            label: "Stage 3".to_string(),
            ..DeltaOptions::default()
        };
        let report = report_row_deltas(Some(&before), &after, &["Skill"], &options);
        assert_eq!(report.lines, vec!["Stage 3 deltas: added=2, removed=2, changed=0"]);
    }

    #[test]
    fn aligned_keys_pad_every_column() {
        let key = vec!["Ab".to_string(), "c".to_string()];
        assert_eq!(format_key(&key, Some(&[4, 3][..])), "Ab   | c");
        assert_eq!(format_key(&["".to_string()], None), "<empty>");
    }
}
