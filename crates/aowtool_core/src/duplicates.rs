use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use indexmap::IndexMap;

use crate::record::{GroupKey, PART, SKILL, Table};
use crate::table::read_table;

/// Columns every duplicate check matches on.
pub const BASE_MATCH_FIELDS: [&str; 2] = [SKILL, PART];

const BLANK_VALUE: &str = "-";
const STAGE_FILE_PREFIX: &str = "aow-data-";
const STAGE_FILE_SUFFIX: &str = ".csv";

/// One key seen on more than one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub key: GroupKey,
    pub count: usize,
    /// CSV line of the first occurrence; the header is line 1.
    pub first_line: usize,
}

#[derive(Debug, Clone)]
pub struct DuplicateReport {
    pub input: PathBuf,
    pub match_fields: Vec<String>,
    pub groups: Vec<DuplicateGroup>,
}

/// Skill and Part followed by the extra columns. Each entry may hold several
/// comma-separated names; blanks and repeats are dropped.
pub fn match_fields(extra: &[String]) -> Vec<String> {
    let mut fields = BASE_MATCH_FIELDS
        .iter()
        .map(|field| field.to_string())
        .collect::<Vec<_>>();
    for name in extra.iter().flat_map(|entry| entry.split(',')) {
        let name = name.trim();
        if !name.is_empty() && !fields.iter().any(|field| field == name) {
            fields.push(name.to_string());
        }
    }
    fields
}

/// Groups rows by `fields` and returns keys seen more than once, most
/// frequent first, then by first line, then by lowercased key.
pub fn find_duplicates(table: &Table, fields: &[String]) -> Result<Vec<DuplicateGroup>> {
    let missing = fields
        .iter()
        .filter(|field| !table.has_column(field))
        .map(String::as_str)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!("missing required columns: {}", missing.join(", "));
    }

    let field_refs = fields.iter().map(String::as_str).collect::<Vec<_>>();
    let mut seen: IndexMap<GroupKey, (usize, usize)> = IndexMap::new();
    for (index, row) in table.rows.iter().enumerate() {
        let key = normalize_key(row.key(&field_refs));
        let entry = seen.entry(key).or_insert((0, index + 2));
        entry.0 += 1;
    }

    let mut groups = seen
        .into_iter()
        .filter(|(_, (count, _))| *count > 1)
        .map(|(key, (count, first_line))| DuplicateGroup {
            key,
            count,
            first_line,
        })
        .collect::<Vec<_>>();
    groups.sort_by(|left, right| {
        right
            .count
            .cmp(&left.count)
            .then(left.first_line.cmp(&right.first_line))
            .then_with(|| lowercase_key(&left.key).cmp(&lowercase_key(&right.key)))
    });
    tracing::debug!(rows = table.rows.len(), duplicates = groups.len(), "scanned for duplicates");
    Ok(groups)
}

/// The `AoW-data-<n>.csv` in `dir` with the highest `n`.
pub fn latest_stage_table(dir: &Path) -> Result<Option<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?;
    let mut latest: Option<(u32, PathBuf)> = None;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        let Some(index) = name
            .strip_prefix(STAGE_FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(STAGE_FILE_SUFFIX))
            .and_then(|digits| digits.parse::<u32>().ok())
        else {
            continue;
        };
        if latest.as_ref().is_none_or(|(best, _)| index > *best) {
            latest = Some((index, entry.path()));
        }
    }
    Ok(latest.map(|(_, path)| path))
}

/// Reads `input` and reports duplicate keys over Skill, Part and `extra`.
pub fn scan_duplicates(input: &Path, extra: &[String]) -> Result<DuplicateReport> {
    let table = read_table(input)?;
    let match_fields = match_fields(extra);
    let groups = find_duplicates(&table, &match_fields)
        .map_err(|error| anyhow!("{error} in {}", input.display()))?;
    Ok(DuplicateReport {
        input: input.to_path_buf(),
        match_fields,
        groups,
    })
}

/// `<line> <label>: <count>` with line numbers right-aligned. The label is
/// Skill and Part unless `full_key` asks for every matched column.
pub fn render_groups(groups: &[DuplicateGroup], full_key: bool) -> Vec<String> {
    let width = groups
        .iter()
        .map(|group| group.first_line.to_string().len())
        .max()
        .unwrap_or(1);
    groups
        .iter()
        .map(|group| {
            let parts = if full_key {
                &group.key.0[..]
            } else {
                &group.key.0[..group.key.0.len().min(BASE_MATCH_FIELDS.len())]
            };
            format!(
                "{:>width$} {}: {}",
                group.first_line,
                parts.join(" | "),
                group.count
            )
        })
        .collect()
}

fn normalize_key(key: GroupKey) -> GroupKey {
    GroupKey(
        key.0
            .into_iter()
            .map(|value| {
                let value = value.trim();
                if value.is_empty() {
                    BLANK_VALUE.to_string()
                } else {
                    value.to_string()
                }
            })
            .collect(),
    )
}

fn lowercase_key(key: &GroupKey) -> Vec<String> {
    key.0.iter().map(|part| part.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::table::parse_csv;

    const TABLE: &str = "\
Skill,Part,Weapon,Dmg Type
Quickstep,,Dagger,Phys
Lion's Claw,Slam,Greatsword,Phys
Quickstep, ,Dagger,Fire
Lion's Claw,Slam,Greatsword,Fire
Lion's Claw,Slam,Colossal Axe,Phys
Bloodhound's Step,,Dagger,Phys
";

    fn base_fields() -> Vec<String> {
        match_fields(&[])
    }

    #[test]
    fn groups_sort_by_count_then_first_line() {
        let table = parse_csv(TABLE);
        let groups = find_duplicates(&table, &base_fields()).expect("scan");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.0, vec!["Lion's Claw", "Slam"]);
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[0].first_line, 3);
        assert_eq!(groups[1].key.0, vec!["Quickstep", "-"]);
        assert_eq!(groups[1].count, 2);
        assert_eq!(groups[1].first_line, 2);
    }

    #[test]
    fn ignored_columns_widen_the_key() {
        let table = parse_csv(TABLE);
        let fields = match_fields(&["Weapon, Dmg Type".to_string()]);
        assert_eq!(fields, vec!["Skill", "Part", "Weapon", "Dmg Type"]);
        assert!(find_duplicates(&table, &fields).expect("scan").is_empty());

        let by_weapon = match_fields(&["Weapon".to_string(), "Skill".to_string()]);
        assert_eq!(by_weapon, vec!["Skill", "Part", "Weapon"]);
        let groups = find_duplicates(&table, &by_weapon).expect("scan");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.0, vec!["Quickstep", "-", "Dagger"]);
        assert_eq!(groups[1].key.0, vec!["Lion's Claw", "Slam", "Greatsword"]);
    }

    #[test]
    fn missing_match_column_is_fatal() {
        let table = parse_csv(TABLE);
        let fields = match_fields(&["Hand".to_string()]);
        let error = find_duplicates(&table, &fields).expect_err("must fail");
        assert_eq!(error.to_string(), "missing required columns: Hand");
    }

    #[test]
    fn render_right_aligns_lines_and_trims_label() {
        let groups = vec![
            DuplicateGroup {
                key: GroupKey(vec!["Quickstep".into(), "-".into(), "Dagger".into()]),
                count: 4,
                first_line: 9,
            },
            DuplicateGroup {
                key: GroupKey(vec!["Lion's Claw".into(), "Slam".into(), "Axe".into()]),
                count: 2,
                first_line: 120,
            },
        ];
        assert_eq!(
            render_groups(&groups, false),
            vec!["  9 Quickstep | -: 4", "120 Lion's Claw | Slam: 2"]
        );
        assert_eq!(render_groups(&groups, true)[0], "  9 Quickstep | - | Dagger: 4");
    }

    #[test]
    fn latest_stage_table_picks_highest_index() {
        let temp = tempdir().expect("tempdir");
        for name in ["AoW-data-1.csv", "AoW-data-3.csv", "AoW-data-12.csv", "AoW-data-x.csv"] {
            fs::write(temp.path().join(name), "Skill,Part\n").expect("write");
        }
        fs::write(temp.path().join("notes.txt"), "").expect("write");
        let latest = latest_stage_table(temp.path()).expect("scan dir");
        assert_eq!(latest, Some(temp.path().join("AoW-data-12.csv")));

        let empty = tempdir().expect("tempdir");
        assert_eq!(latest_stage_table(empty.path()).expect("scan dir"), None);
    }

    #[test]
    fn scan_names_the_input_on_missing_columns() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("AoW-data-2.csv");
        fs::write(&path, "Skill,Weapon\nQuickstep,Dagger\n").expect("write");
        let error = scan_duplicates(&path, &[]).expect_err("must fail");
        assert_eq!(
            error.to_string(),
            format!("missing required columns: Part in {}", path.display())
        );
    }
}
