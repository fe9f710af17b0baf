use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};

use crate::record::{Record, Table};

pub fn read_table(path: &Path) -> Result<Table> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_csv(&content))
}

/// Reads `path` if it exists; a missing file is an empty table.
pub fn read_table_if_exists(path: &Path) -> Result<Option<Table>> {
    if !path.exists() {
        return Ok(None);
    }
    read_table(path).map(Some)
}

pub fn parse_csv(content: &str) -> Table {
    let rows = parse_csv_rows(strip_bom(content), ',');
    let Some(header) = rows.first() else {
        return Table::default();
    };

    let columns = header
        .iter()
        .map(|value| value.trim().to_string())
        .collect::<Vec<_>>();

    let mut output = Vec::new();
    for row in rows.iter().skip(1) {
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        let mut record = Record::new();
        for (index, column) in columns.iter().enumerate() {
            if column.is_empty() {
                continue;
            }
            record.set(column, row.get(index).cloned().unwrap_or_default());
        }
        output.push(record);
    }
    Table::new(
        columns.into_iter().filter(|column| !column.is_empty()).collect(),
        output,
    )
}

pub fn render_csv(table: &Table) -> String {
    let mut out = String::new();
    push_csv_line(&mut out, table.columns.iter().map(String::as_str));
    for row in &table.rows {
        push_csv_line(&mut out, table.columns.iter().map(|column| row.get(column)));
    }
    out
}

/// Writes the table and returns the SHA-256 of the bytes written.
pub fn write_table(path: &Path, table: &Table) -> Result<String> {
    if table.columns.is_empty() {
        bail!("refusing to write {} without columns", path.display());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let rendered = render_csv(table);
    fs::write(path, &rendered).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(compute_hash(&rendered))
}

pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn push_csv_line<'a>(out: &mut String, values: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for value in values {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_csv_field(value));
    }
    out.push_str("\r\n");
}

fn escape_csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn parse_csv_rows(content: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let chars = content.chars().collect::<Vec<_>>();
    let mut index = 0usize;

    while index < chars.len() {
        let ch = chars[index];
        if in_quotes {
            if ch == '"' {
                if index + 1 < chars.len() && chars[index + 1] == '"' {
                    field.push('"');
                    index += 2;
                    continue;
                }
                in_quotes = false;
                index += 1;
                continue;
            }
            field.push(ch);
            index += 1;
            continue;
        }

        if ch == '"' {
            in_quotes = true;
            index += 1;
            continue;
        }
        if ch == delimiter {
            row.push(std::mem::take(&mut field));
            index += 1;
            continue;
        }
        if ch == '\n' || ch == '\r' {
            row.push(std::mem::take(&mut field));
            if ch == '\r' && index + 1 < chars.len() && chars[index + 1] == '\n' {
                index += 1;
            }
            rows.push(std::mem::take(&mut row));
            index += 1;
            continue;
        }
        field.push(ch);
        index += 1;
    }

    row.push(field);
    if row.len() > 1 || row.first().is_some_and(|value| !value.trim().is_empty()) {
        rows.push(row);
    }
    rows
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{parse_csv, read_table, read_table_if_exists, render_csv, write_table};
    use crate::record::{Record, Table};

    #[test]
    fn parse_csv_supports_quotes_and_newlines() {
        let table = parse_csv(
            "\u{feff}Skill,Weapon\nAlpha,\"Sword | Axe\"\n\"Beta\",\"has \"\"quotes\"\"\nand lines\"\n",
        );
        assert_eq!(table.columns, vec!["Skill", "Weapon"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("Weapon"), "Sword | Axe");
        assert_eq!(table.rows[1].get("Weapon"), "has \"quotes\"\nand lines");
    }

    #[test]
    fn parse_csv_skips_blank_rows_and_pads_short_rows() {
        let table = parse_csv("A,B,C\n1,2\n,,\n");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("C"), "");
        assert!(table.rows[0].contains("C"));
    }

    #[test]
    fn render_csv_quotes_fields_that_need_it() {
        let table = Table::new(
            vec!["Dmg MV".to_string(), "Weapon".to_string()],
            vec![Record::from_pairs([
                ("Dmg MV", "1, 2 [3]"),
                ("Weapon", "Say \"hi\""),
            ])],
        );
        let rendered = render_csv(&table);
        assert_eq!(rendered, "Dmg MV,Weapon\r\n\"1, 2 [3]\",\"Say \"\"hi\"\"\"\r\n");
        assert_eq!(parse_csv(&rendered), table);
    }

    #[test]
    fn write_table_creates_parents_and_hashes_deterministically() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("out.csv");
        let table = Table::new(
            vec!["Skill".to_string()],
            vec![Record::from_pairs([("Skill", "Glintblade Phalanx")])],
        );
        let first = write_table(&path, &table).expect("write");
        let second = write_table(&path, &table).expect("rewrite");
        assert_eq!(first, second);
        assert_eq!(read_table(&path).expect("read"), table);
    }

    #[test]
    fn read_table_if_exists_returns_none_for_missing_file() {
        let temp = tempdir().expect("tempdir");
        let missing = read_table_if_exists(&temp.path().join("missing.csv")).expect("read");
        assert!(missing.is_none());
    }
}
