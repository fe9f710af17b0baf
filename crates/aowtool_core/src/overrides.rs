use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::record::Record;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OverridesFile {
    Legacy(Vec<ForceEntry>),
    Extended(ExtendedFile),
}

#[derive(Debug, Default, Deserialize)]
struct ExtendedFile {
    #[serde(default)]
    force_collapse: Vec<ForceEntry>,
    #[serde(default)]
    blacklist: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ForceEntry {
    Names(Vec<String>),
    Detailed {
        names: Vec<String>,
        #[serde(default)]
        overrides: BTreeMap<String, String>,
    },
}

/// Rows listed together by Name that must fold into one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedGroup {
    /// Sorted member names joined by `" | "`.
    pub id: String,
    pub names: Vec<String>,
    pub overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    groups: Vec<ForcedGroup>,
    by_name: HashMap<String, usize>,
    blacklist: BTreeMap<String, BTreeSet<String>>,
}

impl Overrides {
    /// Loads an overrides file; a missing file means no overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no overrides file");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("failed to parse overrides file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: OverridesFile =
            serde_json::from_str(content).context("expected a list of name groups or an object")?;
        let (entries, blacklist) = match file {
            OverridesFile::Legacy(entries) => (entries, BTreeMap::new()),
            OverridesFile::Extended(file) => (file.force_collapse, file.blacklist),
        };

        let mut overrides = Self {
            blacklist: blacklist
                .into_iter()
                .map(|(field, values)| (field, values.into_iter().collect()))
                .collect(),
            ..Self::default()
        };
        for entry in entries {
            let (names, field_overrides) = match entry {
                ForceEntry::Names(names) => (names, BTreeMap::new()),
                ForceEntry::Detailed { names, overrides } => (names, overrides),
            };
            overrides.add_group(names, field_overrides);
        }
        Ok(overrides)
    }

    fn add_group(&mut self, names: Vec<String>, field_overrides: BTreeMap<String, String>) {
        let mut names = names
            .into_iter()
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>();
        if names.len() < 2 {
            tracing::debug!(?names, "ignoring force-collapse entry with fewer than two names");
            return;
        }
        names.sort();
        names.dedup();
        let index = self.groups.len();
        for name in &names {
            if self.by_name.insert(name.clone(), index).is_some() {
                tracing::debug!(%name, "name listed in several force-collapse groups; last wins");
            }
        }
        self.groups.push(ForcedGroup {
            id: names.join(" | "),
            names,
            overrides: field_overrides,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.blacklist.is_empty()
    }

    pub fn groups(&self) -> &[ForcedGroup] {
        &self.groups
    }

    pub fn group_for(&self, name: &str) -> Option<&ForcedGroup> {
        self.by_name.get(name).map(|index| &self.groups[*index])
    }

    /// Blanks blacklisted literals in place and returns how many cells changed.
    pub fn apply_blacklist(&self, record: &mut Record) -> usize {
        let mut blanked = 0;
        for (field, forbidden) in &self.blacklist {
            if record.contains(field) && forbidden.contains(record.get_trimmed(field)) {
                record.set(field, "");
                blanked += 1;
            }
        }
        blanked
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::Overrides;
    use crate::record::Record;

    #[test]
    fn legacy_list_builds_sorted_group_ids() {
        let overrides =
            Overrides::parse(r#"[["Zeta Slash", "Alpha Slash"], ["Lonely"], ["", "Only"]]"#)
                .expect("parse");
        assert_eq!(overrides.groups().len(), 1);
        let group = overrides.group_for("Zeta Slash").expect("group");
        assert_eq!(group.id, "Alpha Slash | Zeta Slash");
        assert!(group.overrides.is_empty());
        assert!(overrides.group_for("Lonely").is_none());
    }

    #[test]
    fn extended_form_carries_overrides_and_blacklist() {
        let overrides = Overrides::parse(
            r#"{
                "force_collapse": [
                    ["A", "B"],
                    {"names": ["C", "D"], "overrides": {"Part": "Slash"}}
                ],
                "blacklist": {"subCategory1": ["Unknown", "TBD"]}
            }"#,
        )
        .expect("parse");
        assert_eq!(overrides.groups().len(), 2);
        let detailed = overrides.group_for("D").expect("group");
        assert_eq!(detailed.overrides.get("Part").map(String::as_str), Some("Slash"));

        let mut row = Record::from_pairs([("subCategory1", "TBD"), ("subCategory2", "TBD")]);
        assert_eq!(overrides.apply_blacklist(&mut row), 1);
        assert_eq!(row.get("subCategory1"), "");
        assert_eq!(row.get("subCategory2"), "TBD");
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(Overrides::parse(r#""just a string""#).is_err());
        assert!(Overrides::parse("{not json").is_err());
    }

    #[test]
    fn load_treats_missing_file_as_empty() {
        let temp = tempdir().expect("tempdir");
        let missing = Overrides::load(&temp.path().join("force.json")).expect("load");
        assert!(missing.is_empty());

        let path = temp.path().join("present.json");
        fs::write(&path, r#"[["A", "B"]]"#).expect("write");
        let loaded = Overrides::load(&path).expect("load");
        assert!(loaded.group_for("A").is_some());
    }
}
