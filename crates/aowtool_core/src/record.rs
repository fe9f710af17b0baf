use indexmap::IndexMap;

use crate::tokens::parse_scalar;

pub const NAME: &str = "Name";
pub const SKILL: &str = "Skill";
pub const FOLLOW_UP: &str = "Follow-up";
pub const HAND: &str = "Hand";
pub const PART: &str = "Part";
pub const FP: &str = "FP";
pub const CHARGED: &str = "Charged";
pub const STEP: &str = "Step";
pub const BULLET: &str = "Bullet";
pub const TICK: &str = "Tick";
pub const ATK_ID: &str = "AtkId";
pub const WEAPON_SOURCE: &str = "Weapon Source";
pub const WEAPON: &str = "Weapon";
pub const WEAPON_POISE: &str = "Weapon Poise";
pub const WEP_POISE_RANGE: &str = "Wep Poise Range";
pub const DISABLE_GEM_ATTR: &str = "Disable Gem Attr";
pub const WEP_PHYS: &str = "Wep Phys";
pub const WEP_MAGIC: &str = "Wep Magic";
pub const WEP_FIRE: &str = "Wep Fire";
pub const WEP_LTNG: &str = "Wep Ltng";
pub const WEP_HOLY: &str = "Wep Holy";
pub const PHYS_MV: &str = "Phys MV";
pub const MAGIC_MV: &str = "Magic MV";
pub const FIRE_MV: &str = "Fire MV";
pub const LTNG_MV: &str = "Ltng MV";
pub const HOLY_MV: &str = "Holy MV";
pub const DMG_TYPE: &str = "Dmg Type";
pub const DMG_MV: &str = "Dmg MV";
pub const STATUS_MV: &str = "Status MV";
pub const WEP_STATUS: &str = "Wep Status";
pub const WEAPON_BUFF_MV: &str = "Weapon Buff MV";
pub const POISE_DMG_MV: &str = "Poise Dmg MV";
pub const STANCE_DMG: &str = "Stance Dmg";
pub const PHYS_ATK_ATTRIBUTE: &str = "PhysAtkAttribute";
pub const ATK_PHYS: &str = "AtkPhys";
pub const ATK_MAG: &str = "AtkMag";
pub const ATK_FIRE: &str = "AtkFire";
pub const ATK_LTNG: &str = "AtkLtng";
pub const ATK_HOLY: &str = "AtkHoly";
pub const ATK_SUPER_ARMOR: &str = "AtkSuperArmor";
pub const IS_ADD_BASE_ATK: &str = "isAddBaseAtk";
pub const OVERWRITE_SCALING: &str = "Overwrite Scaling";
pub const SUB_CATEGORIES: [&str; 4] = ["subCategory1", "subCategory2", "subCategory3", "subCategory4"];
pub const SUB_CATEGORY_SUM: &str = "subCategorySum";

/// Highest step a slot series lays out. Larger steps read as step 1.
pub const MAX_STEP: u32 = 64;

/// Numeric columns rendered as slot series in the consolidated table.
pub const SERIES_COLUMNS: [&str; 9] = [
    DMG_MV,
    STATUS_MV,
    WEAPON_BUFF_MV,
    STANCE_DMG,
    ATK_PHYS,
    ATK_MAG,
    ATK_FIRE,
    ATK_LTNG,
    ATK_HOLY,
];

/// The five damage elements in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    Phys,
    Magic,
    Fire,
    Ltng,
    Holy,
}

impl Element {
    pub const ALL: [Element; 5] = [
        Element::Phys,
        Element::Magic,
        Element::Fire,
        Element::Ltng,
        Element::Holy,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Phys => "Phys",
            Self::Magic => "Magic",
            Self::Fire => "Fire",
            Self::Ltng => "Ltng",
            Self::Holy => "Holy",
        }
    }

    pub fn mv_column(self) -> &'static str {
        match self {
            Self::Phys => PHYS_MV,
            Self::Magic => MAGIC_MV,
            Self::Fire => FIRE_MV,
            Self::Ltng => LTNG_MV,
            Self::Holy => HOLY_MV,
        }
    }

    pub fn weapon_base_column(self) -> &'static str {
        match self {
            Self::Phys => WEP_PHYS,
            Self::Magic => WEP_MAGIC,
            Self::Fire => WEP_FIRE,
            Self::Ltng => WEP_LTNG,
            Self::Holy => WEP_HOLY,
        }
    }
}

/// (FP tier, charged, step) coordinate of one sub-hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotCoord {
    pub fp: u8,
    pub charged: u8,
    pub step: u32,
}

impl SlotCoord {
    pub fn new(fp: u8, charged: u8, step: u32) -> Self {
        Self { fp, charged, step }
    }
}

/// One table row. Column order follows insertion; absent columns read as "".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn get_trimmed(&self, column: &str) -> &str {
        self.get(column).trim()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.fields.insert(column.to_string(), value.into());
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Projects the record onto `columns`, filling absent columns with "".
    pub fn project(&self, columns: &[String]) -> Record {
        Record::from_pairs(
            columns
                .iter()
                .map(|column| (column.clone(), self.get(column).to_string())),
        )
    }

    pub fn key(&self, fields: &[&str]) -> GroupKey {
        GroupKey(fields.iter().map(|field| self.get(field).to_string()).collect())
    }

    /// Scalar value of a numeric column; blank, "-" and garbage read as zero.
    pub fn scalar(&self, column: &str) -> f64 {
        parse_scalar(self.get(column)).unwrap_or(0.0)
    }

    /// Missing or blank FP means the attack is paid for (flag 1).
    pub fn fp_flag(&self) -> u8 {
        if self.get_trimmed(FP) == "0" { 0 } else { 1 }
    }

    pub fn charged_flag(&self) -> u8 {
        if self.get_trimmed(CHARGED) == "1" { 1 } else { 0 }
    }

    /// Step within `1..=MAX_STEP`; anything else reads as step 1.
    pub fn step(&self) -> u32 {
        self.parsed_step()
            .filter(|step| (1..=MAX_STEP).contains(step))
            .unwrap_or(1)
    }

    /// True when Step holds a number past [`MAX_STEP`].
    pub fn step_out_of_range(&self) -> bool {
        self.parsed_step().is_some_and(|step| step > MAX_STEP)
    }

    fn parsed_step(&self) -> Option<u32> {
        self.get_trimmed(STEP).parse::<u32>().ok()
    }

    pub fn slot(&self) -> SlotCoord {
        SlotCoord::new(self.fp_flag(), self.charged_flag(), self.step())
    }
}

/// Ordered tuple of categorical values identifying a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(pub Vec<String>);

impl GroupKey {
    pub fn display(&self) -> String {
        let text = self
            .0
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
}

/// A table: header order plus rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|name| name == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_accessors_apply_defaults() {
        let blank = Record::new();
        assert_eq!(blank.slot(), SlotCoord::new(1, 0, 1));

        let row = Record::from_pairs([(FP, "0"), (CHARGED, "1"), (STEP, "3")]);
        assert_eq!(row.slot(), SlotCoord::new(0, 1, 3));

        let odd = Record::from_pairs([(FP, "x"), (CHARGED, "yes"), (STEP, "0")]);
        assert_eq!(odd.slot(), SlotCoord::new(1, 0, 1));
    }

    #[test]
    fn oversized_step_falls_back_to_one() {
        let capped = Record::from_pairs([(STEP, "64")]);
        assert_eq!(capped.step(), MAX_STEP);
        assert!(!capped.step_out_of_range());

        let huge = Record::from_pairs([(STEP, "4000000000")]);
        assert_eq!(huge.step(), 1);
        assert!(huge.step_out_of_range());

        let garbage = Record::from_pairs([(STEP, "x")]);
        assert!(!garbage.step_out_of_range());
    }

    #[test]
    fn project_fills_missing_columns() {
        let row = Record::from_pairs([(SKILL, "Lion's Claw")]);
        let projected = row.project(&[SKILL.to_string(), BULLET.to_string()]);
        assert_eq!(projected.get(SKILL), "Lion's Claw");
        assert!(projected.contains(BULLET));
        assert_eq!(projected.get(BULLET), "");
    }

    #[test]
    fn group_key_display_skips_blanks() {
        let key = GroupKey(vec!["Skill".into(), String::new(), "2h".into()]);
        assert_eq!(key.display(), "Skill | 2h");
        assert_eq!(GroupKey(vec![String::new()]).display(), "<empty>");
    }
}
