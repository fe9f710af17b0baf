use indexmap::IndexMap;

use crate::record::{FOLLOW_UP, GroupKey, HAND, Record, SKILL, SlotCoord, WEAPON};

/// Fields that define a layout scope: every part of a skill on one weapon
/// renders against the same slot grid.
pub const LAYOUT_SCOPE_FIELDS: [&str; 4] = [SKILL, FOLLOW_UP, HAND, WEAPON];

/// Which slots exist in a scope. Width depends only on presence, never on the
/// column being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub max_step: u32,
    pub has_fp0: bool,
    pub has_fp1: bool,
    pub has_charged: bool,
}

impl Default for SlotLayout {
    fn default() -> Self {
        Self {
            max_step: 1,
            has_fp0: false,
            has_fp1: false,
            has_charged: false,
        }
    }
}

impl SlotLayout {
    pub fn from_coords(coords: impl IntoIterator<Item = SlotCoord>) -> Self {
        let mut layout = Self::default();
        for coord in coords {
            layout.observe(coord);
        }
        layout
    }

    pub fn observe(&mut self, coord: SlotCoord) {
        self.max_step = self.max_step.max(coord.step);
        if coord.fp == 0 {
            self.has_fp0 = true;
        } else {
            self.has_fp1 = true;
        }
        if coord.charged == 1 {
            self.has_charged = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.has_fp0 && !self.has_fp1
    }
}

pub fn layout_scope(row: &Record) -> GroupKey {
    row.key(&LAYOUT_SCOPE_FIELDS)
}

pub fn build_layout<F>(rows: &[Record], scope_fn: F) -> IndexMap<GroupKey, SlotLayout>
where
    F: Fn(&Record) -> GroupKey,
{
    let mut layouts: IndexMap<GroupKey, SlotLayout> = IndexMap::new();
    for row in rows {
        layouts.entry(scope_fn(row)).or_default().observe(row.slot());
    }
    layouts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CHARGED, FP, STEP};

    fn row(weapon: &str, fp: &str, charged: &str, step: &str) -> Record {
        Record::from_pairs([
            (SKILL, "Lion's Claw"),
            (FOLLOW_UP, "-"),
            (HAND, "-"),
            (WEAPON, weapon),
            (FP, fp),
            (CHARGED, charged),
            (STEP, step),
        ])
    }

    #[test]
    fn layout_tracks_presence_per_scope() {
        let rows = vec![
            row("Sword", "1", "0", "1"),
            row("Sword", "0", "0", "3"),
            row("Axe", "", "1", "2"),
        ];
        let layouts = build_layout(&rows, layout_scope);
        assert_eq!(layouts.len(), 2);

        let sword = layouts[&layout_scope(&rows[0])];
        assert_eq!(sword.max_step, 3);
        assert!(sword.has_fp0 && sword.has_fp1);
        assert!(!sword.has_charged);

        let axe = layouts[&layout_scope(&rows[2])];
        assert_eq!(axe.max_step, 2);
        assert!(axe.has_fp1 && !axe.has_fp0);
        assert!(axe.has_charged);
    }

    #[test]
    fn blank_step_defaults_to_one() {
        let layout = SlotLayout::from_coords([row("Sword", "1", "0", "").slot()]);
        assert_eq!(layout.max_step, 1);
        assert!(!layout.is_empty());
        assert!(SlotLayout::default().is_empty());
    }
}
