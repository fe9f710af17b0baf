use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::layout::SlotLayout;
use crate::record::{Record, SlotCoord};
use crate::tokens::{ShapeMismatch, merge_ranges, sum_scalar};

/// Per-slot cells of one numeric column within a group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSeries {
    cells: BTreeMap<SlotCoord, String>,
}

impl SlotSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell; a second value at the same coordinate is summed into it.
    pub fn insert(&mut self, coord: SlotCoord, value: &str, diagnostics: &mut Diagnostics) {
        let value = if value.trim().is_empty() {
            "0"
        } else {
            value.trim()
        };
        let mut existing = match self.cells.entry(coord) {
            Entry::Vacant(entry) => {
                entry.insert(value.to_string());
                return;
            }
            Entry::Occupied(entry) => entry,
        };
        match fold_cell(existing.get(), value) {
            Ok(merged) => *existing.get_mut() = merged,
            Err(mismatch) => diagnostics.push(
                DiagnosticKind::ShapeMismatch,
                format!(
                    "slot fp={} charged={} step={}: keeping '{}', dropped '{value}' ({mismatch})",
                    coord.fp,
                    coord.charged,
                    coord.step,
                    existing.get()
                ),
            ),
        }
    }

    pub fn get(&self, coord: SlotCoord) -> Option<&str> {
        self.cells.get(&coord).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Renders `fp1 [| fp1 charged] [fp0 [| fp0 charged]]` padded to the layout.
    pub fn render(&self, layout: &SlotLayout) -> String {
        if self.cells.is_empty() || layout.is_empty() {
            return "-".to_string();
        }
        let primary = layout.has_fp1.then(|| self.block(1, layout));
        let secondary = layout.has_fp0.then(|| self.block(0, layout));
        match (primary, secondary) {
            (Some(primary), Some(secondary)) => format!("{primary} [{secondary}]"),
            (Some(primary), None) => primary,
            (None, Some(secondary)) => format!("[{secondary}]"),
            (None, None) => "-".to_string(),
        }
    }

    fn block(&self, fp: u8, layout: &SlotLayout) -> String {
        let mut parts = vec![self.sub_block(fp, 0, layout.max_step)];
        if layout.has_charged {
            parts.push(self.sub_block(fp, 1, layout.max_step));
        }
        parts.join(" | ")
    }

    fn sub_block(&self, fp: u8, charged: u8, max_step: u32) -> String {
        (1..=max_step)
            .map(|step| {
                self.get(SlotCoord::new(fp, charged, step))
                    .unwrap_or("0")
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Sums two cells: shape-aligned range sum first, scalar sum as fallback.
pub fn fold_cell(current: &str, incoming: &str) -> Result<String, ShapeMismatch> {
    match merge_ranges(current, incoming) {
        Ok(merged) => Ok(merged),
        Err(mismatch) => sum_scalar(current, incoming).ok_or(mismatch),
    }
}

pub fn collect_series(rows: &[Record], column: &str, diagnostics: &mut Diagnostics) -> SlotSeries {
    let mut series = SlotSeries::new();
    for row in rows {
        series.insert(row.slot(), row.get(column), diagnostics);
    }
    series
}

pub fn aggregate(
    rows: &[Record],
    column: &str,
    layout: &SlotLayout,
    diagnostics: &mut Diagnostics,
) -> String {
    collect_series(rows, column, diagnostics).render(layout)
}
