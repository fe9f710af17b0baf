use crate::diagnostics::DEFAULT_WARNING_SAMPLE;
use crate::record::Record;
use crate::tokens::{Precision, Range, embedded_numbers, fmt_number};

pub const ZERO_SENTINEL: &str = "-";

/// Rendering options passed explicitly to the stage transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatConfig {
    pub zero_sentinel: String,
    pub show_phys_attribute: bool,
    pub warning_sample: usize,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            zero_sentinel: ZERO_SENTINEL.to_string(),
            show_phys_attribute: false,
            warning_sample: DEFAULT_WARNING_SAMPLE,
        }
    }
}

pub fn format_value(value: f64) -> String {
    fmt_number(value, Precision::Thousandths)
}

/// True when `text` holds at least one number and every number is zero.
pub fn zeros_only(text: &str) -> bool {
    let numbers = embedded_numbers(text);
    !numbers.is_empty() && numbers.iter().all(|value| *value == 0.0)
}

/// Replaces all-zero cells in `fields` with the sentinel; returns how many changed.
pub fn mask_zero_cells(record: &mut Record, fields: &[&str], sentinel: &str) -> usize {
    let mut masked = 0;
    for field in fields {
        let value = record.get_trimmed(field);
        if !value.is_empty() && zeros_only(value) {
            record.set(field, sentinel);
            masked += 1;
        }
    }
    masked
}

/// Collapses `" | "`-separated readings into `lo` or `lo-hi` plus the bounds.
pub fn summarize_range(raw: &str) -> (String, Option<Range>) {
    let numbers = raw
        .split('|')
        .map(str::trim)
        .filter(|reading| !reading.is_empty() && *reading != "-")
        .flat_map(embedded_numbers)
        .collect::<Vec<_>>();
    if numbers.is_empty() {
        return (ZERO_SENTINEL.to_string(), None);
    }
    let lo = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = Range::new(lo, hi);
    (range.render(Precision::Thousandths), Some(range))
}

/// Joins distinct values in first-seen order, skipping blanks and `"-"`.
pub fn unique_join<'a>(values: impl IntoIterator<Item = &'a str>, separator: &str) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() || value == "-" || seen.contains(&value) {
            continue;
        }
        seen.push(value);
    }
    seen.join(separator)
}

/// Joins dimension labels (already-joined labels are split first), de-duplicated
/// and sorted case-insensitively.
pub fn join_dimension<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let mut names = values
        .into_iter()
        .flat_map(|value| value.split(" | "))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>();
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    names.dedup();
    names.join(" | ")
}
