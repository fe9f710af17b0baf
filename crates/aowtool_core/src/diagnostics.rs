use std::fmt;

use indexmap::IndexMap;

pub const DEFAULT_WARNING_SAMPLE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Two cells at the same slot or in the same bucket had different shapes.
    ShapeMismatch,
    /// Categorical values disagreed while folding a group.
    FieldDisagreement,
    /// Force-collapsed rows disagreed on a field that was not overridden.
    ForcedMergeConflict,
    /// The weapon collapse refused a bucket.
    CollapseAborted,
    /// A Step value past the layout cap was read as step 1.
    InvalidStep,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShapeMismatch => "shape_mismatch",
            Self::FieldDisagreement => "field_disagreement",
            Self::ForcedMergeConflict => "forced_merge_conflict",
            Self::CollapseAborted => "collapse_aborted",
            Self::InvalidStep => "invalid_step",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal findings of one run, grouped by kind in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: IndexMap<DiagnosticKind, Vec<String>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(kind = kind.as_str(), %message, "diagnostic");
        self.entries.entry(kind).or_default().push(message);
    }

    pub fn disagreement(&mut self, column: &str, key: &str, kept: &str, seen: &str) {
        self.push(
            DiagnosticKind::FieldDisagreement,
            format!("Disagreement on column '{column}' for key {key}: keeping '{kept}', saw '{seen}'"),
        );
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for (kind, messages) in other.entries {
            self.entries.entry(kind).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.get(&kind).map_or(0, Vec::len)
    }

    pub fn messages(&self, kind: DiagnosticKind) -> &[String] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Human summary: every kind with at most `sample` messages and the remainder count.
    pub fn summary_lines(&self, sample: usize) -> Vec<String> {
        let mut lines = Vec::new();
        if self.is_empty() {
            return lines;
        }
        lines.push(format!("Warnings ({}):", self.total()));
        for (kind, messages) in &self.entries {
            if messages.is_empty() {
                continue;
            }
            lines.push(format!("  {kind} ({}):", messages.len()));
            for message in messages.iter().take(sample) {
                lines.push(format!("    - {message}"));
            }
            if messages.len() > sample {
                lines.push(format!("    ... {} more", messages.len() - sample));
            }
        }
        lines
    }
}
