use std::fmt;

/// Decimal precision used when rendering a number back into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// One decimal place, used for stage-2 sums and Dmg MV.
    Tenths,
    /// Three decimal places, used for multipliers and merged series.
    Thousandths,
}

impl Precision {
    fn digits(self) -> usize {
        match self {
            Self::Tenths => 1,
            Self::Thousandths => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Separator,
    Numeric,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn separator(text: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::Separator,
            text: text.into(),
        }
    }

    fn numeric(text: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::Numeric,
            text: text.into(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == TokenKind::Numeric
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShapePart {
    Separator(String),
    Numeric,
}

/// Structural fingerprint of a formatted cell: separators verbatim, numbers erased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Shape {
    parts: Vec<ShapePart>,
}

impl Shape {
    pub fn numeric_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, ShapePart::Numeric))
            .count()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                ShapePart::Separator(text) => f.write_str(text)?,
                ShapePart::Numeric => f.write_str("{n}")?,
            }
        }
        Ok(())
    }
}

/// Numeric bounds of a single numeric token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub lo: f64,
    pub hi: f64,
}

impl Range {
    pub const ZERO: Range = Range { lo: 0.0, hi: 0.0 };

    pub fn point(value: f64) -> Self {
        Self {
            lo: value,
            hi: value,
        }
    }

    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Adds lows and highs independently.
    pub fn sum(self, other: Range) -> Range {
        Range::new(self.lo + other.lo, self.hi + other.hi)
    }

    /// Smallest range covering both operands.
    pub fn union(self, other: Range) -> Range {
        Range::new(self.lo.min(other.lo), self.hi.max(other.hi))
    }

    pub fn render(self, precision: Precision) -> String {
        let lo = fmt_number(self.lo, precision);
        let hi = fmt_number(self.hi, precision);
        if lo == hi { lo } else { format!("{lo}-{hi}") }
    }
}

/// Returned when two cells cannot be merged because their shapes differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub left: Shape,
    pub right: Shape,
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shape mismatch: '{}' vs '{}'",
            self.left, self.right
        )
    }
}

impl std::error::Error for ShapeMismatch {}

/// Splits `text` into separator and numeric tokens.
///
/// A numeric token is `-?D(.D)?` optionally followed by `-` and a second
/// number (a `lo-hi` range). A leading `-` only belongs to the number when it
/// does not directly follow a digit. Empty input yields one empty separator.
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut separator = String::new();
    let mut index = 0usize;

    while index < chars.len() {
        if let Some(end) = scan_number_or_range(&chars, index) {
            if !separator.is_empty() {
                tokens.push(Token::separator(std::mem::take(&mut separator)));
            }
            tokens.push(Token::numeric(chars[index..end].iter().collect::<String>()));
            index = end;
            continue;
        }
        separator.push(chars[index]);
        index += 1;
    }

    if !separator.is_empty() || tokens.is_empty() {
        tokens.push(Token::separator(separator));
    }
    tokens
}

fn scan_number_or_range(chars: &[char], start: usize) -> Option<usize> {
    let first_end = scan_number(chars, start)?;
    if first_end < chars.len()
        && chars[first_end] == '-'
        && let Some(second_end) = scan_unsigned_or_negative(chars, first_end + 1)
    {
        return Some(second_end);
    }
    Some(first_end)
}

fn scan_number(chars: &[char], start: usize) -> Option<usize> {
    let mut index = start;
    if chars.get(index) == Some(&'-') {
        if start > 0 && chars[start - 1].is_ascii_digit() {
            return None;
        }
        index += 1;
    }
    scan_digits_with_fraction(chars, index)
}

fn scan_unsigned_or_negative(chars: &[char], start: usize) -> Option<usize> {
    let index = if chars.get(start) == Some(&'-') {
        start + 1
    } else {
        start
    };
    scan_digits_with_fraction(chars, index)
}

fn scan_digits_with_fraction(chars: &[char], start: usize) -> Option<usize> {
    let mut index = start;
    while index < chars.len() && chars[index].is_ascii_digit() {
        index += 1;
    }
    if index == start {
        return None;
    }
    if index + 1 < chars.len() && chars[index] == '.' && chars[index + 1].is_ascii_digit() {
        index += 1;
        while index < chars.len() && chars[index].is_ascii_digit() {
            index += 1;
        }
    }
    Some(index)
}

pub fn shape_of(tokens: &[Token]) -> Shape {
    Shape {
        parts: tokens
            .iter()
            .map(|token| match token.kind {
                TokenKind::Numeric => ShapePart::Numeric,
                TokenKind::Separator => ShapePart::Separator(token.text.clone()),
            })
            .collect(),
    }
}

pub fn shape(text: &str) -> Shape {
    shape_of(&tokenize(text))
}

/// Lenient bounds parser: `n`, `lo-hi`, else min/max of embedded numbers, else zero.
pub fn parse_range(text: &str) -> Range {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        return Range::point(value);
    }
    if let Some(split) = trimmed
        .char_indices()
        .skip(1)
        .find(|(_, ch)| *ch == '-')
        .map(|(index, _)| index)
        && let (Ok(lo), Ok(hi)) = (
            trimmed[..split].trim().parse::<f64>(),
            trimmed[split + 1..].trim().parse::<f64>(),
        )
    {
        return Range::new(lo, hi);
    }

    let embedded = embedded_numbers(trimmed);
    if embedded.is_empty() {
        tracing::trace!(text, "no numeric content, treating as zero");
        return Range::ZERO;
    }
    let lo = embedded.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = embedded.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    tracing::trace!(text, lo, hi, "lenient range fallback");
    Range::new(lo, hi)
}

/// Every plain number embedded in `text`, ranges split into both bounds.
pub fn embedded_numbers(text: &str) -> Vec<f64> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut out = Vec::new();
    let mut index = 0usize;
    while index < chars.len() {
        if let Some(end) = scan_number(&chars, index) {
            let literal = chars[index..end].iter().collect::<String>();
            if let Ok(value) = literal.parse::<f64>() {
                out.push(value);
            }
            index = end;
            continue;
        }
        index += 1;
    }
    out
}

fn combine_tokens(
    current: &str,
    incoming: &str,
    op: impl Fn(Range, Range) -> Range,
) -> Result<String, ShapeMismatch> {
    let left = tokenize(current);
    let right = tokenize(incoming);
    let left_shape = shape_of(&left);
    let right_shape = shape_of(&right);
    if left_shape != right_shape {
        return Err(ShapeMismatch {
            left: left_shape,
            right: right_shape,
        });
    }

    let mut out = String::new();
    for (a, b) in left.iter().zip(right.iter()) {
        if a.is_numeric() {
            let merged = op(parse_range(&a.text), parse_range(&b.text));
            out.push_str(&merged.render(Precision::Thousandths));
        } else {
            out.push_str(&a.text);
        }
    }
    Ok(out)
}

/// Sums two same-shaped cells position by position (`lo+lo`, `hi+hi`).
pub fn merge_ranges(current: &str, incoming: &str) -> Result<String, ShapeMismatch> {
    combine_tokens(current, incoming, Range::sum)
}

/// Widens two same-shaped cells position by position (`min lo`, `max hi`).
pub fn union_ranges(current: &str, incoming: &str) -> Result<String, ShapeMismatch> {
    combine_tokens(current, incoming, Range::union)
}

/// Parses a scalar cell; blank and the `-` sentinel read as zero.
pub fn parse_scalar(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok()
}

/// Scalar addition for cells whose shapes do not line up.
pub fn sum_scalar(current: &str, incoming: &str) -> Option<String> {
    let a = parse_scalar(current)?;
    let b = parse_scalar(incoming)?;
    Some(fmt_number(a + b, Precision::Thousandths))
}

pub fn fmt_number(value: f64, precision: Precision) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let digits = precision.digits();
    let text = format!("{value:.digits$}");
    let trimmed = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed
    }
}
