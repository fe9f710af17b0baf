use crate::record::{DISABLE_GEM_ATTR, Element, Record};
use crate::tokens::{Precision, Range, fmt_number, parse_scalar};

/// Below this fraction of the strongest element a split is flagged as lopsided.
pub const ASYMMETRY_THRESHOLD: f64 = 0.75;
/// With all five elements present, `max >= SPREAD_FACTOR * min` is flagged.
pub const SPREAD_FACTOR: f64 = 2.0;
pub const ALL_ELEMENTS_LABEL: &str = "Weapon";
pub const FLAG_LABEL: &str = "!";

pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Stance damage of one attack: `round_half_up(poise * mv / 100 + super_armor)`
/// for both poise bounds. No poise reading renders `"-"`.
pub fn stance_damage(poise: Option<Range>, poise_mv: f64, super_armor: f64) -> String {
    let Some(poise) = poise else {
        return "-".to_string();
    };
    let low = round_half_up(poise.lo * poise_mv / 100.0 + super_armor);
    let high = round_half_up(poise.hi * poise_mv / 100.0 + super_armor);
    Range::new(low, high).render(Precision::Tenths)
}

/// Motion values per element in `Element::ALL` order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ElementValues([f64; 5]);

impl ElementValues {
    pub fn new(values: [f64; 5]) -> Self {
        Self(values)
    }

    pub fn from_record(record: &Record) -> Self {
        let mut values = [0.0; 5];
        for (slot, element) in values.iter_mut().zip(Element::ALL) {
            *slot = record.scalar(element.mv_column());
        }
        Self(values)
    }

    pub fn get(&self, element: Element) -> f64 {
        self.0[element as usize]
    }

    fn positive(&self) -> Vec<(Element, f64)> {
        Element::ALL
            .into_iter()
            .map(|element| (element, self.get(element)))
            .filter(|(_, value)| *value > 0.0)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DamageLabel {
    pub label: String,
    /// Mean of the positive motion values as a multiplier (percent / 100).
    pub mv: f64,
}

impl DamageLabel {
    fn none() -> Self {
        Self {
            label: "-".to_string(),
            mv: 0.0,
        }
    }

    pub fn mv_text(&self) -> String {
        fmt_number(self.mv, Precision::Tenths)
    }
}

pub fn classify_damage_type(
    mvs: &ElementValues,
    phys_attribute: &str,
    show_phys_attribute: bool,
) -> DamageLabel {
    let positive = mvs.positive();
    if positive.is_empty() {
        return DamageLabel::none();
    }

    let mv = positive.iter().map(|(_, value)| value).sum::<f64>() / positive.len() as f64 / 100.0;
    let min = positive.iter().map(|(_, value)| *value).fold(f64::INFINITY, f64::min);
    let max = positive
        .iter()
        .map(|(_, value)| *value)
        .fold(f64::NEG_INFINITY, f64::max);

    if positive.len() == Element::ALL.len() {
        let label = if max >= SPREAD_FACTOR * min {
            FLAG_LABEL
        } else {
            ALL_ELEMENTS_LABEL
        };
        return DamageLabel {
            label: label.to_string(),
            mv,
        };
    }

    let names = positive
        .iter()
        .map(|(element, _)| element_name(*element, phys_attribute, show_phys_attribute))
        .collect::<Vec<_>>()
        .join(" | ");
    let label = if positive.len() > 1 && min < ASYMMETRY_THRESHOLD * max {
        format!("{FLAG_LABEL} | {names}")
    } else {
        names
    };
    DamageLabel { label, mv }
}

fn element_name(element: Element, phys_attribute: &str, show_phys_attribute: bool) -> String {
    let attribute = phys_attribute.trim();
    if element == Element::Phys && show_phys_attribute && !attribute.is_empty() && attribute != "-" {
        return format!("{} ({attribute})", element.label());
    }
    element.label().to_string()
}

/// Zeroes motion values whose weapon base is exactly zero when the attack
/// disables gem attribute scaling.
pub fn zero_for_disabled(record: &mut Record) {
    let disabled = record
        .get_trimmed(DISABLE_GEM_ATTR)
        .parse::<i64>()
        .is_ok_and(|flag| flag == 1);
    if !disabled {
        return;
    }
    for element in Element::ALL {
        if parse_scalar(record.get(element.weapon_base_column())) == Some(0.0) {
            record.set(element.mv_column(), "0");
        }
    }
}
