//! Extraction of a numeric weight and unit from a scale output line.
//!
//! Kern scales print readings such as `"  123.45 g"`, `"ST,GS,  -5.0 kg"` or
//! `"7%"`.  The pattern below finds the first number in the line (optional
//! minus sign, digits, optional decimal part) followed by optional whitespace
//! and an optional unit made of letters, `%` or `/`.

use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

const WEIGHT_PATTERN: &str = r"(-?\d+(?:\.\d+)?)\s*([a-zA-Z%/]*)";

/// Unit label used when a reading carries no unit suffix.
pub const UNKNOWN_UNIT: &str = "unknown";

fn weight_regex() -> &'static Regex {
    static WEIGHT_RE: OnceLock<Regex> = OnceLock::new();
    // The pattern is a compile-time constant, so compilation cannot fail.
    WEIGHT_RE.get_or_init(|| Regex::new(WEIGHT_PATTERN).expect("weight pattern is valid"))
}

/// A single weight value parsed from a scale line.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightReading {
    /// Numeric value as printed by the scale.
    pub value: f64,
    /// Unit suffix (`"g"`, `"kg"`, `"%"`, `"g/cm"`...), `None` when absent.
    pub unit: Option<String>,
}

impl WeightReading {
    /// Returns the unit, or `"unknown"` when the line carried none.
    pub fn unit_or_unknown(&self) -> &str {
        self.unit.as_deref().unwrap_or(UNKNOWN_UNIT)
    }
}

/// Parses the first weight reading found in `line`.
///
/// Returns `None` when the line contains no number.
///
/// ```rust
/// use scale_core::parse_weight;
///
/// let reading = parse_weight("123.45 g").unwrap();
/// assert_eq!(reading.value, 123.45);
/// assert_eq!(reading.unit.as_deref(), Some("g"));
/// assert!(parse_weight("OK").is_none());
/// ```
pub fn parse_weight(line: &str) -> Option<WeightReading> {
    let captures = weight_regex().captures(line)?;
    let number = captures.get(1)?.as_str();
    let value = match number.parse::<f64>() {
        Ok(value) => value,
        Err(e) => {
            // `\d` also matches non-ASCII digits, which f64 parsing rejects.
            trace!("ignoring unparseable weight {number:?}: {e}");
            return None;
        }
    };
    let unit = captures
        .get(2)
        .map(|m| m.as_str())
        .filter(|unit| !unit.is_empty())
        .map(str::to_string);
    Some(WeightReading { value, unit })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
