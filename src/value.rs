// Value model - typed metric values and their quality tags
//
// Every process variable published by this tool is one of three scalar types.
// A value is always stored together with a quality flag so that readers can
// tell freshly polled data apart from placeholders written after a failure.

use serde::Serialize;
use std::fmt;

/// Scalar type of a metric field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Float,
}

/// A typed metric value
///
/// # Example JSON Output
/// ```json
/// "Normal"
/// 100
/// 1.23
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    String(String),
    Int64(i64),
    Float64(f64),
}

impl MetricValue {
    /// Returns the kind this value belongs to
    pub fn kind(&self) -> FieldKind {
        match self {
            MetricValue::String(_) => FieldKind::String,
            MetricValue::Int64(_) => FieldKind::Int,
            MetricValue::Float64(_) => FieldKind::Float,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::String(s) => write!(f, "{}", s),
            MetricValue::Int64(i) => write!(f, "{}", i),
            MetricValue::Float64(v) => write!(f, "{}", v),
        }
    }
}

/// Why a value is not trustworthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InvalidReason {
    /// Seeded at startup, no poll has completed yet
    NeverPolled,
    Timeout,
    ConnectionRefused,
    BadStatus,
    MissingField,
    EmptyBody,
    MalformedBody,
}

/// Quality tag attached to every stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quality {
    Good,
    Invalid(InvalidReason),
}

impl Quality {
    pub fn is_good(&self) -> bool {
        matches!(self, Quality::Good)
    }
}

/// A value together with its quality, as held in the metric table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEntry {
    pub value: MetricValue,
    pub quality: Quality,
}

impl MetricEntry {
    pub fn good(value: MetricValue) -> Self {
        MetricEntry {
            value,
            quality: Quality::Good,
        }
    }

    pub fn invalid(value: MetricValue, reason: InvalidReason) -> Self {
        MetricEntry {
            value,
            quality: Quality::Invalid(reason),
        }
    }
}

/// Strips thousands separators from a numeric string
///
/// The appliance formats storage figures for humans, e.g. `"1,234.56"`.
fn strip_separators(raw: &str) -> String {
    raw.trim().replace(',', "")
}

/// Parses an integer that may contain thousands separators
///
/// # Returns
/// * `Some(i64)` - Parsed value
/// * `None` - Not an integer
pub fn parse_int(raw: &str) -> Option<i64> {
    strip_separators(raw).parse().ok()
}

/// Parses a float that may contain thousands separators
///
/// Non-finite results (`"NaN"`, `"inf"`) are rejected.
pub fn parse_float(raw: &str) -> Option<f64> {
    strip_separators(raw)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_strips_separators() {
        assert_eq!(parse_float("12,345.60"), Some(12345.60));
        assert_eq!(parse_float("1,000.00"), Some(1000.0));
        assert_eq!(parse_float(" 25.05 "), Some(25.05));
        assert_eq!(parse_float("abc"), None);
        assert_eq!(parse_float("NaN"), None);
        assert_eq!(parse_float(""), None);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("100"), Some(100));
        assert_eq!(parse_int("1,024"), Some(1024));
        assert_eq!(parse_int("1.5"), None);
        assert_eq!(parse_int("-3"), Some(-3));
    }

    #[test]
    fn test_entry_serialization() {
        let entry = MetricEntry::invalid(MetricValue::Int64(0), InvalidReason::Timeout);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["value"], 0);
        assert_eq!(json["quality"]["Invalid"], "Timeout");

        let good = serde_json::to_value(MetricEntry::good(MetricValue::String("Normal".into())))
            .unwrap();
        assert_eq!(good["quality"], "Good");
        assert_eq!(good["value"], "Normal");
    }
}
