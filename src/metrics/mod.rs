// Metrics module - defines the metric groups polled from each appliance
//
// A metric group is a fixed set of fields served by one management endpoint.
// Each group knows how to build its URL and how to turn a response body into
// typed values. Parsing is a pure function so groups can be tested without a
// network.

use serde_json::{Map, Value};

use crate::config::Appliance;
use crate::error::PollError;
use crate::value::{parse_float, parse_int, FieldKind, MetricValue};

pub mod appliance;
pub mod instance;
pub mod storage;

/// One JSON object from a list payload
pub type Record = Map<String, Value>;

/// Values produced by one successful parse, keyed by field key
pub type Sample = Vec<(&'static str, MetricValue)>;

/// Static description of one metric field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Key within the appliance namespace (e.g. "pvCount")
    pub key: &'static str,

    /// Scalar type of the field
    pub kind: FieldKind,

    /// Value written when the group is invalidated
    pub invalid_value: MetricValue,

    /// Display precision, floats only
    pub precision: Option<u8>,

    /// Engineering unit, floats only
    pub unit: Option<&'static str>,
}

impl FieldSpec {
    /// A string field with the given placeholder for invalid states
    pub fn string(key: &'static str, invalid: &str) -> Self {
        FieldSpec {
            key,
            kind: FieldKind::String,
            invalid_value: MetricValue::String(invalid.to_string()),
            precision: None,
            unit: None,
        }
    }

    /// An integer field, invalidated to 0
    pub fn int(key: &'static str) -> Self {
        FieldSpec {
            key,
            kind: FieldKind::Int,
            invalid_value: MetricValue::Int64(0),
            precision: None,
            unit: None,
        }
    }

    /// A float field with display hints, invalidated to 0.0
    pub fn float(key: &'static str, precision: u8, unit: &'static str) -> Self {
        FieldSpec {
            key,
            kind: FieldKind::Float,
            invalid_value: MetricValue::Float64(0.0),
            precision: Some(precision),
            unit: Some(unit),
        }
    }
}

/// A group of metrics fetched together from one endpoint
///
/// Implementations hold only static data; one instance is shared by the
/// pollers of every appliance.
pub trait MetricGroup: Send + Sync {
    /// Short name used in configuration and logs (e.g. "storage")
    fn name(&self) -> &'static str;

    /// Every field this group declares, in publication order
    fn fields(&self) -> &[FieldSpec];

    /// Full URL to poll for the given appliance
    fn endpoint(&self, appliance: &Appliance) -> String;

    /// Turns a response body into field values
    ///
    /// # Returns
    /// * `Ok(Sample)` - Values for the fields present in the response; a group
    ///   may legitimately return fewer than `fields()` (see storage tiers)
    /// * `Err(PollError)` - The whole group must be invalidated
    fn parse(&self, appliance: &Appliance, body: &str) -> Result<Sample, PollError>;
}

/// Creates every metric group polled for each appliance
///
/// # Adding New Groups
/// 1. Create a new module implementing `MetricGroup`
/// 2. Declare it at the top of this file
/// 3. Add its instantiation here
pub fn create_all_groups() -> Vec<std::sync::Arc<dyn MetricGroup>> {
    vec![
        // Status, uptime and PV counts from the cluster-wide instance list
        std::sync::Arc::new(instance::InstanceMetrics::new()),
        // Paused PV count for one appliance
        std::sync::Arc::new(appliance::ApplianceMetrics::new()),
        // Short/medium/long-term storage capacity
        std::sync::Arc::new(storage::StorageMetrics::new()),
    ]
}

/// Decodes a body that must be a non-empty text holding a JSON array of objects
///
/// An empty array is accepted here; groups decide whether that is an error.
pub fn parse_records(body: &str) -> Result<Vec<Record>, PollError> {
    if body.trim().is_empty() {
        return Err(PollError::EmptyBody);
    }

    let parsed: Value =
        serde_json::from_str(body).map_err(|e| PollError::MalformedBody(e.to_string()))?;

    let Value::Array(items) = parsed else {
        return Err(PollError::MalformedBody("expected a JSON array".to_string()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(PollError::MalformedBody(format!(
                "element {} is not an object: {}",
                i, other
            ))),
        })
        .collect()
}

/// Returns the `name` attribute of a flat `{name, ...}` record, if it is a string
pub fn record_name(record: &Record) -> Option<&str> {
    record.get("name").and_then(Value::as_str)
}

/// Reads `source` from a record and converts it to `kind`
///
/// Numbers may arrive either as JSON numbers or as strings, possibly with
/// thousands separators.
pub fn extract(record: &Record, source: &str, kind: FieldKind) -> Result<MetricValue, PollError> {
    let raw = match record.get(source) {
        None | Some(Value::Null) => return Err(PollError::MissingField(source.to_string())),
        Some(raw) => raw,
    };

    let invalid = || PollError::InvalidNumber {
        field: source.to_string(),
        raw: raw.to_string(),
    };

    match (kind, raw) {
        (FieldKind::String, Value::String(s)) => Ok(MetricValue::String(s.clone())),
        (FieldKind::String, Value::Number(n)) => Ok(MetricValue::String(n.to_string())),
        (FieldKind::String, Value::Bool(b)) => Ok(MetricValue::String(b.to_string())),
        (FieldKind::Int, Value::String(s)) => parse_int(s).map(MetricValue::Int64).ok_or_else(invalid),
        (FieldKind::Int, Value::Number(n)) => n.as_i64().map(MetricValue::Int64).ok_or_else(invalid),
        (FieldKind::Float, Value::String(s)) => {
            parse_float(s).map(MetricValue::Float64).ok_or_else(invalid)
        }
        (FieldKind::Float, Value::Number(n)) => {
            n.as_f64().map(MetricValue::Float64).ok_or_else(invalid)
        }
        (_, other) => Err(PollError::MalformedBody(format!(
            "field {} has unexpected JSON type: {}",
            source, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_parse_records_validation_order() {
        assert_eq!(parse_records(""), Err(PollError::EmptyBody));
        assert_eq!(parse_records("  \n"), Err(PollError::EmptyBody));
        assert!(matches!(parse_records("<html>"), Err(PollError::MalformedBody(_))));
        assert!(matches!(parse_records("{\"a\":1}"), Err(PollError::MalformedBody(_))));
        assert!(matches!(parse_records("[1, 2]"), Err(PollError::MalformedBody(_))));
        assert_eq!(parse_records("[]"), Ok(vec![]));
        assert_eq!(parse_records("[{\"name\":\"STS\"}]").unwrap().len(), 1);
    }

    #[test]
    fn test_extract_conversions() {
        let r = record(json!({
            "status": "Normal",
            "pvCount": "1,024",
            "rawCount": 7,
            "rate": "1.23",
            "bad": "many",
            "nested": {"x": 1},
            "nothing": null
        }));

        assert_eq!(
            extract(&r, "status", FieldKind::String),
            Ok(MetricValue::String("Normal".into()))
        );
        assert_eq!(extract(&r, "pvCount", FieldKind::Int), Ok(MetricValue::Int64(1024)));
        assert_eq!(extract(&r, "rawCount", FieldKind::Int), Ok(MetricValue::Int64(7)));
        assert_eq!(extract(&r, "rawCount", FieldKind::Float), Ok(MetricValue::Float64(7.0)));
        assert_eq!(extract(&r, "rate", FieldKind::Float), Ok(MetricValue::Float64(1.23)));
        assert_eq!(
            extract(&r, "missing", FieldKind::Int),
            Err(PollError::MissingField("missing".into()))
        );
        assert_eq!(
            extract(&r, "nothing", FieldKind::String),
            Err(PollError::MissingField("nothing".into()))
        );
        assert!(matches!(
            extract(&r, "bad", FieldKind::Int),
            Err(PollError::InvalidNumber { .. })
        ));
        assert!(matches!(
            extract(&r, "nested", FieldKind::String),
            Err(PollError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_field_spec_invalid_values_match_kind() {
        for group in create_all_groups() {
            for field in group.fields() {
                assert_eq!(field.invalid_value.kind(), field.kind, "{}", field.key);
            }
        }
    }

    #[test]
    fn test_group_names_and_keys_are_unique() {
        let groups = create_all_groups();
        let mut names: Vec<_> = groups.iter().map(|g| g.name()).collect();
        names.dedup();
        assert_eq!(names.len(), 3);

        let mut keys: Vec<_> = groups
            .iter()
            .flat_map(|g| g.fields().iter().map(|f| f.key))
            .collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 16);
    }
}
