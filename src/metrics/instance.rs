// Instance metrics group
//
// Reads `getInstanceMetrics`, which lists every appliance in the cluster.
// The record describing the polled appliance is located by its `instance`
// attribute.

use tracing::debug;

use super::{extract, parse_records, FieldSpec, MetricGroup, Sample};
use crate::config::Appliance;
use crate::error::PollError;

const PATH: &str = "/mgmt/bpl/getInstanceMetrics";

/// Status, uptime, PV counts and data rate of one appliance
///
/// # Response Structure
/// ```json
/// [
///   {
///     "instance": "appliance_01",
///     "status": "Normal",
///     "MGMT_uptime": "3 days",
///     "pvCount": "100",
///     "connectedPVCount": "95",
///     "disconnectedPVCount": "5",
///     "dataRateGBPerDay": "1.23"
///   }
/// ]
/// ```
pub struct InstanceMetrics {
    fields: Vec<FieldSpec>,
}

impl InstanceMetrics {
    pub fn new() -> Self {
        InstanceMetrics {
            fields: vec![
                FieldSpec::string("status", "Disconnected"),
                FieldSpec::string("MGMT_uptime", "Unknown"),
                FieldSpec::int("pvCount"),
                FieldSpec::int("connectedPVCount"),
                FieldSpec::int("disconnectedPVCount"),
                FieldSpec::float("dataRateGBPerDay", 2, "GB/day"),
            ],
        }
    }
}

impl MetricGroup for InstanceMetrics {
    fn name(&self) -> &'static str {
        "instance"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn endpoint(&self, appliance: &Appliance) -> String {
        appliance.join(PATH)
    }

    fn parse(&self, appliance: &Appliance, body: &str) -> Result<Sample, PollError> {
        let records = parse_records(body)?;

        // First match wins; duplicate identities are not checked
        let record = records
            .iter()
            .find(|r| r.get("instance").and_then(|v| v.as_str()) == Some(appliance.identity.as_str()))
            .ok_or_else(|| PollError::InstanceNotFound(appliance.identity.clone()))?;

        // Field keys double as the JSON attribute names in this payload
        let sample = self
            .fields
            .iter()
            .map(|field| Ok((field.key, extract(record, field.key, field.kind)?)))
            .collect::<Result<Sample, PollError>>()?;

        debug!(
            "Instance metrics for {}: {} field(s) of {} record(s)",
            appliance.identity,
            sample.len(),
            records.len()
        );

        Ok(sample)
    }
}

impl Default for InstanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MetricValue;

    fn appliance() -> Appliance {
        Appliance {
            identity: "appliance_01".to_string(),
            url: "http://10.1.236.142:17665".to_string(),
        }
    }

    const BODY: &str = r#"[
        {"instance":"appliance_02","status":"Stopped","MGMT_uptime":"1 day","pvCount":"1","connectedPVCount":"1","disconnectedPVCount":"0","dataRateGBPerDay":"0.01"},
        {"instance":"appliance_01","status":"Normal","MGMT_uptime":"3 days","pvCount":"100","connectedPVCount":"95","disconnectedPVCount":"5","dataRateGBPerDay":"1.23"}
    ]"#;

    #[test]
    fn test_selects_record_for_identity() {
        let sample = InstanceMetrics::new().parse(&appliance(), BODY).unwrap();

        assert_eq!(sample.len(), 6);
        assert_eq!(sample[0], ("status", MetricValue::String("Normal".into())));
        assert_eq!(sample[1], ("MGMT_uptime", MetricValue::String("3 days".into())));
        assert_eq!(sample[2], ("pvCount", MetricValue::Int64(100)));
        assert_eq!(sample[3], ("connectedPVCount", MetricValue::Int64(95)));
        assert_eq!(sample[4], ("disconnectedPVCount", MetricValue::Int64(5)));
        assert_eq!(sample[5], ("dataRateGBPerDay", MetricValue::Float64(1.23)));
    }

    #[test]
    fn test_missing_instance() {
        let group = InstanceMetrics::new();
        assert_eq!(
            group.parse(&appliance(), "[]"),
            Err(PollError::InstanceNotFound("appliance_01".into()))
        );
        assert_eq!(
            group.parse(&appliance(), r#"[{"status":"Normal"}]"#),
            Err(PollError::InstanceNotFound("appliance_01".into()))
        );
    }

    #[test]
    fn test_missing_field_is_named() {
        let body = r#"[{"instance":"appliance_01","status":"Normal","pvCount":"1"}]"#;
        assert_eq!(
            InstanceMetrics::new().parse(&appliance(), body),
            Err(PollError::MissingField("MGMT_uptime".into()))
        );
    }

    #[test]
    fn test_non_numeric_count() {
        let body = r#"[{"instance":"appliance_01","status":"Normal","MGMT_uptime":"1 day","pvCount":"lots","connectedPVCount":"1","disconnectedPVCount":"0","dataRateGBPerDay":"0"}]"#;
        let err = InstanceMetrics::new().parse(&appliance(), body).unwrap_err();
        assert_eq!(err.reason(), crate::value::InvalidReason::MalformedBody);
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            InstanceMetrics::new().endpoint(&appliance()),
            "http://10.1.236.142:17665/mgmt/bpl/getInstanceMetrics"
        );
    }
}
