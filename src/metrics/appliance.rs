// Appliance metrics group
//
// Reads `getApplianceMetricsForAppliance`, a flat list of `{name, value}`
// counters for one appliance. Only the paused PV count is published.

use super::{extract, parse_records, record_name, FieldSpec, MetricGroup, Sample};
use crate::config::Appliance;
use crate::error::PollError;

const PATH: &str = "/mgmt/bpl/getApplianceMetricsForAppliance";

/// Record name carrying the paused PV counter
const PAUSED_PV_COUNT: &str = "Paused PV count";

/// Paused PV count of one appliance
pub struct ApplianceMetrics {
    fields: Vec<FieldSpec>,
}

impl ApplianceMetrics {
    pub fn new() -> Self {
        ApplianceMetrics {
            fields: vec![FieldSpec::int("pausedPVCount")],
        }
    }
}

impl MetricGroup for ApplianceMetrics {
    fn name(&self) -> &'static str {
        "appliance"
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn endpoint(&self, appliance: &Appliance) -> String {
        appliance.join(&format!(
            "{}?appliance={}",
            PATH,
            urlencoding::encode(&appliance.identity)
        ))
    }

    fn parse(&self, _appliance: &Appliance, body: &str) -> Result<Sample, PollError> {
        let records = parse_records(body)?;

        // The endpoint answers an unknown identity with an empty list
        if records.is_empty() {
            return Err(PollError::EmptyBody);
        }

        let record = records
            .iter()
            .find(|r| record_name(r) == Some(PAUSED_PV_COUNT))
            .ok_or_else(|| PollError::MissingField(PAUSED_PV_COUNT.to_string()))?;

        let field = &self.fields[0];
        Ok(vec![(field.key, extract(record, "value", field.kind)?)])
    }
}

impl Default for ApplianceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
