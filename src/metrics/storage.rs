// Storage metrics group
//
// Reads `getStorageMetricsForAppliance`, one record per storage tier.
// Capacity figures are formatted with thousands separators.

use tracing::warn;

use super::{extract, parse_records, record_name, FieldSpec, MetricGroup, Sample};
use crate::config::Appliance;
use crate::error::PollError;

const PATH: &str = "/mgmt/bpl/getStorageMetricsForAppliance";

/// Record names of the storage tiers, in publication order
static TIERS: [&str; 3] = ["STS", "MTS", "LTS"];

/// Per-tier JSON attributes and their units
static ATTRIBUTES: [(&str, &str); 3] = [
    ("total_space", "GB"),
    ("available_space", "GB"),
    ("available_space_percent", "%"),
];

/// Total and available space for the short, medium and long-term stores
///
/// # Response Structure
/// ```json
/// [
///   {
///     "name": "STS",
///     "total_space": "1,000.00",
///     "available_space": "250.50",
///     "available_space_percent": "25.05"
///   }
/// ]
/// ```
///
/// A tier missing from the response keeps its previous values.
pub struct StorageMetrics {
    fields: Vec<FieldSpec>,
}

impl StorageMetrics {
    pub fn new() -> Self {
        let keys: [[&'static str; 3]; 3] = [
            ["sts_total_space", "sts_available_space", "sts_available_space_percent"],
            ["mts_total_space", "mts_available_space", "mts_available_space_percent"],
            ["lts_total_space", "lts_available_space", "lts_available_space_percent"],
        ];

        let fields = keys
            .iter()
            .flat_map(|tier| {
                tier.iter()
                    .zip(ATTRIBUTES.iter())
                    .map(|(key, (_, unit))| FieldSpec::float(*key, 2, *unit))
            })
            .collect();

        StorageMetrics { fields }
    }

    /// Fields belonging to the tier at `index` in `TIERS`
    fn tier_fields(&self, index: usize) -> &[FieldSpec] {
        &self.fields[index * ATTRIBUTES.len()..(index + 1) * ATTRIBUTES.len()]
    }
}

impl MetricGroup for StorageMetrics {
    fn name(&self) -> &'static str {
        "storage"
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

    fn parse(&self, appliance: &Appliance, body: &str) -> Result<Sample, PollError> {
        let records = parse_records(body)?;

        if records.is_empty() {
            return Err(PollError::EmptyBody);
        }

        let mut sample = Sample::with_capacity(self.fields.len());

        for (index, tier_name) in TIERS.iter().enumerate() {
            // Records with unknown names are ignored
            let Some(record) = records.iter().find(|r| record_name(r) == Some(*tier_name)) else {
                warn!(
                    "Appliance {}: storage tier {} is absent, keeping previous values",
                    appliance.identity, tier_name
                );
                continue;
            };

            for (field, (attribute, _)) in self.tier_fields(index).iter().zip(ATTRIBUTES.iter()) {
                sample.push((field.key, extract(record, attribute, field.kind)?));
            }
        }

        Ok(sample)
    }
}

impl Default for StorageMetrics {
    fn default() -> Self {
        Self::new()
    }
}
