// Metric table - the latest value of every published metric
//
// The table is seeded once at startup with every (appliance, group) batch and
// never changes shape afterwards. Each batch sits behind its own lock, so the
// poller owning a batch replaces all of its fields in one step and readers
// never see half of a cycle.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::Appliance;
use crate::error::TableError;
use crate::metrics::MetricGroup;
use crate::value::{FieldKind, InvalidReason, MetricEntry};

/// Identifies one (appliance, group) batch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
    appliance: String,
    group: &'static str,
}

/// Fields of one batch, in declaration order
type Batch = Vec<(&'static str, MetricEntry)>;

/// One row of a table snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRow {
    /// PV name without prefix, e.g. "appliance_01:pvCount"
    pub pv: String,
    pub group: &'static str,
    #[serde(flatten)]
    pub entry: MetricEntry,
}

/// Consistent-per-batch copy of the whole table
#[derive(Debug, Clone, Serialize)]
pub struct TableSnapshot {
    pub taken_at: DateTime<Utc>,
    pub metrics: Vec<SnapshotRow>,
}

/// Declaration of one PV, handed to the publisher at startup
#[derive(Debug, Clone, PartialEq)]
pub struct PvDeclaration {
    pub pv: String,
    pub kind: FieldKind,
    pub precision: Option<u8>,
    pub unit: Option<&'static str>,
}

/// Builds the PV name of a field within an appliance namespace
pub fn pv_name(identity: &str, key: &str) -> String {
    format!("{}:{}", identity, key)
}

/// Shared table of the latest metric values
///
/// Shared between pollers and readers through an `Arc`. Writes for different
/// batches never contend with each other.
pub struct MetricTable {
    batches: HashMap<BatchKey, RwLock<Batch>>,

    /// Batch keys in seeding order, for stable snapshots
    order: Vec<BatchKey>,

    declarations: Vec<PvDeclaration>,
}

impl MetricTable {
    /// Creates the table with every declared field set to its invalid value
    ///
    /// # Arguments
    /// * `appliances` - All monitored appliances
    /// * `groups` - All polled metric groups
    pub fn seed(appliances: &[Appliance], groups: &[std::sync::Arc<dyn MetricGroup>]) -> Self {
        let mut batches = HashMap::new();
        let mut order = Vec::new();
        let mut declarations = Vec::new();

        for appliance in appliances {
            for group in groups {
                let key = BatchKey {
                    appliance: appliance.identity.clone(),
                    group: group.name(),
                };

                let batch: Batch = group
                    .fields()
                    .iter()
                    .map(|field| {
                        debug_assert_eq!(field.invalid_value.kind(), field.kind);
                        declarations.push(PvDeclaration {
                            pv: pv_name(&appliance.identity, field.key),
                            kind: field.kind,
                            precision: field.precision,
                            unit: field.unit,
                        });
                        (
                            field.key,
                            MetricEntry::invalid(
                                field.invalid_value.clone(),
                                InvalidReason::NeverPolled,
                            ),
                        )
                    })
                    .collect();

                order.push(key.clone());
                batches.insert(key, RwLock::new(batch));
            }
        }

        debug!(
            "Seeded metric table with {} batch(es), {} metric(s)",
            order.len(),
            declarations.len()
        );

        MetricTable {
            batches,
            order,
            declarations,
        }
    }

    /// Every PV the table will ever hold
    pub fn declarations(&self) -> &[PvDeclaration] {
        &self.declarations
    }

    /// Replaces the given fields of one batch in a single step
    ///
    /// Fields of the batch not present in `updates` keep their value. Either
    /// every update is applied or, on error, none is.
    pub fn commit(
        &self,
        appliance: &str,
        group: &'static str,
        updates: &[(&'static str, MetricEntry)],
    ) -> Result<(), TableError> {
        let lock = self.batch(appliance, group)?;
        let mut batch = lock.write();

        let positions = updates
            .iter()
            .map(|(key, _)| {
                batch
                    .iter()
                    .position(|(k, _)| k == key)
                    .ok_or_else(|| TableError::UndeclaredKey {
                        group: group.to_string(),
                        key: key.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (index, (_, entry)) in positions.into_iter().zip(updates) {
            batch[index].1 = entry.clone();
        }

        Ok(())
    }

    /// Copy of the whole table; each batch is internally consistent
    pub fn snapshot(&self) -> TableSnapshot {
        let metrics = self
            .order
            .iter()
            .flat_map(|b| {
                self.batches[b]
                    .read()
                    .iter()
                    .map(|(key, entry)| SnapshotRow {
                        pv: pv_name(&b.appliance, key),
                        group: b.group,
                        entry: entry.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        TableSnapshot {
            taken_at: Utc::now(),
            metrics,
        }
    }

    fn batch(&self, appliance: &str, group: &'static str) -> Result<&RwLock<Batch>, TableError> {
        let key = BatchKey {
            appliance: appliance.to_string(),
            group,
        };
        self.batches
            .get(&key)
            .ok_or_else(|| TableError::UndeclaredBatch {
                appliance: appliance.to_string(),
                group: group.to_string(),
            })
    }
}

#[cfg(test)]
impl MetricTable {
    /// Current entry for one field
    pub fn get(&self, appliance: &str, key: &str) -> Option<MetricEntry> {
        self.order
            .iter()
            .filter(|b| b.appliance == appliance)
            .find_map(|b| {
                self.batches[b]
                    .read()
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, entry)| entry.clone())
            })
    }

    /// Copy of one batch, read under a single lock
    pub fn group_snapshot(
        &self,
        appliance: &str,
        group: &'static str,
    ) -> Result<Vec<(&'static str, MetricEntry)>, TableError> {
        Ok(self.batch(appliance, group)?.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::create_all_groups;
    use crate::value::{MetricValue, Quality};
    use std::sync::Arc;

    fn appliances() -> Vec<Appliance> {
        ["appliance_01", "appliance_02"]
            .iter()
            .map(|id| Appliance {
                identity: id.to_string(),
                url: "http://localhost:17665".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_every_declared_key_is_seeded_invalid() {
        let groups = create_all_groups();
        let table = MetricTable::seed(&appliances(), &groups);

        assert_eq!(table.declarations().len(), 32);

        for appliance in appliances() {
            for group in &groups {
                for field in group.fields() {
                    let entry = table.get(&appliance.identity, field.key).unwrap();
                    assert_eq!(entry.value, field.invalid_value);
                    assert_eq!(entry.quality, Quality::Invalid(InvalidReason::NeverPolled));
                }
            }
        }

        let status = table.get("appliance_01", "status").unwrap();
        assert_eq!(status.value, MetricValue::String("Disconnected".into()));
    }

    #[test]
    fn test_commit_touches_only_its_batch() {
        let table = MetricTable::seed(&appliances(), &create_all_groups());

        table
            .commit(
                "appliance_01",
                "appliance",
                &[("pausedPVCount", MetricEntry::good(MetricValue::Int64(7)))],
            )
            .unwrap();

        assert_eq!(
            table.get("appliance_01", "pausedPVCount"),
            Some(MetricEntry::good(MetricValue::Int64(7)))
        );
        assert_eq!(
            table.get("appliance_02", "pausedPVCount").unwrap().quality,
            Quality::Invalid(InvalidReason::NeverPolled)
        );
        assert_eq!(
            table.get("appliance_01", "pvCount").unwrap().quality,
            Quality::Invalid(InvalidReason::NeverPolled)
        );
    }

    #[test]
    fn test_commit_rejects_undeclared_keys_atomically() {
        let table = MetricTable::seed(&appliances(), &create_all_groups());

        let result = table.commit(
            "appliance_01",
            "instance",
            &[
                ("pvCount", MetricEntry::good(MetricValue::Int64(1))),
                ("bogus", MetricEntry::good(MetricValue::Int64(2))),
            ],
        );
        assert!(matches!(result, Err(TableError::UndeclaredKey { .. })));
        assert!(!table.get("appliance_01", "pvCount").unwrap().quality.is_good());

        assert!(matches!(
            table.commit("appliance_09", "instance", &[]),
            Err(TableError::UndeclaredBatch { .. })
        ));
    }

    #[test]
    fn test_snapshot_order_and_names() {
        let groups = create_all_groups();
        let table = MetricTable::seed(&appliances()[..1], &groups);

        let snapshot = table.snapshot();
        assert_eq!(snapshot.metrics.len(), 16);
        assert_eq!(snapshot.metrics[0].pv, "appliance_01:status");
        assert_eq!(snapshot.metrics[0].group, "instance");
        assert_eq!(snapshot.metrics[6].pv, "appliance_01:pausedPVCount");
        assert_eq!(snapshot.metrics[15].pv, "appliance_01:lts_available_space_percent");

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["metrics"][0]["value"], "Disconnected");
        assert!(json["taken_at"].is_string());
    }

    #[test]
    fn test_concurrent_readers_see_whole_batches() {
        let table = Arc::new(MetricTable::seed(&appliances()[..1], &create_all_groups()));

        let writer = {
            let table = Arc::clone(&table);
            std::thread::spawn(move || {
                for i in 0..500_i64 {
                    let updates: Vec<_> = ["pvCount", "connectedPVCount", "disconnectedPVCount"]
                        .iter()
                        .map(|key| (*key, MetricEntry::good(MetricValue::Int64(i))))
                        .collect();
                    table.commit("appliance_01", "instance", &updates).unwrap();
                }
            })
        };

        for _ in 0..500 {
            let batch = table.group_snapshot("appliance_01", "instance").unwrap();
            let counts: Vec<_> = batch[2..5].iter().map(|(_, e)| e.value.clone()).collect();
            assert!(counts.iter().all(|v| *v == counts[0]));
        }

        writer.join().unwrap();
    }
}
