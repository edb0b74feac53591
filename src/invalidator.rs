// Invalidator - marks a whole metric group as untrustworthy
//
// Used by every poller on every kind of failure. All fields of the group are
// replaced with their declared invalid value in one table commit, then the
// publisher raises a COMM alarm on each of them.

use tracing::error;

use crate::metrics::MetricGroup;
use crate::publish::{Alarm, Publisher, PvUpdate, Severity};
use crate::table::{pv_name, MetricTable};
use crate::value::{InvalidReason, MetricEntry};

/// Writes the invalid state of `group` for one appliance
///
/// Idempotent: calling it again with the same reason leaves the table and
/// the publisher's alarm state unchanged.
///
/// # Arguments
/// * `table` - Shared metric table
/// * `publisher` - Export surface to notify
/// * `identity` - Appliance whose group failed
/// * `group` - The failed group
/// * `reason` - Tag stored with every invalidated value
pub fn invalidate(
    table: &MetricTable,
    publisher: &dyn Publisher,
    identity: &str,
    group: &dyn MetricGroup,
    reason: InvalidReason,
) {
    let updates: Vec<_> = group
        .fields()
        .iter()
        .map(|field| {
            (
                field.key,
                MetricEntry::invalid(field.invalid_value.clone(), reason),
            )
        })
        .collect();

    if let Err(e) = table.commit(identity, group.name(), &updates) {
        error!("Appliance {}: failed to invalidate {} metrics: {}", identity, group.name(), e);
        return;
    }

    let batch: Vec<_> = group
        .fields()
        .iter()
        .map(|field| PvUpdate {
            pv: pv_name(identity, field.key),
            value: field.invalid_value.clone(),
            alarm: Some((Alarm::Comm, Severity::Minor)),
        })
        .collect();
    publisher.publish_batch(&batch);
}
