// Publish module - the process-variable export surface
//
// The core never talks to a control-system protocol directly. It pushes
// values through the `Publisher` trait, mirroring the calls a PV server
// driver offers: declare, write, set alarm, flush.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::table::PvDeclaration;
use crate::value::MetricValue;

/// Alarm condition raised on a PV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    /// Communication with the data source failed
    Comm,
}

/// Severity of a raised alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Minor,
}

/// One PV update within a published batch
#[derive(Debug, Clone, PartialEq)]
pub struct PvUpdate {
    pub pv: String,
    pub value: MetricValue,

    /// Alarm raised together with the value; `None` clears any previous alarm
    pub alarm: Option<(Alarm, Severity)>,
}

/// Export surface for published metrics
///
/// `write` and `set_quality` may be called for disjoint PVs from different
/// pollers. A `write` without a following `set_quality` clears any alarm
/// previously raised on that PV.
pub trait Publisher: Send + Sync {
    /// Declares every PV once, before any poller starts
    ///
    /// Declared PVs start in COMM alarm until their first good value.
    fn create(&self, prefix: &str, declarations: &[PvDeclaration]);

    /// Pushes the latest value of a PV
    fn write(&self, pv: &str, value: &MetricValue);

    /// Marks the value just written as untrustworthy
    fn set_quality(&self, pv: &str, alarm: Alarm, severity: Severity);

    /// Makes the writes since the last flush visible to clients
    fn flush(&self);

    /// Writes one batch and flushes it
    ///
    /// Pollers publish through this call only. Implementations shared by
    /// concurrent callers override it so that one caller's flush can never
    /// expose half of another caller's batch.
    fn publish_batch(&self, updates: &[PvUpdate]) {
        for update in updates {
            self.write(&update.pv, &update.value);
            if let Some((alarm, severity)) = update.alarm {
                self.set_quality(&update.pv, alarm, severity);
            }
        }
        self.flush();
    }
}

/// Alarm state of one PV
type AlarmState = Option<(Alarm, Severity)>;

/// Alarm totals reported at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmSummary {
    /// PVs currently in alarm
    pub active: usize,
    pub raised: u64,
    pub cleared: u64,
}

#[derive(Default)]
struct LogState {
    prefix: String,

    /// Changes staged by `write`/`set_quality` since the last flush
    staged: HashMap<String, AlarmState>,

    /// PVs currently in alarm
    alarmed: HashSet<String>,

    raised_total: u64,
    cleared_total: u64,
}

impl LogState {
    /// Applies alarm changes and logs the resulting transitions
    fn apply(&mut self, changes: impl IntoIterator<Item = (String, AlarmState)>) {
        let mut raised = 0;
        let mut cleared = 0;
        for (pv, alarm) in changes {
            match alarm {
                Some(_) => {
                    if self.alarmed.insert(pv) {
                        raised += 1;
                    }
                }
                None => {
                    if self.alarmed.remove(&pv) {
                        cleared += 1;
                    }
                }
            }
        }

        self.raised_total += raised;
        self.cleared_total += cleared;

        if raised > 0 {
            warn!(
                "{} PV(s) entered COMM alarm, {} in alarm",
                raised,
                self.alarmed.len()
            );
        }
        if cleared > 0 {
            info!(
                "{} PV(s) cleared from alarm, {} in alarm",
                cleared,
                self.alarmed.len()
            );
        }
    }
}

/// Publisher that reports through `tracing`
///
/// Lists the generated PVs at startup and logs alarm transitions.
/// Stands in for a Channel Access server driver.
#[derive(Default)]
pub struct LogPublisher {
    state: Mutex<LogState>,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alarm_summary(&self) -> AlarmSummary {
        let state = self.state.lock();
        AlarmSummary {
            active: state.alarmed.len(),
            raised: state.raised_total,
            cleared: state.cleared_total,
        }
    }
}

impl Publisher for LogPublisher {
    fn create(&self, prefix: &str, declarations: &[PvDeclaration]) {
        let mut state = self.state.lock();
        state.prefix = prefix.to_string();

        info!("The following {} PVs will be generated:", declarations.len());
        for decl in declarations {
            match (decl.precision, decl.unit) {
                (Some(prec), Some(unit)) => info!(
                    "  {}{} ({:?}, prec {}, unit '{}')",
                    prefix, decl.pv, decl.kind, prec, unit
                ),
                _ => info!("  {}{} ({:?})", prefix, decl.pv, decl.kind),
            }
        }

        // Seeded values are invalid until polled
        state.apply(
            declarations
                .iter()
                .map(|decl| (decl.pv.clone(), Some((Alarm::Comm, Severity::Minor)))),
        );
    }

    fn write(&self, pv: &str, value: &MetricValue) {
        let mut state = self.state.lock();
        debug!("{}{} = {}", state.prefix, pv, value);
        state.staged.insert(pv.to_string(), None);
    }

    fn set_quality(&self, pv: &str, alarm: Alarm, severity: Severity) {
        self.state
            .lock()
            .staged
            .insert(pv.to_string(), Some((alarm, severity)));
    }

    fn flush(&self) {
        let mut state = self.state.lock();
        let staged = std::mem::take(&mut state.staged);
        debug!("Flushing {} PV update(s)", staged.len());
        state.apply(staged);
    }

    fn publish_batch(&self, updates: &[PvUpdate]) {
        // One lock for the whole batch; the shared staging area is not used
        let mut state = self.state.lock();
        for update in updates {
            debug!("{}{} = {}", state.prefix, update.pv, update.value);
        }
        state.apply(updates.iter().map(|u| (u.pv.clone(), u.alarm)));
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldKind;
    use std::sync::Arc;

    #[test]
    fn test_alarm_raised_then_cleared_by_write() {
        let publisher = LogPublisher::new();
        publisher.create("MTEST:", &[]);

        publisher.write("a:pvCount", &MetricValue::Int64(0));
        publisher.set_quality("a:pvCount", Alarm::Comm, Severity::Minor);
        publisher.write("a:status", &MetricValue::String("Disconnected".into()));
        publisher.set_quality("a:status", Alarm::Comm, Severity::Minor);
        publisher.flush();
        assert_eq!(publisher.alarm_summary().active, 2);

        // Repeated invalidation leaves the alarm set unchanged
        publisher.write("a:pvCount", &MetricValue::Int64(0));
        publisher.set_quality("a:pvCount", Alarm::Comm, Severity::Minor);
        publisher.flush();
        assert_eq!(publisher.alarm_summary().active, 2);

        publisher.write("a:pvCount", &MetricValue::Int64(100));
        publisher.flush();
        assert_eq!(publisher.alarm_summary().active, 1);
    }

    #[test]
    fn test_flush_without_changes() {
        let publisher = LogPublisher::new();
        publisher.flush();
        assert_eq!(publisher.alarm_summary(), AlarmSummary::default());
    }

    fn update(pv: &str, value: i64, alarmed: bool) -> PvUpdate {
        PvUpdate {
            pv: pv.to_string(),
            value: MetricValue::Int64(value),
            alarm: alarmed.then_some((Alarm::Comm, Severity::Minor)),
        }
    }

    fn declaration(pv: &str) -> PvDeclaration {
        PvDeclaration {
            pv: pv.to_string(),
            kind: FieldKind::Int,
            precision: None,
            unit: None,
        }
    }

    #[test]
    fn test_declared_pvs_start_in_alarm() {
        let publisher = LogPublisher::new();
        publisher.create(
            "MTEST:",
            &[declaration("a:pvCount"), declaration("a:pausedPVCount"), declaration("b:pvCount")],
        );
        assert_eq!(publisher.alarm_summary().active, 3);

        publisher.publish_batch(&[update("a:pvCount", 100, false)]);
        assert_eq!(
            publisher.alarm_summary(),
            AlarmSummary {
                active: 2,
                raised: 3,
                cleared: 1,
            }
        );
    }

    #[test]
    fn test_other_batches_do_not_clear_alarms() {
        let publisher = LogPublisher::new();

        publisher.publish_batch(&[update("a:x", 0, true)]);
        assert_eq!(publisher.alarm_summary().active, 1);

        // Another poller's batch lands between two invalidations of a:x
        publisher.publish_batch(&[update("b:y", 5, false)]);
        publisher.publish_batch(&[update("a:x", 0, true)]);

        assert_eq!(
            publisher.alarm_summary(),
            AlarmSummary {
                active: 1,
                raised: 1,
                cleared: 0,
            }
        );
    }

    #[test]
    fn test_concurrent_batches_keep_alarm_state() {
        let publisher = Arc::new(LogPublisher::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let publisher = Arc::clone(&publisher);
                std::thread::spawn(move || {
                    let pv = format!("appliance_{}:pvCount", i);
                    // Odd threads keep failing, even threads keep succeeding
                    for _ in 0..200 {
                        publisher.publish_batch(&[update(&pv, 0, i % 2 == 1)]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            publisher.alarm_summary(),
            AlarmSummary {
                active: 4,
                raised: 4,
                cleared: 0,
            }
        );
    }
}
