// Poller - one polling loop for one (appliance, metric group) pair
//
// Each cycle fetches the group's endpoint, validates the response, parses it
// and commits the values to the metric table. Any failure invalidates the
// whole group. The loop never ends on its own.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Appliance, PollTiming};
use crate::error::PollError;
use crate::fetch::Fetcher;
use crate::invalidator::invalidate;
use crate::metrics::{MetricGroup, Sample};
use crate::publish::{Publisher, PvUpdate};
use crate::table::{pv_name, MetricTable};
use crate::value::MetricEntry;

/// Polls one metric group of one appliance
pub struct Poller {
    appliance: Appliance,
    group: Arc<dyn MetricGroup>,
    table: Arc<MetricTable>,
    publisher: Arc<dyn Publisher>,
    fetcher: Arc<dyn Fetcher>,
    timing: PollTiming,
}

impl Poller {
    pub fn new(
        appliance: Appliance,
        group: Arc<dyn MetricGroup>,
        table: Arc<MetricTable>,
        publisher: Arc<dyn Publisher>,
        fetcher: Arc<dyn Fetcher>,
        timing: PollTiming,
    ) -> Self {
        Poller {
            appliance,
            group,
            table,
            publisher,
            fetcher,
            timing,
        }
    }

    /// Runs one complete cycle, without sleeping
    ///
    /// On failure the group is already invalidated and the diagnostic logged
    /// when this returns.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of fields written with good quality
    /// * `Err(PollError)` - Why the group was invalidated
    pub async fn poll_once(&self) -> Result<usize, PollError> {
        match self.fetch_and_parse().await {
            Ok(sample) => {
                let count = sample.len();
                self.publish(sample);
                Ok(count)
            }
            Err(e) => {
                warn!(
                    appliance = %self.appliance.identity,
                    group = self.group.name(),
                    reason = ?e.reason(),
                    "Appliance {}: {} metrics invalidated: {}",
                    self.appliance.identity,
                    self.group.name(),
                    e
                );
                invalidate(
                    &self.table,
                    self.publisher.as_ref(),
                    &self.appliance.identity,
                    self.group.as_ref(),
                    e.reason(),
                );
                Err(e)
            }
        }
    }

    /// Polls forever, sleeping for the configured interval after each cycle
    pub async fn run(self) {
        info!(
            "Starting {} poller for appliance {} (every {:?}, timeout {:?})",
            self.group.name(),
            self.appliance.identity,
            self.timing.interval,
            self.timing.timeout
        );

        let mut consecutive_failures: u32 = 0;

        loop {
            match self.poll_once().await {
                Ok(count) => {
                    if consecutive_failures > 0 {
                        info!(
                            "Appliance {}: {} metrics recovered after {} failed cycle(s)",
                            self.appliance.identity,
                            self.group.name(),
                            consecutive_failures
                        );
                    }
                    consecutive_failures = 0;
                    debug!(
                        "Appliance {}: updated {} {} metric(s)",
                        self.appliance.identity,
                        count,
                        self.group.name()
                    );
                }
                Err(_) => consecutive_failures = consecutive_failures.saturating_add(1),
            }

            tokio::time::sleep(self.timing.interval).await;
        }
    }

    async fn fetch_and_parse(&self) -> Result<Sample, PollError> {
        let url = self.group.endpoint(&self.appliance);
        let response = self.fetcher.get(&url, self.timing.timeout).await?;

        if !response.is_success() {
            return Err(PollError::BadStatus(response.status));
        }

        self.group.parse(&self.appliance, &response.body)
    }

    /// Commits a parsed sample with good quality and pushes it to the publisher
    fn publish(&self, sample: Sample) {
        let updates: Vec<_> = sample
            .into_iter()
            .map(|(key, value)| (key, MetricEntry::good(value)))
            .collect();

        if let Err(e) = self
            .table
            .commit(&self.appliance.identity, self.group.name(), &updates)
        {
            error!(
                "Appliance {}: failed to store {} metrics: {}",
                self.appliance.identity,
                self.group.name(),
                e
            );
            return;
        }

        let batch: Vec<_> = updates
            .into_iter()
            .map(|(key, entry)| PvUpdate {
                pv: pv_name(&self.appliance.identity, key),
                value: entry.value,
                alarm: None,
            })
            .collect();
        self.publisher.publish_batch(&batch);
    }
}
