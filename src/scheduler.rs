// Scheduler module - starts one poller per (appliance, metric group) pair
//
// This module implements the scheduling logic using Tokio tasks.
// Each poller runs on its own independent interval.
//
// # Architecture
// - Each (appliance, group) pair runs in its own async task
// - Tasks run concurrently and independently, with no shared queue
// - Failures in one group or appliance don't affect others

use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::MonitoringSettings;
use crate::fetch::Fetcher;
use crate::metrics::MetricGroup;
use crate::poller::Poller;
use crate::publish::Publisher;
use crate::table::MetricTable;

/// Metric scheduler that owns the shared handles given to every poller
pub struct MetricScheduler {
    /// Validated configuration
    settings: Arc<MonitoringSettings>,

    /// Shared table of latest values
    table: Arc<MetricTable>,

    /// Export surface notified after every batch
    publisher: Arc<dyn Publisher>,

    /// HTTP access shared by all pollers
    fetcher: Arc<dyn Fetcher>,
}

impl MetricScheduler {
    /// Creates a new MetricScheduler instance
    pub fn new(
        settings: MonitoringSettings,
        table: Arc<MetricTable>,
        publisher: Arc<dyn Publisher>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        MetricScheduler {
            settings: Arc::new(settings),
            table,
            publisher,
            fetcher,
        }
    }

    /// Builds one poller per enabled (appliance, group) pair
    fn pollers(&self, groups: &[Arc<dyn MetricGroup>]) -> Vec<Poller> {
        let mut pollers = Vec::new();

        for appliance in &self.settings.appliances {
            for group in groups {
                if !self.settings.group_enabled(group.name()) {
                    continue;
                }

                pollers.push(Poller::new(
                    appliance.clone(),
                    Arc::clone(group),
                    Arc::clone(&self.table),
                    Arc::clone(&self.publisher),
                    Arc::clone(&self.fetcher),
                    self.settings.timing(group.name()),
                ));
            }
        }

        pollers
    }

    /// Starts every poller and waits on them
    ///
    /// Pollers never finish on their own, so this only returns if every task
    /// has panicked or been cancelled.
    pub async fn start(self, groups: Vec<Arc<dyn MetricGroup>>) {
        let handles: Vec<_> = self
            .pollers(&groups)
            .into_iter()
            .map(|poller| tokio::spawn(poller.run()))
            .collect();

        info!("Successfully started {} poller task(s)", handles.len());

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Poller task panicked: {}", e);
            }
        }

        error!("All poller tasks have stopped");
    }

    /// Runs a single cycle of every poller concurrently
    ///
    /// Useful for:
    /// - Checking connectivity to every appliance
    /// - Scripting and debugging
    ///
    /// # Returns
    /// (succeeded, total) cycle counts
    pub async fn collect_once(&self, groups: &[Arc<dyn MetricGroup>]) -> (usize, usize) {
        info!("Running one-time metric collection");

        let pollers = self.pollers(groups);
        let total = pollers.len();

        let results = join_all(pollers.iter().map(|p| p.poll_once())).await;
        let success_count = results.iter().filter(|r| r.is_ok()).count();

        info!(
            "One-time collection complete: {}/{} cycles succeeded",
            success_count, total
        );

        (success_count, total)
    }
}
