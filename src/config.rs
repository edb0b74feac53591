// Configuration module - handles the appliance list and polling settings
//
// This module is responsible for:
// 1. Reading the JSON settings file
// 2. Applying defaults and per-group overrides
// 3. Validating the configuration before any poller starts
// 4. Providing strongly-typed access to settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::metrics::MetricGroup;

/// Default PV prefix when none is configured
pub const DEFAULT_PREFIX: &str = "MTEST:";

/// Default request timeout and poll interval, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings format: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No appliances configured")]
    NoAppliances,

    #[error("Duplicate appliance identity: {0}")]
    DuplicateIdentity(String),

    #[error("Invalid appliance '{identity}': {reason}")]
    InvalidAppliance { identity: String, reason: String },

    #[error("Unknown metric group in settings: {0}")]
    UnknownGroup(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

/// One monitored Archiver Appliance node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appliance {
    /// Appliance identity as configured in the cluster (e.g. "appliance_01")
    /// Also used as the PV namespace for this node
    pub identity: String,

    /// Base URL of the management interface (e.g. "http://10.1.236.142:17665")
    pub url: String,
}

impl Appliance {
    /// Parses the `identity=url` form used on the command line
    pub fn parse_pair(pair: &str) -> Result<Self, String> {
        let (identity, url) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected identity=url, got '{}'", pair))?;

        Ok(Appliance {
            identity: identity.trim().to_string(),
            url: url.trim().to_string(),
        })
    }

    /// Joins a management path (with optional query) onto the base URL
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidAppliance {
            identity: self.identity.clone(),
            reason: reason.to_string(),
        };

        if self.identity.is_empty() {
            return Err(invalid("identity must not be empty"));
        }
        if self.identity.contains(':') {
            return Err(invalid("identity must not contain ':'"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(invalid("url must start with http:// or https://"));
        }
        Ok(())
    }
}

/// Optional overrides for a single metric group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    /// Poll interval in seconds, falls back to `request_interval_secs`
    pub interval_secs: Option<u64>,

    /// Request timeout in seconds, falls back to `request_timeout_secs`
    pub timeout_secs: Option<u64>,

    /// Set to false to stop polling this group entirely
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GroupSettings {
    fn default() -> Self {
        GroupSettings {
            interval_secs: None,
            timeout_secs: None,
            enabled: true,
        }
    }
}

/// Resolved timing for one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Main configuration structure
///
/// # Example Settings File
/// ```json
/// {
///   "prefix": "arcapp-acc:",
///   "request_timeout_secs": 10,
///   "request_interval_secs": 10,
///   "appliances": [
///     { "identity": "appliance_01", "url": "http://10.1.236.142:17665" },
///     { "identity": "appliance_02", "url": "http://10.1.236.143:17665" }
///   ],
///   "groups": {
///     "storage": { "interval_secs": 30 }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSettings {
    /// Prefix prepended to every published PV name
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Delay between poll cycles in seconds
    #[serde(default = "default_interval")]
    pub request_interval_secs: u64,

    /// All appliances to monitor
    #[serde(default)]
    pub appliances: Vec<Appliance>,

    /// Per-group overrides keyed by group name ("instance", "appliance", "storage")
    #[serde(default)]
    pub groups: HashMap<String, GroupSettings>,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        MonitoringSettings {
            prefix: default_prefix(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_interval_secs: DEFAULT_INTERVAL_SECS,
            appliances: Vec::new(),
            groups: HashMap::new(),
        }
    }
}

impl MonitoringSettings {
    /// Loads settings from a JSON file
    ///
    /// # Returns
    /// * `Ok(MonitoringSettings)` - Parsed, not yet validated
    /// * `Err(ConfigError)` - File missing or not valid JSON
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading monitoring settings from: {}", path.display());

        let text = tokio::fs::read_to_string(path).await?;
        let settings: MonitoringSettings = serde_json::from_str(&text)?;

        info!(
            "Loaded settings with {} appliance(s) and {} group override(s)",
            settings.appliances.len(),
            settings.groups.len()
        );

        Ok(settings)
    }

    /// Checks the settings against the known group names
    ///
    /// Called once at startup; pollers assume a validated configuration.
    pub fn validate(&self, known_groups: &[&str]) -> Result<(), ConfigError> {
        if self.appliances.is_empty() {
            return Err(ConfigError::NoAppliances);
        }

        let mut seen = std::collections::HashSet::new();
        for appliance in &self.appliances {
            appliance.validate()?;
            if !seen.insert(appliance.identity.as_str()) {
                return Err(ConfigError::DuplicateIdentity(appliance.identity.clone()));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting(
                "request_interval_secs must be greater than 0".to_string(),
            ));
        }

        for (name, group) in &self.groups {
            if !known_groups.contains(&name.as_str()) {
                return Err(ConfigError::UnknownGroup(name.clone()));
            }
            if group.interval_secs == Some(0) || group.timeout_secs == Some(0) {
                return Err(ConfigError::InvalidSetting(format!(
                    "group '{}' timing must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Whether the named group should be polled
    pub fn group_enabled(&self, group: &str) -> bool {
        self.groups.get(group).map_or(true, |g| g.enabled)
    }

    /// Keeps the groups that are not disabled, in their original order
    ///
    /// The result is the single list used to seed the table, declare PVs and
    /// start pollers, so a disabled group is never exported.
    pub fn enabled_groups(&self, groups: Vec<Arc<dyn MetricGroup>>) -> Vec<Arc<dyn MetricGroup>> {
        groups
            .into_iter()
            .filter(|group| {
                let enabled = self.group_enabled(group.name());
                if !enabled {
                    info!("Metric group '{}' is disabled, skipping", group.name());
                }
                enabled
            })
            .collect()
    }

    /// Interval and timeout for the named group, overrides applied
    pub fn timing(&self, group: &str) -> PollTiming {
        let overrides = self.groups.get(group);
        let interval = overrides
            .and_then(|g| g.interval_secs)
            .unwrap_or(self.request_interval_secs);
        let timeout = overrides
            .and_then(|g| g.timeout_secs)
            .unwrap_or(self.request_timeout_secs);

        PollTiming {
            interval: Duration::from_secs(interval),
            timeout: Duration::from_secs(timeout),
        }
    }
}
