// Error types for a single poll cycle
//
// Every variant is recoverable: the poller invalidates its group, logs the
// error and tries again after the configured interval.

use thiserror::Error;

use crate::value::InvalidReason;

/// Errors that can occur while fetching or decoding one metric group
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("request timed out")]
    Timeout,

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("bad response status code {0}")]
    BadStatus(u16),

    #[error("response body is empty")]
    EmptyBody,

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("instance data is not found for identity '{0}'")]
    InstanceNotFound(String),

    #[error("response does not include {0}")]
    MissingField(String),

    #[error("field {field} has non-numeric value '{raw}'")]
    InvalidNumber { field: String, raw: String },
}

impl PollError {
    /// Maps this error onto the reason tag published alongside invalid values
    pub fn reason(&self) -> InvalidReason {
        match self {
            PollError::Timeout => InvalidReason::Timeout,
            PollError::ConnectionRefused(_) => InvalidReason::ConnectionRefused,
            PollError::BadStatus(_) => InvalidReason::BadStatus,
            PollError::EmptyBody => InvalidReason::EmptyBody,
            PollError::MalformedBody(_) | PollError::InvalidNumber { .. } => {
                InvalidReason::MalformedBody
            }
            PollError::InstanceNotFound(_) | PollError::MissingField(_) => {
                InvalidReason::MissingField
            }
        }
    }
}

/// Errors raised by the metric table
#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("no batch declared for appliance '{appliance}' group '{group}'")]
    UndeclaredBatch { appliance: String, group: String },

    #[error("key '{key}' is not declared in group '{group}'")]
    UndeclaredKey { group: String, key: String },
}
