// Fetch module - HTTP access to the appliance management interface
//
// Pollers go through the `Fetcher` trait so that the poll cycle can be driven
// by scripted responses in tests. The production implementation wraps a
// shared `reqwest::Client`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::PollError;

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a single GET request
///
/// Implementations must not retry; a failed request is resolved by the
/// poller's own interval.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, failing with `Timeout` once `timeout` has elapsed
    ///
    /// # Returns
    /// * `Ok(HttpResponse)` - Any completed exchange, including non-2xx
    /// * `Err(PollError)` - `Timeout` or `ConnectionRefused`
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, PollError>;
}

/// `reqwest`-backed fetcher shared by every poller
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates the fetcher and its connection pool
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("archiver-status/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(HttpFetcher { client })
    }

    /// Maps a transport error onto the poll error taxonomy
    fn classify(err: reqwest::Error) -> PollError {
        if err.is_timeout() {
            PollError::Timeout
        } else {
            // Connect, DNS, reset and body-read failures all mean the
            // appliance could not be reached for this cycle
            PollError::ConnectionRefused(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, PollError> {
        debug!("GET {} (timeout {:?})", url, timeout);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(Self::classify)?;

        Ok(HttpResponse { status, body })
    }
}
