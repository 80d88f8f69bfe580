//! History provider abstraction and the HTTP implementation.
//!
//! The history backend answers `GET {base_url}{timeline_path}` with
//! `start_time`/`end_time` query parameters in RFC 3339 UTC. Anything that
//! can produce a [`HistoryResponse`] for a [`TimeRange`] can stand in for
//! it, which is how the fetcher is tested without a network.

use std::future::Future;
use std::time::Duration;

use floorcast_core::config::HistoryConfig;
use floorcast_types::{HistoryResponse, TimeRange};
use tracing::debug;

use crate::error::ClientError;

/// Source of historical events for a time range.
pub trait HistoryProvider: Send + Sync + 'static {
    /// Fetch every event in `range`, plus the state at its start if the
    /// backend provides one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HistoryFetchFailed`] on any failure.
    fn fetch(
        &self,
        range: TimeRange,
    ) -> impl Future<Output = Result<HistoryResponse, ClientError>> + Send;
}

/// History provider backed by the dashboard server's `/timeline` endpoint.
#[derive(Debug, Clone)]
pub struct HttpHistoryProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpHistoryProvider {
    /// Build a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HttpClient`] if the HTTP client cannot be
    /// constructed (e.g. the TLS backend fails to initialize).
    pub fn new(config: &HistoryConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: timeline_url(&config.base_url, &config.timeline_path),
        })
    }

    /// The full endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl HistoryProvider for HttpHistoryProvider {
    async fn fetch(&self, range: TimeRange) -> Result<HistoryResponse, ClientError> {
        let failed = |reason: String| ClientError::HistoryFetchFailed { range, reason };

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("start_time", range.start.to_rfc3339()),
                ("end_time", range.end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(failed(format!("backend returned {status}: {body}")));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("response parse failed: {e}")))?;
        debug!(%range, events = body.events.len(), has_snapshot = body.snapshot.is_some(), "history fetched");
        Ok(body)
    }
}

/// Join the base URL and endpoint path with exactly one slash.
fn timeline_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
