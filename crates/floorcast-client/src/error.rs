//! Error types for the async client.
//!
//! Every variant is recovered at the boundary where it occurs: a lost
//! stream clears the session, a failed fetch leaves coverage unchanged, a
//! malformed frame is dropped. None of them crash the driver.

use floorcast_core::{ConfigError, PlaybackError};
use floorcast_types::TimeRange;

/// Errors that can occur while talking to the stream or history backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The live stream closed or errored.
    #[error("stream connection lost: {reason}")]
    ConnectionLost {
        /// What ended the connection.
        reason: String,
    },

    /// A history range request failed (network, status, or body).
    #[error("history fetch for {range} failed: {reason}")]
    HistoryFetchFailed {
        /// The requested range.
        range: TimeRange,
        /// Description of the failure.
        reason: String,
    },

    /// A live text frame could not be parsed.
    #[error("malformed stream message: {source}")]
    MalformedMessage {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    HttpClient {
        /// The underlying reqwest error.
        #[from]
        source: reqwest::Error,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A playback command was rejected.
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// The session driver is no longer running.
    #[error("session driver has stopped")]
    DriverStopped,
}
