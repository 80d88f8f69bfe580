//! Error types for the dashboard binary.

use floorcast_client::ClientError;
use floorcast_core::ConfigError;

/// Errors that stop the dashboard before or during startup.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// The stream or history client could not be set up.
    #[error("client error: {source}")]
    Client {
        /// The underlying client error.
        #[from]
        source: ClientError,
    },
}
