//! Async I/O for the Floorcast timeline: the live stream connection, the
//! history provider, the range fetcher, and the session driver that ties
//! them to the synchronous core.
//!
//! # Modules
//!
//! - [`connection`] -- `WebSocket` reader for the live event stream.
//! - [`history`] -- [`HistoryProvider`] trait and [`HttpHistoryProvider`].
//! - [`fetcher`] -- Range fetcher with inline and background entry points.
//! - [`driver`] -- The single-task `select!` loop and [`PlaybackHandle`].
//! - [`error`] -- [`ClientError`].

pub mod connection;
pub mod driver;
pub mod error;
pub mod fetcher;
pub mod history;

pub use connection::{StreamConnection, StreamItem};
pub use driver::{DriverExit, PlaybackCommand, PlaybackHandle, SessionDriver};
pub use error::ClientError;
pub use fetcher::{FetchCompletion, FetchOutcome, RangeFetcher};
pub use history::{HistoryProvider, HttpHistoryProvider};
