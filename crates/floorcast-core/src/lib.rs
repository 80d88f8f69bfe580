//! Timeline event store and playback engine for the Floorcast dashboard.
//!
//! Everything in this crate is synchronous and owned: the async client
//! drives it one turn at a time, so no component here needs a lock.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `floorcast.yaml` into
//!   strongly-typed structs.
//! - [`event_store`] -- Bounded per-entity ordered event log.
//! - [`coverage`] -- Fetched-range tracking and single-flight fetch
//!   planning.
//! - [`playback`] -- Live/paused/playing clock behind the scrub track.
//! - [`resolver`] -- State reconstruction at a playhead.
//! - [`filter`] -- Glob block list for entity ids.
//! - [`session`] -- Per-connection state that applies stream messages and
//!   history batches.
//! - [`signals`] -- `watch` channels consumers subscribe to.

pub mod config;
pub mod coverage;
pub mod event_store;
pub mod filter;
pub mod playback;
pub mod resolver;
pub mod session;
pub mod signals;

pub use config::{ConfigError, CoverageMode, FloorcastConfig};
pub use coverage::{CoveredRanges, FetchPlanner, FetchSkip, FetchTicket};
pub use event_store::EventStore;
pub use filter::EntityFilter;
pub use playback::{PlaybackClock, PlaybackError, PlaybackMode, PlaybackState, Playhead, TickOutcome};
pub use session::{Applied, SessionState};
pub use signals::Signals;
