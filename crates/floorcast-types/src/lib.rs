//! Shared type definitions for the Floorcast timeline dashboard.
//!
//! This crate holds every type that crosses a process boundary: the live
//! stream's messages, the history backend's records, and the registry
//! topology. Types shared with the browser dashboard are exported to
//! `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers
//! - [`time`] -- Millisecond [`Timestamp`] and closed [`TimeRange`]
//! - [`event`] -- [`TimelineEvent`] and per-entity values
//! - [`registry`] -- Floor/area/device/entity topology and display helpers
//! - [`message`] -- Inbound live-stream messages
//! - [`history`] -- History backend wire records

pub mod event;
pub mod history;
pub mod ids;
pub mod message;
pub mod registry;
pub mod time;

pub use event::{EntityValue, StateMap, TimelineEvent};
pub use history::{HistoryRecord, HistoryResponse, HistorySnapshot};
pub use ids::{AreaId, DeviceId, EntityId, FloorId, SubscriberId};
pub use message::StreamMessage;
pub use registry::{format_state, Area, Device, Entity, Floor, Registry};
pub use time::{TimeRange, Timestamp, TimestampParseError};
