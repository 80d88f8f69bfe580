//! Inbound live-stream messages.
//!
//! The stream server sends JSON text frames tagged by a `type` field. Each
//! kind maps to one [`StreamMessage`] variant so consumers match on it
//! exhaustively.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::event::StateMap;
use crate::ids::{EntityId, SubscriberId};
use crate::registry::Registry;
use crate::time::Timestamp;

/// A message received on the live event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum StreamMessage {
    /// Full topology snapshot; replaces any previous registry.
    Registry {
        /// The registry.
        registry: Registry,
    },
    /// Subscription acknowledgement.
    Connected {
        /// Identifier assigned to this subscriber.
        subscriber_id: SubscriberId,
    },
    /// Current value of every known entity; replaces the current-state map.
    Snapshot {
        /// Entity values keyed by entity id.
        state: StateMap,
    },
    /// A single state transition.
    Event {
        /// The entity whose state changed.
        entity_id: EntityId,
        /// The new state.
        state: Option<String>,
        /// Unit of measurement.
        #[serde(default)]
        unit: Option<String>,
        /// When the transition was observed.
        #[ts(type = "number")]
        timestamp: Timestamp,
        /// Upstream delivery-order tiebreaker.
        #[ts(type = "number")]
        sequence_id: u64,
    },
}

impl StreamMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] for unparseable frames or
    /// unknown message kinds.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Short name of the message kind, for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Registry { .. } => "registry",
            Self::Connected { .. } => "connected",
            Self::Snapshot { .. } => "snapshot",
            Self::Event { .. } => "event",
        }
    }
}
