//! Timeline events and entity values.
//!
//! A [`TimelineEvent`] is one observed state transition of one entity. Events
//! are immutable; the store only ever inserts or evicts them whole.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::EntityId;
use crate::time::Timestamp;

/// One observed state transition.
///
/// Events are ordered by `timestamp`; `sequence_id` only breaks ties between
/// events that share a timestamp because of clock coarseness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TimelineEvent {
    /// The entity whose state changed.
    pub entity_id: EntityId,
    /// When the transition was observed (epoch milliseconds).
    #[ts(type = "number")]
    pub timestamp: Timestamp,
    /// The new state, or `None` when the entity reported no state.
    pub state: Option<String>,
    /// Unit of measurement, if the entity has one.
    pub unit: Option<String>,
    /// Upstream delivery-order tiebreaker.
    #[ts(type = "number")]
    pub sequence_id: u64,
}

impl TimelineEvent {
    /// Create a new event.
    pub fn new(
        entity_id: impl Into<EntityId>,
        timestamp: Timestamp,
        state: Option<String>,
        unit: Option<String>,
        sequence_id: u64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            timestamp,
            state,
            unit,
            sequence_id,
        }
    }

    /// Position of this event within its entity's ordered subsequence.
    pub const fn order_key(&self) -> (Timestamp, u64) {
        (self.timestamp, self.sequence_id)
    }

    /// The value this event sets, as it appears in a state map.
    pub fn value(&self) -> EntityValue {
        EntityValue {
            value: self.state.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// The displayed value of an entity at some point in time.
///
/// Accepts either `{"value": .., "unit": ..}` or a bare string/null on the
/// wire; older stream servers send snapshots as `entity -> state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(from = "EntityValueRepr")]
#[ts(export, export_to = "bindings/")]
pub struct EntityValue {
    /// The state string, or `None` if the entity has no state.
    pub value: Option<String>,
    /// Unit of measurement, if any.
    pub unit: Option<String>,
}

/// Accepted wire shapes for an [`EntityValue`].
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityValueRepr {
    Full {
        value: Option<String>,
        #[serde(default)]
        unit: Option<String>,
    },
    Bare(Option<String>),
}

impl From<EntityValueRepr> for EntityValue {
    fn from(repr: EntityValueRepr) -> Self {
        match repr {
            EntityValueRepr::Full { value, unit } => Self { value, unit },
            EntityValueRepr::Bare(value) => Self { value, unit: None },
        }
    }
}

impl EntityValue {
    /// Create a value with an optional unit.
    pub fn new(value: Option<&str>, unit: Option<&str>) -> Self {
        Self {
            value: value.map(str::to_owned),
            unit: unit.map(str::to_owned),
        }
    }
}

/// Per-entity displayed values, keyed by entity id.
pub type StateMap = BTreeMap<EntityId, EntityValue>;
