//! History provider wire records.
//!
//! The history backend answers `GET /timeline?start_time=..&end_time=..`
//! with the events in that range plus, optionally, the reconstructed state
//! at the start of the range.

use serde::{Deserialize, Serialize};

use crate::event::{StateMap, TimelineEvent};
use crate::ids::EntityId;
use crate::time::{TimeRange, Timestamp};

/// One historical state transition as returned by the history backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Upstream event serial, used as the sequence id.
    pub id: u64,
    /// The entity whose state changed.
    pub entity_id: EntityId,
    /// When the transition happened.
    pub timestamp: Timestamp,
    /// The new state.
    #[serde(default)]
    pub state: Option<String>,
    /// Unit of measurement.
    #[serde(default)]
    pub unit: Option<String>,
}

impl From<HistoryRecord> for TimelineEvent {
    fn from(record: HistoryRecord) -> Self {
        Self {
            entity_id: record.entity_id,
            timestamp: record.timestamp,
            state: record.state,
            unit: record.unit,
            sequence_id: record.id,
        }
    }
}

/// State reconstructed at the start of the requested range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Entity values at the start of the requested range: the stored
    /// snapshot with every later event up to the range start folded in.
    #[serde(default)]
    pub state: StateMap,
    /// Serial of the last event folded into `state`.
    #[serde(default)]
    pub last_event_id: Option<u64>,
    /// Upstream snapshot row id.
    #[serde(default)]
    pub snapshot_id: Option<u64>,
    /// When the stored snapshot the state was built from was taken. Earlier
    /// than the range start in general, so not a valid time for `state`.
    #[serde(default)]
    pub snapshot_time: Option<Timestamp>,
}

impl HistorySnapshot {
    /// Turn the snapshot into baseline events at `range.start`, the only
    /// instant the state is known to hold.
    ///
    /// Every entry shares the snapshot's `last_event_id` as its sequence id;
    /// entity ids differ, so the dedup identity stays unique.
    pub fn baseline_events(&self, range: TimeRange) -> Vec<TimelineEvent> {
        let at = range.start;
        let sequence_id = self.last_event_id.unwrap_or(0);
        self.state
            .iter()
            .map(|(entity_id, value)| TimelineEvent {
                entity_id: entity_id.clone(),
                timestamp: at,
                state: value.value.clone(),
                unit: value.unit.clone(),
                sequence_id,
            })
            .collect()
    }
}

/// Body of a history response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// State at the start of the range, if the backend provides it.
    #[serde(default)]
    pub snapshot: Option<HistorySnapshot>,
    /// Events inside the range.
    #[serde(default)]
    pub events: Vec<HistoryRecord>,
}
