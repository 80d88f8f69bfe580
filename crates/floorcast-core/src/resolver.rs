//! State-at-time resolution.
//!
//! Live playheads show the current-state map exactly as the stream last
//! delivered it. Any other playhead is reconstructed from the event store:
//! for each entity, the latest event at or before the playhead. Entities
//! with nothing that early are left out rather than shown as unknown.

use std::sync::Arc;

use floorcast_types::{StateMap, Timestamp};

use crate::event_store::EventStore;
use crate::playback::Playhead;

/// Resolve the display state for `playhead`.
///
/// The live path shares `current` without copying; the past path builds a
/// fresh map from `store`. The result depends only on the inputs.
pub fn resolve(playhead: Playhead, current: &Arc<StateMap>, store: &EventStore) -> Arc<StateMap> {
    match playhead {
        Playhead::Live => Arc::clone(current),
        Playhead::At(at) => Arc::new(state_at(store, at)),
    }
}

/// Reconstruct every entity's value at `at` from the store.
pub fn state_at(store: &EventStore, at: Timestamp) -> StateMap {
    store
        .entity_ids()
        .filter_map(|entity_id| {
            store
                .query(entity_id, at)
                .map(|event| (entity_id.clone(), event.value()))
        })
        .collect()
}
