//! Bounded, per-entity ordered log of timeline events.
//!
//! The store merges two feeds into one series per entity: events appended
//! one at a time from the live stream, and batches backfilled from history.
//! Both paths go through the same ordered insert, so the result does not
//! depend on arrival order.
//!
//! # Invariants
//!
//! - Each entity's events are sorted by `(timestamp, sequence_id)`.
//! - No two retained events share `(entity_id, timestamp, sequence_id)`.
//! - At most `capacity` events are retained; on overflow the globally
//!   oldest events are evicted first.
//!
//! Point queries binary-search the entity's subsequence, so they stay
//! O(log k) while the playback loop calls them for every visible entity on
//! every frame.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use floorcast_types::{EntityId, TimelineEvent, Timestamp};
use tracing::debug;

/// Position of an event in the global age order.
type AgeKey = (Timestamp, u64, EntityId);

/// In-memory timeline event store.
#[derive(Debug, Clone)]
pub struct EventStore {
    /// Maximum number of retained events.
    capacity: usize,
    /// Per-entity events in `(timestamp, sequence_id)` order.
    by_entity: BTreeMap<EntityId, VecDeque<TimelineEvent>>,
    /// Every retained event, oldest first, for global eviction.
    by_age: BTreeSet<AgeKey>,
}

impl EventStore {
    /// Create an empty store retaining at most `capacity` events.
    ///
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            by_entity: BTreeMap::new(),
            by_age: BTreeSet::new(),
        }
    }

    /// Maximum number of retained events.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained events across all entities.
    pub fn len(&self) -> usize {
        self.by_age.len()
    }

    /// Whether the store holds no events.
    pub fn is_empty(&self) -> bool {
        self.by_age.is_empty()
    }

    /// Number of entities with at least one retained event.
    pub fn entity_count(&self) -> usize {
        self.by_entity.len()
    }

    /// Entities with at least one retained event, in id order.
    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.by_entity.keys()
    }

    /// All retained events of one entity, oldest first.
    pub fn entity_events(&self, entity_id: &EntityId) -> impl Iterator<Item = &TimelineEvent> {
        self.by_entity.get(entity_id).into_iter().flatten()
    }

    /// Timestamp of the oldest retained event.
    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.by_age.first().map(|(ts, _, _)| *ts)
    }

    /// Timestamp of the newest retained event.
    pub fn newest_timestamp(&self) -> Option<Timestamp> {
        self.by_age.last().map(|(ts, _, _)| *ts)
    }

    /// Drop every event.
    pub fn clear(&mut self) {
        self.by_entity.clear();
        self.by_age.clear();
    }

    /// Insert one event, keeping the entity's subsequence ordered.
    ///
    /// Returns `false` if an event with the same `(entity_id, timestamp,
    /// sequence_id)` was already retained, in which case nothing changes.
    /// If the store overflows, the globally oldest events are evicted, which
    /// may include the one just inserted.
    pub fn append(&mut self, event: TimelineEvent) -> bool {
        let inserted = self.insert_ordered(event);
        if inserted {
            self.evict_overflow();
        }
        inserted
    }

    /// Insert a batch of events, typically a history fetch result.
    ///
    /// Produces the same final state as appending each event individually
    /// in timestamp order. Already-retained events are skipped, so merging
    /// overlapping data is harmless. Returns the number of newly inserted
    /// events (before eviction).
    pub fn merge_range(&mut self, events: impl IntoIterator<Item = TimelineEvent>) -> usize {
        let mut batch: Vec<TimelineEvent> = events.into_iter().collect();
        batch.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

        let received = batch.len();
        let mut inserted: usize = 0;
        for event in batch {
            if self.insert_ordered(event) {
                inserted = inserted.saturating_add(1);
            }
        }
        let evicted = self.evict_overflow();

        debug!(
            received,
            inserted,
            evicted,
            retained = self.len(),
            "merged event batch"
        );
        inserted
    }

    /// Latest event of `entity_id` with `timestamp <= at`, if any.
    pub fn query(&self, entity_id: &EntityId, at: Timestamp) -> Option<&TimelineEvent> {
        let events = self.by_entity.get(entity_id)?;
        let after = events.partition_point(|event| event.timestamp <= at);
        after.checked_sub(1).and_then(|idx| events.get(idx))
    }

    /// Every retained event with `start <= timestamp <= end`, grouped by
    /// entity. Intended for tick marks, not state reconstruction.
    pub fn events_in_window(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> impl Iterator<Item = &TimelineEvent> {
        self.by_entity.values().flat_map(move |events| {
            let lo = events.partition_point(|event| event.timestamp < start);
            let hi = events.partition_point(|event| event.timestamp <= end).max(lo);
            events.range(lo..hi)
        })
    }

    /// Ordered insert without eviction. Returns whether the event was new.
    fn insert_ordered(&mut self, event: TimelineEvent) -> bool {
        let key = event.order_key();
        let events = self.by_entity.entry(event.entity_id.clone()).or_default();
        match events.binary_search_by(|stored| stored.order_key().cmp(&key)) {
            Ok(_) => false,
            Err(pos) => {
                self.by_age
                    .insert((event.timestamp, event.sequence_id, event.entity_id.clone()));
                events.insert(pos, event);
                true
            }
        }
    }

    /// Evict the globally oldest events until within capacity. Returns the
    /// number evicted.
    fn evict_overflow(&mut self) -> usize {
        let mut evicted: usize = 0;
        while self.by_age.len() > self.capacity {
            let Some((_, _, entity_id)) = self.by_age.pop_first() else {
                break;
            };
            // The globally oldest event is always the front of its entity.
            if let Some(events) = self.by_entity.get_mut(&entity_id) {
                events.pop_front();
                if events.is_empty() {
                    self.by_entity.remove(&entity_id);
                }
            }
            evicted = evicted.saturating_add(1);
        }
        evicted
    }
}
