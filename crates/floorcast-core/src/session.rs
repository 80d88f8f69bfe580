//! Per-connection session state.
//!
//! [`SessionState`] is created when the stream connects and cleared when it
//! drops. It owns the registry, the current-state map, the event store and
//! the fetch planner, and it is the only place stream messages and history
//! batches are applied. Callers hold it by `&mut`, one turn at a time, so
//! nothing inside needs a lock.

use std::sync::Arc;

use floorcast_types::{
    HistoryResponse, Registry, StateMap, StreamMessage, SubscriberId, TimeRange, TimelineEvent,
};
use tracing::{debug, info};

use crate::config::{ConfigError, FloorcastConfig};
use crate::coverage::{FetchPlanner, FetchSkip, FetchTicket};
use crate::event_store::EventStore;
use crate::filter::EntityFilter;
use crate::playback::Playhead;
use crate::resolver;

/// What applying a stream message changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The registry was replaced.
    Registry,
    /// The subscriber id was recorded.
    Connected,
    /// The current-state map was replaced.
    Snapshot {
        /// Entities in the new map after filtering.
        entities: usize,
    },
    /// A live event was applied.
    Event {
        /// Whether the event store gained a new event (false for a
        /// duplicate).
        stored: bool,
    },
    /// The message concerned a blocked entity and was dropped.
    Blocked,
}

/// Everything known about the current connection.
#[derive(Debug, Clone)]
pub struct SessionState {
    registry: Option<Arc<Registry>>,
    current: Arc<StateMap>,
    store: EventStore,
    planner: FetchPlanner,
    filter: EntityFilter,
    subscriber: Option<SubscriberId>,
    seed_from_snapshot: bool,
}

impl SessionState {
    /// Build an empty session from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a block list pattern does not
    /// compile.
    pub fn new(config: &FloorcastConfig) -> Result<Self, ConfigError> {
        let filter =
            EntityFilter::new(&config.filter.entity_blocklist).map_err(|err| ConfigError::Invalid {
                reason: format!("filter.entity_blocklist: {err}"),
            })?;
        Ok(Self {
            registry: None,
            current: Arc::new(StateMap::new()),
            store: EventStore::new(config.store.max_events),
            planner: FetchPlanner::new(config.store.coverage, config.playback.refetch_slack_ms),
            filter,
            subscriber: None,
            seed_from_snapshot: config.history.seed_from_snapshot,
        })
    }

    /// The latest registry, if one was received.
    pub const fn registry(&self) -> Option<&Arc<Registry>> {
        self.registry.as_ref()
    }

    /// The current-state map as last delivered by the stream.
    pub const fn current_state(&self) -> &Arc<StateMap> {
        &self.current
    }

    /// The event store.
    pub const fn store(&self) -> &EventStore {
        &self.store
    }

    /// The fetch planner.
    pub const fn planner(&self) -> &FetchPlanner {
        &self.planner
    }

    /// The subscriber id acknowledged by the stream.
    pub const fn subscriber(&self) -> Option<SubscriberId> {
        self.subscriber
    }

    /// Apply one stream message.
    pub fn apply(&mut self, message: StreamMessage) -> Applied {
        match message {
            StreamMessage::Registry { registry } => {
                info!(
                    entities = registry.entities.len(),
                    floors = registry.floors.len(),
                    "registry received"
                );
                self.registry = Some(Arc::new(registry));
                Applied::Registry
            }
            StreamMessage::Connected { subscriber_id } => {
                info!(%subscriber_id, "subscribed to live stream");
                self.subscriber = Some(subscriber_id);
                Applied::Connected
            }
            StreamMessage::Snapshot { mut state } => {
                let blocked = self.filter.retain_allowed(&mut state);
                let entities = state.len();
                debug!(entities, blocked, "state snapshot received");
                self.current = Arc::new(state);
                Applied::Snapshot { entities }
            }
            StreamMessage::Event {
                entity_id,
                state,
                unit,
                timestamp,
                sequence_id,
            } => self.apply_event(TimelineEvent {
                entity_id,
                timestamp,
                state,
                unit,
                sequence_id,
            }),
        }
    }

    fn apply_event(&mut self, event: TimelineEvent) -> Applied {
        if self.filter.is_blocked(&event.entity_id) {
            return Applied::Blocked;
        }
        Arc::make_mut(&mut self.current).insert(event.entity_id.clone(), event.value());
        let stored = self.store.append(event);
        Applied::Event { stored }
    }

    /// Ask for `range` to be covered by history.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchSkip`] reason when no request should be made.
    pub fn ensure_covered(&mut self, range: TimeRange) -> Result<FetchTicket, FetchSkip> {
        self.planner.begin(range)
    }

    /// Whether the visible `window` should trigger a history request.
    pub fn wants_refetch(&self, window: &TimeRange) -> bool {
        self.planner.wants_refetch(window)
    }

    /// Merge a successful history response for `ticket`.
    ///
    /// Returns the number of newly stored events, or `None` when the ticket
    /// belongs to an earlier session (nothing is merged).
    pub fn merge_history(&mut self, ticket: &FetchTicket, response: HistoryResponse) -> Option<usize> {
        if !self.planner.is_current(ticket) {
            debug!(ticket = ticket.id, "discarding history from a previous session");
            return None;
        }
        let baseline = if self.seed_from_snapshot {
            response
                .snapshot
                .as_ref()
                .map(|snapshot| snapshot.baseline_events(ticket.range))
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let filter = &self.filter;
        let events = baseline
            .into_iter()
            .chain(response.events.into_iter().map(TimelineEvent::from))
            .filter(|event| !filter.is_blocked(&event.entity_id));
        let inserted = self.store.merge_range(events);
        self.planner.complete(ticket);
        Some(inserted)
    }

    /// Record a failed history request. Coverage is left unchanged.
    pub fn fail_history(&mut self, ticket: &FetchTicket) -> bool {
        self.planner.fail(ticket)
    }

    /// Display state at `playhead`.
    pub fn resolve_at(&self, playhead: Playhead) -> Arc<StateMap> {
        resolver::resolve(playhead, &self.current, &self.store)
    }

    /// Forget everything learned on this connection.
    pub fn clear(&mut self) {
        self.registry = None;
        self.current = Arc::new(StateMap::new());
        self.store.clear();
        self.planner.clear();
        self.subscriber = None;
        info!("session state cleared");
    }
}
