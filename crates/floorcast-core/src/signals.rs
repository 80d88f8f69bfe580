//! Push-style signals for dashboard consumers.
//!
//! Each signal is a [`tokio::sync::watch`] channel: receivers always see the
//! latest value and are woken on change. Dropping a receiver unsubscribes.
//! Publishing never fails, even with no receivers.

use std::sync::Arc;

use floorcast_types::{Registry, StateMap, TimeRange, Timestamp};
use tokio::sync::watch;

use crate::playback::Playhead;

/// Hub of all consumer-facing signals.
#[derive(Debug)]
pub struct Signals {
    connected: watch::Sender<bool>,
    registry: watch::Sender<Option<Arc<Registry>>>,
    current_state: watch::Sender<Arc<StateMap>>,
    display_state: watch::Sender<Arc<StateMap>>,
    playhead: watch::Sender<Playhead>,
    window: watch::Sender<TimeRange>,
}

impl Signals {
    /// Create a hub with a disconnected, empty initial state.
    pub fn new() -> Self {
        Self {
            connected: watch::Sender::new(false),
            registry: watch::Sender::new(None),
            current_state: watch::Sender::new(Arc::new(StateMap::new())),
            display_state: watch::Sender::new(Arc::new(StateMap::new())),
            playhead: watch::Sender::new(Playhead::Live),
            window: watch::Sender::new(TimeRange::new(Timestamp::EPOCH, Timestamp::EPOCH)),
        }
    }

    /// Subscribe to connection status.
    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Subscribe to registry replacements.
    pub fn subscribe_registry(&self) -> watch::Receiver<Option<Arc<Registry>>> {
        self.registry.subscribe()
    }

    /// Subscribe to the current-state map as delivered by the stream.
    pub fn subscribe_current_state(&self) -> watch::Receiver<Arc<StateMap>> {
        self.current_state.subscribe()
    }

    /// Subscribe to the state resolved at the playhead: the current-state
    /// map while live, a reconstruction otherwise. Throttled with the
    /// playhead.
    pub fn subscribe_display_state(&self) -> watch::Receiver<Arc<StateMap>> {
        self.display_state.subscribe()
    }

    /// Subscribe to the (throttled) playhead.
    pub fn subscribe_playhead(&self) -> watch::Receiver<Playhead> {
        self.playhead.subscribe()
    }

    /// Subscribe to the (throttled) visible window.
    pub fn subscribe_window(&self) -> watch::Receiver<TimeRange> {
        self.window.subscribe()
    }

    /// Latest connection status.
    pub fn connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Latest playhead.
    pub fn playhead(&self) -> Playhead {
        *self.playhead.borrow()
    }

    /// Latest window.
    pub fn window(&self) -> TimeRange {
        *self.window.borrow()
    }

    /// Latest current-state map.
    pub fn current_state(&self) -> Arc<StateMap> {
        Arc::clone(&self.current_state.borrow())
    }

    /// Latest state resolved at the playhead.
    pub fn display_state(&self) -> Arc<StateMap> {
        Arc::clone(&self.display_state.borrow())
    }

    /// Latest registry.
    pub fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.borrow().clone()
    }

    /// Publish connection status; receivers are woken only on change.
    pub fn set_connected(&self, connected: bool) {
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    /// Publish a new registry (or its removal on disconnect).
    pub fn set_registry(&self, registry: Option<Arc<Registry>>) {
        self.registry.send_replace(registry);
    }

    /// Publish the current-state map. Skipped when the same map is already
    /// published.
    pub fn set_current_state(&self, state: Arc<StateMap>) {
        self.current_state.send_if_modified(|current| {
            if Arc::ptr_eq(current, &state) {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Publish the state resolved at the current playhead.
    pub fn set_display_state(&self, state: Arc<StateMap>) {
        self.display_state.send_if_modified(|current| {
            if Arc::ptr_eq(current, &state) {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Publish the playhead and window together.
    pub fn set_position(&self, playhead: Playhead, window: TimeRange) {
        self.window.send_replace(window);
        self.playhead.send_replace(playhead);
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}
