//! Playback clock for the timeline track.
//!
//! The clock is either pinned to live time or positioned somewhere in the
//! visible window, paused or playing forward at a speed multiplier. It is
//! driven with explicit `now` values so every transition is deterministic
//! under test; the session driver supplies wall-clock time.
//!
//! # Rules
//!
//! - `window_end` follows `now` on every tick, in every mode.
//! - In [`PlaybackMode::Live`] the playhead equals `now`.
//! - In [`PlaybackMode::Playing`] the playhead strictly increases by
//!   `elapsed * speed` per tick and snaps to live once it would reach `now`.
//! - In [`PlaybackMode::Paused`] the playhead moves only on scrub.
//! - Downstream notification is throttled; mode transitions bypass the
//!   throttle.

use floorcast_types::{TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PlaybackConfig;

/// Errors for rejected playback commands. State is left unchanged.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// Speed multiplier is not a finite positive number.
    #[error("invalid playback speed {speed}: must be finite and positive")]
    InvalidSpeed {
        /// The rejected multiplier.
        speed: f64,
    },

    /// Window duration is not positive.
    #[error("invalid window duration {duration_ms}ms: must be positive")]
    InvalidWindow {
        /// The rejected duration.
        duration_ms: i64,
    },

    /// Scrub fraction is not a finite number.
    #[error("invalid scrub fraction {fraction}")]
    InvalidFraction {
        /// The rejected fraction.
        fraction: f64,
    },
}

/// Playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Pinned to current time.
    Live,
    /// Frozen at a past time.
    Paused,
    /// Moving forward at the speed multiplier.
    Playing,
}

/// The position consumers should display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Playhead {
    /// Show the current-state map as delivered by the stream.
    Live,
    /// Show the state reconstructed at this time.
    At(Timestamp),
}

impl Playhead {
    /// Whether this is the live sentinel.
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// The concrete time, resolving the live sentinel to `now`.
    pub const fn resolve(&self, now: Timestamp) -> Timestamp {
        match self {
            Self::Live => now,
            Self::At(t) => *t,
        }
    }
}

impl core::fmt::Display for Playhead {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Live => f.write_str("live"),
            Self::At(t) => write!(f, "{t}"),
        }
    }
}

/// Snapshot of the clock's state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Right edge of the visible window.
    pub window_end: Timestamp,
    /// Width of the visible window.
    pub window_duration_ms: i64,
    /// Current position. Equals `window_end` while live.
    pub playhead: Timestamp,
    /// Current mode.
    pub mode: PlaybackMode,
    /// Playback speed multiplier.
    pub speed: f64,
}

impl PlaybackState {
    /// The visible window `[window_end - duration, window_end]`.
    pub fn window(&self) -> TimeRange {
        TimeRange::ending_at(self.window_end, self.window_duration_ms)
    }

    /// The playhead as consumers see it.
    pub const fn public_playhead(&self) -> Playhead {
        match self.mode {
            PlaybackMode::Live => Playhead::Live,
            PlaybackMode::Paused | PlaybackMode::Playing => Playhead::At(self.playhead),
        }
    }
}

/// Result of one frame tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Playhead to display.
    pub playhead: Playhead,
    /// Visible window after the tick.
    pub window: TimeRange,
    /// Mode after the tick.
    pub mode: PlaybackMode,
    /// The mode changed during this tick.
    pub mode_changed: bool,
    /// Downstream consumers should be notified this tick.
    pub notify: bool,
}

/// Virtual clock behind the scrub/playback track.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    state: PlaybackState,
    /// `now` at the previous tick, for elapsed-time playback.
    last_tick: Timestamp,
    /// Minimum spacing between notifications.
    throttle_ms: i64,
    last_notified: Option<Timestamp>,
    /// A command changed the mode; notify on the next tick regardless.
    force_notify: bool,
}

impl PlaybackClock {
    /// Create a live clock at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError`] if the configured speed or window is
    /// invalid.
    pub fn new(config: &PlaybackConfig, now: Timestamp) -> Result<Self, PlaybackError> {
        check_speed(config.speed)?;
        check_window(config.window_duration_ms)?;
        Ok(Self {
            state: PlaybackState {
                window_end: now,
                window_duration_ms: config.window_duration_ms,
                playhead: now,
                mode: PlaybackMode::Live,
                speed: config.speed,
            },
            last_tick: now,
            throttle_ms: config.notify_throttle_ms,
            last_notified: None,
            force_notify: true,
        })
    }

    /// Current state.
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Current mode.
    pub const fn mode(&self) -> PlaybackMode {
        self.state.mode
    }

    /// Playhead as consumers see it.
    pub const fn playhead(&self) -> Playhead {
        self.state.public_playhead()
    }

    /// Visible window.
    pub fn window(&self) -> TimeRange {
        self.state.window()
    }

    /// Freeze the playhead where it is. From live, that is `now`.
    pub fn pause(&mut self, now: Timestamp) {
        self.slide(now);
        match self.state.mode {
            PlaybackMode::Live => {
                self.state.playhead = now;
                self.set_mode(PlaybackMode::Paused);
            }
            PlaybackMode::Playing => self.set_mode(PlaybackMode::Paused),
            PlaybackMode::Paused => {}
        }
    }

    /// Resume forward playback from a paused position. No-op otherwise.
    pub fn play(&mut self, now: Timestamp) {
        self.slide(now);
        if self.state.mode == PlaybackMode::Paused {
            self.last_tick = now;
            self.set_mode(PlaybackMode::Playing);
        }
    }

    /// Move the playhead to `target`, clamped to the visible window, and
    /// pause there.
    pub fn scrub_to(&mut self, target: Timestamp, now: Timestamp) {
        self.slide(now);
        self.state.playhead = self.state.window().clamp(target);
        self.set_mode(PlaybackMode::Paused);
    }

    /// Scrub to a fraction of the track, `0.0` being the window start and
    /// `1.0` its end. Out-of-range fractions are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::InvalidFraction`] for NaN or infinities.
    pub fn scrub_fraction(&mut self, fraction: f64, now: Timestamp) -> Result<(), PlaybackError> {
        if !fraction.is_finite() {
            return Err(PlaybackError::InvalidFraction { fraction });
        }
        let window = TimeRange::ending_at(now, self.state.window_duration_ms);
        let offset = scale_ms(window.duration_ms(), fraction.clamp(0.0, 1.0));
        self.scrub_to(window.start.saturating_add_ms(offset), now);
        Ok(())
    }

    /// Return to live: playhead and window end reset to `now`.
    pub fn go_live(&mut self, now: Timestamp) {
        self.slide(now);
        self.state.playhead = now;
        self.force_notify = true;
        self.set_mode(PlaybackMode::Live);
    }

    /// Change the speed multiplier.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::InvalidSpeed`] for non-finite or
    /// non-positive values.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), PlaybackError> {
        check_speed(speed)?;
        self.state.speed = speed;
        Ok(())
    }

    /// Change the visible window width (the time scale). A paused playhead
    /// that falls outside the new window stays where it is until the next
    /// scrub.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::InvalidWindow`] for zero or negative
    /// durations.
    pub fn set_window_duration(&mut self, duration_ms: i64) -> Result<(), PlaybackError> {
        check_window(duration_ms)?;
        self.state.window_duration_ms = duration_ms;
        self.force_notify = true;
        Ok(())
    }

    /// Advance one display frame.
    pub fn tick(&mut self, now: Timestamp) -> TickOutcome {
        let elapsed = now.millis_since(self.last_tick);
        self.last_tick = now;
        self.state.window_end = now;
        let mut mode_changed = false;

        match self.state.mode {
            PlaybackMode::Live => self.state.playhead = now,
            PlaybackMode::Paused => {}
            PlaybackMode::Playing => {
                let advance = playback_advance(elapsed, self.state.speed);
                let next = self.state.playhead.saturating_add_ms(advance);
                if next >= now {
                    debug!(playhead = %now, "playback caught up with live");
                    self.state.playhead = now;
                    self.set_mode(PlaybackMode::Live);
                    mode_changed = true;
                } else {
                    self.state.playhead = next;
                }
            }
        }

        let notify = self.force_notify
            || self
                .last_notified
                .is_none_or(|at| now.millis_since(at) >= self.throttle_ms);
        if notify {
            self.last_notified = Some(now);
            self.force_notify = false;
        }

        TickOutcome {
            playhead: self.state.public_playhead(),
            window: self.state.window(),
            mode: self.state.mode,
            mode_changed,
            notify,
        }
    }

    const fn slide(&mut self, now: Timestamp) {
        self.state.window_end = now;
    }

    fn set_mode(&mut self, mode: PlaybackMode) {
        if self.state.mode != mode {
            debug!(from = ?self.state.mode, to = ?mode, "playback mode changed");
            self.state.mode = mode;
            self.force_notify = true;
        }
    }
}

fn check_speed(speed: f64) -> Result<(), PlaybackError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(PlaybackError::InvalidSpeed { speed })
    }
}

const fn check_window(duration_ms: i64) -> Result<(), PlaybackError> {
    if duration_ms > 0 {
        Ok(())
    } else {
        Err(PlaybackError::InvalidWindow { duration_ms })
    }
}

/// Milliseconds of playback for `elapsed` wall milliseconds. At least one
/// millisecond whenever any wall time passed, so playing strictly advances.
fn playback_advance(elapsed: i64, speed: f64) -> i64 {
    if elapsed <= 0 {
        return 0;
    }
    scale_ms(elapsed, speed).max(1)
}

/// `ms * factor`, rounded and saturated to the `i64` range.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::arithmetic_side_effects
)]
fn scale_ms(ms: i64, factor: f64) -> i64 {
    // `as` from f64 saturates at the i64 bounds and maps NaN to 0.
    (ms as f64 * factor).round() as i64
}
