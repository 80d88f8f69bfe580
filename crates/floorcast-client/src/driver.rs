//! Session driver: the single task that owns all mutable timeline state.
//!
//! One `tokio::select!` loop interleaves, one turn at a time:
//!
//! 1. Inbound stream messages (applied to the session).
//! 2. History fetch completions (merged into the event store).
//! 3. Frame ticks (advance the playback clock, publish signals, run the
//!    fetch trigger policy).
//! 4. Playback commands from any number of [`PlaybackHandle`]s.
//! 5. Shutdown.
//!
//! Because turns never overlap, the event store is read and written
//! without locks. The history request is the only suspension point and it
//! runs on its own task, so the store stays readable while it is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use floorcast_core::{
    Applied, FloorcastConfig, PlaybackClock, PlaybackError, SessionState, Signals, TickOutcome,
};
use floorcast_types::{TimeRange, Timestamp};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::connection::StreamItem;
use crate::error::ClientError;
use crate::fetcher::{self, FetchCompletion, RangeFetcher};
use crate::history::HistoryProvider;

/// Capacity of the playback command channel.
const COMMAND_BUFFER: usize = 32;

/// Capacity of the fetch completion channel. Single-flight keeps at most
/// one completion pending per session.
const COMPLETION_BUFFER: usize = 4;

/// A user action on the playback track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackCommand {
    /// Freeze the playhead.
    Pause,
    /// Resume forward playback.
    Play,
    /// Return to live.
    GoLive,
    /// Scrub to an absolute time.
    Scrub(Timestamp),
    /// Scrub to a fraction of the track, `0.0..=1.0`.
    ScrubFraction(f64),
    /// Change the playback speed multiplier.
    SetSpeed(f64),
    /// Change the visible window width in milliseconds.
    SetWindow(i64),
    /// Ask for a range to be backfilled from history.
    EnsureCovered(TimeRange),
}

struct Command {
    kind: PlaybackCommand,
    reply: oneshot::Sender<Result<(), PlaybackError>>,
}

/// Cloneable handle for sending playback commands to a running driver.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    tx: mpsc::Sender<Command>,
}

impl core::fmt::Debug for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Command").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl PlaybackHandle {
    /// Send a command and wait for the driver to apply it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Playback`] if the command was rejected, or
    /// [`ClientError::DriverStopped`] if the driver is gone.
    pub async fn send(&self, kind: PlaybackCommand) -> Result<(), ClientError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(Command { kind, reply })
            .await
            .map_err(|_closed| ClientError::DriverStopped)?;
        answer.await.map_err(|_dropped| ClientError::DriverStopped)??;
        Ok(())
    }

    /// Freeze the playhead.
    pub async fn pause(&self) -> Result<(), ClientError> {
        self.send(PlaybackCommand::Pause).await
    }

    /// Resume forward playback from a paused position.
    pub async fn play(&self) -> Result<(), ClientError> {
        self.send(PlaybackCommand::Play).await
    }

    /// Return to live.
    pub async fn go_live(&self) -> Result<(), ClientError> {
        self.send(PlaybackCommand::GoLive).await
    }

    /// Scrub to `at`.
    pub async fn scrub(&self, at: Timestamp) -> Result<(), ClientError> {
        self.send(PlaybackCommand::Scrub(at)).await
    }

    /// Change the speed multiplier.
    pub async fn set_speed(&self, speed: f64) -> Result<(), ClientError> {
        self.send(PlaybackCommand::SetSpeed(speed)).await
    }

    /// Change the visible window width.
    pub async fn set_window(&self, duration_ms: i64) -> Result<(), ClientError> {
        self.send(PlaybackCommand::SetWindow(duration_ms)).await
    }

    /// Ask for `range` to be backfilled.
    pub async fn ensure_covered(&self, range: TimeRange) -> Result<(), ClientError> {
        self.send(PlaybackCommand::EnsureCovered(range)).await
    }
}

/// Why [`SessionDriver::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverExit {
    /// The shutdown future completed.
    Shutdown,
    /// The live stream ended; the session was cleared.
    Disconnected {
        /// What ended the stream.
        reason: String,
    },
}

/// Owns one session and drives it from a stream.
#[derive(Debug)]
pub struct SessionDriver<P> {
    session: SessionState,
    clock: PlaybackClock,
    signals: Arc<Signals>,
    fetcher: RangeFetcher<P>,
    frame_interval: Duration,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::Sender<FetchCompletion>,
    completions_rx: mpsc::Receiver<FetchCompletion>,
    /// The current-state map changed since it was last published.
    state_dirty: bool,
}

impl<P: HistoryProvider> SessionDriver<P> {
    /// Build a driver and the handle used to control its playback.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] or [`ClientError::Playback`] if the
    /// configuration is invalid.
    pub fn new(
        config: &FloorcastConfig,
        provider: P,
        signals: Arc<Signals>,
    ) -> Result<(Self, PlaybackHandle), ClientError> {
        let session = SessionState::new(config)?;
        let clock = PlaybackClock::new(&config.playback, Timestamp::now())?;
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_BUFFER);
        let driver = Self {
            session,
            clock,
            signals,
            fetcher: RangeFetcher::new(provider),
            frame_interval: Duration::from_millis(config.playback.frame_interval_ms.max(1)),
            commands,
            completions_tx,
            completions_rx,
            state_dirty: false,
        };
        Ok((driver, PlaybackHandle { tx }))
    }

    /// The session state.
    pub const fn session(&self) -> &SessionState {
        &self.session
    }

    /// Run until the stream ends or `shutdown` completes.
    ///
    /// `stream` is the receiver returned by
    /// [`StreamConnection::spawn`](crate::connection::StreamConnection::spawn).
    pub async fn run(
        mut self,
        mut stream: mpsc::Receiver<StreamItem>,
        shutdown: impl Future<Output = ()>,
    ) -> DriverExit {
        let mut frames = tokio::time::interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = std::pin::pin!(shutdown);

        self.signals.set_connected(true);
        info!(frame_interval = ?self.frame_interval, "session driver started");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("session driver shutting down");
                    return DriverExit::Shutdown;
                }
                item = stream.recv() => match item {
                    Some(Ok(message)) => self.on_message(message),
                    Some(Err(err)) => return self.disconnect(err.to_string()),
                    None => return self.disconnect("stream reader stopped".to_owned()),
                },
                Some(completion) = self.completions_rx.recv() => self.on_fetch_complete(completion),
                Some(command) = self.commands.recv() => self.on_command(command),
                _ = frames.tick() => self.on_frame(),
            }
        }
    }

    fn on_message(&mut self, message: floorcast_types::StreamMessage) {
        match self.session.apply(message) {
            Applied::Registry => {
                self.signals
                    .set_registry(self.session.registry().map(Arc::clone));
            }
            Applied::Snapshot { .. } | Applied::Event { .. } => self.state_dirty = true,
            Applied::Connected | Applied::Blocked => {}
        }
    }

    fn on_fetch_complete(&mut self, completion: FetchCompletion) {
        // Failures are logged inside; coverage stays as it was.
        let merged = matches!(
            fetcher::complete(&mut self.session, completion),
            Ok(fetcher::FetchOutcome::Merged { inserted }) if inserted > 0
        );
        if merged && !self.clock.playhead().is_live() {
            self.publish_display_state(self.clock.playhead());
        }
    }

    fn on_command(&mut self, command: Command) {
        let now = Timestamp::now();
        let Command { kind, reply } = command;
        debug!(?kind, "playback command");
        let result = match kind {
            PlaybackCommand::Pause => {
                self.clock.pause(now);
                Ok(())
            }
            PlaybackCommand::Play => {
                self.clock.play(now);
                Ok(())
            }
            PlaybackCommand::GoLive => {
                self.clock.go_live(now);
                Ok(())
            }
            PlaybackCommand::Scrub(at) => {
                self.clock.scrub_to(at, now);
                Ok(())
            }
            PlaybackCommand::ScrubFraction(fraction) => self.clock.scrub_fraction(fraction, now),
            PlaybackCommand::SetSpeed(speed) => self.clock.set_speed(speed),
            PlaybackCommand::SetWindow(duration_ms) => self.clock.set_window_duration(duration_ms),
            PlaybackCommand::EnsureCovered(range) => {
                self.request(range);
                Ok(())
            }
        };
        if let Err(err) = &result {
            warn!(error = %err, "playback command rejected");
        }
        // The caller may have stopped waiting; the command still applies.
        let _ = reply.send(result);
    }

    fn on_frame(&mut self) {
        let outcome = self.clock.tick(Timestamp::now());
        if self.state_dirty {
            self.signals
                .set_current_state(Arc::clone(self.session.current_state()));
        }
        if outcome.notify || (self.state_dirty && outcome.playhead.is_live()) {
            self.publish(outcome);
        }
        self.state_dirty = false;

        // Single-flight: the next frame after completion re-evaluates.
        if self.session.planner().in_flight().is_none()
            && self.session.wants_refetch(&outcome.window)
        {
            self.request(outcome.window);
        }
    }

    fn publish(&self, outcome: TickOutcome) {
        self.signals.set_position(outcome.playhead, outcome.window);
        self.publish_display_state(outcome.playhead);
    }

    fn publish_display_state(&self, playhead: floorcast_core::Playhead) {
        self.signals
            .set_display_state(self.session.resolve_at(playhead));
    }

    fn request(&mut self, range: TimeRange) {
        match self.session.ensure_covered(range) {
            Ok(ticket) => self.fetcher.spawn(ticket, self.completions_tx.clone()),
            Err(skip) => debug!(%range, ?skip, "history request skipped"),
        }
    }

    fn disconnect(&mut self, reason: String) -> DriverExit {
        warn!(%reason, "live stream lost, clearing session");
        self.session.clear();
        self.signals.set_connected(false);
        self.signals.set_registry(None);
        self.signals
            .set_current_state(Arc::clone(self.session.current_state()));
        self.signals
            .set_display_state(Arc::clone(self.session.current_state()));
        DriverExit::Disconnected { reason }
    }
}
