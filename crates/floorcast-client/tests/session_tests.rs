//! Integration tests for the client against an in-process fake backend.
//!
//! Each test binds an Axum server on an ephemeral port that serves the
//! history endpoint (`GET /timeline`) and the live stream
//! (`GET /events/live`, `WebSocket`). The server's answers and the frames it
//! pushes are scripted per test through [`FakeBackend`].

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use floorcast_client::{
    ClientError, DriverExit, FetchOutcome, HistoryProvider, HttpHistoryProvider, PlaybackCommand,
    PlaybackHandle, RangeFetcher, SessionDriver, StreamConnection, StreamItem,
};
use floorcast_core::{FetchSkip, FloorcastConfig, Playhead, SessionState, Signals};
use floorcast_types::{
    EntityId, EntityValue, HistoryRecord, HistoryResponse, Registry, StateMap, StreamMessage,
    SubscriberId, TimeRange, Timestamp,
};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

/// Scripted backend shared by both routes.
#[derive(Default)]
struct FakeBackend {
    history_calls: AtomicUsize,
    last_range: Mutex<Option<(Timestamp, Timestamp)>>,
    history_body: Mutex<HistoryResponse>,
    fail_history: AtomicBool,
    frames: Mutex<Vec<String>>,
    hold_open: AtomicBool,
    close: Notify,
}

impl FakeBackend {
    fn calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    fn set_history(&self, body: HistoryResponse) {
        *self.history_body.lock().unwrap() = body;
    }

    fn set_frames(&self, frames: Vec<String>) {
        *self.frames.lock().unwrap() = frames;
    }
}

async fn timeline(
    State(backend): State<Arc<FakeBackend>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    backend.history_calls.fetch_add(1, Ordering::SeqCst);
    let start = params.get("start_time").and_then(|s| Timestamp::parse(s).ok());
    let end = params.get("end_time").and_then(|s| Timestamp::parse(s).ok());
    let (Some(start), Some(end)) = (start, end) else {
        return (StatusCode::BAD_REQUEST, "bad range").into_response();
    };
    *backend.last_range.lock().unwrap() = Some((start, end));

    if backend.fail_history.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "history unavailable").into_response();
    }
    let body = backend.history_body.lock().unwrap().clone();
    Json(body).into_response()
}

async fn live(ws: WebSocketUpgrade, State(backend): State<Arc<FakeBackend>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_frames(socket, backend))
}

async fn push_frames(mut socket: WebSocket, backend: Arc<FakeBackend>) {
    let frames = backend.frames.lock().unwrap().clone();
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }
    if backend.hold_open.load(Ordering::SeqCst) {
        backend.close.notified().await;
    }
    let _ = socket.send(Message::Close(None)).await;
}

async fn spawn_backend(backend: Arc<FakeBackend>) -> SocketAddr {
    let app = Router::new()
        .route("/timeline", get(timeline))
        .route("/events/live", get(live))
        .with_state(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> FloorcastConfig {
    let mut config = FloorcastConfig::default();
    config.stream.url = format!("ws://{addr}/events/live");
    config.history.base_url = format!("http://{addr}");
    config
}

fn range(start: i64, end: i64) -> TimeRange {
    TimeRange::new(Timestamp::from_millis(start), Timestamp::from_millis(end))
}

fn record(id: u64, entity: &str, ts: Timestamp, state: &str) -> HistoryRecord {
    HistoryRecord {
        id,
        entity_id: EntityId::new(entity),
        timestamp: ts,
        state: Some(state.to_owned()),
        unit: None,
    }
}

fn event_frame(entity: &str, ts: Timestamp, state: &str, seq: u64) -> String {
    serde_json::to_string(&StreamMessage::Event {
        entity_id: EntityId::new(entity),
        state: Some(state.to_owned()),
        unit: None,
        timestamp: ts,
        sequence_id: seq,
    })
    .unwrap()
}

/// A driver fed from a hand-held stream channel instead of a socket.
struct RunningDriver {
    signals: Arc<Signals>,
    handle: PlaybackHandle,
    _stream_tx: mpsc::Sender<StreamItem>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<DriverExit>,
}

impl RunningDriver {
    fn start(config: &FloorcastConfig) -> Self {
        let signals = Arc::new(Signals::new());
        let provider = HttpHistoryProvider::new(&config.history).unwrap();
        let (driver, handle) = SessionDriver::new(config, provider, Arc::clone(&signals)).unwrap();
        let (stream_tx, stream_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(driver.run(stream_rx, async move {
            let _ = stop_rx.await;
        }));
        Self {
            signals,
            handle,
            _stream_tx: stream_tx,
            stop_tx,
            task,
        }
    }

    async fn stop(self) {
        self.stop_tx.send(()).unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, DriverExit::Shutdown);
    }
}

fn last_range(backend: &FakeBackend) -> Option<(Timestamp, Timestamp)> {
    *backend.last_range.lock().unwrap()
}

/// Poll `check` every 10ms for up to five seconds.
async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn http_provider_sends_rfc3339_range_and_parses_body() {
    let backend = Arc::new(FakeBackend::default());
    backend.set_history(HistoryResponse {
        snapshot: None,
        events: vec![record(4, "light.hall", Timestamp::from_millis(1_500), "on")],
    });
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let provider = HttpHistoryProvider::new(&config_for(addr).history).unwrap();

    let body = provider.fetch(range(1_000, 2_000)).await.unwrap();
    assert_eq!(body.events.len(), 1);
    assert_eq!(
        *backend.last_range.lock().unwrap(),
        Some((Timestamp::from_millis(1_000), Timestamp::from_millis(2_000)))
    );
}

#[tokio::test]
async fn window_inside_fetched_range_is_not_requested_again() {
    let backend = Arc::new(FakeBackend::default());
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let config = config_for(addr);
    let fetcher = RangeFetcher::new(HttpHistoryProvider::new(&config.history).unwrap());
    let mut session = SessionState::new(&config).unwrap();

    fetcher
        .ensure_covered(&mut session, range(0, 10_000))
        .await
        .unwrap();
    let second = fetcher
        .ensure_covered(&mut session, range(2_000, 8_000))
        .await
        .unwrap();

    assert_eq!(second, FetchOutcome::Skipped(FetchSkip::Covered));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn history_copy_of_live_event_is_not_duplicated() {
    let backend = Arc::new(FakeBackend::default());
    let ts = Timestamp::from_millis(5_000);
    backend.set_history(HistoryResponse {
        snapshot: None,
        events: vec![record(11, "sensor.temp", ts, "21.5")],
    });
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let config = config_for(addr);
    let fetcher = RangeFetcher::new(HttpHistoryProvider::new(&config.history).unwrap());
    let mut session = SessionState::new(&config).unwrap();

    session.apply(StreamMessage::parse(&event_frame("sensor.temp", ts, "21.5", 11)).unwrap());
    let outcome = fetcher
        .ensure_covered(&mut session, range(0, 10_000))
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Merged { inserted: 0 });
    assert_eq!(session.store().len(), 1);
}

#[tokio::test]
async fn failed_fetch_leaves_coverage_and_retry_requests_again() {
    let backend = Arc::new(FakeBackend::default());
    backend.fail_history.store(true, Ordering::SeqCst);
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let config = config_for(addr);
    let fetcher = RangeFetcher::new(HttpHistoryProvider::new(&config.history).unwrap());
    let mut session = SessionState::new(&config).unwrap();

    let err = fetcher
        .ensure_covered(&mut session, range(0, 10_000))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::HistoryFetchFailed { .. }));
    assert!(session.planner().coverage().intervals().is_empty());

    backend.fail_history.store(false, Ordering::SeqCst);
    fetcher
        .ensure_covered(&mut session, range(0, 10_000))
        .await
        .unwrap();
    assert_eq!(backend.calls(), 2);
    assert_eq!(session.planner().coverage().intervals(), &[range(0, 10_000)]);
}

#[tokio::test]
async fn malformed_frame_is_dropped_and_later_frames_still_arrive() {
    let backend = Arc::new(FakeBackend::default());
    let connected = serde_json::to_string(&StreamMessage::Connected {
        subscriber_id: SubscriberId::new(),
    })
    .unwrap();
    backend.set_frames(vec![
        connected,
        "{not json".to_owned(),
        r#"{"type":"telemetry","value":1}"#.to_owned(),
        event_frame("light.hall", Timestamp::from_millis(10), "on", 1),
    ]);
    let addr = spawn_backend(Arc::clone(&backend)).await;

    let connection = StreamConnection::connect(&config_for(addr).stream.url)
        .await
        .unwrap();
    let mut rx = connection.spawn(8);

    let first = rx.recv().await.unwrap().unwrap();
    assert_eq!(first.kind(), "connected");
    let second = rx.recv().await.unwrap().unwrap();
    assert_eq!(second.kind(), "event");
    assert!(matches!(
        rx.recv().await.unwrap(),
        Err(ClientError::ConnectionLost { .. })
    ));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn driver_backfills_resolves_and_clears_on_disconnect() {
    let backend = Arc::new(FakeBackend::default());
    let now = Timestamp::now();
    let earlier = now.saturating_sub_ms(1_800_000);
    let scrub_at = now.saturating_sub_ms(1_200_000);

    backend.set_history(HistoryResponse {
        snapshot: None,
        events: vec![record(1, "light.hall", earlier, "off")],
    });
    let mut state = StateMap::new();
    state.insert(EntityId::new("light.hall"), EntityValue::new(Some("on"), None));
    backend.set_frames(vec![
        serde_json::to_string(&StreamMessage::Registry {
            registry: Registry::default(),
        })
        .unwrap(),
        serde_json::to_string(&StreamMessage::Snapshot { state }).unwrap(),
        event_frame("light.hall", now, "on", 2),
        event_frame("update.core", now, "on", 3),
    ]);
    backend.hold_open.store(true, Ordering::SeqCst);
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let config = config_for(addr);

    let signals = Arc::new(Signals::new());
    let provider = HttpHistoryProvider::new(&config.history).unwrap();
    let (driver, handle) = SessionDriver::new(&config, provider, Arc::clone(&signals)).unwrap();
    let stream = StreamConnection::connect(&config.stream.url)
        .await
        .unwrap()
        .spawn(16);
    let (_stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(driver.run(stream, async move {
        let _ = stop_rx.await;
    }));

    assert!(wait_for(|| signals.connected() && signals.registry().is_some()).await);
    assert!(wait_for(|| backend.calls() >= 1).await);
    assert!(wait_for(|| signals.current_state().contains_key(&EntityId::new("light.hall"))).await);
    assert!(!signals
        .current_state()
        .contains_key(&EntityId::new("update.core")));

    // Rejected commands report back and change nothing.
    assert!(matches!(
        handle.set_speed(0.0).await,
        Err(ClientError::Playback(_))
    ));

    handle.scrub(scrub_at).await.unwrap();
    assert!(wait_for(|| signals.playhead() == Playhead::At(scrub_at)).await);
    assert!(
        wait_for(|| {
            signals
                .display_state()
                .get(&EntityId::new("light.hall"))
                .and_then(|v| v.value.as_deref())
                == Some("off")
        })
        .await
    );

    handle.go_live().await.unwrap();
    assert!(wait_for(|| signals.playhead() == Playhead::Live).await);

    backend.close.notify_one();
    let exit = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(exit, DriverExit::Disconnected { .. }));
    assert!(!signals.connected());
    assert!(signals.registry().is_none());
    assert!(signals.current_state().is_empty());
    assert!(matches!(
        handle.pause().await,
        Err(ClientError::DriverStopped)
    ));
}

#[tokio::test]
async fn driver_stops_on_shutdown() {
    let backend = Arc::new(FakeBackend::default());
    backend.hold_open.store(true, Ordering::SeqCst);
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let config = config_for(addr);

    let signals = Arc::new(Signals::new());
    let provider = HttpHistoryProvider::new(&config.history).unwrap();
    let (driver, _handle) = SessionDriver::new(&config, provider, signals).unwrap();
    let stream = StreamConnection::connect(&config.stream.url)
        .await
        .unwrap()
        .spawn(16);

    let exit = driver
        .run(stream, tokio::time::sleep(Duration::from_millis(100)))
        .await;
    assert_eq!(exit, DriverExit::Shutdown);
    backend.close.notify_one();
}

#[tokio::test]
async fn playing_catches_up_and_publishes_live() {
    let backend = Arc::new(FakeBackend::default());
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let driver = RunningDriver::start(&config_for(addr));

    let target = Timestamp::now().saturating_sub_ms(5_000);
    driver.handle.scrub(target).await.unwrap();
    assert!(wait_for(|| driver.signals.playhead() == Playhead::At(target)).await);

    driver.handle.set_speed(1_000.0).await.unwrap();
    driver.handle.play().await.unwrap();
    assert!(wait_for(|| driver.signals.playhead() == Playhead::Live).await);

    driver.stop().await;
}

#[tokio::test]
async fn window_change_triggers_a_new_history_request() {
    let backend = Arc::new(FakeBackend::default());
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let driver = RunningDriver::start(&config_for(addr));

    let hour = 3_600_000;
    let day = 86_400_000;
    assert!(
        wait_for(|| last_range(&backend).is_some_and(|(start, end)| end.millis_since(start) == hour))
            .await
    );

    driver.handle.set_window(day).await.unwrap();
    assert!(
        wait_for(|| last_range(&backend).is_some_and(|(start, end)| end.millis_since(start) == day))
            .await
    );
    assert!(backend.calls() >= 2);

    driver.stop().await;
}

#[tokio::test]
async fn ensure_covered_command_requests_the_given_range() {
    let backend = Arc::new(FakeBackend::default());
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let driver = RunningDriver::start(&config_for(addr));

    // The frame loop's own request may still be in flight; retry until the
    // requested range reaches the backend.
    let target = range(1_000, 2_000);
    let mut requested = false;
    for _ in 0..500 {
        driver.handle.ensure_covered(target).await.unwrap();
        if last_range(&backend) == Some((target.start, target.end)) {
            requested = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(requested);

    driver.stop().await;
}

#[tokio::test]
async fn scrub_fraction_resolves_backfilled_state() {
    let backend = Arc::new(FakeBackend::default());
    let now = Timestamp::now();
    backend.set_history(HistoryResponse {
        snapshot: None,
        events: vec![record(1, "light.porch", now.saturating_sub_ms(3_000_000), "on")],
    });
    let addr = spawn_backend(Arc::clone(&backend)).await;
    let driver = RunningDriver::start(&config_for(addr));

    assert!(matches!(
        driver.handle.send(PlaybackCommand::ScrubFraction(f64::NAN)).await,
        Err(ClientError::Playback(_))
    ));

    // Halfway along a one-hour track is about thirty minutes ago.
    driver
        .handle
        .send(PlaybackCommand::ScrubFraction(0.5))
        .await
        .unwrap();
    let expected = now.saturating_sub_ms(1_800_000);
    assert!(
        wait_for(|| matches!(
            driver.signals.playhead(),
            Playhead::At(at) if at.millis_since(expected).abs() < 10_000
        ))
        .await
    );
    assert!(
        wait_for(|| {
            driver
                .signals
                .display_state()
                .get(&EntityId::new("light.porch"))
                .and_then(|v| v.value.as_deref())
                == Some("on")
        })
        .await
    );

    driver.stop().await;
}
