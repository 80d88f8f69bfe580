//! Floorcast dashboard binary.
//!
//! A headless consumer of the timeline: it follows the live stream,
//! keeps the session's history backfilled, and logs a per-floor summary
//! of the state at the playhead each time the playhead moves.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `floorcast.yaml` (defaults if absent)
//! 2. Initialize tracing
//! 3. Build the signal hub, history provider, and session driver
//! 4. Connect to the live stream
//! 5. Spawn the floor summary reporter
//! 6. Run the driver until Ctrl-C or the stream ends

mod error;
mod summary;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use floorcast_client::{DriverExit, HttpHistoryProvider, SessionDriver, StreamConnection};
use floorcast_core::config::{LogFormat, LoggingConfig};
use floorcast_core::{FloorcastConfig, Playhead, Signals};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::DashboardError;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "floorcast.yaml";

/// Frames buffered between the stream reader and the driver.
const STREAM_BUFFER: usize = 256;

/// Minimum gap between summaries caused only by state changes. Playhead
/// moves are always reported.
const SUMMARY_MIN_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration comes first so it can pick the log level.
    let config = load_config()?;

    // 2. Tracing. RUST_LOG wins over the configured level.
    init_tracing(&config.logging);
    info!(stream = %config.stream.url, "Floorcast dashboard starting");

    // 3. Session driver.
    let signals = Arc::new(Signals::new());
    let provider = HttpHistoryProvider::new(&config.history).map_err(DashboardError::from)?;
    info!(url = provider.url(), "History provider ready");
    let (driver, _playback) = SessionDriver::new(&config, provider, Arc::clone(&signals))
        .map_err(DashboardError::from)?;

    // 4. Live stream.
    let connection = StreamConnection::connect(&config.stream.url)
        .await
        .map_err(DashboardError::from)?;
    info!("Connected to live stream");
    let stream = connection.spawn(STREAM_BUFFER);

    // 5. Reporter.
    let reporter = tokio::spawn(report_floors(Arc::clone(&signals)));

    // 6. Run.
    let exit = driver.run(stream, shutdown_signal()).await;
    reporter.abort();

    match exit {
        DriverExit::Shutdown => info!("Floorcast dashboard stopped"),
        DriverExit::Disconnected { reason } => {
            warn!(%reason, "Live stream ended, Floorcast dashboard stopped");
        }
    }
    Ok(())
}

/// Load configuration from [`CONFIG_PATH`], falling back to defaults with
/// environment overrides applied.
fn load_config() -> Result<FloorcastConfig, DashboardError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        return Ok(FloorcastConfig::from_file(path)?);
    }
    let mut config = FloorcastConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed the dashboard
/// runs until the stream ends.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Log a per-floor summary of the display state whenever the published
/// playhead changes.
async fn report_floors(signals: Arc<Signals>) {
    let mut playhead_rx = signals.subscribe_playhead();
    let mut last_playhead: Option<Playhead> = None;
    let mut last_state = signals.display_state();
    let mut last_report: Option<Instant> = None;

    while playhead_rx.changed().await.is_ok() {
        let playhead = *playhead_rx.borrow_and_update();
        let state = signals.display_state();

        let moved = last_playhead != Some(playhead);
        let state_changed = !Arc::ptr_eq(&state, &last_state);
        let quiet_long_enough =
            last_report.is_none_or(|at| at.elapsed() >= SUMMARY_MIN_INTERVAL);
        if !moved && !(state_changed && quiet_long_enough) {
            continue;
        }

        let Some(registry) = signals.registry() else {
            continue;
        };
        let window = signals.window();
        info!(%playhead, %window, entities = state.len(), "Timeline position");
        for floor in summary::summarize(&registry, &state) {
            info!(
                floor = %floor.floor,
                entities = floor.lines.len(),
                states = %floor.lines.join(", "),
                "Floor summary"
            );
        }

        last_playhead = Some(playhead);
        last_state = state;
        last_report = Some(Instant::now());
    }
}
