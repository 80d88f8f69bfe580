//! Configuration loading and typed config structures for the timeline core.
//!
//! The canonical configuration lives in `floorcast.yaml` next to the
//! dashboard binary. This module defines strongly-typed structs that mirror
//! the YAML structure, and provides a loader that reads, overrides from the
//! environment, and validates the file.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FloorcastConfig {
    /// Live event stream settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// History backend settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Event store bounds and coverage tracking.
    #[serde(default)]
    pub store: StoreConfig,

    /// Playback clock and refetch policy.
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Entity filtering.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FloorcastConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `FLOORCAST_STREAM_URL` overrides `stream.url`
    /// - `FLOORCAST_HISTORY_URL` overrides `history.base_url`
    /// - `FLOORCAST_LOG_LEVEL` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse_raw(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string and validate it.
    ///
    /// Environment overrides are not applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_raw(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_raw(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to `null`, which fails for a struct.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("FLOORCAST_STREAM_URL") {
            self.stream.url = val;
        }
        if let Some(val) = lookup("FLOORCAST_HISTORY_URL") {
            self.history.base_url = val;
        }
        if let Some(val) = lookup("FLOORCAST_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_events == 0 {
            return Err(invalid("store.max_events must be at least 1"));
        }
        if self.playback.window_duration_ms <= 0 {
            return Err(invalid("playback.window_duration_ms must be positive"));
        }
        if self.playback.frame_interval_ms == 0 {
            return Err(invalid("playback.frame_interval_ms must be at least 1"));
        }
        if self.playback.notify_throttle_ms < 0 {
            return Err(invalid("playback.notify_throttle_ms must not be negative"));
        }
        if self.playback.refetch_slack_ms < 0 {
            return Err(invalid("playback.refetch_slack_ms must not be negative"));
        }
        if !(self.playback.speed.is_finite() && self.playback.speed > 0.0) {
            return Err(invalid("playback.speed must be a positive number"));
        }
        if self.history.timeout_ms == 0 {
            return Err(invalid("history.timeout_ms must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

/// Live event stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// `WebSocket` URL of the live event stream.
    #[serde(default = "default_stream_url")]
    pub url: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
        }
    }
}

/// History backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    /// Base HTTP URL of the history backend.
    #[serde(default = "default_history_url")]
    pub base_url: String,

    /// Path of the timeline endpoint, appended to `base_url`.
    #[serde(default = "default_timeline_path")]
    pub timeline_path: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_history_timeout_ms")]
    pub timeout_ms: u64,

    /// Merge the backend's start-of-range snapshot as baseline events.
    #[serde(default = "default_true")]
    pub seed_from_snapshot: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_history_url(),
            timeline_path: default_timeline_path(),
            timeout_ms: default_history_timeout_ms(),
            seed_from_snapshot: true,
        }
    }
}

/// How fetched history ranges are tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMode {
    /// One interval from the earliest fetched start to the latest fetched
    /// end. Gaps inside it count as covered.
    #[default]
    Coarse,
    /// Sorted disjoint intervals, merged on insert.
    Exact,
}

/// Event store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Maximum retained events across all entities.
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Coverage tracking mode.
    #[serde(default)]
    pub coverage: CoverageMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            coverage: CoverageMode::default(),
        }
    }
}

/// Playback clock configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaybackConfig {
    /// Initial visible window length in milliseconds.
    #[serde(default = "default_window_duration_ms")]
    pub window_duration_ms: i64,

    /// Initial playback speed multiplier.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Frame tick interval in milliseconds.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Minimum interval between playhead notifications in milliseconds.
    #[serde(default = "default_notify_throttle_ms")]
    pub notify_throttle_ms: i64,

    /// How far the window start may move backward before history is
    /// requested again, in milliseconds.
    #[serde(default = "default_refetch_slack_ms")]
    pub refetch_slack_ms: i64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            window_duration_ms: default_window_duration_ms(),
            speed: default_speed(),
            frame_interval_ms: default_frame_interval_ms(),
            notify_throttle_ms: default_notify_throttle_ms(),
            refetch_slack_ms: default_refetch_slack_ms(),
        }
    }
}

/// Entity filter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns of entity ids to ignore: `*`, `?`, `[seq]` and
    /// `[!seq]`, matched against the whole id.
    #[serde(default = "default_entity_blocklist")]
    pub entity_blocklist: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            entity_blocklist: default_entity_blocklist(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_stream_url() -> String {
    "ws://localhost:8000/events/live".to_owned()
}

fn default_history_url() -> String {
    "http://localhost:8000".to_owned()
}

fn default_timeline_path() -> String {
    "/timeline".to_owned()
}

const fn default_history_timeout_ms() -> u64 {
    10_000
}

const fn default_max_events() -> usize {
    10_000
}

const fn default_window_duration_ms() -> i64 {
    3_600_000
}

const fn default_speed() -> f64 {
    1.0
}

const fn default_frame_interval_ms() -> u64 {
    16
}

const fn default_notify_throttle_ms() -> i64 {
    200
}

const fn default_refetch_slack_ms() -> i64 {
    60_000
}

fn default_entity_blocklist() -> Vec<String> {
    vec!["update.*".to_owned()]
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FloorcastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.max_events, 10_000);
        assert_eq!(config.store.coverage, CoverageMode::Coarse);
        assert_eq!(config.playback.notify_throttle_ms, 200);
        assert_eq!(config.playback.refetch_slack_ms, 60_000);
        assert_eq!(config.filter.entity_blocklist, vec!["update.*".to_owned()]);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = FloorcastConfig::parse("").unwrap();
        assert_eq!(config, FloorcastConfig::default());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
stream:
  url: "ws://hub.local:8000/events/live"

history:
  base_url: "http://hub.local:8000"
  timeline_path: "/api/timeline"
  timeout_ms: 2500
  seed_from_snapshot: false

store:
  max_events: 500
  coverage: exact

playback:
  window_duration_ms: 600000
  speed: 4.0
  frame_interval_ms: 33
  notify_throttle_ms: 250
  refetch_slack_ms: 30000

filter:
  entity_blocklist:
    - "update.*"
    - "sensor.*_rssi"

logging:
  level: "debug"
  format: json
"#;
        let config = FloorcastConfig::parse(yaml).unwrap();
        assert_eq!(config.stream.url, "ws://hub.local:8000/events/live");
        assert_eq!(config.history.timeline_path, "/api/timeline");
        assert!(!config.history.seed_from_snapshot);
        assert_eq!(config.store.max_events, 500);
        assert_eq!(config.store.coverage, CoverageMode::Exact);
        assert_eq!(config.playback.frame_interval_ms, 33);
        assert_eq!(config.filter.entity_blocklist.len(), 2);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = FloorcastConfig::parse("store:\n  max_events: 42\n").unwrap();
        assert_eq!(config.store.max_events, 42);
        assert_eq!(config.playback, PlaybackConfig::default());
    }

    #[test]
    fn rejects_zero_capacity() {
        let result = FloorcastConfig::parse("store:\n  max_events: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_non_positive_speed() {
        let result = FloorcastConfig::parse("playback:\n  speed: 0.0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn rejects_negative_notify_throttle() {
        let result = FloorcastConfig::parse("playback:\n  notify_throttle_ms: -1\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        assert!(FloorcastConfig::parse("playback:\n  notify_throttle_ms: 0\n").is_ok());
    }

    #[test]
    fn rejects_malformed_yaml() {
        let result = FloorcastConfig::parse("store: [unterminated");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let mut config = FloorcastConfig::default();
        config.apply_overrides_from(|name| match name {
            "FLOORCAST_STREAM_URL" => Some("ws://override/events/live".to_owned()),
            "FLOORCAST_LOG_LEVEL" => Some("trace".to_owned()),
            _ => None,
        });
        assert_eq!(config.stream.url, "ws://override/events/live");
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.history.base_url, "http://localhost:8000");
    }
}
