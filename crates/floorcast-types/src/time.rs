//! Millisecond timestamps.
//!
//! Every timestamp inside the timeline core is an integer count of
//! milliseconds since the Unix epoch. Conversion to calendar time only
//! happens at the edges (history requests, logging).
//!
//! On the wire a timestamp is normally a JSON integer. RFC 3339 strings are
//! also accepted on input, because the history backend emits them for
//! snapshot times; a string without an offset is read as UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimestampRepr")]
pub struct Timestamp(pub i64);

/// Accepted wire shapes for a [`Timestamp`].
#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Millis(i64),
    Text(String),
}

/// Error produced when a timestamp string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp {input:?}: expected epoch milliseconds or RFC 3339")]
pub struct TimestampParseError {
    /// The rejected input.
    pub input: String,
}

impl TryFrom<TimestampRepr> for Timestamp {
    type Error = TimestampParseError;

    fn try_from(repr: TimestampRepr) -> Result<Self, Self::Error> {
        match repr {
            TimestampRepr::Millis(ms) => Ok(Self(ms)),
            TimestampRepr::Text(text) => Self::parse(&text),
        }
    }
}

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Self = Self(0);

    /// Create a timestamp from epoch milliseconds.
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Return the epoch milliseconds.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Convert to calendar time. `None` if outside chrono's range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    /// Render as an RFC 3339 UTC string with millisecond precision.
    ///
    /// Falls back to the raw millisecond count when the value is outside
    /// the representable calendar range.
    pub fn to_rfc3339(self) -> String {
        self.to_datetime().map_or_else(
            || self.0.to_string(),
            |dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    /// Parse an RFC 3339 string (or an offset-less ISO 8601 string, read as
    /// UTC).
    ///
    /// # Errors
    ///
    /// Returns [`TimestampParseError`] if neither form matches.
    pub fn parse(text: &str) -> Result<Self, TimestampParseError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(Self(dt.timestamp_millis()));
        }
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Self(naive.and_utc().timestamp_millis()))
            .map_err(|_err| TimestampParseError {
                input: text.to_owned(),
            })
    }

    /// Add a (possibly negative) millisecond offset, saturating at the
    /// bounds of `i64`.
    #[must_use]
    pub const fn saturating_add_ms(self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Subtract a millisecond offset, saturating at the bounds of `i64`.
    #[must_use]
    pub const fn saturating_sub_ms(self, ms: i64) -> Self {
        Self(self.0.saturating_sub(ms))
    }

    /// Milliseconds from `earlier` to `self` (negative if `earlier` is
    /// actually later).
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// A closed interval `[start, end]` of timestamps.
///
/// Used both for the visible window of the timeline track and for ranges
/// of fetched history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub start: Timestamp,
    /// Inclusive upper bound.
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a range, swapping the bounds if they are reversed.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// The range of `duration_ms` milliseconds ending at `end`.
    pub fn ending_at(end: Timestamp, duration_ms: i64) -> Self {
        Self::new(end.saturating_sub_ms(duration_ms), end)
    }

    /// Length in milliseconds.
    pub const fn duration_ms(&self) -> i64 {
        self.end.millis_since(self.start)
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the two ranges overlap or are directly adjacent (no
    /// millisecond lies between them).
    pub fn touches(&self, other: &Self) -> bool {
        self.start <= other.end.saturating_add_ms(1) && other.start <= self.end.saturating_add_ms(1)
    }

    /// Smallest range containing both.
    #[must_use]
    pub fn hull(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Clamp `ts` into the range.
    pub fn clamp(&self, ts: Timestamp) -> Timestamp {
        ts.clamp(self.start, self.end)
    }
}

impl core::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
