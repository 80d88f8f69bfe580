//! Tracking of fetched history ranges and fetch planning.
//!
//! [`CoveredRanges`] records which spans of time have already been
//! backfilled. It only ever grows during a session. Two modes exist:
//!
//! - **Coarse** keeps a single interval from the earliest fetched start to
//!   the latest fetched end. A window inside that bound counts as covered
//!   even if nothing inside a gap was ever fetched.
//! - **Exact** keeps sorted disjoint intervals, merging on insert, so gaps
//!   are refetched.
//!
//! [`FetchPlanner`] decides when the consumer should ask for history and
//! enforces single-flight: at most one request is outstanding, identified
//! by a [`FetchTicket`].

use floorcast_types::TimeRange;
use tracing::debug;

use crate::config::CoverageMode;

/// Set of time ranges already retrieved from history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoveredRanges {
    mode: CoverageMode,
    /// Sorted, disjoint, non-adjacent. Coarse mode holds at most one.
    intervals: Vec<TimeRange>,
}

impl CoveredRanges {
    /// Create an empty set.
    pub const fn new(mode: CoverageMode) -> Self {
        Self {
            mode,
            intervals: Vec::new(),
        }
    }

    /// Whether `range` is entirely inside one tracked interval.
    pub fn covers(&self, range: &TimeRange) -> bool {
        self.intervals
            .iter()
            .any(|interval| interval.contains_range(range))
    }

    /// Record `range` as fetched.
    pub fn insert(&mut self, range: TimeRange) {
        match self.mode {
            CoverageMode::Coarse => {
                let widened = self
                    .intervals
                    .first()
                    .map_or(range, |current| current.hull(&range));
                self.intervals = vec![widened];
            }
            CoverageMode::Exact => {
                let mut merged = range;
                self.intervals.retain(|interval| {
                    if interval.touches(&merged) {
                        merged = merged.hull(interval);
                        false
                    } else {
                        true
                    }
                });
                let pos = self
                    .intervals
                    .partition_point(|interval| interval.start < merged.start);
                self.intervals.insert(pos, merged);
            }
        }
    }

    /// Tracked intervals in time order.
    pub fn intervals(&self) -> &[TimeRange] {
        &self.intervals
    }

    /// Smallest interval containing everything fetched so far.
    pub fn bounds(&self) -> Option<TimeRange> {
        let first = self.intervals.first()?;
        let last = self.intervals.last()?;
        Some(TimeRange::new(first.start, last.end))
    }

    /// Forget everything (session teardown).
    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}

/// Handle for one outstanding history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    /// Monotonic request number, unique across sessions.
    pub id: u64,
    /// The requested range.
    pub range: TimeRange,
}

/// Why [`FetchPlanner::begin`] did not issue a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSkip {
    /// The range is already covered.
    Covered,
    /// Another request is in flight.
    InFlight,
}

/// Decides when to request history and tracks the in-flight request.
#[derive(Debug, Clone)]
pub struct FetchPlanner {
    coverage: CoveredRanges,
    in_flight: Option<FetchTicket>,
    /// Window the consumer last asked to have covered.
    last_requested: Option<TimeRange>,
    /// How far the window start may move backward before a refetch.
    slack_ms: i64,
    next_ticket: u64,
}

impl FetchPlanner {
    /// Create a planner with the given coverage mode and backward slack.
    pub const fn new(mode: CoverageMode, slack_ms: i64) -> Self {
        Self {
            coverage: CoveredRanges::new(mode),
            in_flight: None,
            last_requested: None,
            slack_ms,
            next_ticket: 0,
        }
    }

    /// Ranges already fetched.
    pub const fn coverage(&self) -> &CoveredRanges {
        &self.coverage
    }

    /// The outstanding request, if any.
    pub const fn in_flight(&self) -> Option<&FetchTicket> {
        self.in_flight.as_ref()
    }

    /// The window the consumer last asked for.
    pub const fn last_requested(&self) -> Option<TimeRange> {
        self.last_requested
    }

    /// Trigger policy for a continuously sliding window.
    ///
    /// True when nothing was requested yet, when the time scale (window
    /// duration) changed, or when the window start moved backward by more
    /// than the slack relative to the last requested window. Sliding
    /// forward with real time never triggers.
    pub fn wants_refetch(&self, window: &TimeRange) -> bool {
        let Some(last) = self.last_requested else {
            return true;
        };
        if last.duration_ms() != window.duration_ms() {
            return true;
        }
        window.start < last.start.saturating_sub_ms(self.slack_ms)
    }

    /// Try to start a request for `range`.
    ///
    /// Covered ranges are skipped and marked as requested. While a request
    /// is in flight nothing is issued and the requested marker is left
    /// alone, so the trigger fires again once the request completes.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchSkip`] reason when no request should be made.
    pub fn begin(&mut self, range: TimeRange) -> Result<FetchTicket, FetchSkip> {
        if self.coverage.covers(&range) {
            self.last_requested = Some(range);
            debug!(%range, "history range already covered");
            return Err(FetchSkip::Covered);
        }
        if let Some(current) = self.in_flight {
            debug!(%range, in_flight = %current.range, "history request already in flight");
            return Err(FetchSkip::InFlight);
        }
        let ticket = FetchTicket {
            id: self.next_ticket,
            range,
        };
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.in_flight = Some(ticket);
        self.last_requested = Some(range);
        Ok(ticket)
    }

    /// Whether `ticket` is the request this planner is waiting on.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.in_flight.is_some_and(|current| current.id == ticket.id)
    }

    /// Record a successful fetch: widen coverage and clear the marker.
    ///
    /// Returns `false` (and changes nothing) for a ticket that is not the
    /// outstanding one, e.g. a response from before a session reset.
    pub fn complete(&mut self, ticket: &FetchTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.coverage.insert(ticket.range);
        self.in_flight = None;
        true
    }

    /// Record a failed fetch: clear the marker, leave coverage unchanged.
    ///
    /// The requested marker is reset as well, so the same window is retried
    /// by the trigger policy on the next frame.
    pub fn fail(&mut self, ticket: &FetchTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.in_flight = None;
        self.last_requested = None;
        true
    }

    /// Forget coverage, the in-flight marker and the last request. Ticket
    /// numbering continues so stale responses can still be told apart.
    pub fn clear(&mut self) {
        self.coverage.clear();
        self.in_flight = None;
        self.last_requested = None;
    }
}
