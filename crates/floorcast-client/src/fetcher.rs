//! Range fetcher: backfills history for windows the store does not cover.
//!
//! Coverage and single-flight bookkeeping live in the session's
//! [`FetchPlanner`](floorcast_core::FetchPlanner); this module performs the
//! request and routes the result back. Two entry points:
//!
//! - [`RangeFetcher::ensure_covered`] runs the whole cycle inline. Simple
//!   callers and tests use it.
//! - [`RangeFetcher::spawn`] runs only the request on a separate task and
//!   reports a [`FetchCompletion`] through a channel, so the driver keeps
//!   serving frames while the request is in flight.

use std::sync::Arc;

use floorcast_core::{FetchSkip, FetchTicket, SessionState};
use floorcast_types::{HistoryResponse, TimeRange};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::history::HistoryProvider;

/// Result of [`RangeFetcher::ensure_covered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No request was made.
    Skipped(FetchSkip),
    /// A request was made and merged.
    Merged {
        /// Newly stored events.
        inserted: usize,
    },
    /// A request completed but the session had been reset meanwhile.
    Discarded,
}

/// A finished background request.
#[derive(Debug)]
pub struct FetchCompletion {
    /// The ticket the request was issued under.
    pub ticket: FetchTicket,
    /// The provider's answer.
    pub result: Result<HistoryResponse, ClientError>,
}

/// Issues history requests through a [`HistoryProvider`].
#[derive(Debug)]
pub struct RangeFetcher<P> {
    provider: Arc<P>,
}

impl<P> Clone for RangeFetcher<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: HistoryProvider> RangeFetcher<P> {
    /// Wrap a provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Make sure `range` is covered, fetching and merging it if not.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HistoryFetchFailed`] if the request fails.
    /// Coverage is left unchanged in that case.
    pub async fn ensure_covered(
        &self,
        session: &mut SessionState,
        range: TimeRange,
    ) -> Result<FetchOutcome, ClientError> {
        let ticket = match session.ensure_covered(range) {
            Ok(ticket) => ticket,
            Err(skip) => return Ok(FetchOutcome::Skipped(skip)),
        };
        let result = self.provider.fetch(range).await;
        complete(session, FetchCompletion { ticket, result })
    }

    /// Run the request for `ticket` on a new task and send the completion
    /// to `completions`.
    pub fn spawn(&self, ticket: FetchTicket, completions: mpsc::Sender<FetchCompletion>) {
        let provider = Arc::clone(&self.provider);
        debug!(ticket = ticket.id, range = %ticket.range, "history request started");
        tokio::spawn(async move {
            let result = provider.fetch(ticket.range).await;
            if completions.send(FetchCompletion { ticket, result }).await.is_err() {
                debug!(ticket = ticket.id, "session driver gone, dropping history result");
            }
        });
    }
}

/// Apply a finished request to the session.
///
/// # Errors
///
/// Passes the request's error through after marking the fetch as failed.
pub fn complete(
    session: &mut SessionState,
    completion: FetchCompletion,
) -> Result<FetchOutcome, ClientError> {
    let FetchCompletion { ticket, result } = completion;
    match result {
        Ok(response) => match session.merge_history(&ticket, response) {
            Some(inserted) => {
                let store = session.store();
                info!(
                    range = %ticket.range,
                    inserted,
                    retained = store.len(),
                    oldest = ?store.oldest_timestamp(),
                    newest = ?store.newest_timestamp(),
                    "history merged"
                );
                Ok(FetchOutcome::Merged { inserted })
            }
            None => Ok(FetchOutcome::Discarded),
        },
        Err(err) => {
            warn!(range = %ticket.range, error = %err, "history fetch failed");
            session.fail_history(&ticket);
            Err(err)
        }
    }
}
