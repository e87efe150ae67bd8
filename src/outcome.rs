//! Classification and counting of request outcomes.
//!
//! Every completed request produces one outcome, labeled either by its numeric status
//! code (`"200"`, `"404"`, ...) or, for transport failures, by the error message. The
//! [`OutcomeCounter`] keeps a running count per label for the whole load test.

use reqwest::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// How an outcome is displayed and whether it counts as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OutcomeCategory {
    /// The server responded `200 OK`.
    Success,
    /// The server responded with any other non-5xx status.
    ClientError,
    /// The server responded with a 5xx status.
    ServerError,
    /// No response was received: connection refused, timeout, DNS or TLS failure.
    Transport,
}
impl OutcomeCategory {
    /// Classify a response status.
    ///
    /// Only `200` is a success; every other status, including other 2xx codes, is
    /// an error.
    ///
    /// # Example
    /// ```rust
    /// use loadtest::outcome::OutcomeCategory;
    /// use reqwest::StatusCode;
    ///
    /// assert_eq!(OutcomeCategory::from_status(StatusCode::OK), OutcomeCategory::Success);
    /// assert_eq!(OutcomeCategory::from_status(StatusCode::CREATED), OutcomeCategory::ClientError);
    /// assert_eq!(OutcomeCategory::from_status(StatusCode::NOT_FOUND), OutcomeCategory::ClientError);
    /// assert_eq!(OutcomeCategory::from_status(StatusCode::BAD_GATEWAY), OutcomeCategory::ServerError);
    /// ```
    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::OK {
            OutcomeCategory::Success
        } else if status.is_server_error() {
            OutcomeCategory::ServerError
        } else {
            OutcomeCategory::ClientError
        }
    }

    /// Returns `true` if outcomes of this category count toward the error total.
    pub fn is_error(self) -> bool {
        self != OutcomeCategory::Success
    }
}

/// The classified result of one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeEvent {
    /// Status code as text, or the transport error message.
    pub label: String,
    pub category: OutcomeCategory,
}
impl OutcomeEvent {
    pub fn new(label: String, category: OutcomeCategory) -> Self {
        OutcomeEvent { label, category }
    }

    /// Build the outcome of a request that received a response.
    pub fn from_status(status: StatusCode) -> Self {
        OutcomeEvent::new(
            status.as_u16().to_string(),
            OutcomeCategory::from_status(status),
        )
    }
}

/// Running count for one outcome label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OutcomeEntry {
    pub count: usize,
    pub category: OutcomeCategory,
}

/// Thread-safe table of outcome counts, keyed by label.
///
/// Labels are only ever added, never removed. The table is sorted by label so a
/// snapshot can be displayed directly.
#[derive(Debug, Default)]
pub struct OutcomeCounter {
    table: Mutex<BTreeMap<String, OutcomeEntry>>,
}
impl OutcomeCounter {
    pub fn new() -> Self {
        OutcomeCounter::default()
    }

    /// Increment the counter for `label`, creating it with a count of 1 if this is the
    /// first time the label is seen. Safe to call from any number of workers at once.
    ///
    /// # Example
    /// ```rust
    /// use loadtest::outcome::{OutcomeCategory, OutcomeCounter};
    ///
    /// let outcomes = OutcomeCounter::new();
    /// outcomes.record_outcome("200", OutcomeCategory::Success);
    /// outcomes.record_outcome("200", OutcomeCategory::Success);
    /// outcomes.record_outcome("404", OutcomeCategory::ClientError);
    ///
    /// let snapshot = outcomes.snapshot();
    /// assert_eq!(snapshot["200"].count, 2);
    /// assert_eq!(snapshot["404"].count, 1);
    /// assert_eq!(outcomes.total(), 3);
    /// ```
    pub fn record_outcome(&self, label: &str, category: OutcomeCategory) {
        let mut table = self.lock();
        match table.get_mut(label) {
            // We've seen this outcome before, increment counter.
            Some(entry) => {
                entry.count += 1;
                trace!("incremented {} counter: {}", label, entry.count);
            }
            // First time we've seen this outcome, initialize counter.
            None => {
                debug!("new outcome: {} ({:?})", label, category);
                table.insert(label.to_string(), OutcomeEntry { count: 1, category });
            }
        }
    }

    /// Copy of the current table, sorted by label.
    pub fn snapshot(&self) -> BTreeMap<String, OutcomeEntry> {
        self.lock().clone()
    }

    /// Sum of all outcome counts.
    pub fn total(&self) -> usize {
        self.lock().values().map(|entry| entry.count).sum()
    }

    // A panic elsewhere while holding the lock can't leave a half-updated entry, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, OutcomeEntry>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
