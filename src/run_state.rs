//! Mutable state shared by every worker during a load test.
//!
//! A single [`RunState`] is created immediately before the workers start and is
//! shared with all of them through an [`Arc`](std::sync::Arc). Its counters only ever
//! grow and its [`StopSignal`] only ever moves from "running" to "stopped".

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time;

use crate::util;

/// Thread-safe flag telling every worker to stop issuing new requests.
///
/// Cloning a `StopSignal` returns a handle to the same flag. Once set the flag is
/// never cleared, and setting it again has no further effect.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);
impl StopSignal {
    /// Create a new signal that has not been triggered.
    pub fn new() -> Self {
        StopSignal(Arc::new(AtomicBool::new(false)))
    }

    /// Ask all workers to stop. Returns `true` only for the call that actually
    /// triggered the signal.
    ///
    /// # Example
    /// ```rust
    /// use loadtest::run_state::StopSignal;
    ///
    /// let stop_signal = StopSignal::new();
    /// assert!(stop_signal.request_stop());
    /// // Already stopping.
    /// assert!(!stop_signal.request_stop());
    /// assert!(stop_signal.is_stop_requested());
    /// ```
    pub fn request_stop(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Returns `true` once a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `true` if both handles refer to the same flag.
    pub(crate) fn same_signal(&self, other: &StopSignal) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Counters and stop flag shared by all workers of one load test.
#[derive(Debug)]
pub struct RunState {
    /// When the workers were started.
    started: time::Instant,
    /// Set by ctrl-c, by duration expiry, or programmatically.
    stop_signal: StopSignal,
    /// How many requests the workers have started.
    requests: AtomicUsize,
    /// How many requests ended with a non-200 status or a transport error.
    errors: AtomicUsize,
}
impl RunState {
    /// Create run state, starting the run clock now.
    pub fn new(stop_signal: StopSignal) -> Self {
        RunState {
            started: time::Instant::now(),
            stop_signal,
            requests: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    /// How long ago the run started.
    pub fn elapsed(&self) -> time::Duration {
        self.started.elapsed()
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop_signal
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_signal.is_stop_requested()
    }

    /// Ask all workers to stop, see [`StopSignal::request_stop`].
    pub fn request_stop(&self) -> bool {
        self.stop_signal.request_stop()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn total_errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    /// Determine if a worker should start another request.
    ///
    /// Workers continue until a stop is requested or, when `request_limit` is not 0,
    /// until the shared request counter reaches the limit. The check and the following
    /// [`RunState::increment_requests`] are not one atomic step, so with N workers the
    /// total may overshoot the limit by at most N - 1.
    pub fn should_continue(&self, request_limit: usize) -> bool {
        !self.is_stop_requested()
            && (request_limit == 0 || self.total_requests() < request_limit)
    }

    /// Determine if the run has lasted at least `duration_limit` seconds. A limit of
    /// 0 never expires.
    pub fn duration_expired(&self, duration_limit: usize) -> bool {
        util::timer_expired(self.started, duration_limit)
    }

    /// Count a new request, returning the number of requests started before it.
    pub(crate) fn increment_requests(&self) -> usize {
        self.requests.fetch_add(1, Ordering::SeqCst)
    }

    /// Uncount a request that was never sent because it could not be built.
    pub(crate) fn rollback_request(&self) {
        self.requests.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_is_idempotent() {
        let stop_signal = StopSignal::new();
        assert!(!stop_signal.is_stop_requested());

        // Only the first request flips the flag.
        assert!(stop_signal.request_stop());
        assert!(!stop_signal.request_stop());
        assert!(!stop_signal.request_stop());
        assert!(stop_signal.is_stop_requested());

        // Clones share the flag.
        let clone = stop_signal.clone();
        assert!(clone.is_stop_requested());
        assert!(clone.same_signal(&stop_signal));
        assert!(!clone.same_signal(&StopSignal::new()));
    }

    #[test]
    fn continue_until_limit() {
        let run_state = RunState::new(StopSignal::new());
        assert!(run_state.should_continue(0));
        assert!(run_state.should_continue(2));

        assert_eq!(run_state.increment_requests(), 0);
        assert!(run_state.should_continue(2));
        assert_eq!(run_state.increment_requests(), 1);
        assert!(!run_state.should_continue(2));
        // No limit.
        assert!(run_state.should_continue(0));

        run_state.rollback_request();
        assert_eq!(run_state.total_requests(), 1);
        assert!(run_state.should_continue(2));
    }

    #[test]
    fn stop_ends_run() {
        let stop_signal = StopSignal::new();
        let run_state = RunState::new(stop_signal.clone());
        assert!(run_state.should_continue(0));

        // Stopping through any handle is seen by the run state.
        assert!(stop_signal.request_stop());
        assert!(!run_state.should_continue(0));
        assert!(!run_state.request_stop());
        assert!(run_state.is_stop_requested());
    }

    #[test]
    fn duration() {
        let run_state = RunState::new(StopSignal::new());
        // Disabled.
        assert!(!run_state.duration_expired(0));
        assert!(!run_state.duration_expired(60));
    }

    #[test]
    fn concurrent_counters() {
        let run_state = Arc::new(RunState::new(StopSignal::new()));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let run_state = run_state.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1_000 {
                    run_state.increment_requests();
                    run_state.increment_errors();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(run_state.total_requests(), 16_000);
        assert_eq!(run_state.total_errors(), 16_000);
    }
}
