//! # Loadtest
//!
//! Loadtest is a concurrent HTTP(S) load testing tool. Given a target URL it issues a
//! stream of identical requests from a fixed pool of concurrent workers, counts every
//! outcome (status codes and transport errors), and reports throughput and error rate
//! when the run ends.
//!
//! Loadtest uses [`reqwest`](https://docs.rs/reqwest/) to provide the HTTP client, and
//! [`tokio`](https://docs.rs/tokio/) to run the workers.
//!
//! ## Running a load test from the command line
//!
//! ```bash
//! $ loadtest http://dev.local/ -t 4 -c 1000
//! Running 4 threads against: http://dev.local/ (1000 total requests)
//! ........................................................................
//! 0 errors of 1000 requests (0% error rate) made in 2.104391 seconds.
//! 475.20 requests/second.
//! Responses:
//!   200: 1000 475.20 per second
//! ```
//!
//! A run stops when the request count (`-c`) is exhausted, when the duration
//! (`--duration`) expires, or when the process receives ctrl-c. In every case the
//! workers finish their in-flight request and the summary is displayed.
//!
//! Every response other than `200` is counted as an error, as is every transport
//! failure (connection refused, timeout, DNS or TLS failure). Transport failures are
//! reported by their error message.
//!
//! ## Embedding a load test
//!
//! The same engine is available as a library:
//!
//! ```rust,no_run
//! use loadtest::config::LoadTestConfig;
//! use loadtest::LoadTest;
//!
//! fn main() -> Result<(), loadtest::LoadTestError> {
//!     let configuration = LoadTestConfig {
//!         threads: 4,
//!         count: 100,
//!         ..LoadTestConfig::new("http://dev.local/")
//!     };
//!     let report = LoadTest::new(configuration).execute()?;
//!     println!("{}", report);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## License
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! you may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//! <http://www.apache.org/licenses/LICENSE-2.0>
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

#[macro_use]
extern crate log;

pub mod config;
pub mod dispatcher;
pub mod outcome;
pub mod progress;
pub mod report;
pub mod run_state;
pub mod util;
pub mod worker;

use chrono::prelude::*;
use std::sync::Arc;
use std::{fmt, io};

use crate::config::LoadTestConfig;
use crate::dispatcher::RequestDispatcher;
use crate::outcome::{OutcomeCounter, OutcomeEvent};
use crate::report::LoadTestReport;
use crate::run_state::{RunState, StopSignal};

/// An enumeration of all errors a [`LoadTest`](./struct.LoadTest.html) can return.
#[derive(Debug)]
pub enum LoadTestError {
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`reqwest::Error`](https://docs.rs/reqwest/*/reqwest/struct.Error.html).
    Reqwest(reqwest::Error),
    /// Wraps a ['tokio::task::JoinError'](https://tokio-rs.github.io/tokio/doc/tokio/task/struct.JoinError.html).
    TokioJoin(tokio::task::JoinError),
    /// Failed to parse a URL.
    InvalidUrl {
        /// The invalid URL that caused this error.
        url: String,
        /// An optional explanation of the error.
        detail: String,
        /// Wraps a [`url::ParseError`](https://docs.rs/url/*/url/enum.ParseError.html).
        parse_error: url::ParseError,
    },
    /// Invalid option or value specified, may only be invalid in context.
    InvalidOption {
        /// The invalid option that caused this error, may be only invalid in context.
        option: String,
        /// The invalid value that caused this error, may be only invalid in context.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// A request could not be constructed from the configuration. This stops the
    /// worker that hit it.
    InvalidRequest {
        /// An explanation of the error.
        detail: String,
    },
}
/// Implement a helper to provide a text description of all possible types of errors.
impl LoadTestError {
    fn describe(&self) -> &str {
        match *self {
            LoadTestError::Io(_) => "io::Error",
            LoadTestError::Reqwest(_) => "reqwest::Error",
            LoadTestError::TokioJoin(_) => "tokio::task::JoinError",
            LoadTestError::InvalidUrl { .. } => "failed to parse url",
            LoadTestError::InvalidOption { .. } => "invalid option or value specified",
            LoadTestError::InvalidRequest { .. } => "failed to build request",
        }
    }
}

/// Implement format trait to allow displaying errors.
impl fmt::Display for LoadTestError {
    // Implement display of error with `{}` marker.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadTestError::Io(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Reqwest(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::TokioJoin(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::InvalidUrl {
                ref url,
                ref parse_error,
                ..
            } => write!(
                f,
                "LoadTestError: {} ({}: {})",
                self.describe(),
                url,
                parse_error
            ),
            LoadTestError::InvalidOption {
                ref option,
                ref value,
                ref detail,
            } => write!(
                f,
                "LoadTestError: {} ({} = '{}': {})",
                self.describe(),
                option,
                value,
                detail
            ),
            LoadTestError::InvalidRequest { ref detail } => {
                write!(f, "LoadTestError: {} ({})", self.describe(), detail)
            }
        }
    }
}

// Define the lower level source of this error, if any.
impl std::error::Error for LoadTestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            LoadTestError::Io(ref source) => Some(source),
            LoadTestError::Reqwest(ref source) => Some(source),
            LoadTestError::TokioJoin(ref source) => Some(source),
            LoadTestError::InvalidUrl {
                ref parse_error, ..
            } => Some(parse_error),
            _ => None,
        }
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for LoadTestError {
    fn from(err: reqwest::Error) -> LoadTestError {
        LoadTestError::Reqwest(err)
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for LoadTestError {
    fn from(err: io::Error) -> LoadTestError {
        LoadTestError::Io(err)
    }
}

/// Auto-convert TokioJoin errors.
impl From<tokio::task::JoinError> for LoadTestError {
    fn from(err: tokio::task::JoinError) -> LoadTestError {
        LoadTestError::TokioJoin(err)
    }
}

/// Coordinates a single load test run.
///
/// A `LoadTest` launches one worker per configured thread, all sharing one
/// [`RunState`](./run_state/struct.RunState.html) and one
/// [`OutcomeCounter`](./outcome/struct.OutcomeCounter.html), waits for every worker to
/// return, and then builds the [`LoadTestReport`](./report/struct.LoadTestReport.html).
pub struct LoadTest {
    /// The validated, read-only configuration for this run.
    configuration: LoadTestConfig,
    /// Shared flag telling all workers to stop, set by ctrl-c, by duration expiry, or
    /// programmatically through [`LoadTest::stop_signal`].
    stop_signal: StopSignal,
    /// Optional stream of outcome events, one per completed request.
    progress: Option<flume::Sender<OutcomeEvent>>,
}
impl LoadTest {
    /// Create a load test from a validated configuration.
    ///
    /// # Example
    /// ```rust
    /// use loadtest::config::LoadTestConfig;
    /// use loadtest::LoadTest;
    ///
    /// let load_test = LoadTest::new(LoadTestConfig::new("http://127.0.0.1/"));
    /// ```
    pub fn new(configuration: LoadTestConfig) -> LoadTest {
        LoadTest {
            configuration,
            stop_signal: StopSignal::new(),
            progress: None,
        }
    }

    /// Send an [`OutcomeEvent`](./outcome/struct.OutcomeEvent.html) to `sender` each
    /// time a request completes. The channel is closed when the load test finishes.
    ///
    /// # Example
    /// ```rust
    /// use loadtest::config::LoadTestConfig;
    /// use loadtest::LoadTest;
    ///
    /// let (sender, receiver) = flume::unbounded();
    /// let load_test = LoadTest::new(LoadTestConfig::new("http://127.0.0.1/"))
    ///     .with_progress(sender);
    /// ```
    pub fn with_progress(mut self, sender: flume::Sender<OutcomeEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Returns a handle to the stop signal shared by all workers of this load test.
    ///
    /// Requesting a stop has the same effect as ctrl-c: each worker finishes its
    /// in-flight request and exits.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    /// Run the load test to completion and return the final report.
    ///
    /// A multi-threaded Tokio runtime with one thread per configured worker is created
    /// for the duration of the run. Use [`LoadTest::run`] from within an existing
    /// runtime.
    pub fn execute(self) -> Result<LoadTestReport, LoadTestError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.configuration.threads.max(1))
            .enable_all()
            .build()?;
        runtime.block_on(self.run())
    }

    /// Asynchronously run the load test to completion and return the final report.
    pub async fn run(self) -> Result<LoadTestReport, LoadTestError> {
        let LoadTest {
            configuration,
            stop_signal,
            progress,
        } = self;
        trace!("run: {:?}", configuration);

        // All workers share one client, and with it one connection pool.
        let dispatcher = Arc::new(RequestDispatcher::new(&configuration)?);
        let configuration = Arc::new(configuration);
        let outcomes = Arc::new(OutcomeCounter::new());

        // Catch ctrl-c to allow a clean shutdown that still displays the report.
        util::setup_ctrlc_handler(&stop_signal);

        let started = Local::now();
        let run_state = Arc::new(RunState::new(stop_signal.clone()));

        let mut workers = Vec::with_capacity(configuration.threads);
        // Workers are numbered from 1 as they're human-visible in the logs.
        for thread_number in 1..=configuration.threads {
            workers.push(tokio::spawn(worker::worker_main(
                thread_number,
                configuration.clone(),
                dispatcher.clone(),
                run_state.clone(),
                outcomes.clone(),
                progress.clone(),
            )));
        }
        // Workers hold the only remaining senders, the channel closes when they exit.
        drop(progress);

        info!("launched {} workers...", workers.len());
        let results = futures::future::join_all(workers).await;
        let elapsed = run_state.elapsed();
        let stopped = Local::now();
        util::release_ctrlc_handler(&stop_signal);
        debug!("all workers exited");

        let mut worker_errors = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            if let Err(e) = result? {
                error!("worker {} stopped early: {}", index + 1, e);
                worker_errors.push(format!("worker {}: {}", index + 1, e));
            }
        }

        // Every worker has joined, nothing can still be writing to the counters.
        Ok(LoadTestReport::new(
            started,
            stopped,
            elapsed,
            run_state.total_requests(),
            run_state.total_errors(),
            outcomes.snapshot(),
            worker_errors,
        ))
    }
}
