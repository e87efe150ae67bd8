//! The summary of a finished load test.
//!
//! A [`LoadTestReport`] is returned by
//! [`LoadTest::execute()`](../struct.LoadTest.html#method.execute). Displaying it with
//! `{}` produces the plain text summary, [`LoadTestReport::colored`] adds terminal colors
//! to the response counts, and [`LoadTestReport::write_json`] saves it as JSON.

use chrono::prelude::*;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;
use std::{fmt, io};

use crate::outcome::{OutcomeCategory, OutcomeEntry};
use crate::progress;
use crate::util;
use crate::LoadTestError;

/// How often one outcome was seen.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutcomeSummary {
    /// Status code as text, or the transport error message.
    pub label: String,
    pub count: usize,
    pub category: OutcomeCategory,
    /// Average occurrences per second over the whole load test.
    pub per_second: f64,
}

/// Final statistics of one load test.
#[derive(Clone, Debug)]
pub struct LoadTestReport {
    /// When the workers were started.
    pub started: DateTime<Local>,
    /// When the last worker exited.
    pub stopped: DateTime<Local>,
    /// Time from starting the workers until the last one exited.
    pub elapsed: Duration,
    pub total_requests: usize,
    pub total_errors: usize,
    /// Share of requests that were errors, 0 if there were no requests.
    pub error_rate_percent: f64,
    /// 0 if no time elapsed.
    pub requests_per_second: f64,
    /// Sorted by label.
    pub outcomes: Vec<OutcomeSummary>,
    /// Workers that stopped early because a request could not be built.
    pub worker_errors: Vec<String>,
}
impl LoadTestReport {
    /// Calculate rates from the final counters.
    pub fn new(
        started: DateTime<Local>,
        stopped: DateTime<Local>,
        elapsed: Duration,
        total_requests: usize,
        total_errors: usize,
        outcomes: BTreeMap<String, OutcomeEntry>,
        worker_errors: Vec<String>,
    ) -> Self {
        let seconds = elapsed.as_secs_f64();
        let per_second = |count: usize| {
            if seconds > 0.0 {
                count as f64 / seconds
            } else {
                0.0
            }
        };

        let error_rate_percent = if total_requests > 0 {
            total_errors as f64 * 100.0 / total_requests as f64
        } else {
            0.0
        };

        // BTreeMap iterates in label order.
        let outcomes = outcomes
            .into_iter()
            .map(|(label, entry)| OutcomeSummary {
                label,
                count: entry.count,
                category: entry.category,
                per_second: per_second(entry.count),
            })
            .collect();

        LoadTestReport {
            started,
            stopped,
            elapsed,
            total_requests,
            total_errors,
            error_rate_percent,
            requests_per_second: per_second(total_requests),
            outcomes,
            worker_errors,
        }
    }

    /// Display the report with response counts colored by category.
    ///
    /// # Example
    /// ```rust
    /// use loadtest::report::LoadTestReport;
    ///
    /// fn print_report(report: &LoadTestReport) {
    ///     println!("{}", report.colored());
    /// }
    /// ```
    pub fn colored(&self) -> ColoredReport<'_> {
        ColoredReport(self)
    }

    /// Returns `true` if workers stopped early without a single request being sent.
    pub fn failed_to_start(&self) -> bool {
        self.total_requests == 0 && !self.worker_errors.is_empty()
    }

    /// Write the report to `path` as pretty-printed JSON.
    pub fn write_json(&self, path: &str) -> Result<(), LoadTestError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self).map_err(io::Error::from)?;
        writer.flush()?;
        info!("wrote report to {}", path);
        Ok(())
    }

    fn fmt_report(&self, fmt: &mut fmt::Formatter, colored: bool) -> fmt::Result {
        writeln!(
            fmt,
            "{} of {} ({}% error rate) made in {:.6} seconds.",
            util::count_string(self.total_errors, "error"),
            util::count_string(self.total_requests, "request"),
            self.error_rate_percent.trunc() as u64,
            self.elapsed.as_secs_f64()
        )?;
        writeln!(fmt, "{:.2} requests/second.", self.requests_per_second)?;
        writeln!(fmt, "Responses:")?;
        for outcome in &self.outcomes {
            if colored {
                writeln!(
                    fmt,
                    "  {}: {}{}{} {:.2} per second",
                    outcome.label,
                    progress::color(outcome.category),
                    outcome.count,
                    progress::CLEAR,
                    outcome.per_second
                )?;
            } else {
                writeln!(
                    fmt,
                    "  {}: {} {:.2} per second",
                    outcome.label, outcome.count, outcome.per_second
                )?;
            }
        }

        if !self.worker_errors.is_empty() {
            writeln!(fmt, "Workers stopped early:")?;
            for worker_error in &self.worker_errors {
                writeln!(fmt, "  {}", worker_error)?;
            }
        }

        Ok(())
    }
}

/// Implement format trait to allow displaying the report.
impl fmt::Display for LoadTestReport {
    // Implement display of the report with `{}` marker.
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_report(fmt, false)
    }
}

/// A [`LoadTestReport`] displayed with terminal colors.
pub struct ColoredReport<'a>(&'a LoadTestReport);
impl fmt::Display for ColoredReport<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt_report(fmt, true)
    }
}

impl Serialize for LoadTestReport {
    // LoadTestReport serialization can't be derived because of the timestamp fields.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("LoadTestReport", 9)?;
        // Convert timestamps to unix timestamps.
        s.serialize_field("started", &self.started.timestamp())?;
        s.serialize_field("stopped", &self.stopped.timestamp())?;
        s.serialize_field("elapsed", &self.elapsed.as_secs_f64())?;
        s.serialize_field("total_requests", &self.total_requests)?;
        s.serialize_field("total_errors", &self.total_errors)?;
        s.serialize_field("error_rate_percent", &self.error_rate_percent)?;
        s.serialize_field("requests_per_second", &self.requests_per_second)?;
        s.serialize_field("outcomes", &self.outcomes)?;
        s.serialize_field("worker_errors", &self.worker_errors)?;
        s.end()
    }
}
