//! Functions and structures related to configuring a load test.
//!
//! A load test can be configured at run time by passing in the options and flags
//! defined by the [`LoadTestOptions`] structure, which are validated into an immutable
//! [`LoadTestConfig`].
//!
//! A [`LoadTestConfig`] can also be built programmatically, starting from
//! [`LoadTestConfig::new`].

use gumdrop::Options;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use simplelog::*;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use std::{fmt, fs};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::util;
use crate::LoadTestError;

/// Default number of seconds to wait for a connection, and for a response.
const DEFAULT_CONNECT_TIMEOUT: usize = 3;

/// Runtime options available when launching a load test.
///
/// Loadtest leverages [`gumdrop`](https://docs.rs/gumdrop/) to derive the help output
/// from the below structure.
#[derive(Options, Debug, Clone, Default, Serialize, Deserialize)]
#[options(help = r#"Http(s) load test utility.

Usage: loadtest [OPTIONS] URL

The following runtime options are available:"#)]
pub struct LoadTestOptions {
    /// URL to load test
    #[options(free)]
    pub url: Vec<String>,

    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Prints version information
    #[options(short = "V", help = "Prints version information\n\nRequests:")]
    pub version: bool,

    /// Specifies the request method to use (default: GET)
    #[options(short = "X", meta = "METHOD")]
    pub command: String,
    /// Sets the total number of requests to make, values < 1 are unlimited
    #[options(short = "c", meta = "N")]
    pub count: i64,
    /// Stops the load test after (30s, 20m, 3h, 1h30m, etc)
    #[options(no_short, meta = "TIME")]
    pub duration: String,
    /// Sets how many concurrent threads to use (default: 1)
    #[options(short = "t", meta = "N")]
    pub threads: Option<usize>,
    /// Sets the wait time between requests in seconds, per thread (default: 0)
    #[options(no_short, meta = "SECONDS")]
    pub delay: Option<String>,
    /// Sets the maximum time allowed for a request in seconds (default: 3)
    #[options(no_short, meta = "SECONDS")]
    pub connect_timeout: Option<usize>,
    /// Sets the request body
    #[options(short = "d", meta = "DATA")]
    pub data: String,
    /// Reads the request body from a file
    #[options(no_short, meta = "PATH")]
    pub data_file: String,
    /// Adds a custom header, can be repeated (key:value)
    #[options(short = "H", meta = "KEY:VALUE")]
    pub header: Vec<String>,
    /// Allows insecure server connections when using SSL
    #[options(short = "k", help = "Allows insecure server connections when using SSL\n\nOutput:")]
    pub insecure: bool,

    /// Also writes the final report as JSON to this file
    #[options(no_short, meta = "NAME")]
    pub report_file: String,
    /// Doesn't print a progress marker for each request
    #[options(no_short)]
    pub no_progress: bool,
    /// Enables log file and sets name
    #[options(no_short, meta = "NAME")]
    pub log_file: String,
    /// Increases log file level (-g, -gg, etc)
    #[options(short = "g", count)]
    pub log_level: u8,
    /// Decreases verbosity (-q, -qq, etc)
    #[options(count, short = "q")]
    pub quiet: u8,
    /// Increases verbosity (-v, -vv, etc)
    #[options(count, short = "v")]
    pub verbose: u8,
}

/// The request methods that can be load tested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, Serialize, Deserialize)]
pub enum HttpMethod {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}
impl HttpMethod {
    /// The method as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Delete => "DELETE",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}
/// Case-insensitive, surrounding whitespace is ignored.
impl FromStr for HttpMethod {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        HttpMethod::iter()
            .find(|method| method.as_str() == normalized)
            .ok_or_else(|| LoadTestError::InvalidOption {
                option: "--command".to_string(),
                value: s.to_string(),
                detail: format!(
                    "must be one of: {}",
                    HttpMethod::iter()
                        .map(|method| method.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
    }
}
impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// The validated configuration of one load test, read-only for the whole run.
#[derive(Clone, Debug)]
pub struct LoadTestConfig {
    pub method: HttpMethod,
    pub url: String,
    /// Sent with every request, unless empty.
    pub body: Vec<u8>,
    /// Raw `key:value` headers in the order given. When a key repeats, the last value
    /// wins.
    pub headers: Vec<String>,
    /// Number of concurrent workers, at least 1.
    pub threads: usize,
    /// How long each worker waits between requests.
    pub delay: Duration,
    /// Total requests across all workers, 0 is unlimited.
    pub count: usize,
    /// Maximum run time in seconds, 0 is unlimited.
    pub duration: usize,
    /// Bounds both connecting and the whole request.
    pub connect_timeout: Duration,
    /// Skip certificate verification, only used for HTTPS URLs.
    pub insecure: bool,
}
impl LoadTestConfig {
    /// A configuration sending unlimited GET requests to `url` from a single worker.
    pub fn new(url: &str) -> Self {
        LoadTestConfig {
            method: HttpMethod::Get,
            url: url.to_string(),
            body: Vec::new(),
            headers: Vec::new(),
            threads: 1,
            delay: Duration::from_secs(0),
            count: 0,
            duration: 0,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT as u64),
            insecure: false,
        }
    }

    /// Returns `true` if certificates won't be verified for this load test.
    pub fn skips_certificate_verification(&self) -> bool {
        self.insecure && self.url.starts_with("https")
    }

    /// One-line description of the load test, displayed before it starts.
    ///
    /// # Example
    /// ```rust
    /// use loadtest::config::LoadTestConfig;
    ///
    /// let configuration = LoadTestConfig {
    ///     threads: 4,
    ///     count: 100,
    ///     duration: 30,
    ///     ..LoadTestConfig::new("http://dev.local/")
    /// };
    /// assert_eq!(
    ///     configuration.banner(),
    ///     "Running 4 threads against: http://dev.local/ (100 total requests), maximum duration of 30 seconds"
    /// );
    /// ```
    pub fn banner(&self) -> String {
        let requests = if self.count > 0 {
            util::count_string(self.count, "total request")
        } else {
            "unlimited requests".to_string()
        };
        let duration = if self.duration > 0 {
            format!(
                ", maximum duration of {}",
                util::count_string(self.duration, "second")
            )
        } else {
            String::new()
        };
        format!(
            "Running {} against: {} ({}){}",
            util::count_string(self.threads, "thread"),
            self.url,
            requests,
            duration
        )
    }
}

impl LoadTestOptions {
    /// Validate the options, and convert them into the configuration of a load test.
    ///
    /// # Example
    /// ```rust
    /// use gumdrop::Options;
    /// use loadtest::config::{HttpMethod, LoadTestOptions};
    ///
    /// let options =
    ///     LoadTestOptions::parse_args_default(&["-X", " post ", "-c", "10", "http://dev.local/"])
    ///         .unwrap();
    /// let configuration = options.validate().unwrap();
    /// assert_eq!(configuration.method, HttpMethod::Post);
    /// assert_eq!(configuration.count, 10);
    /// assert_eq!(configuration.threads, 1);
    /// ```
    pub fn validate(&self) -> Result<LoadTestConfig, LoadTestError> {
        // Can't set both --verbose and --quiet.
        if self.verbose > 0 && self.quiet > 0 {
            return Err(LoadTestError::InvalidOption {
                option: "--verbose".to_string(),
                value: self.verbose.to_string(),
                detail: "--verbose can not be set with --quiet.".to_string(),
            });
        }

        // Exactly one URL is required.
        let url = match self.url.as_slice() {
            [url] => url.trim().to_string(),
            [] => {
                return Err(LoadTestError::InvalidOption {
                    option: "URL".to_string(),
                    value: "".to_string(),
                    detail: "A URL to load test is required.".to_string(),
                })
            }
            urls => {
                return Err(LoadTestError::InvalidOption {
                    option: "URL".to_string(),
                    value: urls.join(" "),
                    detail: "Only one URL can be load tested.".to_string(),
                })
            }
        };
        util::is_valid_url(&url)?;

        let method = if self.command.trim().is_empty() {
            HttpMethod::Get
        } else {
            HttpMethod::from_str(&self.command)?
        };

        // Validate `threads`.
        let threads = self.threads.unwrap_or(1);
        if threads == 0 {
            return Err(LoadTestError::InvalidOption {
                option: "--threads".to_string(),
                value: threads.to_string(),
                detail: "--threads must be a positive integer.".to_string(),
            });
        }

        // Validate `connect_timeout`.
        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        if connect_timeout == 0 {
            return Err(LoadTestError::InvalidOption {
                option: "--connect-timeout".to_string(),
                value: connect_timeout.to_string(),
                detail: "--connect-timeout must be a positive integer.".to_string(),
            });
        }

        // Validate `delay`, negative delays are treated as no delay.
        let delay = match self.delay.as_ref() {
            Some(delay) => delay
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|seconds| !seconds.is_nan())
                .and_then(|seconds| Duration::try_from_secs_f64(seconds.max(0.0)).ok())
                .ok_or_else(|| LoadTestError::InvalidOption {
                    option: "--delay".to_string(),
                    value: delay.to_string(),
                    detail: "--delay must be a number of seconds.".to_string(),
                })?,
            None => Duration::from_secs(0),
        };

        // Values < 1 are unlimited.
        let count = if self.count < 1 { 0 } else { self.count as usize };

        let duration = if self.duration.trim().is_empty() {
            0
        } else {
            util::parse_timespan(&self.duration)?
        };

        // Validate `header`.
        for header in &self.header {
            let invalid_header = |detail: String| LoadTestError::InvalidOption {
                option: "--header".to_string(),
                value: header.to_string(),
                detail,
            };
            let (key, value) = util::split_header(header).ok_or_else(|| {
                invalid_header("Invalid header format, expected key:value.".to_string())
            })?;
            HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| invalid_header(format!("invalid header name {}: {}", key, e)))?;
            HeaderValue::from_str(value)
                .map_err(|e| invalid_header(format!("invalid value for header {}: {}", key, e)))?;
        }

        // Validate `data` and `data_file`.
        let body = if !self.data_file.is_empty() {
            if !self.data.is_empty() {
                return Err(LoadTestError::InvalidOption {
                    option: "--data-file".to_string(),
                    value: self.data_file.to_string(),
                    detail: "--data-file can not be set with --data.".to_string(),
                });
            }
            let path = util::resolve_path(&self.data_file)?;
            let body = fs::read(&path).map_err(|e| LoadTestError::InvalidOption {
                option: "--data-file".to_string(),
                value: self.data_file.to_string(),
                detail: format!("unable to read {}: {}", path.display(), e),
            })?;
            debug!("read {} bytes from {}", body.len(), path.display());
            body
        } else {
            self.data.as_bytes().to_vec()
        };

        // Confirm the report file can be written before spending time on the load test,
        // without truncating an existing report.
        if !self.report_file.is_empty() {
            fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.report_file)
                .map_err(|e| LoadTestError::InvalidOption {
                    option: "--report-file".to_string(),
                    value: self.report_file.to_string(),
                    detail: format!("unable to create report file: {}", e),
                })?;
        }

        let configuration = LoadTestConfig {
            method,
            url,
            body,
            headers: self.header.clone(),
            threads,
            delay,
            count,
            duration,
            connect_timeout: Duration::from_secs(connect_timeout as u64),
            insecure: self.insecure,
        };
        info!("method = {}", configuration.method);
        info!("threads = {}", configuration.threads);
        info!("count = {}", configuration.count);
        info!("duration = {}", configuration.duration);
        info!("delay = {:?}", configuration.delay);
        info!("connect_timeout = {:?}", configuration.connect_timeout);
        Ok(configuration)
    }

    /// Configure console and optional file logging.
    pub fn initialize_logger(&self) {
        // Configure console output level. Warn by default so log lines don't break up the
        // progress markers.
        let debug_level = match self.verbose {
            0 => match self.quiet {
                0 => LevelFilter::Warn,
                _ => LevelFilter::Error,
            },
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Configure log file level.
        let log_level = match self.log_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Open the log file if configured.
        let log_file: Option<PathBuf> = if !self.log_file.is_empty() {
            Some(PathBuf::from(&self.log_file))
        // Otherwise disable the log.
        } else {
            None
        };

        let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
        loggers.push(SimpleLogger::new(debug_level, Config::default()));
        if let Some(log_to_file) = log_file.as_ref() {
            match fs::File::create(log_to_file) {
                Ok(file) => loggers.push(WriteLogger::new(log_level, Config::default(), file)),
                Err(e) => eprintln!(
                    "failed to create log file {}: {}",
                    log_to_file.display(),
                    e
                ),
            }
        }
        if let Err(e) = CombinedLogger::init(loggers) {
            info!("failed to initialize CombinedLogger: {}", e);
        }
        if let Some(log_to_file) = log_file {
            info!("Writing to log file: {}", log_to_file.display());
        }

        info!("Output verbosity level: {}", debug_level);
        info!("Logfile verbosity level: {}", log_level);
    }
}
