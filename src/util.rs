//! Utility functions used by the load test and the command line front end.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use std::time;
use url::Url;

use crate::run_state::StopSignal;
use crate::LoadTestError;

lazy_static! {
    static ref TIMESPAN: Regex =
        Regex::new(r"^(?:(?P<hours>\d+)h)?(?:(?P<minutes>\d+)m)?(?:(?P<seconds>\d+)s)?$")
            .unwrap_or_else(|e| unreachable!("invalid timespan regex: {}", e));
    /// The stop signal of the load test currently running, if any.
    static ref INTERRUPT_TARGET: Mutex<Option<StopSignal>> = Mutex::new(None);
}

/// Guards installation of the process-wide ctrl-c handler.
static INSTALL_CTRLC_HANDLER: Once = Once::new();

/// Exit code for a process ended by SIGINT while no load test is running.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Never sleep longer than this without checking whether the load test is stopping.
const MAXIMUM_SLEEP: time::Duration = time::Duration::from_millis(500);

/// Parse a string representing a time span and return the number of seconds.
///
/// Can be specified as an integer, indicating seconds. Or can use integers
/// together with one or more of "h", "m", and "s", in that order, indicating
/// "hours", "minutes", and "seconds".
///
/// Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, etc.
///
/// # Example
/// ```rust
/// use loadtest::util;
///
/// // 1 hour 2 minutes and 3 seconds is 3,723 seconds.
/// assert_eq!(util::parse_timespan("1h2m3s").unwrap(), 3_723);
///
/// // 45 seconds is 45 seconds.
/// assert_eq!(util::parse_timespan("45").unwrap(), 45);
///
/// // Invalid value is an error.
/// assert!(util::parse_timespan("foo").is_err());
/// ```
pub fn parse_timespan(time_str: &str) -> Result<usize, LoadTestError> {
    let time_str = time_str.trim();
    // If an integer is passed in, assume it's seconds
    if let Ok(t) = usize::from_str(time_str) {
        trace!("{} is integer: {} seconds", time_str, t);
        return Ok(t);
    }

    let invalid = || LoadTestError::InvalidOption {
        option: "--duration".to_string(),
        value: time_str.to_string(),
        detail: "expected seconds or a time span such as 30s, 20m, 3h or 1h30m".to_string(),
    };

    // Otherwise use a regex to extract hours, minutes and seconds from string.
    let time_matches = TIMESPAN.captures(time_str).ok_or_else(invalid)?;
    let mut parts = [0usize; 3];
    for (part, name) in parts.iter_mut().zip(["hours", "minutes", "seconds"].iter()) {
        if let Some(value) = time_matches.name(name) {
            *part = usize::from_str(value.as_str()).map_err(|_| invalid())?;
        }
    }
    let [hours, minutes, seconds] = parts;
    let total = hours
        .checked_mul(60 * 60)
        .zip(minutes.checked_mul(60))
        .and_then(|(hours, minutes)| hours.checked_add(minutes))
        .and_then(|total| total.checked_add(seconds))
        .ok_or_else(invalid)?;
    trace!(
        "{} hours {} minutes {} seconds: {} seconds",
        hours,
        minutes,
        seconds,
        total
    );
    Ok(total)
}

/// Format a count followed by a pluralized noun.
///
/// A count of exactly 1 keeps the noun singular. Otherwise nouns ending in "s" get
/// "es" appended, all others get "s".
///
/// # Example
/// ```rust
/// use loadtest::util;
///
/// assert_eq!(util::count_string(1, "thread"), "1 thread");
/// assert_eq!(util::count_string(4, "thread"), "4 threads");
/// assert_eq!(util::count_string(0, "error"), "0 errors");
/// assert_eq!(util::count_string(2, "process"), "2 processes");
/// ```
pub fn count_string(count: usize, base: &str) -> String {
    let counted = format!("{} {}", count, base);
    if count == 1 {
        counted
    } else if counted.ends_with('s') {
        counted + "es"
    } else {
        counted + "s"
    }
}

/// Split a `key:value` header on the first `:`, trimming whitespace from both halves.
///
/// Returns `None` if there is no `:`.
///
/// # Example
/// ```rust
/// use loadtest::util;
///
/// assert_eq!(
///     util::split_header(" Accept : text/html "),
///     Some(("Accept", "text/html"))
/// );
/// // Only the first colon separates the key from the value.
/// assert_eq!(
///     util::split_header("Referer: http://example.com/"),
///     Some(("Referer", "http://example.com/"))
/// );
/// assert_eq!(util::split_header("no-separator"), None);
/// ```
pub fn split_header(header: &str) -> Option<(&str, &str)> {
    let mut split = header.splitn(2, ':');
    match (split.next(), split.next()) {
        (Some(key), Some(value)) => Some((key.trim(), value.trim())),
        _ => None,
    }
}

/// Resolve a path given on the command line.
///
/// Anything containing `://` is parsed as a URL and its path component is used. A
/// leading `~` or `~/` expands to the current user's home directory as set in `HOME`,
/// and `~name/` expands to the home directory of user `name`.
///
/// # Example
/// ```rust
/// use loadtest::util;
/// use std::path::PathBuf;
///
/// assert_eq!(
///     util::resolve_path("file:///tmp/body.json").unwrap(),
///     PathBuf::from("/tmp/body.json")
/// );
/// assert_eq!(
///     util::resolve_path("body.json").unwrap(),
///     PathBuf::from("body.json")
/// );
/// ```
pub fn resolve_path(path: &str) -> Result<PathBuf, LoadTestError> {
    if path.contains("://") {
        let url = Url::parse(path).map_err(|parse_error| LoadTestError::InvalidUrl {
            url: path.to_string(),
            detail: "Invalid data file url.".to_string(),
            parse_error,
        })?;
        return Ok(PathBuf::from(url.path()));
    }

    if let Some(rest) = path.strip_prefix('~') {
        let (user, rest) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        let home = if user.is_empty() {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| LoadTestError::InvalidOption {
                    option: "--data-file".to_string(),
                    value: path.to_string(),
                    detail: "HOME is not set, unable to expand ~".to_string(),
                })?
        } else {
            user_home(user).ok_or_else(|| LoadTestError::InvalidOption {
                option: "--data-file".to_string(),
                value: path.to_string(),
                detail: format!("unable to find the home directory of {}", user),
            })?
        };
        let mut resolved = home;
        let rest = rest.trim_start_matches('/');
        if !rest.is_empty() {
            resolved.push(rest);
        }
        trace!("resolved {} to {}", path, resolved.display());
        return Ok(resolved);
    }

    Ok(PathBuf::from(path))
}

// Home directory of the named user, from the system's user database.
#[cfg(unix)]
fn user_home(name: &str) -> Option<PathBuf> {
    match nix::unistd::User::from_name(name) {
        Ok(user) => user.map(|user| user.dir),
        Err(e) => {
            debug!("failed to look up user {}: {}", name, e);
            None
        }
    }
}

#[cfg(not(unix))]
fn user_home(_name: &str) -> Option<PathBuf> {
    None
}

/// Helper function to determine if a URL can be load tested.
///
/// # Example
/// ```rust
/// use loadtest::util;
///
/// // Hostname is a valid URL.
/// assert!(util::is_valid_url("http://localhost/").is_ok());
///
/// // IP is a valid URL.
/// assert!(util::is_valid_url("https://127.0.0.1:8080").is_ok());
///
/// // Protocol is required
/// assert!(util::is_valid_url("example.com/").is_err());
///
/// // Only HTTP(S) can be load tested.
/// assert!(util::is_valid_url("ftp://example.com/").is_err());
/// ```
pub fn is_valid_url(url: &str) -> Result<Url, LoadTestError> {
    let parsed = Url::parse(url).map_err(|parse_error| LoadTestError::InvalidUrl {
        url: url.to_string(),
        detail: "Invalid url.".to_string(),
        parse_error,
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(LoadTestError::InvalidOption {
            option: "URL".to_string(),
            value: url.to_string(),
            detail: format!("unsupported scheme {}, expected http or https", scheme),
        }),
    }
}

/// Determine if a timer expired, with second granularity.
///
/// If the timer was started more than `run_time` seconds ago return `true`, otherwise
/// return `false`. A `run_time` of 0 never expires.
///
/// # Example
/// ```rust
/// use loadtest::util;
///
/// let started = std::time::Instant::now();
/// assert!(!util::timer_expired(started, 60));
/// // Timer is disabled.
/// assert!(!util::timer_expired(started, 0));
/// ```
pub fn timer_expired(started: time::Instant, run_time: usize) -> bool {
    run_time > 0 && started.elapsed().as_secs() >= run_time as u64
}

/// Sleep for `duration`, waking early if a stop is requested.
///
/// The sleep is split into chunks of at most 500 milliseconds, and the stop signal is
/// checked before each chunk. Returns `false` if the sleep was cut short.
pub async fn sleep_unless_stopped(duration: time::Duration, stop_signal: &StopSignal) -> bool {
    let mut remaining = duration;
    while remaining > time::Duration::from_millis(0) {
        if stop_signal.is_stop_requested() {
            return false;
        }
        let sleep_duration = remaining.min(MAXIMUM_SLEEP);
        remaining -= sleep_duration;
        tokio::time::sleep(sleep_duration).await;
    }
    true
}

fn interrupt_target() -> MutexGuard<'static, Option<StopSignal>> {
    INTERRUPT_TARGET
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

// Forward ctrl-c to the running load test. Returns `false` if no load test is running.
fn route_ctrlc() -> bool {
    match interrupt_target().as_ref() {
        Some(stop_signal) => {
            if stop_signal.request_stop() {
                warn!("caught ctrl-c, stopping...");
            } else {
                info!("caught another ctrl-c, already stopping...");
            }
            true
        }
        None => false,
    }
}

fn handle_ctrlc() {
    if !route_ctrlc() {
        // Outside a load test ctrl-c behaves as if no handler were installed.
        info!("caught ctrl-c, no load test is running, exiting");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}

// Internal helper to route ctrl-c to the stop signal of the load test that is starting.
// The process-wide handler is only installed once; later load tests replace the target.
pub(crate) fn setup_ctrlc_handler(stop_signal: &StopSignal) {
    *interrupt_target() = Some(stop_signal.clone());
    INSTALL_CTRLC_HANDLER.call_once(|| {
        if let Err(e) = ctrlc::set_handler(handle_ctrlc) {
            // Something else owns SIGINT, the load test can still be stopped through its
            // stop signal.
            warn!("failed to set ctrl-c handler: {}", e);
        }
    });
}

// Internal helper to stop routing ctrl-c to a finished load test. Until the next load
// test starts, ctrl-c exits the process.
pub(crate) fn release_ctrlc_handler(stop_signal: &StopSignal) {
    let mut target = interrupt_target();
    if target
        .as_ref()
        .map_or(false, |current| current.same_signal(stop_signal))
    {
        *target = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn timespan() {
        assert_eq!(parse_timespan("0").unwrap(), 0);
        assert_eq!(parse_timespan("1").unwrap(), 1);
        assert_eq!(parse_timespan(" 30 ").unwrap(), 30);
        assert_eq!(parse_timespan("1s").unwrap(), 1);
        assert_eq!(parse_timespan("1m").unwrap(), 60);
        assert_eq!(parse_timespan("61").unwrap(), 61);
        assert_eq!(parse_timespan("1m1s").unwrap(), 61);
        assert_eq!(parse_timespan("10m5s").unwrap(), 605);
        assert_eq!(parse_timespan("60m").unwrap(), 3600);
        assert_eq!(parse_timespan("1h").unwrap(), 3600);
        assert_eq!(parse_timespan("1h15s").unwrap(), 3615);
        assert_eq!(parse_timespan("1h5m13s").unwrap(), 3913);
        assert_eq!(parse_timespan("88h88m88s").unwrap(), 322168);

        assert!(parse_timespan("foo").is_err());
        assert!(parse_timespan("15mins").is_err());
        assert!(parse_timespan("1s1m").is_err());
        assert!(parse_timespan("-1").is_err());
        assert!(parse_timespan("1.5").is_err());

        // Too large to count in seconds.
        assert!(parse_timespan("9999999999999999h").is_err());
        assert!(parse_timespan(&format!("{}m", usize::MAX / 60 + 1)).is_err());
        assert!(parse_timespan(&format!("{}s", usize::MAX)).is_ok());
        assert!(parse_timespan(&format!("1m{}s", usize::MAX)).is_err());
        assert!(parse_timespan("99999999999999999999999s").is_err());
    }

    #[test]
    fn pluralize() {
        assert_eq!(count_string(0, "request"), "0 requests");
        assert_eq!(count_string(1, "request"), "1 request");
        assert_eq!(count_string(30, "total request"), "30 total requests");
        assert_eq!(count_string(1, "second"), "1 second");
        assert_eq!(count_string(5, "error"), "5 errors");
        assert_eq!(count_string(1, "status"), "1 status");
        assert_eq!(count_string(3, "status"), "3 statuses");
    }

    #[test]
    fn header() {
        assert_eq!(split_header("a:b"), Some(("a", "b")));
        assert_eq!(split_header("  X-Test  :  value  "), Some(("X-Test", "value")));
        assert_eq!(split_header("Key:"), Some(("Key", "")));
        assert_eq!(split_header("Time: 12:30:00"), Some(("Time", "12:30:00")));
        assert_eq!(split_header("Key"), None);
        assert_eq!(split_header(""), None);
    }

    #[test]
    fn path() {
        assert_eq!(
            resolve_path("file:///etc/hosts").unwrap(),
            PathBuf::from("/etc/hosts")
        );
        assert_eq!(
            resolve_path("relative/data.txt").unwrap(),
            PathBuf::from("relative/data.txt")
        );
        assert_eq!(resolve_path("/tmp/a").unwrap(), PathBuf::from("/tmp/a"));
        assert!(resolve_path("~no-such-user-for-loadtest/data").is_err());

        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(resolve_path("~").unwrap(), PathBuf::from(&home));
            assert_eq!(resolve_path("~/").unwrap(), PathBuf::from(&home));
            assert_eq!(
                resolve_path("~/data.json").unwrap(),
                PathBuf::from(&home).join("data.json")
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn other_user_home() {
        let root = nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(0))
            .unwrap()
            .expect("uid 0 has no user entry");
        let prefix = format!("~{}", root.name);
        assert_eq!(resolve_path(&prefix).unwrap(), root.dir);
        assert_eq!(resolve_path(&format!("{}/", prefix)).unwrap(), root.dir);
        assert_eq!(
            resolve_path(&format!("{}/data.json", prefix)).unwrap(),
            root.dir.join("data.json")
        );
    }

    #[test]
    fn valid_url() {
        assert!(is_valid_url("http://example.com").is_ok());
        assert!(is_valid_url("http://example.com/").is_ok());
        assert!(is_valid_url("https://www.example.com/and/with/path").is_ok());
        assert!(is_valid_url("http://foo").is_ok());
        assert!(is_valid_url("example.com").is_err());
        assert!(is_valid_url("www.example.com/and/with/path").is_err());
        assert!(is_valid_url("foo://example.com").is_err());
        assert!(is_valid_url("file:///path/to/file").is_err());
        assert!(is_valid_url("/path/to/file").is_err());
        assert!(is_valid_url("http://").is_err());
        assert!(is_valid_url("http:// example.com").is_err());
    }

    #[tokio::test]
    async fn timer() {
        let started = time::Instant::now();

        // 60 second timer has not expired.
        assert!(!timer_expired(started, 60));

        // Timer is disabled.
        assert!(!timer_expired(started, 0));

        tokio::time::sleep(time::Duration::from_secs(1)).await;

        // Timer is now expired.
        assert!(timer_expired(started, 1));
    }

    #[tokio::test]
    async fn interrupted_sleep() {
        let stop_signal = StopSignal::new();

        // A short sleep completes.
        assert!(sleep_unless_stopped(time::Duration::from_millis(10), &stop_signal).await);

        // A long sleep is abandoned once a stop is requested.
        let started = time::Instant::now();
        let sleeper = stop_signal.clone();
        let handle = tokio::spawn(async move {
            sleep_unless_stopped(time::Duration::from_secs(60), &sleeper).await
        });
        tokio::time::sleep(time::Duration::from_millis(100)).await;
        stop_signal.request_stop();
        assert!(!handle.await.unwrap());
        assert!(started.elapsed() < time::Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn release_only_own_signal() {
        let first = StopSignal::new();
        let second = StopSignal::new();

        setup_ctrlc_handler(&first);
        setup_ctrlc_handler(&second);
        // Releasing a signal that is no longer the target leaves the target alone.
        release_ctrlc_handler(&first);
        assert!(interrupt_target()
            .as_ref()
            .map_or(false, |target| target.same_signal(&second)));

        release_ctrlc_handler(&second);
        assert!(interrupt_target().is_none());
    }

    #[test]
    #[serial]
    fn ctrlc_routing() {
        let stop_signal = StopSignal::new();
        setup_ctrlc_handler(&stop_signal);

        // Routed to the running load test, repeatedly.
        assert!(route_ctrlc());
        assert!(stop_signal.is_stop_requested());
        assert!(route_ctrlc());
        assert!(stop_signal.is_stop_requested());

        // Once the load test is over there is nothing to route to, the handler exits.
        release_ctrlc_handler(&stop_signal);
        assert!(!route_ctrlc());
    }
}
