//! Prints one colored marker per completed request while a load test runs.

use std::io::{self, Write};
use std::thread;

use crate::outcome::{OutcomeCategory, OutcomeEvent};

/// Resets the terminal color.
pub const CLEAR: &str = "\x1b[0m";
const GREEN: &str = "\x1b[1;32m";
const RED: &str = "\x1b[1;31m";
const BLUE: &str = "\x1b[1;34m";

/// The terminal color used to display an outcome category.
pub fn color(category: OutcomeCategory) -> &'static str {
    match category {
        OutcomeCategory::Success => GREEN,
        OutcomeCategory::ClientError | OutcomeCategory::ServerError => RED,
        OutcomeCategory::Transport => BLUE,
    }
}

/// Write a `.` for each event, switching color only when the category color changes.
fn print_markers<W: Write>(
    receiver: flume::Receiver<OutcomeEvent>,
    mut out: W,
) -> io::Result<()> {
    let mut current_color = "";
    // Ends once every sender is dropped and the queue is drained.
    for event in receiver.iter() {
        let event_color = color(event.category);
        if event_color != current_color {
            out.write_all(event_color.as_bytes())?;
            current_color = event_color;
        }
        out.write_all(b".")?;
        out.flush()?;
    }
    write!(out, "{}", CLEAR)?;
    writeln!(out)?;
    out.flush()
}

/// Progress output running on its own thread, so terminal writes never slow down the
/// workers.
///
/// # Example
/// ```rust,no_run
/// use loadtest::config::LoadTestConfig;
/// use loadtest::progress::ProgressPrinter;
/// use loadtest::LoadTest;
///
/// let (sender, receiver) = flume::unbounded();
/// let printer = ProgressPrinter::spawn(receiver);
/// let report = LoadTest::new(LoadTestConfig::new("http://dev.local/"))
///     .with_progress(sender)
///     .execute();
/// printer.finish();
/// ```
pub struct ProgressPrinter {
    handle: thread::JoinHandle<io::Result<()>>,
}
impl ProgressPrinter {
    /// Start printing markers for the events sent to `receiver`.
    pub fn spawn(receiver: flume::Receiver<OutcomeEvent>) -> Self {
        let handle = thread::spawn(move || print_markers(receiver, io::stdout()));
        ProgressPrinter { handle }
    }

    /// Wait for all remaining markers to be printed, then reset the color and end the
    /// line. Returns once every sender has been dropped.
    pub fn finish(self) {
        match self.handle.join() {
            Ok(Ok(())) => (),
            Ok(Err(e)) => debug!("failed to write progress: {}", e),
            Err(_) => warn!("progress printer panicked"),
        }
    }
}
