//! Timestamped, leveled log records and the sinks they are written to.
//!
//! Every record is a single line of the form
//!
//! ```text
//! Oct 16 23:04:05.123: INFO: connecting to the test cluster
//! ```
//!
//! Failure records (level `FAIL`) carry a multi-line message: the failure
//! text, a blank line, a `Full Stack Trace` header and the pruned trace.
//!
//! Where the records end up is decided by the [`LogSink`] of the
//! [`Harness`]. The default [`StdoutSink`] goes through `println!`, so libtest
//! captures the output and only shows it for failing tests.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use crate::Harness;

/// [`chrono`] format of record timestamps: `Oct 16 23:04:05.123`.
pub const STAMP_FORMAT: &str = "%b %d %H:%M:%S%.3f";

/// The current local wall-clock time in [`STAMP_FORMAT`].
pub fn now_stamp() -> String {
    chrono::Local::now().format(STAMP_FORMAT).to_string()
}

/// Severity of a [`LogRecord`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    /// Informational progress output, rendered as `INFO`.
    Info,
    /// A test failure, rendered as `FAIL`.
    Fail,
}

impl Level {
    /// The label written into the record line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One formatted log record.
///
/// The [`Display`](fmt::Display) implementation renders the record line
/// without a trailing newline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    timestamp: String,
    level: Level,
    message: String,
}

impl LogRecord {
    /// Creates a record from its parts.
    pub fn new(timestamp: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            level,
            message: message.into(),
        }
    }

    /// The timestamp, in [`STAMP_FORMAT`] for records built by the harness.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// The level of the record.
    pub fn level(&self) -> Level {
        self.level
    }

    /// The formatted message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.timestamp, self.level, self.message)
    }
}

/// Destination for log records.
///
/// A sink is shared by every thread that logs through a [`Harness`], so it
/// must write each record atomically; the harness does no locking of its own.
/// Write failures are the sink's business and are not reported back.
///
/// # Examples
///
/// ```rust
/// use failsignal::{Harness, LogRecord, LogSink};
///
/// struct Prefixed;
///
/// impl LogSink for Prefixed {
///     fn write_record(&self, record: &LogRecord) {
///         eprintln!("[e2e] {record}");
///     }
/// }
///
/// let harness = Harness::new().sink(Prefixed);
/// harness.log_info(format_args!("cluster has {} nodes", 3));
/// ```
pub trait LogSink: Send + Sync + 'static {
    /// Writes one record.
    fn write_record(&self, record: &LogRecord);
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn write_record(&self, record: &LogRecord) {
        (**self).write_record(record);
    }
}

/// Writes records to standard output with `println!`.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_record(&self, record: &LogRecord) {
        println!("{record}");
    }
}

/// Writes records to standard error with `eprintln!`.
#[derive(Copy, Clone, Debug, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_record(&self, record: &LogRecord) {
        eprintln!("{record}");
    }
}

/// Keeps rendered records in memory.
///
/// Useful for asserting on harness output and for embedding the harness in a
/// runner that reports output itself.
///
/// ```rust
/// use std::sync::Arc;
///
/// use failsignal::{Harness, MemorySink};
///
/// let sink = Arc::new(MemorySink::new());
/// let harness = Harness::new().sink(Arc::clone(&sink));
/// harness.log_info(format_args!("n={}", 5));
///
/// assert!(sink.lines()[0].ends_with(": INFO: n=5"));
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub const fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    /// The rendered records written so far, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All records joined with newlines.
    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }

    /// Removes and returns the records written so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl LogSink for MemorySink {
    fn write_record(&self, record: &LogRecord) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.to_string());
    }
}

impl Harness {
    /// Formats a record at `level` with the current time and writes it to
    /// the harness sink.
    pub fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = LogRecord::new(now_stamp(), level, args.to_string());
        self.sink.write_record(&record);
    }

    /// Logs an `INFO` record. See also the [`log_info!`](crate::log_info!)
    /// macro.
    pub fn log_info(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Info, args);
    }

    pub(crate) fn log_failure(&self, message: &str, trace: &str) {
        self.emit(
            Level::Fail,
            format_args!("{message}\n\nFull Stack Trace\n{trace}"),
        );
    }
}

/// Logs an `INFO` record through the process-wide [`Harness`].
pub fn log_info(args: fmt::Arguments<'_>) {
    Harness::global().log_info(args);
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_SHAPE: &str = r"^\S+\s\S+\s\d+:\d+:\d+\.\d+: INFO: n=5$";

    fn harness_with_memory() -> (Harness, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Harness::new().sink(Arc::clone(&sink)), sink)
    }

    #[test]
    fn test_sinks_send_sync() {
        static_assertions::assert_impl_all!(MemorySink: Send, Sync);
        static_assertions::assert_impl_all!(LogRecord: Send, Sync, Clone);
        static_assertions::assert_impl_all!(Arc<dyn LogSink>: LogSink);
    }

    #[test]
    fn test_level_labels() {
        assert_eq!(Level::Info.to_string(), "INFO");
        assert_eq!(Level::Fail.as_str(), "FAIL");
    }

    #[test]
    fn test_record_display() {
        let record = LogRecord::new("Jan 02 15:04:05.000", Level::Info, "hello");
        assert_eq!(record.to_string(), "Jan 02 15:04:05.000: INFO: hello");
        assert_eq!(record.level(), Level::Info);
        assert_eq!(record.message(), "hello");
        assert_eq!(record.timestamp(), "Jan 02 15:04:05.000");
    }

    #[test]
    fn test_stamp_shape() {
        let stamp_shape = regex::Regex::new(r"^[A-Z][a-z]{2} \d{2} \d{2}:\d{2}:\d{2}\.\d{3}$").unwrap();
        let stamp = now_stamp();
        assert!(stamp_shape.is_match(&stamp), "{stamp}");
    }

    #[test]
    fn test_log_info_line() {
        let (harness, sink) = harness_with_memory();
        harness.log_info(format_args!("n={}", 5));

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].lines().count(), 1);
        assert!(
            regex::Regex::new(LINE_SHAPE).unwrap().is_match(&lines[0]),
            "{}",
            lines[0]
        );
    }

    #[test]
    fn test_failure_record_layout() {
        let (harness, sink) = harness_with_memory();
        harness.log_failure("boom", "app::check\n\t/src/check.rs:4");

        let contents = sink.contents();
        let (_, rest) = contents.split_once(": FAIL: ").unwrap();
        assert_eq!(rest, "boom\n\nFull Stack Trace\napp::check\n\t/src/check.rs:4");
    }

    #[test]
    fn test_memory_sink_take() {
        let (harness, sink) = harness_with_memory();
        harness.log_info(format_args!("one"));
        harness.log_info(format_args!("two"));

        assert_eq!(sink.take().len(), 2);
        assert!(sink.lines().is_empty());
        assert_eq!(sink.contents(), "");
    }
}
