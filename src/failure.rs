//! The value a failing test unwinds with.

use std::fmt;

/// Text shown when a [`FailureRecord`] is displayed.
///
/// A record only reaches a place where it gets printed when nobody recovered
/// the unwinding test, which almost always means an assertion failed on a
/// thread the harness does not watch.
pub const FAILURE_PANIC_TEXT: &str = "
Your test failed.
failsignal panics to prevent subsequent assertions from running.
Normally the test harness rescues this panic so you shouldn't see it.
But, if you make an assertion in a spawned thread, the harness can't capture the panic.
To circumvent this, you should run
\tfailsignal::recover(|| { ... })
at the top of the thread that caused this panic.
";

/// Describes one test failure.
///
/// A failing test unwinds with a `FailureRecord` as its panic payload. The
/// record is built exactly once per failure, when the abort is triggered, and
/// cannot be changed afterwards. Recover it with [`recover`](crate::recover)
/// or by downcasting the payload from [`std::panic::catch_unwind`].
///
/// # Examples
///
/// ```rust
/// use failsignal::{Abort, Harness, UnwindFail, recover};
///
/// let harness = Harness::new().native_fail(UnwindFail);
/// let Err(Abort::Failure(record)) = recover(|| harness.fail("disk quota exceeded")) else {
///     panic!("expected a failure");
/// };
/// assert!(record.message().ends_with("disk quota exceeded"));
/// assert!(record.source_line() > 0);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    message: String,
    source_file: String,
    source_line: u32,
    full_stack_trace: String,
}

impl FailureRecord {
    pub(crate) fn new(
        message: String,
        source_file: String,
        source_line: u32,
        full_stack_trace: String,
    ) -> Self {
        Self {
            message,
            source_file,
            source_line,
            full_stack_trace,
        }
    }

    /// The failure message, prefixed with the time of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The file of the frame the failure is attributed to.
    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    /// The line in [`source_file`](Self::source_file), zero if unknown.
    pub fn source_line(&self) -> u32 {
        self.source_line
    }

    /// The pruned stack trace, starting at the frame the failure is
    /// attributed to.
    pub fn full_stack_trace(&self) -> &str {
        &self.full_stack_trace
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(FAILURE_PANIC_TEXT)
    }
}

impl std::error::Error for FailureRecord {}
