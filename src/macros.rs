/// Fails the current test with a formatted message through the process-wide
/// harness.
///
/// Logs the message at `FAIL` level with a trace starting at the code that
/// invoked the macro, then unwinds with a
/// [`FailureRecord`](crate::FailureRecord). Never returns.
///
/// # Examples
///
/// ```rust
/// use failsignal::{Abort, failf, recover};
///
/// let replicas = 2;
/// let outcome: Result<(), Abort> = recover(|| {
///     if replicas < 3 {
///         failf!("expected 3 replicas, got {replicas}");
///     }
/// });
/// assert!(outcome.unwrap_err().is_failure());
/// ```
#[macro_export]
macro_rules! failf {
    ($($arg:tt)*) => {
        $crate::failf(::core::format_args!($($arg)*))
    };
}

/// Logs an `INFO` record through the process-wide harness.
///
/// # Examples
///
/// ```rust
/// failsignal::log_info!("waiting up to {}s for {} pods", 30, 3);
/// ```
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log_info(::core::format_args!($($arg)*))
    };
}
