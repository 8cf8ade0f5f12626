//! Recovery points: telling harness failures apart from crashes.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use crate::FailureRecord;

/// Why a recovered closure did not return normally.
pub enum Abort {
    /// The closure failed through failsignal. This is an expected test
    /// failure.
    Failure(FailureRecord),
    /// The closure panicked for any other reason. The original payload is
    /// kept so it can be resumed with [`Abort::resume`].
    Crash(Box<dyn Any + Send>),
}

impl Abort {
    /// Classifies a panic payload.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        match payload.downcast::<FailureRecord>() {
            Ok(record) => Abort::Failure(*record),
            Err(payload) => Abort::Crash(payload),
        }
    }

    /// Whether this is a harness-issued failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Abort::Failure(_))
    }

    /// The failure record, if this is a harness-issued failure.
    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            Abort::Failure(record) => Some(record),
            Abort::Crash(_) => None,
        }
    }

    /// Converts into the failure record, if this is a harness-issued
    /// failure.
    pub fn into_failure(self) -> Option<FailureRecord> {
        match self {
            Abort::Failure(record) => Some(record),
            Abort::Crash(_) => None,
        }
    }

    /// The panic message of a crash, when the payload is a string.
    pub fn crash_message(&self) -> Option<&str> {
        let Abort::Crash(payload) = self else {
            return None;
        };
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            Some(message)
        } else {
            payload.downcast_ref::<String>().map(String::as_str)
        }
    }

    /// Continues unwinding with the original payload.
    pub fn resume(self) -> ! {
        match self {
            Abort::Failure(record) => panic::resume_unwind(Box::new(record)),
            Abort::Crash(payload) => panic::resume_unwind(payload),
        }
    }
}

impl fmt::Debug for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::Failure(record) => f.debug_tuple("Failure").field(record).finish(),
            Abort::Crash(_) => f
                .debug_tuple("Crash")
                .field(&self.crash_message().unwrap_or("Box<dyn Any>"))
                .finish(),
        }
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Abort::Failure(record) => write!(
                f,
                "{} [{}:{}]",
                record.message(),
                record.source_file(),
                record.source_line()
            ),
            Abort::Crash(_) => f.write_str(self.crash_message().unwrap_or("Box<dyn Any>")),
        }
    }
}

impl std::error::Error for Abort {}

/// Runs `f`, catching any unwind it causes.
///
/// This is the recovery point a runner puts around each test, and the one a
/// test must put at the top of every thread it spawns: a failure raised on a
/// thread nobody recovers is an ordinary panic of that thread.
///
/// # Examples
///
/// ```rust
/// use std::{sync::Arc, thread};
///
/// use failsignal::{Abort, Harness, UnwindFail, recover};
///
/// let harness = Arc::new(Harness::new().native_fail(UnwindFail));
/// let worker = {
///     let harness = Arc::clone(&harness);
///     thread::spawn(move || {
///         recover(|| {
///             harness.fail("replica never became ready");
///         })
///     })
/// };
///
/// match worker.join().expect("recover caught the unwind") {
///     Err(Abort::Failure(record)) => println!("worker failed: {}", record.message()),
///     Err(crash) => crash.resume(),
///     Ok(()) => {}
/// }
/// ```
pub fn recover<T>(f: impl FnOnce() -> T) -> Result<T, Abort> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Abort::from_payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FailureRecord {
        FailureRecord::new(
            "Oct 16 23:04:05.123: boom".to_owned(),
            "/src/check.rs".to_owned(),
            3,
            String::new(),
        )
    }

    fn abort_with(payload: Box<dyn Any + Send>) -> Abort {
        recover(|| -> () { panic::resume_unwind(payload) }).unwrap_err()
    }

    #[test]
    fn test_abort_send() {
        static_assertions::assert_impl_all!(Abort: Send, std::error::Error);
        static_assertions::assert_not_impl_any!(Abort: Sync, Clone);
    }

    #[test]
    fn test_recover_passes_values_through() {
        assert_eq!(recover(|| 40 + 2).unwrap(), 42);
    }

    #[test]
    fn test_recover_classifies_failure_records() {
        let abort = abort_with(Box::new(record()));

        assert!(abort.is_failure());
        assert_eq!(abort.failure(), Some(&record()));
        assert_eq!(abort.crash_message(), None);
        assert_eq!(
            abort.to_string(),
            "Oct 16 23:04:05.123: boom [/src/check.rs:3]"
        );
        assert_eq!(abort.into_failure(), Some(record()));
    }

    #[test]
    fn test_recover_classifies_crashes() {
        let abort = abort_with(Box::new("static message"));
        assert!(!abort.is_failure());
        assert_eq!(abort.crash_message(), Some("static message"));

        let abort = abort_with(Box::new(format!("formatted {}", 1)));
        assert_eq!(abort.to_string(), "formatted 1");

        let abort = abort_with(Box::new(17_u8));
        assert_eq!(abort.crash_message(), None);
        assert_eq!(format!("{abort:?}"), "Crash(\"Box<dyn Any>\")");
        assert_eq!(abort.into_failure(), None);
    }

    #[test]
    fn test_resume_keeps_payload() {
        let abort = abort_with(Box::new(record()));
        let again = recover(|| -> () { abort.resume() }).unwrap_err();
        assert_eq!(again.into_failure(), Some(record()));

        let crash = abort_with(Box::new(5_i32));
        let Abort::Crash(payload) = recover(|| -> () { crash.resume() }).unwrap_err() else {
            panic!("crash became a failure");
        };
        assert_eq!(payload.downcast_ref::<i32>(), Some(&5));
    }
}
