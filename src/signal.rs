//! Failing a test: logging the failure and unwinding with a
//! [`FailureRecord`].
//!
//! # The abort protocol
//!
//! Every failure goes through the same steps:
//!
//! 1. the message is formatted;
//! 2. it is logged at `FAIL` level together with a pruned trace that starts
//!    at the caller of the failing entry point;
//! 3. a [`FailureRecord`] is built from the message, the source location of
//!    the frame the failure is attributed to and a fresh pruned trace;
//! 4. the hosting runner's own failure primitive ([`NativeFail`]) is invoked
//!    inside a recovery point;
//! 5. when that primitive unwinds, its payload is dropped and the unwind is
//!    resumed with the [`FailureRecord`] instead.
//!
//! Runners therefore abort tests exactly the way they always do, but whoever
//! recovers the unwind gets a typed record with a source location and a trace
//! rather than whatever opaque payload the runner uses.
//!
//! # Skip depths
//!
//! A skip of zero attributes the failure to the code that called the failing
//! entry point. Assertion helpers that call [`fail_skipping`] pass the number
//! of helper frames between themselves and the code that should be blamed.
//! Functions on the failure path are `#[inline(never)]`, and none of them
//! calls the next one in tail position, so the frame counts hold in optimized
//! builds too.
//!
//! Without debug info the attributed frame has no file or line. The failure
//! is then attributed to the `#[track_caller]` location of the entry point's
//! caller, ignoring any extra skip.

use std::{
    fmt,
    hint::black_box,
    panic::{self, AssertUnwindSafe, Location},
};

use failsignal_backtrace::{CallerLocation, caller_location, capture_trace_with_filter};

use crate::{FailureRecord, Harness, logger::now_stamp};

/// The hosting runner's failure primitive.
///
/// Implementations must unwind: failsignal intercepts that unwind and
/// replaces its payload with a [`FailureRecord`]. `skip` is the number of
/// frames between the primitive and the frame the failure is attributed to,
/// for runners that do their own location lookup.
///
/// Any `Fn(&str, usize)` closure is a `NativeFail`.
///
/// # Examples
///
/// ```rust
/// use failsignal::Harness;
///
/// fn my_runner_fail(message: &str, _skip: usize) {
///     std::panic::panic_any(format!("[my-runner] {message}"))
/// }
///
/// let harness = Harness::new().native_fail(my_runner_fail);
/// ```
pub trait NativeFail: Send + Sync + 'static {
    /// Fails the current test. Must not return.
    fn fail(&self, message: &str, skip: usize);
}

impl<F> NativeFail for F
where
    F: Fn(&str, usize) + Send + Sync + 'static,
{
    fn fail(&self, message: &str, skip: usize) {
        self(message, skip);
    }
}

/// Fails like a libtest assertion: panics with the message as a `String`, so
/// the panic hook reports it the usual way.
///
/// This is the default primitive.
#[derive(Copy, Clone, Debug, Default)]
pub struct PanicFail;

impl NativeFail for PanicFail {
    fn fail(&self, message: &str, _skip: usize) {
        panic::panic_any(message.to_owned());
    }
}

/// Unwinds with a [`NativeFailure`] without running the panic hook, so
/// nothing is printed for the native step.
#[derive(Copy, Clone, Debug, Default)]
pub struct UnwindFail;

impl NativeFail for UnwindFail {
    fn fail(&self, message: &str, skip: usize) {
        panic::resume_unwind(Box::new(NativeFailure {
            message: message.to_owned(),
            skip,
        }));
    }
}

/// Payload of [`UnwindFail`]. Never seen outside the abort protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeFailure {
    /// The message given to the primitive.
    pub message: String,
    /// The skip given to the primitive.
    pub skip: usize,
}

impl Harness {
    /// Fails the current test with a formatted message.
    ///
    /// Logs the message at `FAIL` level with a trace starting at the caller,
    /// then unwinds with a [`FailureRecord`] attributed to the caller. See
    /// also the [`failf!`](crate::failf!) macro.
    #[inline(never)]
    #[track_caller]
    pub fn failf(&self, args: fmt::Arguments<'_>) -> ! {
        self.failf_at(args, 2)
    }

    /// Fails the current test with a preformatted message.
    ///
    /// Behaves like [`failf`](Self::failf), except that it returns if the
    /// native primitive breaks its contract and returns.
    #[inline(never)]
    #[track_caller]
    pub fn fail(&self, message: &str) {
        self.fail_at(message, 2);
        black_box(());
    }

    /// Like [`fail`](Self::fail), but attributes the failure `caller_skip`
    /// frames further up the stack.
    ///
    /// An assertion helper called by the test body passes `1` to blame the
    /// test body rather than itself.
    #[inline(never)]
    #[track_caller]
    pub fn fail_skipping(&self, message: &str, caller_skip: usize) {
        self.fail_at(message, 2 + caller_skip);
        black_box(());
    }

    /// Captures a trace with this harness's frame filter, starting at the
    /// caller when `skip` is zero.
    #[inline(never)]
    pub fn capture_trace(&self, skip: usize) -> String {
        let trace = capture_trace_with_filter(skip + 1, &self.frame_filter);
        black_box(trace)
    }

    // `skip` counts from here: zero is `failf_at` itself.
    #[inline(never)]
    #[track_caller]
    pub(crate) fn failf_at(&self, args: fmt::Arguments<'_>, skip: usize) -> ! {
        let message = args.to_string();
        self.log_failure(
            &message,
            &capture_trace_with_filter(skip, &self.frame_filter),
        );
        self.trigger_abort(&format!("{}: {message}", now_stamp()), skip);
        unreachable!("the native failure primitive returned instead of unwinding")
    }

    #[inline(never)]
    #[track_caller]
    pub(crate) fn fail_at(&self, message: &str, skip: usize) {
        self.log_failure(
            message,
            &capture_trace_with_filter(skip, &self.frame_filter),
        );
        self.trigger_abort(&format!("{}: {message}", now_stamp()), skip);
        black_box(());
    }

    /// Builds the [`FailureRecord`] and aborts through the native primitive.
    ///
    /// `caller_skip` counts frames above the caller of this function. Returns
    /// only if the native primitive returns.
    #[inline(never)]
    #[track_caller]
    pub(crate) fn trigger_abort(&self, message: &str, caller_skip: usize) {
        let skip = 1 + caller_skip;

        let (source_file, source_line) =
            attributed_location(caller_location(skip), Location::caller());
        let record = FailureRecord::new(
            message.to_owned(),
            source_file,
            source_line,
            capture_trace_with_filter(skip, &self.frame_filter),
        );
        tracing::trace!(
            source_file = record.source_file(),
            source_line = record.source_line(),
            "built failure record"
        );

        let native = panic::catch_unwind(AssertUnwindSafe(|| {
            self.native_fail.fail(message, skip);
        }));

        if let Err(native_payload) = native {
            tracing::debug!("replacing native failure payload with failure record");
            drop(native_payload);
            panic::resume_unwind(Box::new(record));
        }

        tracing::debug!("native failure primitive returned without unwinding");
    }
}

fn attributed_location(
    resolved: Option<CallerLocation>,
    fallback: &Location<'_>,
) -> (String, u32) {
    match resolved {
        Some(location) => (location.file, location.line),
        None => (fallback.file().to_owned(), fallback.line()),
    }
}

/// Fails the current test through the process-wide [`Harness`].
///
/// See [`Harness::failf`] and the [`failf!`](crate::failf!) macro.
#[inline(never)]
#[track_caller]
pub fn failf(args: fmt::Arguments<'_>) -> ! {
    Harness::global().failf_at(args, 2)
}

/// Fails the current test through the process-wide [`Harness`].
///
/// See [`Harness::fail`].
#[inline(never)]
#[track_caller]
pub fn fail(message: &str) {
    Harness::global().fail_at(message, 2);
    black_box(());
}

/// Fails the current test through the process-wide [`Harness`], attributing
/// the failure `caller_skip` frames above the caller.
///
/// See [`Harness::fail_skipping`].
#[inline(never)]
#[track_caller]
pub fn fail_skipping(message: &str, caller_skip: usize) {
    Harness::global().fail_at(message, 2 + caller_skip);
    black_box(());
}

/// Captures a trace of the current thread with the frame filter of the
/// process-wide [`Harness`].
///
/// With `skip == 0` the trace starts at the direct caller of this function.
#[inline(never)]
pub fn capture_trace(skip: usize) -> String {
    let trace = Harness::global().capture_trace(skip + 1);
    black_box(trace)
}
