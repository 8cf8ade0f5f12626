#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! The failure-signaling core of a test harness.
//!
//! Once an assertion has decided that a test failed, failsignal takes over:
//!
//! - it writes a timestamped `FAIL` record to the harness log, with a stack
//!   trace that starts at the failing code and leaves out the frames of the
//!   harness and of the test runner;
//! - it aborts the test by unwinding with a [`FailureRecord`] carrying the
//!   message, the source location the failure is attributed to and the
//!   trace.
//!
//! The unwind goes through the hosting runner's own failure primitive, so
//! runners abort tests the way they always do. Whoever recovers the unwind
//! (the runner, or a test guarding a spawned thread with [`recover`]) can tell
//! an expected, harness-issued failure from an unrelated crash.
//!
//! ## Quick Example
//!
//! ```
//! use failsignal::{Abort, failf, log_info, recover};
//!
//! fn check_pods(ready: usize, wanted: usize) {
//!     log_info!("{ready}/{wanted} pods ready");
//!     if ready < wanted {
//!         failf!("only {ready} of {wanted} pods became ready");
//!     }
//! }
//!
//! match recover(|| check_pods(2, 3)) {
//!     Err(Abort::Failure(record)) => {
//!         println!(
//!             "{} at {}:{}",
//!             record.message(),
//!             record.source_file(),
//!             record.source_line()
//!         );
//!         println!("{}", record.full_stack_trace());
//!     }
//!     Err(crash) => crash.resume(),
//!     Ok(()) => unreachable!(),
//! }
//! ```
//!
//! ## Pieces
//!
//! - [`Harness`] - the sink, native failure primitive and frame filter the
//!   failure path uses; either injected or installed process-wide.
//! - [`failf!`], [`fail`], [`fail_skipping`] - fail the current test.
//! - [`log_info!`] - informational records in the same log.
//! - [`recover`] and [`Abort`] - recovery points for runners and threads.
//! - [`capture_trace`] and [`FrameFilter`] - pruned traces, built on the
//!   [`failsignal-backtrace`] crate.
//!
//! [`failsignal-backtrace`]: failsignal_backtrace
//!
//! ## Threads
//!
//! A failure unwinds only the thread it was raised on. A test that asserts
//! from a thread it spawned must run that thread's body inside [`recover`]
//! and hand the outcome back; otherwise the thread simply dies with a
//! [`FailureRecord`] payload, whose `Display` explains exactly that.

mod failure;
mod harness;
pub mod logger;
mod macros;
mod recovery;
pub mod signal;

pub use failsignal_backtrace::{CallerLocation, Frame, FrameFilter, frames};

pub use self::{
    failure::{FAILURE_PANIC_TEXT, FailureRecord},
    harness::{Harness, HarnessAlreadyInstalledError},
    logger::{Level, LogRecord, LogSink, MemorySink, StderrSink, StdoutSink, log_info},
    recovery::{Abort, recover},
    signal::{
        NativeFail, NativeFailure, PanicFail, UnwindFail, capture_trace, fail, fail_skipping,
        failf,
    },
};
