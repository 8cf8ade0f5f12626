#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Routes failsignal harness logs through `tracing`.
//!
//! Harnesses that already run a `tracing` subscriber stack usually want test
//! progress and failures to end up in the same place as everything else.
//! [`TracingSink`] is a [`LogSink`] that turns every harness record into a
//! `tracing` event with target `failsignal`:
//!
//! | record level | event level |
//! |--------------|-------------|
//! | `INFO`       | `INFO`      |
//! | `FAIL`       | `ERROR`     |
//!
//! The record's own timestamp is kept as the `timestamp` field, so it stays
//! identical to the one in the [`FailureRecord`](failsignal::FailureRecord)
//! message even when the subscriber adds its own.
//!
//! # Quick Start
//!
//! ```
//! use failsignal::Harness;
//! use failsignal_tracing::TracingSink;
//!
//! tracing_subscriber::fmt().init();
//!
//! Harness::new()
//!     .sink(TracingSink)
//!     .install()
//!     .expect("failed to install harness");
//!
//! failsignal::log_info!("suite started");
//! ```
//!
//! Events are emitted inside whatever span is current on the logging thread,
//! so `#[tracing::instrument]` on test helpers shows up around failures too.

use failsignal::{Level, LogRecord, LogSink};

/// A [`LogSink`] that emits records as `tracing` events.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_record(&self, record: &LogRecord) {
        match record.level() {
            Level::Info => tracing::info!(
                target: "failsignal",
                timestamp = record.timestamp(),
                "{}",
                record.message()
            ),
            Level::Fail => tracing::error!(
                target: "failsignal",
                timestamp = record.timestamp(),
                "{}",
                record.message()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_send_sync() {
        static_assertions::assert_impl_all!(TracingSink: LogSink, Send, Sync, Copy);
    }

    #[test]
    fn test_without_subscriber_is_a_no_op() {
        TracingSink.write_record(&LogRecord::new(
            "Oct 16 23:04:05.123",
            Level::Fail,
            "nobody listens",
        ));
    }
}
