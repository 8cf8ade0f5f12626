//! Harness configuration and the process-wide harness.
//!
//! A [`Harness`] bundles the three things the failure path depends on: the
//! [`LogSink`] records go to, the hosting runner's failure primitive
//! ([`NativeFail`]) and the [`FrameFilter`] that hides runner frames from
//! traces.
//!
//! Tests and embedders usually build their own harness and call its methods
//! directly. The free functions ([`failf`](fn@crate::failf),
//! [`log_info`](fn@crate::log_info), ...) use the process-wide harness, which is
//! configured once at startup with [`Harness::install`] or falls back to the
//! defaults on first use.
//!
//! ```rust
//! use failsignal::{FrameFilter, Harness, StderrSink};
//!
//! Harness::new()
//!     .sink(StderrSink)
//!     .frame_filter(FrameFilter::new(r"/e2e-runner/src/").expect("valid pattern"))
//!     .install()
//!     .expect("failed to install harness");
//!
//! failsignal::log_info!("suite started with {} workers", 4);
//! ```

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use failsignal_backtrace::FrameFilter;

use crate::{
    logger::{LogSink, StdoutSink},
    signal::{NativeFail, PanicFail},
};

static GLOBAL_HARNESS: OnceLock<Harness> = OnceLock::new();

/// Configuration of the failure path.
///
/// # Defaults
///
/// - sink: [`StdoutSink`]
/// - native failure primitive: [`PanicFail`]
/// - frame filter: [`FrameFilter::from_env`]
pub struct Harness {
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) native_fail: Box<dyn NativeFail>,
    pub(crate) frame_filter: FrameFilter,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("frame_filter", &self.frame_filter)
            .finish_non_exhaustive()
    }
}

/// Error returned when a process-wide harness is already in place.
///
/// Contains the harness that was attempted to be installed.
pub struct HarnessAlreadyInstalledError(pub Harness);

impl fmt::Debug for HarnessAlreadyInstalledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessAlreadyInstalledError").finish()
    }
}

impl fmt::Display for HarnessAlreadyInstalledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a failsignal harness is already installed for this process")
    }
}

impl std::error::Error for HarnessAlreadyInstalledError {}

impl Harness {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self {
            sink: Arc::new(StdoutSink),
            native_fail: Box::new(PanicFail),
            frame_filter: FrameFilter::from_env(),
        }
    }

    /// Sets where log records are written.
    pub fn sink(mut self, sink: impl LogSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Sets the hosting runner's failure primitive.
    pub fn native_fail(mut self, native_fail: impl NativeFail) -> Self {
        self.native_fail = Box::new(native_fail);
        self
    }

    /// Sets which frames count as runner internals.
    pub fn frame_filter(mut self, frame_filter: FrameFilter) -> Self {
        self.frame_filter = frame_filter;
        self
    }

    /// The frame filter traces are pruned with.
    pub fn filter(&self) -> &FrameFilter {
        &self.frame_filter
    }

    /// Makes this the process-wide harness.
    ///
    /// Must happen before the first use of the process-wide harness; once
    /// one is in place it is never replaced.
    pub fn install(self) -> Result<(), HarnessAlreadyInstalledError> {
        GLOBAL_HARNESS
            .set(self)
            .map_err(HarnessAlreadyInstalledError)
    }

    /// The process-wide harness, created with the defaults if none was
    /// installed.
    pub fn global() -> &'static Harness {
        GLOBAL_HARNESS.get_or_init(Harness::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySink, UnwindFail};

    #[test]
    fn test_harness_send_sync() {
        static_assertions::assert_impl_all!(Harness: Send, Sync, Default);
        static_assertions::assert_not_impl_any!(Harness: Clone);
    }

    #[test]
    fn test_builder_sets_filter() {
        let harness = Harness::new()
            .sink(MemorySink::new())
            .native_fail(UnwindFail)
            .frame_filter(FrameFilter::none());
        assert_eq!(harness.filter().pattern(), None);

        let harness = harness.frame_filter(FrameFilter::runner_default());
        assert_eq!(
            harness.filter().pattern(),
            Some(FrameFilter::DEFAULT_RUNNER_PATTERN)
        );
    }

    #[test]
    fn test_debug_hides_trait_objects() {
        let debug = format!("{:?}", Harness::new().frame_filter(FrameFilter::none()));
        assert!(debug.starts_with("Harness { frame_filter: "));
        assert!(debug.ends_with(".. }"));
    }

    #[test]
    fn test_already_installed_error() {
        let error = HarnessAlreadyInstalledError(Harness::new());
        assert_eq!(
            error.to_string(),
            "a failsignal harness is already installed for this process"
        );
        assert_eq!(format!("{error:?}"), "HarnessAlreadyInstalledError");
    }
}
