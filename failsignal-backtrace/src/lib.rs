#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Pruned stack traces for the failsignal test harness core.
//!
//! This crate captures the call stack of the current thread as text and
//! removes the frames nobody wants to read in a test failure: the frames of
//! the capture machinery itself, a caller-chosen number of plumbing frames,
//! and the frames that belong to the test runner.
//!
//! # Quick Start
//!
//! ```rust
//! use failsignal_backtrace::{capture_trace, frames};
//!
//! fn assertion_helper() -> String {
//!     // Skip this helper, start the trace at whoever called it.
//!     capture_trace(1)
//! }
//!
//! let trace = assertion_helper();
//! for frame in frames(&trace) {
//!     println!("{} at {}:{:?}", frame.short_name(), frame.file, frame.line);
//! }
//! ```
//!
//! # Trace format
//!
//! A raw stack (see [`capture_raw_stack`]) is a header line followed by one
//! pair of lines per frame, innermost frame first:
//!
//! ```text
//! thread 'tests::login' [running]:
//! failsignal_backtrace::capture_raw_stack
//! 	/build/failsignal-backtrace/src/lib.rs:137
//! my_suite::login::check_password
//! 	/build/tests/login.rs:42
//! ```
//!
//! A pruned trace has the same shape without the header. Filtering always
//! removes whole pairs.
//!
//! # Environment Variables
//!
//! - `RUST_BACKTRACE=full` - Disables runner frame filtering
//! - `FAILSIGNAL_BACKTRACE` - Comma-separated options:
//!   - `unfiltered` - Keep runner frames in traces
//!   - `filtered` - Filter runner frames even if `RUST_BACKTRACE=full`
//!
//! # Debugging symbols in release builds
//!
//! Traces and caller locations are only as good as the debug information in
//! the binary. Test profiles have it by default; for release builds enable it
//! in your `Cargo.toml`:
//!
//! ```toml
//! [profile.release]
//! strip = false
//! debug = "line-tables-only"
//! ```

use std::{fmt::Write as _, hint::black_box, sync::OnceLock, thread};

/// Number of frames the capture machinery contributes to a raw stack when it
/// is called through [`capture_trace_with_filter`] or [`caller_location`]:
/// [`capture_raw_stack`] itself plus the entry point that called it.
///
/// With a `skip` of zero, dropping this many frames leaves the direct caller
/// of the entry point at the top of the trace.
pub const CAPTURE_FRAMES: usize = 2;

const THREAD_HEADER_PREFIX: &str = "thread ";

const UNKNOWN_FILE: &str = "??";

const RAW_STACK_SYMBOL: &str = concat!(module_path!(), "::capture_raw_stack");

/// Source location of a frame on the current call stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerLocation {
    /// Source file as recorded in the debug information.
    pub file: String,
    /// Line in [`file`](Self::file).
    pub line: u32,
}

/// One frame of a textual trace, borrowed from the trace it was parsed from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    /// The demangled function path, e.g. `my_suite::login::check_password`.
    pub function: &'a str,
    /// The source file of the frame, or `??` if unknown.
    pub file: &'a str,
    /// The line within [`file`](Self::file), if known.
    pub line: Option<u32>,
}

impl<'a> Frame<'a> {
    /// The file and line of the frame, if both are known.
    pub fn location(&self) -> Option<CallerLocation> {
        match (self.file, self.line) {
            (UNKNOWN_FILE, _) | (_, None) => None,
            (file, Some(line)) => Some(CallerLocation {
                file: file.to_owned(),
                line,
            }),
        }
    }

    fn parse(function: &'a str, location: &'a str) -> Self {
        let location = location.strip_prefix('\t').unwrap_or(location);
        let (file, line) = match location
            .rsplit_once(':')
            .map(|(file, line)| (file, line.parse::<u32>()))
        {
            Some((file, Ok(line))) => (file, Some(line)),
            _ => (location, None),
        };

        Frame {
            function,
            file,
            line,
        }
    }

    /// The last path segment of the function, without trailing generic
    /// arguments.
    ///
    /// `<my_suite::Db as Store>::get::<u8>` becomes `get`, and a closure
    /// frame becomes `{{closure}}`. Names that are already short, as debug
    /// info reports them for inlined frames, are kept apart from their
    /// generic arguments: `trace_unsynchronized<F>` becomes
    /// `trace_unsynchronized`.
    pub fn short_name(&self) -> &'a str {
        last_path_segment(strip_generic_suffix(self.function))
    }
}

// `->` in a fn pointer type is not a closing angle bracket.
fn closes_angle(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'>' && (i == 0 || bytes[i - 1] != b'-')
}

fn strip_generic_suffix(function: &str) -> &str {
    let bytes = function.as_bytes();
    if bytes.is_empty() || !closes_angle(bytes, bytes.len() - 1) {
        return function;
    }

    let mut depth = 0usize;
    for i in (0..bytes.len()).rev() {
        if closes_angle(bytes, i) {
            depth += 1;
        } else if bytes[i] == b'<' {
            depth -= 1;
            if depth == 0 {
                let head = &function[..i];
                let head = head.strip_suffix("::").unwrap_or(head);
                return if head.is_empty() { function } else { head };
            }
        }
    }
    function
}

fn last_path_segment(path: &str) -> &str {
    let bytes = path.as_bytes();
    let mut depth = 0usize;
    for i in (1..bytes.len()).rev() {
        if closes_angle(bytes, i) {
            depth += 1;
        } else if bytes[i] == b'<' {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && bytes[i] == b':' && bytes[i - 1] == b':' {
            return &path[i + 1..];
        }
    }
    path
}

/// Decides which frames of a trace belong to the test runner and should be
/// hidden.
///
/// The predicate is a regular expression matched against the location line of
/// each frame. Which paths count as "runner internals" depends entirely on
/// the runner a harness is hosted in, so it is configurable rather than fixed.
///
/// Only the location line is matched. A frame without debug info has the
/// location `??` and is never filtered, so binaries built without line tables
/// (see the crate docs) keep their runner frames in traces.
///
/// # Examples
///
/// ```rust
/// use failsignal_backtrace::FrameFilter;
///
/// // Hide libtest and the std runtime (the default).
/// let filter = FrameFilter::default();
/// assert!(filter.is_runner_frame(
///     "\t/rustc/0123456789abcdef0123456789abcdef01234567/library/test/src/lib.rs:666"
/// ));
///
/// // Hide a custom runner's sources instead.
/// let filter = FrameFilter::new(r"/my-runner/src/").expect("valid pattern");
/// assert!(filter.is_runner_frame("\t/home/ci/my-runner/src/exec.rs:10"));
///
/// // Keep everything.
/// assert!(!FrameFilter::none().is_runner_frame("\t/anything.rs:1"));
/// ```
#[derive(Clone, Debug)]
pub struct FrameFilter {
    runner: Option<regex::Regex>,
}

impl FrameFilter {
    /// Matches libtest and the std, core, alloc and panic_unwind sources that
    /// ship with the toolchain, either under `/rustc/<commit>/library/` or in
    /// the `rust-src` component.
    pub const DEFAULT_RUNNER_PATTERN: &'static str = r"(?:[/\\]lib[/\\]rustlib[/\\]src[/\\]rust|/rustc/[0-9a-f]{40})[/\\]library[/\\](?:test|std|core|alloc|panic_unwind)[/\\]src[/\\]";

    /// Creates a filter that hides frames whose location matches `pattern`.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            runner: Some(regex::Regex::new(pattern)?),
        })
    }

    /// A filter that keeps every frame.
    pub const fn none() -> Self {
        Self { runner: None }
    }

    /// The default filter, see [`DEFAULT_RUNNER_PATTERN`](Self::DEFAULT_RUNNER_PATTERN).
    pub fn runner_default() -> Self {
        static DEFAULT_RUNNER: OnceLock<regex::Regex> = OnceLock::new();
        let runner = DEFAULT_RUNNER.get_or_init(|| {
            regex::Regex::new(Self::DEFAULT_RUNNER_PATTERN)
                .expect("built-in regex pattern for runner paths should be valid")
        });
        Self {
            runner: Some(runner.clone()),
        }
    }

    /// The default filter unless the environment asks for unfiltered traces.
    ///
    /// # Environment Variables
    ///
    /// - `RUST_BACKTRACE=full` - Returns [`FrameFilter::none`]
    /// - `FAILSIGNAL_BACKTRACE` - Comma-separated options:
    ///   - `unfiltered` - Returns [`FrameFilter::none`]
    ///   - `filtered` - Returns the default filter even with
    ///     `RUST_BACKTRACE=full`
    pub fn from_env() -> Self {
        if FailsignalEnvOptions::get().unfiltered {
            Self::none()
        } else {
            Self::runner_default()
        }
    }

    /// The pattern this filter matches, if it filters at all.
    pub fn pattern(&self) -> Option<&str> {
        self.runner.as_ref().map(regex::Regex::as_str)
    }

    /// Whether the frame with this location line belongs to the runner.
    pub fn is_runner_frame(&self, location: &str) -> bool {
        self.runner
            .as_ref()
            .is_some_and(|runner| runner.is_match(location))
    }
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self::runner_default()
    }
}

#[derive(Debug)]
struct FailsignalEnvOptions {
    unfiltered: bool,
}

impl FailsignalEnvOptions {
    fn get() -> &'static Self {
        static FAILSIGNAL_FLAGS: OnceLock<FailsignalEnvOptions> = OnceLock::new();

        FAILSIGNAL_FLAGS.get_or_init(|| {
            let mut unfiltered =
                std::env::var_os("RUST_BACKTRACE").is_some_and(|var| var == "full");
            if let Some(var) = std::env::var_os("FAILSIGNAL_BACKTRACE") {
                for v in var.to_string_lossy().split(',') {
                    if v.eq_ignore_ascii_case("unfiltered") {
                        unfiltered = true;
                    } else if v.eq_ignore_ascii_case("filtered") {
                        unfiltered = false;
                    }
                }
            }
            FailsignalEnvOptions { unfiltered }
        })
    }
}

/// Captures the raw call stack of the current thread.
///
/// The result starts with a `thread '<name>' [running]:` header followed by
/// a function line and a tab-indented `file:line` line for every resolved
/// symbol, innermost first. Inlined functions get a pair of their own.
/// Frames of the unwinder that sit above this function, or that were inlined
/// into it, are not included, so when symbols are available the first pair
/// is always this function. Its own frame is recognized by address, with the
/// symbol name as a fallback.
///
/// Symbols without a name are left out; symbols without a file get `??` as
/// their location.
#[inline(never)]
pub fn capture_raw_stack() -> String {
    let own_address = capture_raw_stack as fn() -> String as usize;
    let mut physical_frames: Vec<Vec<(String, String)>> = Vec::new();
    let mut own_frame: Option<usize> = None;

    backtrace::trace(|frame| {
        let mut is_own = frame.symbol_address() as usize == own_address;
        let mut symbols = Vec::new();

        backtrace::resolve_frame(frame, |symbol| {
            let Some(name) = symbol.name() else {
                return;
            };
            is_own |= symbol.addr().is_some_and(|addr| addr as usize == own_address);

            let location = match (symbol.filename(), symbol.lineno()) {
                (Some(file), Some(line)) => format!("\t{}:{line}", file.display()),
                (Some(file), None) => format!("\t{}", file.display()),
                (None, _) => format!("\t{UNKNOWN_FILE}"),
            };
            symbols.push((format!("{name:#}"), location));
        });

        if is_own && own_frame.is_none() {
            own_frame = Some(physical_frames.len());
        }
        physical_frames.push(symbols);
        true
    });

    let own_frame = own_frame.or_else(|| {
        physical_frames.iter().position(|symbols| {
            symbols
                .iter()
                .any(|(function, _)| function == RAW_STACK_SYMBOL || function == "capture_raw_stack")
        })
    });

    // The unwinder is inlined into this function's frame in optimized
    // builds; of that frame only its outermost symbol is ours.
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (index, mut symbols) in physical_frames.into_iter().enumerate() {
        match own_frame {
            Some(own) if index < own => {}
            Some(own) if index == own => pairs.extend(symbols.pop()),
            _ => pairs.append(&mut symbols),
        }
    }

    let current = thread::current();
    let mut raw = String::new();
    let _ = write!(
        raw,
        "{THREAD_HEADER_PREFIX}'{}' [running]:",
        current.name().unwrap_or("<unnamed>")
    );
    for (function, location) in &pairs {
        raw.push('\n');
        raw.push_str(function);
        raw.push('\n');
        raw.push_str(location);
    }
    raw
}

/// Prunes a raw stack captured by [`capture_raw_stack`].
///
/// Drops the thread header if present, then the first `skip` frames (two
/// lines each), then every remaining frame whose location line is a runner
/// frame according to `filter`. Survivors keep their relative order and are
/// joined with newlines. If the stack has fewer than `skip` frames the result
/// is empty. A trailing line without a partner is ignored.
///
/// # Examples
///
/// ```rust
/// use failsignal_backtrace::{FrameFilter, prune};
///
/// let raw = "thread 'main' [running]:\n\
///            plumbing\n\t/src/plumbing.rs:3\n\
///            runner::exec\n\t/runner/src/exec.rs:9\n\
///            app::main\n\t/src/main.rs:12";
/// let filter = FrameFilter::new("/runner/src/").expect("valid pattern");
/// assert_eq!(prune(raw, 1, &filter), "app::main\n\t/src/main.rs:12");
/// ```
pub fn prune(raw: &str, skip: usize, filter: &FrameFilter) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines
        .first()
        .is_some_and(|line| line.starts_with(THREAD_HEADER_PREFIX))
    {
        lines.remove(0);
    }

    let Some(remaining) = lines.get(skip.saturating_mul(2)..) else {
        return String::new();
    };

    remaining
        .chunks_exact(2)
        .filter(|pair| !filter.is_runner_frame(pair[1]))
        .flatten()
        .copied()
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Captures a trace of the current thread with the default [`FrameFilter`].
///
/// With `skip == 0` the trace starts at the direct caller of this function;
/// every increment of `skip` removes one more caller from the top.
///
/// The default filter honors the environment, see [`FrameFilter::from_env`].
#[inline(never)]
pub fn capture_trace(skip: usize) -> String {
    let trace = capture_trace_with_filter(skip + 1, &FrameFilter::from_env());
    black_box(trace)
}

/// Captures a trace of the current thread with a custom [`FrameFilter`].
///
/// With `skip == 0` the trace starts at the direct caller of this function.
#[inline(never)]
pub fn capture_trace_with_filter(skip: usize, filter: &FrameFilter) -> String {
    let raw = capture_raw_stack();
    prune(&raw, skip + CAPTURE_FRAMES, filter)
}

/// Resolves the source location of a frame on the current call stack.
///
/// With `skip == 0` this is the location inside the function calling
/// `caller_location`; with `skip == 1` it is the location in that function's
/// caller where the call was made, and so on. Runner frames are not filtered
/// here, depths are counted on the real call chain.
///
/// Returns `None` if the stack is not that deep, or if the frame has no
/// file and line because the binary lacks debug info.
#[inline(never)]
pub fn caller_location(skip: usize) -> Option<CallerLocation> {
    let raw = capture_raw_stack();
    let trace = prune(&raw, skip + CAPTURE_FRAMES, &FrameFilter::none());
    let location = frames(&trace).next().and_then(|frame| frame.location());
    black_box(location)
}

/// Parses a raw or pruned trace into its frames.
///
/// A leading thread header is skipped. A trailing unpaired line is ignored.
pub fn frames(trace: &str) -> impl Iterator<Item = Frame<'_>> {
    let mut lines = trace
        .lines()
        .skip_while(|line| line.starts_with(THREAD_HEADER_PREFIX));
    std::iter::from_fn(move || {
        let function = lines.next()?;
        let location = lines.next()?;
        Some(Frame::parse(function, location))
    })
}
