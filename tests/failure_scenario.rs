//! Failures raised through real call chains and recovered the way a runner
//! or a guarded worker thread would.

use std::{hint::black_box, sync::Arc, thread};

use failsignal::{
    Abort, FAILURE_PANIC_TEXT, FailureRecord, Harness, MemorySink, UnwindFail, frames, recover,
};

const FAIL_LINE: &str = r"^\S+ \S+ \d+:\d+:\d+\.\d+: FAIL: ";

fn harness() -> (Arc<Harness>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let harness = Harness::new()
        .sink(Arc::clone(&sink))
        .native_fail(UnwindFail);
    (Arc::new(harness), sink)
}

fn short_names(record: &FailureRecord) -> Vec<&str> {
    frames(record.full_stack_trace())
        .map(|frame| frame.short_name())
        .collect()
}

#[inline(never)]
fn a(harness: &Harness, calls: &mut Vec<u32>) {
    calls.push(line!() + 1);
    b(harness, calls);
    black_box(());
}

#[inline(never)]
fn b(harness: &Harness, calls: &mut Vec<u32>) {
    calls.push(line!() + 1);
    c(harness, calls);
    black_box(());
}

#[inline(never)]
fn c(harness: &Harness, calls: &mut Vec<u32>) {
    calls.push(line!() + 1);
    harness.failf(format_args!("boom {}", 42));
}

#[test]
fn failf_through_a_call_chain() {
    let (harness, sink) = harness();
    let mut calls = Vec::new();

    let record = recover(|| a(&harness, &mut calls))
        .unwrap_err()
        .into_failure()
        .expect("failf unwinds with a failure record");

    assert!(record.message().ends_with("boom 42"), "{}", record.message());
    assert!(record.source_file().ends_with(file!()));
    assert_eq!(record.source_line(), calls[2]);

    let names = short_names(&record);
    assert_eq!(&names[..3], ["c", "b", "a"], "{}", record.full_stack_trace());
    for plumbing in [
        "failf",
        "failf_at",
        "trigger_abort",
        "capture_trace",
        "capture_trace_with_filter",
        "capture_raw_stack",
    ] {
        assert!(!names.contains(&plumbing), "{plumbing} leaked into the trace");
    }

    let lines = sink.lines();
    assert_eq!(lines.len(), 1);
    let (header, trace) = lines[0].split_once("\n\nFull Stack Trace\n").unwrap();
    let header_shape = regex::Regex::new(&format!("{FAIL_LINE}boom 42$")).unwrap();
    assert!(header_shape.is_match(header), "{header}");
    assert_eq!(frames(trace).next().unwrap().short_name(), "c");
}

#[inline(never)]
fn scenario_body(harness: &Harness, calls: &mut Vec<u32>) {
    calls.push(line!() + 1);
    check_a(harness, calls);
    black_box(());
}

#[inline(never)]
fn check_a(harness: &Harness, calls: &mut Vec<u32>) {
    calls.push(line!() + 1);
    check_b(harness, calls);
    black_box(());
}

#[inline(never)]
fn check_b(harness: &Harness, calls: &mut Vec<u32>) {
    calls.push(line!() + 1);
    harness.fail_skipping("X", 2);
    black_box(());
}

#[test]
fn fail_skipping_blames_the_outermost_caller() {
    let (harness, sink) = harness();
    let mut calls = Vec::new();

    let record = recover(|| scenario_body(&harness, &mut calls))
        .unwrap_err()
        .into_failure()
        .unwrap();

    assert_eq!(record.source_line(), calls[0]);
    assert!(record.source_file().ends_with(file!()));

    let names = short_names(&record);
    assert_eq!(names[0], "scenario_body");
    assert!(!names.contains(&"check_a"));
    assert!(!names.contains(&"check_b"));

    let logged = sink.contents();
    let (_, trace) = logged.split_once("\n\nFull Stack Trace\n").unwrap();
    assert_eq!(frames(trace).next().unwrap().short_name(), "scenario_body");
}

#[test]
fn every_abort_is_a_failure_record() {
    let (harness, sink) = harness();

    for i in 0..100 {
        let message = format!("iteration {i}");
        match recover(|| harness.fail(&message)) {
            Err(Abort::Failure(record)) => {
                assert!(record.message().ends_with(&format!(": {message}")));
            }
            other => panic!("iteration {i}: expected a failure record, got {other:?}"),
        }
    }

    assert_eq!(sink.lines().len(), 100);
}

#[inline(never)]
fn worker_body(harness: &Harness) {
    harness.fail("replica 2 never became ready");
    black_box(());
}

#[test]
fn failure_on_a_guarded_worker_thread() {
    let (harness, sink) = harness();

    let worker = {
        let harness = Arc::clone(&harness);
        thread::Builder::new()
            .name("replica-watcher".to_owned())
            .spawn(move || recover(|| worker_body(&harness)))
            .unwrap()
    };

    let abort = worker.join().unwrap().unwrap_err();
    let record = abort.failure().expect("worker failure is a failure record");
    assert!(record.message().ends_with("replica 2 never became ready"));
    assert_eq!(short_names(record)[0], "worker_body");
    assert!(!short_names(record).contains(&"failure_on_a_guarded_worker_thread"));

    assert!(sink.contents().contains("FAIL: replica 2 never became ready"));
}

#[test]
fn unguarded_worker_thread_dies_with_the_record() {
    let (harness, _sink) = harness();

    let worker = {
        let harness = Arc::clone(&harness);
        thread::spawn(move || worker_body(&harness))
    };

    let payload = worker.join().unwrap_err();
    let record = payload
        .downcast::<FailureRecord>()
        .expect("the thread unwound with a failure record");
    assert_eq!(record.to_string(), FAILURE_PANIC_TEXT);
}

#[test]
fn unrelated_panics_are_crashes() {
    let (harness, sink) = harness();

    let abort = recover(|| {
        harness.log_info(format_args!("about to index"));
        let empty: Vec<u8> = Vec::new();
        black_box(&empty)[3]
    })
    .unwrap_err();

    assert!(!abort.is_failure());
    assert!(abort.crash_message().unwrap().contains("index out of bounds"));
    assert_eq!(sink.lines().len(), 1);
}
