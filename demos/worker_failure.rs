//! A test body that fans work out to threads, where one worker fails an
//! assertion and another crashes outright.
//!
//! Run with `cargo run --example worker_failure`.

use std::{sync::Arc, thread};

use failsignal::{Abort, Harness, StderrSink, UnwindFail, recover};

#[inline(never)]
fn wait_for_replicas(harness: &Harness, wanted: usize) {
    let ready = wanted - 1;
    harness.log_info(format_args!("{ready}/{wanted} replicas ready"));
    if ready < wanted {
        harness.failf(format_args!("expected {wanted} replicas, {ready} became ready"));
    }
}

#[inline(never)]
fn parse_manifest() -> u16 {
    let port: &str = "eighty";
    port.parse().expect("manifest port is not a number")
}

fn main() {
    let harness = Arc::new(Harness::new().sink(StderrSink).native_fail(UnwindFail));

    let replicas = {
        let harness = Arc::clone(&harness);
        thread::spawn(move || recover(|| wait_for_replicas(&harness, 3)))
    };
    let manifest = thread::spawn(|| recover(parse_manifest));

    for (name, outcome) in [
        ("replicas", replicas.join().map(|r| r.map(|_| ()))),
        ("manifest", manifest.join().map(|r| r.map(|_| ()))),
    ] {
        match outcome {
            Ok(Ok(())) => println!("{name}: passed"),
            Ok(Err(Abort::Failure(record))) => {
                println!(
                    "{name}: failed at {}:{}\n  {}\n{}",
                    record.source_file(),
                    record.source_line(),
                    record.message(),
                    record.full_stack_trace()
                );
            }
            Ok(Err(crash)) => println!("{name}: crashed: {crash}"),
            Err(_) => println!("{name}: thread died outside its recovery point"),
        }
    }
}
