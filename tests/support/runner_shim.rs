//! Stands in for the dispatch code of a test runner.

use std::hint::black_box;

#[inline(never)]
pub fn dispatch<T>(body: impl FnOnce() -> T) -> T {
    let result = body();
    black_box(result)
}
