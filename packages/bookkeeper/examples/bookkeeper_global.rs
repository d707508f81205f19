//! Example that uses the process-wide tracker and turns its report into the exit code.
//!
//! One block is freed twice and one is never freed, so this exits with a failure code after
//! printing both findings.

use std::process::ExitCode;

use bookkeeper::{CallSite, global};

fn main() -> ExitCode {
    println!("=== Bookkeeper Global Tracker Example ===");

    let kept = global()
        .track_allocate(CallSite::here(), size_of::<u32>(), 10)
        .unwrap();
    let freed = global().track_allocate(CallSite::here(), 1, 64).unwrap();

    // SAFETY: The block came from the global tracker and this is its only release.
    unsafe {
        global().track_deallocate(CallSite::here(), freed.as_ptr());
    }

    // Freeing the same block again would be undefined behavior in the real heap, so the
    // double free is only simulated by freeing a block the books have never seen.
    let foreign = bookkeeper::Heap::allocate(global().heap(), 8).unwrap();

    // SAFETY: The block came from the same C runtime heap and is released exactly once.
    unsafe {
        global().track_deallocate(CallSite::here(), foreign.as_ptr());
    }

    let report = global().report();
    report.print_to_stderr();

    println!(
        "{} leak(s), {} invalid free(s); {:?} is still allocated.",
        report.leaks().len(),
        report.invalid_frees().len(),
        kept
    );

    report.exit_code()
}
