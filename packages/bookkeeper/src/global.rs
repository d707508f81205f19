use crate::{SystemHeap, Tracker};

static GLOBAL: Tracker<SystemHeap> = Tracker::new(SystemHeap);

/// The process-wide tracker on top of the C runtime heap.
///
/// This exists for call sites that cannot easily be handed a tracker instance. It is ready
/// from the first call, without any initialization step, and lives until the process exits.
/// Prefer an explicitly owned [`Tracker`] where possible: all users of the global tracker
/// share one set of books, so tests running in parallel see each other's allocations.
///
/// Call [`Tracker::reset()`] to tear the books down, for example between independent runs
/// in the same process.
///
/// # Examples
///
/// ```
/// use bookkeeper::{CallSite, global};
///
/// let block = global().track_allocate(CallSite::here(), 1, 32).unwrap();
///
/// // SAFETY: The block came from the global tracker and is freed exactly once.
/// unsafe {
///     global().track_deallocate(CallSite::here(), block.as_ptr());
/// }
///
/// assert!(global().is_clean());
/// ```
#[must_use]
pub fn global() -> &'static Tracker<SystemHeap> {
    &GLOBAL
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::ptr;

    use super::*;

    #[test]
    fn global_is_one_instance() {
        assert!(ptr::eq(global(), global()));
    }
}
