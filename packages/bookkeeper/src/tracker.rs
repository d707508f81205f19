//! Allocation bookkeeping on top of a heap primitive.

use std::collections::BTreeMap;
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::array_allocator::array_bytes;
use crate::constants::ERR_POISONED_LOCK;
use crate::{AllocError, ArrayAllocator, CallSite, Heap, InvalidFree, Leak, Report, Result};

/// Keeps books on every allocation and deallocation made through it.
///
/// Each successful allocation is recorded together with its call site and size until the
/// same address is freed through the tracker. Frees of addresses without a live record
/// (double frees, frees of foreign blocks) are recorded as invalid. Neither condition
/// interrupts the caller; both are reported by [`report()`][Self::report], typically at the
/// end of the program or test run.
///
/// The only error surfaced directly is a failure to allocate, in which case nothing is
/// recorded.
///
/// # Examples
///
/// ```
/// use bookkeeper::{CallSite, SystemHeap, Tracker};
///
/// let tracker = Tracker::new(SystemHeap);
///
/// let block = tracker.track_allocate(CallSite::here(), size_of::<u64>(), 16).unwrap();
///
/// // SAFETY: The block came from this tracker and is freed exactly once.
/// unsafe {
///     tracker.track_deallocate(CallSite::here(), block.as_ptr());
/// }
///
/// assert!(tracker.report().is_clean());
/// ```
///
/// # Thread safety
///
/// All bookkeeping happens under a single lock, so a tracker can be shared between threads
/// whenever its heap can.
#[derive(Debug)]
pub struct Tracker<H: Heap> {
    heap: H,
    books: Mutex<Books>,
}

#[derive(Debug)]
struct Books {
    // Ordered by address so reports come out the same way every time.
    live: BTreeMap<usize, AllocationRecord>,
    invalid_frees: Vec<InvalidFree>,
}

#[derive(Debug)]
struct AllocationRecord {
    call_site: CallSite,
    bytes: usize,
}

impl Books {
    const fn new() -> Self {
        Self {
            live: BTreeMap::new(),
            invalid_frees: Vec::new(),
        }
    }
}

impl<H: Heap> Tracker<H> {
    /// Creates a tracker with empty books on top of `heap`.
    ///
    /// This is a `const fn`, so a tracker can be placed in a `static`.
    #[must_use]
    pub const fn new(heap: H) -> Self {
        Self {
            heap,
            books: Mutex::new(Books::new()),
        }
    }

    /// The heap that the tracker allocates from.
    ///
    /// Blocks allocated directly from the heap are not tracked; freeing one through the
    /// tracker is recorded as an invalid free.
    #[must_use]
    pub fn heap(&self) -> &H {
        &self.heap
    }

    /// Allocates room for `count` elements of `element_size` bytes each and records the
    /// allocation under `call_site`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::SizeOverflow`] if the total size does not fit into `usize` and
    /// [`AllocError::OutOfMemory`] if the heap cannot satisfy the request. Nothing is
    /// recorded in either case.
    pub fn track_allocate(
        &self,
        call_site: CallSite,
        element_size: usize,
        count: usize,
    ) -> Result<NonNull<u8>> {
        let bytes = array_bytes(element_size, count)?;

        let ptr = self
            .heap
            .allocate(bytes)
            .ok_or(AllocError::OutOfMemory { bytes })?;

        tracing::trace!(%call_site, ?ptr, bytes, "allocation recorded");

        let stale = self
            .books
            .lock()
            .expect(ERR_POISONED_LOCK)
            .live
            .insert(ptr.addr().get(), AllocationRecord { call_site, bytes });

        // The heap only reuses an address after it was released, so a stale record means
        // the previous block was released without going through the tracker.
        if let Some(stale) = stale {
            tracing::warn!(
                stale_call_site = %stale.call_site,
                stale_bytes = stale.bytes,
                ?ptr,
                "address reused while still on the books; previous block was freed untracked"
            );
        }

        Ok(ptr)
    }

    /// Frees `ptr` and removes its record from the books.
    ///
    /// If there is no live record for `ptr`, an invalid free is recorded under `call_site`
    /// and the block is still handed to the heap for release. A null pointer is ignored
    /// and is never an invalid free.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a block that the heap can legally release. Releasing an address
    /// the heap never handed out, or one it already took back, is undefined behavior in the
    /// heap even though the tracker records it as an invalid free.
    pub unsafe fn track_deallocate(&self, call_site: CallSite, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            tracing::debug!(%call_site, "ignoring deallocation of null pointer");
            return;
        };

        let address = ptr.addr().get();

        // The record must be gone before the heap can hand the address out again.
        let removed = {
            let mut books = self.books.lock().expect(ERR_POISONED_LOCK);

            let removed = books.live.remove(&address);
            if removed.is_none() {
                books
                    .invalid_frees
                    .push(InvalidFree::new(address, call_site.clone()));
            }

            removed
        };

        match removed {
            Some(record) => tracing::trace!(
                %call_site,
                allocated_at = %record.call_site,
                bytes = record.bytes,
                ?ptr,
                "allocation released"
            ),
            None => tracing::warn!(%call_site, ?ptr, "deallocation of untracked address"),
        }

        // SAFETY: Forwarding the caller's guarantee that the heap can release this block.
        unsafe {
            self.heap.deallocate(ptr);
        }
    }

    /// Creates a report of all live allocations and all invalid frees so far.
    ///
    /// The books are not modified, so calling this repeatedly without intervening
    /// allocations or deallocations yields identical reports.
    #[must_use]
    pub fn report(&self) -> Report {
        let books = self.books.lock().expect(ERR_POISONED_LOCK);

        let leaks = books
            .live
            .iter()
            .map(|(&address, record)| Leak::new(address, record.call_site.clone(), record.bytes))
            .collect();

        Report::new(leaks, books.invalid_frees.clone())
    }

    /// Whether the books are balanced right now.
    ///
    /// Equivalent to `report().is_clean()` without building the report.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        let books = self.books.lock().expect(ERR_POISONED_LOCK);
        books.live.is_empty() && books.invalid_frees.is_empty()
    }

    /// Number of allocations currently on the books.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.books.lock().expect(ERR_POISONED_LOCK).live.len()
    }

    /// Total size of all allocations currently on the books, in bytes.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.books
            .lock()
            .expect(ERR_POISONED_LOCK)
            .live
            .values()
            .map(|record| record.bytes)
            .sum()
    }

    /// Number of invalid frees recorded so far.
    #[must_use]
    pub fn invalid_free_count(&self) -> usize {
        self.books.lock().expect(ERR_POISONED_LOCK).invalid_frees.len()
    }

    /// Discards all books without touching any memory.
    ///
    /// Blocks that were live remain allocated; if they are freed through this tracker later,
    /// that is recorded as an invalid free.
    pub fn reset(&self) {
        let mut books = self.books.lock().expect(ERR_POISONED_LOCK);

        tracing::debug!(
            live = books.live.len(),
            invalid_frees = books.invalid_frees.len(),
            "discarding allocation books"
        );

        *books = Books::new();
    }
}

impl<H: Heap> ArrayAllocator for Tracker<H> {
    fn allocate(
        &self,
        call_site: CallSite,
        element_size: usize,
        count: usize,
    ) -> Result<NonNull<u8>> {
        self.track_allocate(call_site, element_size, count)
    }

    unsafe fn deallocate(&self, call_site: CallSite, ptr: *mut u8) {
        // SAFETY: Same contract as the trait method.
        unsafe {
            self.track_deallocate(call_site, ptr);
        }
    }

    fn report(&self) -> Report {
        Self::report(self)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::ptr;
    use std::sync::atomic::{self, AtomicUsize};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::{MockHeap, SystemHeap};

    assert_impl_all!(Tracker<SystemHeap>: Send, Sync);

    const FIRST_ADDRESS: usize = 0x1000;

    /// A heap that hands out increasing fake addresses and accepts any release.
    ///
    /// The addresses are never dereferenced, so releasing unknown or already released
    /// addresses is harmless here.
    fn fake_heap() -> MockHeap {
        let next = AtomicUsize::new(FIRST_ADDRESS);

        let mut heap = MockHeap::new();
        heap.expect_allocate().returning(move |bytes| {
            let stride = bytes.max(1).next_multiple_of(16);
            let address = next.fetch_add(stride, atomic::Ordering::Relaxed);
            NonNull::new(ptr::without_provenance_mut(address))
        });
        heap.expect_deallocate().return_const(());
        heap
    }

    fn fake_pointer(address: usize) -> *mut u8 {
        ptr::without_provenance_mut(address)
    }

    #[test]
    fn new_tracker_is_clean() {
        let tracker = Tracker::new(fake_heap());

        assert!(tracker.is_clean());
        assert!(tracker.report().is_clean());
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn matched_allocation_is_clean() {
        let tracker = Tracker::new(fake_heap());

        let block = tracker
            .track_allocate(CallSite::new("a.cpp", 10), 4, 10)
            .unwrap();

        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::new("a.cpp", 20), block.as_ptr());
        }

        assert!(tracker.report().is_clean());
    }

    #[test]
    fn unmatched_allocation_is_leak_with_allocating_call_site() {
        let tracker = Tracker::new(fake_heap());

        let block = tracker
            .track_allocate(CallSite::new("a.cpp", 10), 4, 10)
            .unwrap();

        let report = tracker.report();
        assert_eq!(report.leaks().len(), 1);
        assert!(report.invalid_frees().is_empty());

        let leak = &report.leaks()[0];
        assert_eq!(leak.call_site(), &CallSite::new("a.cpp", 10));
        assert_eq!(leak.bytes(), 40);
        assert_eq!(leak.address(), block.addr().get());
    }

    #[test]
    fn only_unmatched_allocations_are_leaks() {
        let tracker = Tracker::new(fake_heap());

        let freed = tracker.track_allocate(CallSite::from("freed"), 1, 8).unwrap();
        tracker.track_allocate(CallSite::from("kept"), 2, 8).unwrap();

        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("free"), freed.as_ptr());
        }

        let report = tracker.report();
        assert_eq!(report.leaks().len(), 1);
        assert_eq!(report.leaks()[0].call_site().label(), "kept");
        assert_eq!(report.leaks()[0].bytes(), 16);
    }

    #[test]
    fn unknown_address_is_invalid_free_and_still_released() {
        let mut heap = MockHeap::new();
        heap.expect_deallocate()
            .withf(|ptr| ptr.addr().get() == 0xDEAD_0000)
            .times(1)
            .return_const(());

        let tracker = Tracker::new(heap);

        // SAFETY: The mock heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::new("b.cpp", 5), fake_pointer(0xDEAD_0000));
        }

        let report = tracker.report();
        assert!(report.leaks().is_empty());
        assert_eq!(report.invalid_frees().len(), 1);
        assert_eq!(
            report.invalid_frees()[0].call_site(),
            &CallSite::new("b.cpp", 5)
        );
        assert_eq!(report.invalid_frees()[0].address(), 0xDEAD_0000);
    }

    #[test]
    fn invalid_free_leaves_live_set_alone() {
        let tracker = Tracker::new(fake_heap());

        tracker.track_allocate(CallSite::from("live"), 8, 1).unwrap();

        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("stray"), fake_pointer(0xF000_0000));
        }

        assert_eq!(tracker.live_allocations(), 1);
        assert_eq!(tracker.invalid_free_count(), 1);
    }

    #[test]
    fn double_free_is_one_invalid_free() {
        let tracker = Tracker::new(fake_heap());

        let block = tracker.track_allocate(CallSite::from("alloc"), 4, 4).unwrap();

        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("first"), block.as_ptr());
        }
        assert!(tracker.report().is_clean());

        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("second"), block.as_ptr());
        }

        let report = tracker.report();
        assert!(report.leaks().is_empty());
        assert_eq!(report.invalid_frees().len(), 1);
        assert_eq!(report.invalid_frees()[0].call_site().label(), "second");
    }

    #[test]
    fn null_is_never_invalid_and_never_reaches_heap() {
        let mut heap = MockHeap::new();
        heap.expect_deallocate().never();

        let tracker = Tracker::new(heap);

        // SAFETY: Null is always accepted.
        unsafe {
            tracker.track_deallocate(CallSite::from("null"), ptr::null_mut());
        }

        assert!(tracker.report().is_clean());
    }

    #[test]
    fn failed_allocation_records_nothing() {
        let mut heap = MockHeap::new();
        heap.expect_allocate().returning(|_| None);

        let tracker = Tracker::new(heap);

        assert_eq!(
            tracker.track_allocate(CallSite::from("oom"), 1024, 1024),
            Err(AllocError::OutOfMemory {
                bytes: 1024 * 1024
            })
        );
        assert!(tracker.report().is_clean());
    }

    #[test]
    fn overflowing_size_never_reaches_heap() {
        let mut heap = MockHeap::new();
        heap.expect_allocate().never();

        let tracker = Tracker::new(heap);

        assert_eq!(
            tracker.track_allocate(CallSite::from("huge"), usize::MAX, 3),
            Err(AllocError::SizeOverflow {
                element_size: usize::MAX,
                count: 3
            })
        );
        assert!(tracker.is_clean());
    }

    #[test]
    fn zero_count_allocation_is_tracked() {
        let tracker = Tracker::new(fake_heap());

        tracker.track_allocate(CallSite::from("empty"), 8, 0).unwrap();

        let report = tracker.report();
        assert_eq!(report.leaks().len(), 1);
        assert_eq!(report.leaks()[0].bytes(), 0);
    }

    #[test]
    fn report_is_idempotent() {
        let tracker = Tracker::new(fake_heap());

        tracker.track_allocate(CallSite::from("leak"), 3, 3).unwrap();
        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("stray"), fake_pointer(0x10));
        }

        let first = tracker.report();
        let second = tracker.report();

        assert_eq!(first, second);
        assert!(!first.is_clean());
    }

    #[test]
    fn leaks_are_reported_in_address_order() {
        let tracker = Tracker::new(fake_heap());

        for label in ["first", "second", "third"] {
            tracker.track_allocate(CallSite::from(label), 1, 1).unwrap();
        }

        let report = tracker.report();
        let addresses: Vec<_> = report.leaks().iter().map(Leak::address).collect();

        let mut sorted = addresses.clone();
        sorted.sort_unstable();
        assert_eq!(addresses, sorted);
        assert_eq!(report.leaks()[0].call_site().label(), "first");
    }

    #[test]
    fn invalid_frees_are_reported_in_call_order() {
        let tracker = Tracker::new(fake_heap());

        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("later address"), fake_pointer(0x9000));
            tracker.track_deallocate(CallSite::from("earlier address"), fake_pointer(0x100));
        }

        let labels: Vec<_> = tracker
            .report()
            .invalid_frees()
            .iter()
            .map(|free| free.call_site().label().to_owned())
            .collect();

        assert_eq!(labels, ["later address", "earlier address"]);
    }

    #[test]
    fn reused_address_replaces_stale_record() {
        let mut heap = MockHeap::new();
        heap.expect_allocate()
            .returning(|_| NonNull::new(ptr::without_provenance_mut(FIRST_ADDRESS)));

        let tracker = Tracker::new(heap);

        tracker.track_allocate(CallSite::from("stale"), 1, 4).unwrap();
        tracker.track_allocate(CallSite::from("fresh"), 1, 8).unwrap();

        let report = tracker.report();
        assert_eq!(report.leaks().len(), 1);
        assert_eq!(report.leaks()[0].call_site().label(), "fresh");
        assert_eq!(report.leaks()[0].bytes(), 8);
    }

    #[test]
    fn live_counters_follow_books() {
        let tracker = Tracker::new(fake_heap());

        let a = tracker.track_allocate(CallSite::from("a"), 10, 1).unwrap();
        tracker.track_allocate(CallSite::from("b"), 5, 2).unwrap();

        assert_eq!(tracker.live_allocations(), 2);
        assert_eq!(tracker.live_bytes(), 20);

        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("a"), a.as_ptr());
        }

        assert_eq!(tracker.live_allocations(), 1);
        assert_eq!(tracker.live_bytes(), 10);
    }

    #[test]
    fn reset_discards_books() {
        let tracker = Tracker::new(fake_heap());

        let block = tracker.track_allocate(CallSite::from("leak"), 1, 1).unwrap();
        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("stray"), fake_pointer(0x10));
        }
        assert!(!tracker.is_clean());

        tracker.reset();
        assert!(tracker.report().is_clean());

        // The block is no longer on the books, so freeing it now is invalid.
        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            tracker.track_deallocate(CallSite::from("late"), block.as_ptr());
        }
        assert_eq!(tracker.invalid_free_count(), 1);
    }

    #[test]
    fn array_allocator_impl_keeps_books() {
        let tracker = Tracker::new(fake_heap());
        let allocator: &dyn ArrayAllocator = &tracker;

        let block = allocator.allocate(CallSite::from("dyn"), 2, 2).unwrap();
        assert_eq!(ArrayAllocator::report(allocator).leaks().len(), 1);

        // SAFETY: The fake heap never dereferences pointers.
        unsafe {
            allocator.deallocate(CallSite::from("dyn"), block.as_ptr());
        }
        assert!(ArrayAllocator::report(allocator).is_clean());
    }
}
