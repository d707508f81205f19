use std::fmt::Debug;
use std::ptr::NonNull;

use crate::{AllocError, CallSite, Report, Result};

/// Allocates and frees arrays on behalf of code that labels each request with its call site.
///
/// There are two implementations, and a host picks one when it is composed:
///
/// * [`Tracker`][crate::Tracker] keeps books on every request and reports leaks and invalid
///   frees.
/// * [`Passthrough`][crate::Passthrough] forwards to the heap without any bookkeeping and
///   always reports clean.
///
/// Code written against this trait works unchanged with either, so both variants can be
/// used side by side and tested without rebuilding.
///
/// # Examples
///
/// ```
/// use bookkeeper::{ArrayAllocator, CallSite, Passthrough, SystemHeap, Tracker};
///
/// fn forget_to_free(allocator: &impl ArrayAllocator) -> bool {
///     allocator
///         .allocate(CallSite::here(), size_of::<u32>(), 8)
///         .unwrap();
///
///     allocator.report().is_clean()
/// }
///
/// assert!(!forget_to_free(&Tracker::new(SystemHeap)));
/// assert!(forget_to_free(&Passthrough::new(SystemHeap)));
/// ```
pub trait ArrayAllocator: Debug + Send + Sync {
    /// Allocates room for `count` elements of `element_size` bytes each.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::SizeOverflow`] if the total size does not fit into `usize` and
    /// [`AllocError::OutOfMemory`] if the heap cannot satisfy the request.
    fn allocate(&self, call_site: CallSite, element_size: usize, count: usize)
    -> Result<NonNull<u8>>;

    /// Frees a block previously returned by [`allocate()`][Self::allocate].
    ///
    /// A null pointer is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a block that the underlying heap can legally release.
    unsafe fn deallocate(&self, call_site: CallSite, ptr: *mut u8);

    /// Creates a report of everything the allocator considers wrong at this moment.
    fn report(&self) -> Report;
}

/// Total size of an array, or the error to return if it does not fit into `usize`.
pub(crate) fn array_bytes(element_size: usize, count: usize) -> Result<usize> {
    element_size
        .checked_mul(count)
        .ok_or(AllocError::SizeOverflow {
            element_size,
            count,
        })
}
