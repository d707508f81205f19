use std::fmt::Debug;
use std::ptr::NonNull;

/// An allocation primitive that hands out and takes back untyped blocks of memory.
///
/// This is the collaborator that [`Tracker`][crate::Tracker] and
/// [`Passthrough`][crate::Passthrough] wrap. It knows nothing about call sites or
/// bookkeeping; it only manages memory.
///
/// This trait is automatically mocked by mockall in test builds, generating `MockHeap`.
#[cfg_attr(test, mockall::automock)]
pub trait Heap: Debug + Send + Sync {
    /// Allocates a block of at least `bytes` bytes.
    ///
    /// Returns `None` if the request cannot be satisfied. A zero-byte request must still
    /// return a unique address that can later be passed to [`deallocate()`][Self::deallocate].
    fn allocate(&self, bytes: usize) -> Option<NonNull<u8>>;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate()`][Self::allocate] on this heap and must
    /// not have been released since.
    unsafe fn deallocate(&self, ptr: NonNull<u8>);
}
