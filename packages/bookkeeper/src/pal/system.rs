// Real heap implementation that delegates to the C runtime allocator.

use std::ptr::NonNull;

use crate::Heap;

/// The C runtime heap (`malloc` and `free`).
///
/// Blocks are aligned for any fundamental type, which is what `malloc` guarantees.
/// Zero-byte requests are rounded up to one byte so that every successful allocation
/// has an address of its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHeap;

// Trivial forwarder to system APIs - covered by the integration tests, not worth mutating.
#[cfg_attr(test, mutants::skip)]
impl Heap for SystemHeap {
    fn allocate(&self, bytes: usize) -> Option<NonNull<u8>> {
        // SAFETY: malloc has no preconditions; a null result is handled below.
        let ptr = unsafe { libc::malloc(bytes.max(1)) };

        NonNull::new(ptr.cast::<u8>())
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        // SAFETY: Forwarding the caller's guarantee that ptr came from malloc and is still live.
        unsafe {
            libc::free(ptr.as_ptr().cast::<libc::c_void>());
        }
    }
}
