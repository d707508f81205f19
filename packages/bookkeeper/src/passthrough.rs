use std::ptr::NonNull;

use crate::array_allocator::array_bytes;
use crate::{AllocError, ArrayAllocator, CallSite, Heap, Report, Result};

/// An [`ArrayAllocator`] that forwards straight to the heap and keeps no books.
///
/// Call sites are accepted and ignored. [`report()`][ArrayAllocator::report] is always
/// clean, so a host that ends with `report().exit_code()` exits successfully.
#[derive(Debug)]
pub struct Passthrough<H: Heap> {
    heap: H,
}

impl<H: Heap> Passthrough<H> {
    /// Creates an allocator that forwards every request to `heap`.
    #[must_use]
    pub const fn new(heap: H) -> Self {
        Self { heap }
    }

    /// The heap that requests are forwarded to.
    #[must_use]
    pub fn heap(&self) -> &H {
        &self.heap
    }
}

impl<H: Heap> ArrayAllocator for Passthrough<H> {
    fn allocate(
        &self,
        _call_site: CallSite,
        element_size: usize,
        count: usize,
    ) -> Result<NonNull<u8>> {
        let bytes = array_bytes(element_size, count)?;

        self.heap
            .allocate(bytes)
            .ok_or(AllocError::OutOfMemory { bytes })
    }

    unsafe fn deallocate(&self, _call_site: CallSite, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        // SAFETY: Forwarding the caller's guarantee that the heap can release this block.
        unsafe {
            self.heap.deallocate(ptr);
        }
    }

    fn report(&self) -> Report {
        Report::clean()
    }
}
