use thiserror::Error;

/// Errors that can occur when requesting memory through an [`ArrayAllocator`][crate::ArrayAllocator].
///
/// Leaks and invalid frees are not errors in this sense. They are recorded as data and only
/// surface through [`Report`][crate::Report].
#[derive(Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum AllocError {
    /// The underlying heap primitive could not satisfy the request.
    #[error("out of memory: the heap could not provide {bytes} bytes")]
    OutOfMemory {
        /// The total number of bytes that was requested from the heap.
        bytes: usize,
    },

    /// The total size of the requested array does not fit into `usize`.
    #[error("array of {count} elements of {element_size} bytes each overflows usize")]
    SizeOverflow {
        /// Size of a single element, in bytes.
        element_size: usize,

        /// Number of elements requested.
        count: usize,
    },
}

/// A specialized `Result` type for allocation requests, returning the crate's
/// [`AllocError`] type as the error value.
pub type Result<T> = std::result::Result<T, AllocError>;
