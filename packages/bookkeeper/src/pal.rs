//! Heap primitives that allocation bookkeeping is layered on top of.
//!
//! The abstraction is public so that hosts can inject their own primitive. The crate ships
//! one real implementation backed by the C runtime heap.

mod abstractions;
pub use abstractions::*;

mod system;
pub use system::*;
