#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Allocation bookkeeping that reports leaked blocks and invalid frees.
//!
//! This package wraps an allocation primitive with books that record, for every outstanding
//! allocation, where it was made and how large it is. At any checkpoint, typically at the end
//! of a program or test run, the books can be inspected for:
//!
//! * leaks - allocations that were never freed;
//! * invalid frees - frees of addresses with no live allocation, such as double frees or
//!   blocks that were allocated elsewhere.
//!
//! The core types are:
//!
//! - [`Tracker`] - keeps the books on top of a [`Heap`]
//! - [`Passthrough`] - the same interface without any bookkeeping
//! - [`ArrayAllocator`] - the interface both implement, so a host can pick one at composition
//!   time
//! - [`CallSite`] - the provenance label attached to each request
//! - [`Report`] - a read-only snapshot of leaks and invalid frees
//!
//! This package is not a general-purpose allocator. It does no pooling and no layout
//! management of its own; all memory comes from the wrapped [`Heap`].
//!
//! # Example
//!
//! ```
//! use bookkeeper::{CallSite, SystemHeap, Tracker};
//!
//! let tracker = Tracker::new(SystemHeap);
//!
//! let kept = tracker.track_allocate(CallSite::new("a.cpp", 10), 4, 10).unwrap();
//! let freed = tracker.track_allocate(CallSite::new("a.cpp", 11), 1, 8).unwrap();
//!
//! // SAFETY: The block came from this tracker and is freed exactly once.
//! unsafe {
//!     tracker.track_deallocate(CallSite::new("a.cpp", 20), freed.as_ptr());
//! }
//!
//! let report = tracker.report();
//! assert_eq!(report.leaks().len(), 1);
//! assert_eq!(report.leaks()[0].bytes(), 40);
//!
//! // A host program would finish with `report.exit_code()` here.
//! # unsafe { tracker.track_deallocate(CallSite::here(), kept.as_ptr()) };
//! ```
//!
//! # Logging
//!
//! Every tracked allocation and release is logged at `trace` level via `tracing`. Invalid
//! frees are logged at `warn` level as they happen, in addition to being reported.

mod array_allocator;
mod call_site;
mod constants;
mod error;
mod global;
mod pal;
mod passthrough;
mod report;
mod tracker;

pub use array_allocator::*;
pub use call_site::*;
pub use error::*;
pub use global::*;
pub use pal::*;
pub use passthrough::*;
pub use report::*;
pub use tracker::*;
