//! Snapshots of the allocation books.

use std::fmt;
use std::process::ExitCode;

use crate::CallSite;

/// A point-in-time view of everything the books consider wrong.
///
/// A report is clean when there are no live allocations and no invalid frees. Creating a
/// report does not change the books, so intermediate checkpoints lose no information.
///
/// # Examples
///
/// ```
/// use bookkeeper::{CallSite, SystemHeap, Tracker};
///
/// let tracker = Tracker::new(SystemHeap);
///
/// let block = tracker
///     .track_allocate(CallSite::new("a.cpp", 10), 4, 10)
///     .unwrap();
///
/// let report = tracker.report();
/// assert!(!report.is_clean());
/// assert_eq!(report.leaks()[0].bytes(), 40);
/// assert_eq!(
///     report.to_string(),
///     "Leak detected in a.cpp:10. Did not delete 40 bytes.\n"
/// );
///
/// // SAFETY: The block came from this tracker and has not been freed.
/// unsafe {
///     tracker.track_deallocate(CallSite::new("a.cpp", 20), block.as_ptr());
/// }
///
/// assert!(tracker.report().is_clean());
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Report {
    leaks: Vec<Leak>,
    invalid_frees: Vec<InvalidFree>,
}

/// An allocation that was still live when the report was created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Leak {
    address: usize,
    call_site: CallSite,
    bytes: usize,
}

/// A deallocation request for an address that had no live allocation.
///
/// This covers double frees as well as frees of blocks that were never allocated through
/// the tracker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidFree {
    address: usize,
    call_site: CallSite,
}

impl Report {
    /// A report with nothing in it.
    #[must_use]
    pub fn clean() -> Self {
        Self::default()
    }

    #[must_use]
    pub(crate) fn new(leaks: Vec<Leak>, invalid_frees: Vec<InvalidFree>) -> Self {
        Self {
            leaks,
            invalid_frees,
        }
    }

    /// Whether the books were balanced: nothing leaked and nothing was freed invalidly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty() && self.invalid_frees.is_empty()
    }

    /// Allocations that were live at the time of the report, in ascending address order.
    #[must_use]
    pub fn leaks(&self) -> &[Leak] {
        &self.leaks
    }

    /// Invalid frees, in the order they happened.
    #[must_use]
    pub fn invalid_frees(&self) -> &[InvalidFree] {
        &self.invalid_frees
    }

    /// The process exit code a host program should finish with.
    ///
    /// Success only if the report is clean.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    /// Prints all findings to stderr, one per line. Prints nothing if the report is clean.
    #[cfg_attr(test, mutants::skip)] // Too difficult to test stderr output reliably - manually tested.
    pub fn print_to_stderr(&self) {
        if self.is_clean() {
            return;
        }

        eprint!("{self}");
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for leak in &self.leaks {
            writeln!(f, "{leak}")?;
        }

        for invalid_free in &self.invalid_frees {
            writeln!(f, "{invalid_free}")?;
        }

        Ok(())
    }
}

impl Leak {
    #[must_use]
    pub(crate) fn new(address: usize, call_site: CallSite, bytes: usize) -> Self {
        Self {
            address,
            call_site,
            bytes,
        }
    }

    /// Address of the leaked block.
    #[must_use]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Where the leaked block was allocated.
    #[must_use]
    pub fn call_site(&self) -> &CallSite {
        &self.call_site
    }

    /// Size of the leaked block, in bytes.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl fmt::Display for Leak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Leak detected in {}. Did not delete {} bytes.",
            self.call_site, self.bytes
        )
    }
}

impl InvalidFree {
    #[must_use]
    pub(crate) fn new(address: usize, call_site: CallSite) -> Self {
        Self { address, call_site }
    }

    /// The address that was passed to the deallocation request.
    #[must_use]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Where the deallocation was requested.
    #[must_use]
    pub fn call_site(&self) -> &CallSite {
        &self.call_site
    }
}

impl fmt::Display for InvalidFree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deallocation error detected in {}.", self.call_site)
    }
}
