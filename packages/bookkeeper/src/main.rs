#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Copies the program arguments into heap memory and frees that memory only when the number
//! of arguments, including the program name, is even.
//!
//! With the tracking allocator the odd case is reported as a leak and the process exits with
//! a failure code. With the passthrough allocator nothing is reported and the process always
//! exits successfully, leaking silently.

use std::fmt;
use std::process::ExitCode;
use std::ptr::{self, NonNull};
use std::str::FromStr;

use argh::FromArgs;
use bookkeeper::{AllocError, ArrayAllocator, CallSite, Passthrough, Report, SystemHeap, Tracker};
use tracing_subscriber::EnvFilter;

/// Copies the program arguments into heap memory and frees it only if their count is even.
#[derive(FromArgs)]
struct Args {
    /// allocator to use (tracked, passthrough); defaults to tracked
    #[argh(option, default = "Mode::Tracked")]
    mode: Mode,

    /// log every allocation and release to stderr
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// arguments to copy
    #[argh(positional, greedy)]
    words: Vec<String>,
}

/// Which [`ArrayAllocator`] the program is composed with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Tracked,
    Passthrough,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tracked" => Ok(Self::Tracked),
            "passthrough" => Ok(Self::Passthrough),
            _ => Err(format!(
                "Invalid mode: '{s}'. Valid options are: tracked, passthrough"
            )),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracked => write!(f, "tracked"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

// Binary entry point - mutations would require subprocess testing, which the integration
// tests already cover.
#[cfg_attr(test, mutants::skip)]
fn main() -> ExitCode {
    let args: Args = argh::from_env();

    init_tracing(args.verbose);

    // The program name counts as an argument, same as argc in C.
    let arguments: Vec<String> = std::env::args().take(1).chain(args.words).collect();

    tracing::debug!(mode = %args.mode, count = arguments.len(), "copying arguments");

    let outcome = match args.mode {
        Mode::Tracked => run(&Tracker::new(SystemHeap), &arguments),
        Mode::Passthrough => run(&Passthrough::new(SystemHeap), &arguments),
    };

    match outcome {
        Ok(report) => {
            report.print_to_stderr();
            report.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg_attr(test, mutants::skip)] // Logging setup has no observable contract to test.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "bookkeeper=trace" } else { "warn" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Copies `arguments` through `allocator`, releases them if their count is even and returns
/// the allocator's report.
fn run(allocator: &impl ArrayAllocator, arguments: &[String]) -> Result<Report, AllocError> {
    let table = copy_arguments(allocator, arguments)?;

    if arguments.len() % 2 == 0 {
        println!("Delete allocated array.");

        // SAFETY: The table was created above for exactly this many arguments and nothing
        // else has released it.
        unsafe {
            release_arguments(allocator, table, arguments.len());
        }
    } else {
        println!("Don't delete allocated array.");
    }

    Ok(allocator.report())
}

/// Allocates one block per argument holding its bytes, plus a table of pointers to them.
///
/// Returns the table.
fn copy_arguments(
    allocator: &impl ArrayAllocator,
    arguments: &[String],
) -> Result<NonNull<u8>, AllocError> {
    let table = allocator.allocate(CallSite::here(), size_of::<*mut u8>(), arguments.len())?;

    for (index, argument) in arguments.iter().enumerate() {
        let block = allocator.allocate(CallSite::here(), 1, argument.len())?;

        // SAFETY: The block is argument.len() bytes long and the table has room for
        // arguments.len() pointers. Heap blocks are aligned for any pointer type.
        unsafe {
            ptr::copy_nonoverlapping(argument.as_ptr(), block.as_ptr(), argument.len());
            table.cast::<*mut u8>().add(index).write(block.as_ptr());
        }
    }

    Ok(table)
}

/// Releases every argument block and then the table itself.
///
/// # Safety
///
/// `table` must have been returned by [`copy_arguments()`] on the same allocator for `count`
/// arguments and must not have been released yet.
unsafe fn release_arguments(allocator: &impl ArrayAllocator, table: NonNull<u8>, count: usize) {
    for index in 0..count {
        // SAFETY: Guaranteed by the caller - the table holds `count` initialized pointers.
        let block = unsafe { table.cast::<*mut u8>().add(index).read() };

        // SAFETY: Each block was allocated by copy_arguments() and is released exactly once.
        unsafe {
            allocator.deallocate(CallSite::here(), block);
        }
    }

    // SAFETY: Guaranteed by the caller.
    unsafe {
        allocator.deallocate(CallSite::here(), table.as_ptr());
    }
}
