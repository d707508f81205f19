use std::borrow::Cow;
use std::fmt;
use std::panic::Location;

/// Identifies where an allocation or deallocation request originated.
///
/// Conventionally this is a source file name and line number, which is what
/// [`CallSite::here()`] captures, but any label works. The tracker treats the value as
/// opaque and only hands it back in reports.
///
/// # Examples
///
/// ```
/// use bookkeeper::CallSite;
///
/// let labelled = CallSite::from("request parser");
/// assert_eq!(labelled.to_string(), "request parser");
///
/// let positioned = CallSite::new("parser.rs", 42);
/// assert_eq!(positioned.to_string(), "parser.rs:42");
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CallSite {
    label: Cow<'static, str>,
    line: Option<u32>,
}

impl CallSite {
    /// Creates a call site from a file name and a line number.
    #[must_use]
    pub fn new(file: impl Into<Cow<'static, str>>, line: u32) -> Self {
        Self {
            label: file.into(),
            line: Some(line),
        }
    }

    /// Captures the source location of the caller.
    ///
    /// Functions that forward the location of their own caller must themselves be
    /// marked `#[track_caller]`.
    #[must_use]
    #[track_caller]
    pub fn here() -> Self {
        Location::caller().into()
    }

    /// The file name or free-form label of the call site.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The line number, if the call site was created from a source location.
    #[must_use]
    pub fn line(&self) -> Option<u32> {
        self.line
    }
}

impl From<&'static str> for CallSite {
    fn from(label: &'static str) -> Self {
        Self {
            label: Cow::Borrowed(label),
            line: None,
        }
    }
}

impl From<String> for CallSite {
    fn from(label: String) -> Self {
        Self {
            label: Cow::Owned(label),
            line: None,
        }
    }
}

impl From<&'static Location<'static>> for CallSite {
    fn from(location: &'static Location<'static>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}", self.label),
            None => write!(f, "{}", self.label),
        }
    }
}
