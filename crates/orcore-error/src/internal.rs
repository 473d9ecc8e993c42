//! The [`Bug`] type, and macros for constructing one.

use crate::{ErrorKind, HasKind};
use std::fmt::{self, Display};
use std::panic;

/// An internal error: something that should not be able to happen, but did.
///
/// Seeing one of these means there is a bug in orcore.
#[derive(Debug, Clone)]
pub struct Bug {
    /// Human-readable description of what went wrong.
    message: String,
    /// Source location of the `internal!()` call site.
    location: &'static panic::Location<'static>,
}

impl Bug {
    /// Construct a new `Bug`, capturing the caller's location.
    #[track_caller]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Bug {
            message: message.into(),
            location: panic::Location::caller(),
        }
    }
}

impl std::error::Error for Bug {}

impl Display for Bug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal error (bug) at {}: {}", self.location, self.message)
    }
}

impl HasKind for Bug {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Construct a [`Bug`], with a message like `format!`, capturing the call site.
#[macro_export]
macro_rules! internal {
    { $( $arg:tt )* } => {
        $crate::Bug::new(format!($($arg)*))
    }
}

/// Build a closure that turns any error into a [`Bug`] carrying `msg`, for use with
/// `.map_err(into_internal!("..."))`.
#[macro_export]
macro_rules! into_internal {
    { $( $arg:tt )* } => {
        |source| $crate::Bug::new(format!("{}: {}", format!($($arg)*), source))
    }
}
