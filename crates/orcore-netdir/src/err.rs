//! Errors from router-set maintenance and path selection.

use orcore_error::{ErrorKind, HasKind};

/// Errors from this crate.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// No path satisfying the caller's constraints could be assembled
    /// from the current router set.
    #[error("no suitable path: {0}")]
    NoSuitablePath(&'static str),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            // Not a protocol or link failure - there's simply nothing to
            // route through right now; the caller should retry later.
            Error::NoSuitablePath(_) => ErrorKind::ResourceExhausted,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
