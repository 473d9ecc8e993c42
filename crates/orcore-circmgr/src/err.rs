//! Error type for circuit build orchestration.

use orcore_error::{ErrorKind, HasKind};
use retry_error::RetryError;
use thiserror::Error;

/// An error returned while selecting a path or building a circuit.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// No path could be found under the given policy.
    #[error("no suitable path: {0}")]
    NoPath(String),

    /// Couldn't get or open the first-hop link.
    #[error("couldn't open first-hop link: {0}")]
    Chan(#[from] orcore_chanmgr::Error),

    /// A protocol-level failure while creating or extending the circuit.
    #[error("circuit build failed: {0}")]
    Proto(#[from] orcore_proto::Error),

    /// A hop rejected the extend with `RELAY_TRUNCATED`.
    #[error("hop {hop} truncated the circuit: {reason}")]
    Truncated {
        /// Index of the hop that sent `RELAY_TRUNCATED`.
        hop: usize,
        /// The reason byte the truncating hop gave.
        reason: u8,
    },

    /// The build didn't finish inside its adaptive timeout.
    #[error("circuit build timed out")]
    BuildTimeout,

    /// A reply cell didn't match the command we were waiting for.
    #[error("unexpected reply while building circuit: {0}")]
    UnexpectedReply(String),

    /// Every path-selection and build attempt in a retried request failed.
    #[error("{0}")]
    RequestFailed(RetryError<Box<Error>>),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NoPath(_) => ErrorKind::PolicyDenied,
            Error::Chan(e) => e.kind(),
            Error::Proto(e) => e.kind(),
            Error::Truncated { .. } => ErrorKind::LinkFailure,
            Error::BuildTimeout => ErrorKind::Timeout,
            Error::UnexpectedReply(_) => ErrorKind::ProtocolViolation,
            Error::RequestFailed(_) => ErrorKind::ResourceExhausted,
        }
    }
}

// RetryError<E>'s Display/Error impls need E: AsRef<dyn StdError>; Box only
// forwards AsRef to its own pointee type, so Box<Error> needs this spelled
// out explicitly rather than inheriting it from std.
impl AsRef<dyn std::error::Error + 'static> for Box<Error> {
    fn as_ref(&self) -> &(dyn std::error::Error + 'static) {
        &**self
    }
}

/// Shorthand for a `Result` using this crate's `Error`.
pub type Result<T> = std::result::Result<T, Error>;
