//! Errors from looking up or building an OR-link.

use orcore_error::{ErrorKind, HasKind};
use orcore_llcrypto::pk::rsa::RsaIdentity;
use std::sync::Arc;

/// Errors produced by this crate.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Dialing the peer, or the TLS handshake over that connection, failed.
    #[error("connecting to relay {0}: {1}")]
    Connect(RsaIdentity, Arc<std::io::Error>),
    /// The relay-cell engine rejected this link once it was open.
    #[error("link error with relay {0}: {1}")]
    Proto(RsaIdentity, orcore_proto::Error),
    /// It took too long to open this link.
    #[error("timed out connecting to relay {0}")]
    Timeout(RsaIdentity),
    /// A pending build that we were waiting on never completed (the task
    /// doing the building was dropped).
    #[error("pending link build for {0} disappeared")]
    BuildTaskGone(RsaIdentity),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect(..) => ErrorKind::LinkFailure,
            Error::Proto(_, e) => e.kind(),
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::BuildTaskGone(_) => ErrorKind::Internal,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
