//! Errors produced while framing or parsing cells.

use orcore_error::{ErrorKind, HasKind};

/// Errors from this crate.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Bytes-level parsing failure (truncated input, bad length field).
    #[error("cell parsing error: {0}")]
    Bytes(#[from] orcore_bytes::Error),
    /// A relay cell's `length` field exceeded the 498-byte data area.
    #[error("relay cell length {0} exceeds maximum of 498")]
    OversizedRelayLength(u16),
    /// A fixed-length cell command carried a body longer than 509 bytes,
    /// or a variable-length cell's declared length didn't match what
    /// followed.
    #[error("malformed cell: {0}")]
    MalformedCell(&'static str),
    /// Encoding a value failed, e.g. a relay payload longer than fits.
    #[error("cell encoding error: {0}")]
    Encode(#[from] orcore_bytes::EncodeError),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Bytes(_) | Error::OversizedRelayLength(_) | Error::MalformedCell(_) => {
                ErrorKind::ProtocolViolation
            }
            Error::Encode(_) => ErrorKind::Internal,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
