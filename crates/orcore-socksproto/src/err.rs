//! Errors from parsing or encoding the SOCKS surface.

/// Errors produced by this crate.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Not enough bytes have arrived yet to parse a complete message;
    /// the caller should read more and try again.
    #[error("incomplete SOCKS message, need {more_bytes} more bytes")]
    Incomplete {
        /// A lower bound on how many more bytes are needed.
        more_bytes: usize,
    },
    /// The first byte wasn't a SOCKS version this crate understands.
    #[error("unrecognized SOCKS version byte {0}")]
    BadVersion(u8),
    /// A SOCKS5 request's address type wasn't one this crate understands.
    #[error("unrecognized SOCKS5 address type {0}")]
    BadAddressType(u8),
    /// A hostname was longer than the wire format allows, or not valid
    /// UTF-8.
    #[error("malformed hostname in SOCKS request")]
    BadHostname,
    /// The request used a feature (SOCKS5 auth negotiation we don't
    /// support, a reserved field set wrong) this crate rejects outright.
    #[error("malformed SOCKS request: {0}")]
    Malformed(&'static str),
}

impl From<orcore_bytes::Error> for Error {
    fn from(e: orcore_bytes::Error) -> Self {
        match e {
            orcore_bytes::Error::Truncated { deficit } => Error::Incomplete { more_bytes: deficit },
            orcore_bytes::Error::ExtraneousBytes => Error::Malformed("trailing bytes after request"),
            _ => Error::Malformed("malformed SOCKS request"),
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
