//! Errors from OR-link handling, circuit lifecycle, and the relay-cell
//! engine.

use orcore_error::{ErrorKind, HasKind};
use std::sync::Arc;

/// Errors produced by this crate.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Cell framing or relay sub-frame parsing failed.
    #[error("cell error: {0}")]
    Cell(#[from] orcore_cell::Error),
    /// A cryptographic primitive rejected its input (bad DH value, output
    /// too long, ...).
    #[error("crypto error: {0}")]
    Crypto(#[from] orcore_llcrypto::Error),
    /// I/O failure on an OR-link's TLS session.
    #[error("link io error: {0}")]
    LinkIo(#[source] Arc<std::io::Error>),
    /// The peer's TLS identity did not match the identity we dialed for, or
    /// the link died mid-handshake.
    #[error("link failure: {0}")]
    LinkFailure(String),
    /// A cell violated the wire protocol: wrong length, bad digest, cell on
    /// an unexpected circuit, negative window, etc.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The create-handshake's key-confirmation tag didn't match.
    #[error("create handshake failed authentication")]
    BadHandshakeAuth,
    /// No circuit or stream ID could be allocated (the space is full).
    #[error("id space exhausted")]
    IdRangeFull,
    /// An operation referenced a hop, circuit, or stream that doesn't
    /// exist.
    #[error("no such {0}")]
    NotFound(&'static str),
    /// A stream's destination was refused by an exit policy.
    #[error("destination denied by exit policy")]
    PolicyDenied,
    /// A circuit or stream window would have gone negative.
    #[error("flow-control window exhausted")]
    WindowExhausted,
    /// A deadline (circuit build, stream connect, link connect) passed.
    #[error("operation timed out")]
    Timeout,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::LinkIo(Arc::new(e))
    }
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Cell(e) => e.kind(),
            Error::Crypto(e) => e.kind(),
            Error::LinkIo(_) => ErrorKind::TransientIo,
            Error::LinkFailure(_) => ErrorKind::LinkFailure,
            Error::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Error::BadHandshakeAuth => ErrorKind::ProtocolViolation,
            Error::IdRangeFull => ErrorKind::ResourceExhausted,
            Error::NotFound(_) => ErrorKind::Internal,
            Error::PolicyDenied => ErrorKind::PolicyDenied,
            Error::WindowExhausted => ErrorKind::ProtocolViolation,
            Error::Timeout => ErrorKind::Timeout,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
