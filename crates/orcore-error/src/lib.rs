//! Unified error-kind classification for the orcore crates.
//!
//! Every error type in orcore implements [`HasKind`], so that callers who
//! don't want to match on a crate-specific enum can still ask "is this
//! transient, and should I retry?" or "did the peer misbehave?".
//!
//! The kinds here follow the propagation policy of the circuit engine:
//! `TransientIo` is swallowed and retried by the scheduler, everything else
//! propagates up to the owning circuit or stream, which is responsible for
//! turning it into a `DESTROY`/`END` cell with the matching reason code.

#![warn(missing_docs)]

mod internal;
pub use internal::{Bug, into_internal};

use std::fmt;

/// Coarse classification of an error produced somewhere in orcore.
///
/// This mirrors the propagation policy of the circuit engine: callers that
/// only care about "should I retry" or "should I tear down this circuit"
/// can match on the kind instead of a crate-specific error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A recoverable I/O condition: EAGAIN, an in-progress connect, a short
    /// read. The event loop retries; this is never user-visible.
    TransientIo,
    /// The OR-link to a peer failed: TLS error, identity mismatch, or the
    /// peer closed mid-handshake. Every circuit routed over that link is
    /// torn down.
    LinkFailure,
    /// A peer sent something that violates the wire protocol: a malformed
    /// cell, an unrecognized relay cell at the circuit's origin, a window
    /// that went negative, an oversized relay-cell length.
    ProtocolViolation,
    /// A stream's destination was refused by an exit policy, or a SOCKS
    /// client asked for something we don't allow.
    PolicyDenied,
    /// We're out of some local resource: too many circuits, too many
    /// streams, or a buffer that can't grow further.
    ResourceExhausted,
    /// A deadline passed: circuit build, stream connect, or an onion-skin
    /// computation that never came back.
    Timeout,
    /// An internal invariant was violated (e.g. a cipher layer missing when
    /// we expected one to be there). Indicates a bug in orcore itself.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TransientIo => "transient I/O condition",
            ErrorKind::LinkFailure => "OR-link failure",
            ErrorKind::ProtocolViolation => "protocol violation",
            ErrorKind::PolicyDenied => "denied by policy",
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Internal => "internal error",
        };
        write!(f, "{s}")
    }
}

/// Trait implemented by every orcore error type, to expose its [`ErrorKind`].
pub trait HasKind {
    /// Return the kind of this error.
    fn kind(&self) -> ErrorKind;
}

impl HasKind for std::io::Error {
    fn kind(&self) -> ErrorKind {
        use std::io::ErrorKind as IoKind;
        match self.kind() {
            IoKind::WouldBlock | IoKind::Interrupted | IoKind::TimedOut => ErrorKind::TransientIo,
            IoKind::ConnectionReset
            | IoKind::ConnectionAborted
            | IoKind::BrokenPipe
            | IoKind::NotConnected => ErrorKind::LinkFailure,
            _ => ErrorKind::LinkFailure,
        }
    }
}
