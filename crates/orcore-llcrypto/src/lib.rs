//! Low-level cryptography wrappers used by the orcore circuit engine.
//!
//! This crate intentionally uses the "historical" Tor cryptography: RSA-1024
//! identity keys, a fixed 1024-bit Diffie-Hellman group, AES in counter mode,
//! and SHA-1 for digests and key derivation. There is no cryptographic
//! novelty here on purpose — see the top-level specification for why.
//!
//! Sub-modules:
//!   * [`d`] — digests (SHA-1).
//!   * [`cipher`] — AES-CTR, with a seekable counter.
//!   * [`pk::rsa`] — RSA identity keys and the hybrid "TAP" encryption scheme.
//!   * [`dh`] — the fixed-group Diffie-Hellman handshake.
//!   * [`kdf`] — the legacy (SHA-1-based) key derivation function.

#![warn(missing_docs)]

pub mod cipher;
pub mod d;
pub mod dh;
pub mod kdf;
pub mod pk;

pub use orcore_error::{ErrorKind, HasKind};

/// Errors produced by this crate.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// An RSA operation failed (bad key, bad padding, message too long).
    #[error("RSA operation failed: {0}")]
    Rsa(String),
    /// A Diffie-Hellman public value was invalid (e.g. out of range, or
    /// produced a degenerate shared secret).
    #[error("invalid Diffie-Hellman public value")]
    BadDhPublic,
    /// The KDF was asked to produce more output than it can ever provide.
    #[error("requested {0} bytes from KDF, but SHA-1-based KDF tops out at {max} bytes", max = kdf::MAX_KDF_OUTPUT)]
    KdfOutputTooLarge(usize),
    /// A plaintext was too long to be hybrid-encrypted at all.
    #[error("plaintext too long for hybrid encryption")]
    MessageTooLong,
    /// A ciphertext was too short to have been produced by this scheme.
    #[error("ciphertext too short")]
    CiphertextTooShort,
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Rsa(_) | Error::BadDhPublic | Error::CiphertextTooShort => {
                ErrorKind::ProtocolViolation
            }
            Error::KdfOutputTooLarge(_) | Error::MessageTooLong => ErrorKind::Internal,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
