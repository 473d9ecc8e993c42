//! Error types for `orcore-bytes`.

use thiserror::Error;

/// An error produced while decoding bytes into a structured value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// We tried to read more bytes than remained in the input.
    #[error("object truncated, at least {deficit} more bytes needed")]
    Truncated {
        /// Lower bound on the number of additional bytes needed.
        deficit: usize,
    },
    /// `Reader::should_be_exhausted` was called, but bytes remained.
    #[error("extra bytes at end of object")]
    ExtraneousBytes,
    /// A length field described an object too large to be legal here.
    #[error("length field out of range")]
    BadLengthValue,
    /// The content of an otherwise well-framed object was invalid.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
}

/// An error produced while encoding a value onto a [`crate::Writer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeError {
    /// The value would not fit into the space available for it.
    #[error("object too large to encode in the space available")]
    Oversized,
}
