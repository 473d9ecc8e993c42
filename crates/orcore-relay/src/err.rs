//! Top-level error type for the relay binary, following the same
//! per-crate `thiserror`/`HasKind` pattern as every other orcore crate.

use orcore_error::{ErrorKind, HasKind};
use std::sync::Arc;

/// Errors that can surface from the relay's own glue code (config
/// loading, listener setup, dispatch) rather than from one of the
/// library crates it wires together.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Couldn't read or parse the config file.
    #[error("loading config from {path}: {source}")]
    Config {
        /// Path of the config file that failed to load.
        path: String,
        /// Underlying parse or I/O failure.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
    /// Couldn't load or generate this relay's RSA identity key.
    #[error("loading identity key: {0}")]
    Identity(String),
    /// Binding or accepting on the OR-port listener failed.
    #[error("OR-port listener: {0}")]
    Listen(#[source] Arc<std::io::Error>),
    /// Binding or accepting on the SOCKS listener failed.
    #[error("SOCKS listener: {0}")]
    Socks(#[source] Arc<std::io::Error>),
    /// The OR-link cache or circuit manager reported a failure.
    #[error("chanmgr: {0}")]
    Chan(#[from] orcore_chanmgr::Error),
    /// The circuit manager reported a failure building an origin circuit.
    #[error("circmgr: {0}")]
    Circ(#[from] orcore_circmgr::Error),
    /// The relay-cell engine reported a failure.
    #[error("proto: {0}")]
    Proto(#[from] orcore_proto::Error),
    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Bug(#[from] orcore_error::Bug),
}

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Internal,
            Error::Identity(_) => ErrorKind::Internal,
            Error::Listen(_) => ErrorKind::LinkFailure,
            Error::Socks(_) => ErrorKind::LinkFailure,
            Error::Chan(e) => e.kind(),
            Error::Circ(e) => e.kind(),
            Error::Proto(e) => e.kind(),
            Error::Bug(_) => ErrorKind::Internal,
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
