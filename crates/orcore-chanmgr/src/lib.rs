//! The OR-link cache (spec §4.C): one TLS-protected link per peer
//! identity, shared by every circuit that needs it, dialed lazily and
//! expired when idle.

#![warn(missing_docs)]

pub mod connector;
mod err;
mod map;
mod mgr;

pub use connector::LinkTarget;
pub use err::{Error, Result};
pub use mgr::{BandwidthParams, ChanMgr, DEFAULT_CONNECT_TIMEOUT};

/// A link shared by every circuit routed over it; `orcore_proto::Channel`
/// is not `Clone` (it owns a framed socket), so callers reach it through
/// this handle and take the lock for the duration of one send/recv.
pub type SharedChannel = std::sync::Arc<tokio::sync::Mutex<orcore_proto::Channel<connector::OrStream>>>;
