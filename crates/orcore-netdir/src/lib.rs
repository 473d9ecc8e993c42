//! In-memory router directory and bandwidth-weighted path selection.
//!
//! This crate holds no network code: it's fed [`descriptor::RouterDescriptor`]s
//! by whatever directory-fetch mechanism a caller wires up, and in turn hands
//! [`pathchooser::select_path`] ordered hop lists for circuit construction.

#![warn(missing_docs)]

pub mod descriptor;
pub mod err;
pub mod exitpolicy;
pub mod pathchooser;
pub mod routerset;

pub use descriptor::{OnionPublicKey, RouterDescriptor, RouterFlags};
pub use err::{Error, Result};
pub use exitpolicy::{AddrSpec, ExitPattern, ExitPolicy, PortSpec, Rule};
pub use pathchooser::{select_path, CircuitPurpose, PathPolicy};
pub use routerset::RouterSet;
