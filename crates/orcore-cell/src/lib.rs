//! Cell framing for the orcore circuit engine.
//!
//! This crate knows nothing about circuits, streams, or cryptography — it
//! only knows how to turn bytes on an OR-link into [`chancell::ChanCell`]s
//! and [`relaycell::RelayMsg`]s and back.

#![warn(missing_docs)]

pub mod chancell;
pub mod codec;
pub mod err;
pub mod relaycell;

pub use chancell::{ChanCell, ChanCellBody, ChanCmd, CircId, CELL_DATA_LEN, CELL_LEN};
pub use codec::ChannelCodec;
pub use err::{Error, Result};
pub use relaycell::{RelayCmd, RelayMsg, HEADER_LEN, RELAY_PAYLOAD_LEN};
