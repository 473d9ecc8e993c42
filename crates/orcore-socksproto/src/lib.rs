//! The client-facing SOCKS4/4a/5 surface (spec §6).
//!
//! This crate only parses/encodes the wire messages; it owns no sockets
//! and drives no state machine across reads. A caller buffers bytes off
//! its listener, hands them to [`request::parse_method_negotiation`] and
//! [`request::parse_request`], and writes back whatever
//! [`reply::encode_reply`] produces.

mod err;
mod reply;
mod request;
mod types;

pub use err::{Error, Result};
pub use reply::{encode_command_not_supported, encode_reply, socks4_status, socks5_status};
pub use request::{
    encode_method_selection, parse_method_negotiation, parse_request, MethodNegotiation, SocksRequest,
    METHOD_NONE_ACCEPTABLE, METHOD_NO_AUTH, METHOD_USERNAME_PASSWORD,
};
pub use types::{split_dest_modifier, DestModifier, SocksAddr, SocksAuth, SocksCmd, SocksVersion};
