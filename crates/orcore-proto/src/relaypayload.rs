//! Wire formats for the stream-lifecycle relay commands (spec §4.G):
//! `RELAY_BEGIN`'s destination string, `RELAY_CONNECTED`'s resolved
//! address, and `RELAY_END`'s reason code. Shared between the stream-mux
//! ingress side (an origin, building a `BEGIN`) and the exit side (a
//! relay, decoding one and replying).

use crate::err::{Error, Result};
use std::net::Ipv4Addr;

/// Why a stream ended, carried in a `RELAY_END` payload's first byte
/// (spec §4.G).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum EndReason {
    /// The exit policy forbade this destination.
    ExitPolicy,
    /// Name resolution failed.
    ResolveFailed,
    /// The destination refused the TCP connection.
    ConnectRefused,
    /// Connecting timed out.
    ConnectTimeout,
    /// Some other failure not covered by a more specific reason.
    Misc,
    /// The stream closed normally (peer hung up, or we chose to close).
    Done,
}

impl EndReason {
    fn to_byte(self) -> u8 {
        match self {
            EndReason::Misc => 1,
            EndReason::ResolveFailed => 2,
            EndReason::ConnectRefused => 3,
            EndReason::ExitPolicy => 4,
            EndReason::ConnectTimeout => 5,
            EndReason::Done => 6,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            2 => EndReason::ResolveFailed,
            3 => EndReason::ConnectRefused,
            4 => EndReason::ExitPolicy,
            5 => EndReason::ConnectTimeout,
            6 => EndReason::Done,
            _ => EndReason::Misc,
        }
    }
}

/// Encode a `RELAY_END` payload: a single reason byte.
pub fn encode_end(reason: EndReason) -> Vec<u8> {
    vec![reason.to_byte()]
}

/// Decode a `RELAY_END` payload. An empty payload is treated as
/// `Misc`, matching real Tor's tolerance of a bare `END` with no
/// reason attached.
pub fn decode_end(payload: &[u8]) -> EndReason {
    payload.first().copied().map(EndReason::from_byte).unwrap_or(EndReason::Misc)
}

/// Encode a `RELAY_BEGIN` payload: `"<host>:<port>\0<flags>"` (spec
/// §4.G). `flags` is a single byte of stream-open flags; this
/// implementation only ever sends `0`, but accepts whatever a peer
/// sends.
pub fn encode_begin(host: &str, port: u16, flags: u8) -> Vec<u8> {
    let mut out = format!("{host}:{port}").into_bytes();
    out.push(0);
    out.push(flags);
    out
}

/// A decoded `RELAY_BEGIN` destination.
pub struct BeginPayload {
    /// Hostname or literal IPv4 address requested.
    pub host: String,
    /// Destination port.
    pub port: u16,
    /// Stream-open flags byte, if present.
    pub flags: u8,
}

/// Decode a payload produced by [`encode_begin`].
pub fn decode_begin(payload: &[u8]) -> Result<BeginPayload> {
    let nul = payload
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::ProtocolViolation("RELAY_BEGIN payload missing NUL terminator".into()))?;
    let addr_port = std::str::from_utf8(&payload[..nul])
        .map_err(|_| Error::ProtocolViolation("RELAY_BEGIN destination is not UTF-8".into()))?;
    let (host, port) = addr_port
        .rsplit_once(':')
        .ok_or_else(|| Error::ProtocolViolation("RELAY_BEGIN destination missing ':'".into()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::ProtocolViolation("RELAY_BEGIN destination has a non-numeric port".into()))?;
    let flags = payload.get(nul + 1).copied().unwrap_or(0);
    Ok(BeginPayload { host: host.to_string(), port, flags })
}

/// Encode a `RELAY_CONNECTED` payload: 4-byte IPv4 address, 4-byte TTL
/// in seconds (spec §8 scenario 2).
pub fn encode_connected(addr: Ipv4Addr, ttl_secs: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&addr.octets());
    out.extend_from_slice(&ttl_secs.to_be_bytes());
    out
}

/// A decoded `RELAY_CONNECTED` payload.
pub struct ConnectedPayload {
    /// Resolved address the exit connected to.
    pub addr: Ipv4Addr,
    /// How long, in seconds, the resolution may be cached.
    pub ttl_secs: u32,
}

/// Decode a payload produced by [`encode_connected`].
pub fn decode_connected(payload: &[u8]) -> Result<ConnectedPayload> {
    if payload.len() < 8 {
        return Err(Error::ProtocolViolation("RELAY_CONNECTED payload too short".into()));
    }
    let addr = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
    let ttl_secs = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    Ok(ConnectedPayload { addr, ttl_secs })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn begin_round_trips() {
        let payload = encode_begin("example.com", 80, 0);
        let decoded = decode_begin(&payload).unwrap();
        assert_eq!(decoded.host, "example.com");
        assert_eq!(decoded.port, 80);
        assert_eq!(decoded.flags, 0);
    }

    #[test]
    fn begin_rejects_missing_nul() {
        assert!(decode_begin(b"example.com:80").is_err());
    }

    #[test]
    fn begin_rejects_missing_port() {
        let mut payload = b"example.com".to_vec();
        payload.push(0);
        assert!(decode_begin(&payload).is_err());
    }

    #[test]
    fn connected_round_trips() {
        let payload = encode_connected(Ipv4Addr::new(93, 184, 216, 34), 3600);
        let decoded = decode_connected(&payload).unwrap();
        assert_eq!(decoded.addr, Ipv4Addr::new(93, 184, 216, 34));
        assert_eq!(decoded.ttl_secs, 3600);
    }

    #[test]
    fn end_round_trips() {
        assert_eq!(decode_end(&encode_end(EndReason::ExitPolicy)), EndReason::ExitPolicy);
        assert_eq!(decode_end(&[]), EndReason::Misc);
    }
}
