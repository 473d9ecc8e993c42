//! Wire format for a `RELAY_EXTEND` payload (spec §4.E): enough to name
//! the next hop and carry its `CREATE` onion skin. Shared between the
//! origin that builds this payload and the intermediate that decodes it
//! to open the next link.

use crate::err::{Error, Result};
use orcore_llcrypto::pk::rsa::RsaIdentity;
use std::net::Ipv4Addr;

/// A decoded `RELAY_EXTEND` payload.
pub struct ExtendPayload {
    /// Next hop's IPv4 address.
    pub address: Ipv4Addr,
    /// Next hop's OR port.
    pub or_port: u16,
    /// The `CREATE` onion skin to forward to the next hop.
    pub onion_skin: Vec<u8>,
    /// Next hop's expected identity digest.
    pub identity: RsaIdentity,
}

/// Encode: `4-byte addr ∥ 2-byte port ∥ 2-byte onion-skin length ∥
/// onion-skin ∥ 20-byte identity digest`. The length prefix is this
/// implementation's own addition: a hybrid-encrypted `CREATE` onion skin's
/// length is key-size dependent rather than the fixed 144 bytes the spec's
/// prose gives for an idealized handshake.
pub fn encode(address: Ipv4Addr, or_port: u16, onion_skin: &[u8], identity: &RsaIdentity) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 2 + 2 + onion_skin.len() + 20);
    out.extend_from_slice(&address.octets());
    out.extend_from_slice(&or_port.to_be_bytes());
    out.extend_from_slice(&(onion_skin.len() as u16).to_be_bytes());
    out.extend_from_slice(onion_skin);
    out.extend_from_slice(identity.as_bytes());
    out
}

/// Decode a payload produced by [`encode`].
pub fn decode(payload: &[u8]) -> Result<ExtendPayload> {
    if payload.len() < 4 + 2 + 2 {
        return Err(Error::Cell(orcore_cell::Error::MalformedCell("truncated EXTEND payload header")));
    }
    let address = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
    let or_port = u16::from_be_bytes([payload[4], payload[5]]);
    let skin_len = u16::from_be_bytes([payload[6], payload[7]]) as usize;
    let rest = &payload[8..];
    if rest.len() < skin_len + 20 {
        return Err(Error::Cell(orcore_cell::Error::MalformedCell("truncated EXTEND onion skin or identity")));
    }
    let onion_skin = rest[..skin_len].to_vec();
    let identity = RsaIdentity::from_bytes(&rest[skin_len..skin_len + 20])
        .ok_or_else(|| Error::ProtocolViolation("malformed identity digest in EXTEND payload".into()))?;
    Ok(ExtendPayload { address, or_port, onion_skin, identity })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips() {
        let identity = RsaIdentity::from_bytes(&[7; 20]).unwrap();
        let encoded = encode(Ipv4Addr::new(10, 0, 0, 1), 9001, &[1, 2, 3, 4, 5], &identity);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(decoded.or_port, 9001);
        assert_eq!(decoded.onion_skin, vec![1, 2, 3, 4, 5]);
        assert_eq!(decoded.identity, identity);
    }

    #[test]
    fn rejects_truncated_payload() {
        assert!(decode(&[1, 2, 3]).is_err());
    }
}
