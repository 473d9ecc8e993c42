//! Encoding the server's SOCKS4/5 reply to a CONNECT request (spec §6).

use crate::types::SocksVersion;
use orcore_bytes::Writer;
use std::net::Ipv4Addr;

/// SOCKS4 reply codes (the second byte of an 8-byte reply).
pub mod socks4_status {
    /// Request granted.
    pub const GRANTED: u8 = 0x5a;
    /// Request rejected or failed.
    pub const REJECTED: u8 = 0x5b;
}

/// SOCKS5 reply codes (the `REP` field).
pub mod socks5_status {
    /// Succeeded.
    pub const SUCCEEDED: u8 = 0x00;
    /// General SOCKS server failure.
    pub const GENERAL_FAILURE: u8 = 0x01;
    /// Connection not allowed by ruleset.
    pub const NOT_ALLOWED: u8 = 0x02;
    /// Network unreachable.
    pub const NETWORK_UNREACHABLE: u8 = 0x03;
    /// Host unreachable.
    pub const HOST_UNREACHABLE: u8 = 0x04;
    /// Connection refused.
    pub const CONNECTION_REFUSED: u8 = 0x05;
    /// TTL expired.
    pub const TTL_EXPIRED: u8 = 0x06;
    /// Command not supported (BIND, UDP ASSOCIATE).
    pub const COMMAND_NOT_SUPPORTED: u8 = 0x07;
    /// Address type not supported.
    pub const ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;
}

/// Encode a SOCKS4 reply: `VN(0) ∥ CD ∥ DSTPORT ∥ DSTIP`.
///
/// `bound_addr`/`bound_port` are the address/port the relay bound for the
/// connection; SOCKS4 clients generally ignore them for CONNECT, but we
/// fill them in when known rather than zeroing them.
pub fn encode_socks4_reply(status: u8, bound_addr: Ipv4Addr, bound_port: u16) -> Vec<u8> {
    let mut w = Vec::new();
    w.write_u8(0);
    w.write_u8(status);
    w.write_u16(bound_port);
    w.write_all(&bound_addr.octets());
    w
}

/// Encode a SOCKS5 reply: `VER(5) ∥ REP ∥ RSV(0) ∥ ATYP ∥ BND.ADDR ∥
/// BND.PORT`. Always uses an IPv4 `BND.ADDR` (ATYP 1); this relay never
/// binds a hostname.
pub fn encode_socks5_reply(status: u8, bound_addr: Ipv4Addr, bound_port: u16) -> Vec<u8> {
    let mut w = Vec::new();
    w.write_u8(5);
    w.write_u8(status);
    w.write_u8(0);
    w.write_u8(1); // ATYP: IPv4
    w.write_all(&bound_addr.octets());
    w.write_u16(bound_port);
    w
}

/// Encode a success/failure reply for `version`, filling in `bound_addr`/
/// `bound_port` on success and zeroing them on failure.
pub fn encode_reply(version: SocksVersion, succeeded: bool, bound_addr: Ipv4Addr, bound_port: u16) -> Vec<u8> {
    match version {
        SocksVersion::V4 => {
            let status = if succeeded { socks4_status::GRANTED } else { socks4_status::REJECTED };
            let (addr, port) = if succeeded { (bound_addr, bound_port) } else { (Ipv4Addr::UNSPECIFIED, 0) };
            encode_socks4_reply(status, addr, port)
        }
        SocksVersion::V5 => {
            let status = if succeeded { socks5_status::SUCCEEDED } else { socks5_status::GENERAL_FAILURE };
            let (addr, port) = if succeeded { (bound_addr, bound_port) } else { (Ipv4Addr::UNSPECIFIED, 0) };
            encode_socks5_reply(status, addr, port)
        }
    }
}

/// Encode a "command not supported" failure for BIND/UDP ASSOCIATE
/// requests, per spec §6.
pub fn encode_command_not_supported(version: SocksVersion) -> Vec<u8> {
    match version {
        SocksVersion::V4 => encode_socks4_reply(socks4_status::REJECTED, Ipv4Addr::UNSPECIFIED, 0),
        SocksVersion::V5 => encode_socks5_reply(socks5_status::COMMAND_NOT_SUPPORTED, Ipv4Addr::UNSPECIFIED, 0),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn socks4_success_reply_has_expected_shape() {
        let buf = encode_socks4_reply(socks4_status::GRANTED, Ipv4Addr::new(1, 2, 3, 4), 443);
        assert_eq!(buf, vec![0, 0x5a, 1, 187, 1, 2, 3, 4]);
    }

    #[test]
    fn socks5_success_reply_has_expected_shape() {
        let buf = encode_socks5_reply(socks5_status::SUCCEEDED, Ipv4Addr::new(10, 0, 0, 1), 80);
        assert_eq!(buf, vec![5, 0, 0, 1, 10, 0, 0, 1, 0, 80]);
    }

    #[test]
    fn command_not_supported_uses_0x07_for_v5() {
        let buf = encode_command_not_supported(SocksVersion::V5);
        assert_eq!(buf[1], socks5_status::COMMAND_NOT_SUPPORTED);
    }
}
