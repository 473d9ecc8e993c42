//! Parsing the client's SOCKS4/4a/5 CONNECT request (spec §6).
//!
//! SOCKS5 negotiates its authentication method before the request proper
//! arrives, so that round trip is its own pair of functions
//! ([`parse_method_negotiation`]/[`encode_method_selection`]); SOCKS4 and
//! SOCKS4a fold straight into [`parse_request`].

use crate::err::{Error, Result};
use crate::types::{split_dest_modifier, DestModifier, SocksAddr, SocksAuth, SocksCmd, SocksVersion};
use orcore_bytes::Reader;
use std::net::Ipv4Addr;

/// No authentication required (SOCKS5 method byte).
pub const METHOD_NO_AUTH: u8 = 0x00;
/// Username/password authentication (SOCKS5 method byte, RFC 1929).
pub const METHOD_USERNAME_PASSWORD: u8 = 0x02;
/// No acceptable method (sent back when we support none the client offered).
pub const METHOD_NONE_ACCEPTABLE: u8 = 0xff;

/// A fully parsed client request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SocksRequest {
    version: SocksVersion,
    cmd: SocksCmd,
    addr: SocksAddr,
    port: u16,
    dest_modifier: DestModifier,
    auth: SocksAuth,
}

impl SocksRequest {
    /// Which SOCKS dialect this request used.
    pub fn version(&self) -> SocksVersion {
        self.version
    }

    /// The requested command.
    pub fn command(&self) -> SocksCmd {
        self.cmd
    }

    /// The requested destination address.
    pub fn addr(&self) -> &SocksAddr {
        &self.addr
    }

    /// The requested destination port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Any `.onion`/`.exit` modifier parsed off the destination hostname.
    pub fn dest_modifier(&self) -> &DestModifier {
        &self.dest_modifier
    }

    /// Credentials the client presented, if any.
    pub fn auth(&self) -> &SocksAuth {
        &self.auth
    }
}

/// A SOCKS5 method-negotiation message: the methods a client says it
/// supports.
pub struct MethodNegotiation {
    methods: Vec<u8>,
}

impl MethodNegotiation {
    /// The methods the client offered, in the order it sent them.
    pub fn methods(&self) -> &[u8] {
        &self.methods
    }

    /// Pick `METHOD_NO_AUTH` if offered, else `METHOD_NONE_ACCEPTABLE`.
    /// This crate only implements the no-auth path; username/password
    /// negotiation is recognized in [`Self::methods`] for a caller that
    /// wants to implement it, but not driven here.
    pub fn choose_method(&self) -> u8 {
        if self.methods.contains(&METHOD_NO_AUTH) {
            METHOD_NO_AUTH
        } else {
            METHOD_NONE_ACCEPTABLE
        }
    }
}

/// Parse a SOCKS5 method-negotiation message: `VER(5) ∥ NMETHODS ∥
/// METHODS[NMETHODS]`. Returns the parsed message and how many bytes it
/// consumed.
pub fn parse_method_negotiation(buf: &[u8]) -> Result<(MethodNegotiation, usize)> {
    let mut r = Reader::from_slice(buf);
    let ver = r.take_u8()?;
    if ver != 5 {
        return Err(Error::BadVersion(ver));
    }
    let nmethods = r.take_u8()? as usize;
    let methods = r.take_vec(nmethods)?;
    Ok((MethodNegotiation { methods }, r.consumed()))
}

/// Encode the server's method-selection reply: `VER(5) ∥ METHOD`.
pub fn encode_method_selection(method: u8) -> [u8; 2] {
    [5, method]
}

/// Parse one client request, detecting SOCKS4/4a vs SOCKS5 from the
/// version byte. For SOCKS5, this parses the request message only — the
/// method-negotiation round trip must already have completed via
/// [`parse_method_negotiation`]. Returns the parsed request and how many
/// bytes of `buf` it consumed.
pub fn parse_request(buf: &[u8]) -> Result<(SocksRequest, usize)> {
    let mut r = Reader::from_slice(buf);
    let ver = r.take_u8()?;
    match ver {
        4 => parse_socks4(&mut r),
        5 => parse_socks5(&mut r),
        other => Err(Error::BadVersion(other)),
    }
}

fn parse_socks4(r: &mut Reader<'_>) -> Result<(SocksRequest, usize)> {
    let cmd_byte = r.take_u8()?;
    let cmd = SocksCmd::from(cmd_byte);
    let port = r.take_u16()?;
    let ip_bytes = r.take_array::<4>()?;
    let username = take_nul_terminated(r)?;

    // SOCKS4a: an IP of the form 0.0.0.x (x != 0) signals "a hostname
    // follows the userid field", rather than a literal address.
    let is_socks4a = ip_bytes[0] == 0 && ip_bytes[1] == 0 && ip_bytes[2] == 0 && ip_bytes[3] != 0;
    let (addr, dest_modifier) = if is_socks4a {
        let hostname_bytes = take_nul_terminated(r)?;
        let hostname = String::from_utf8(hostname_bytes).map_err(|_| Error::BadHostname)?;
        let (base, modifier) = split_dest_modifier(&hostname);
        (SocksAddr::Hostname(base), modifier)
    } else {
        (SocksAddr::Ip(Ipv4Addr::from(ip_bytes)), DestModifier::None)
    };

    Ok((
        SocksRequest {
            version: SocksVersion::V4,
            cmd,
            addr,
            port,
            dest_modifier,
            auth: SocksAuth { username, password: Vec::new() },
        },
        r.consumed(),
    ))
}

fn parse_socks5(r: &mut Reader<'_>) -> Result<(SocksRequest, usize)> {
    let cmd_byte = r.take_u8()?;
    let cmd = SocksCmd::from(cmd_byte);
    let _reserved = r.take_u8()?;
    let atyp = r.take_u8()?;
    let (addr, dest_modifier) = match atyp {
        1 => {
            let ip_bytes = r.take_array::<4>()?;
            (SocksAddr::Ip(Ipv4Addr::from(ip_bytes)), DestModifier::None)
        }
        3 => {
            let len = r.take_u8()? as usize;
            let hostname_bytes = r.take_vec(len)?;
            let hostname = String::from_utf8(hostname_bytes).map_err(|_| Error::BadHostname)?;
            let (base, modifier) = split_dest_modifier(&hostname);
            (SocksAddr::Hostname(base), modifier)
        }
        other => return Err(Error::BadAddressType(other)),
    };
    let port = r.take_u16()?;

    Ok((
        SocksRequest {
            version: SocksVersion::V5,
            cmd,
            addr,
            port,
            dest_modifier,
            auth: SocksAuth::default(),
        },
        r.consumed(),
    ))
}

fn take_nul_terminated(r: &mut Reader<'_>) -> Result<Vec<u8>> {
    let rest = r.peek(r.remaining())?;
    let nul_at = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::Incomplete { more_bytes: 1 })?;
    let out = r.take_vec(nul_at)?;
    r.advance(1)?; // consume the NUL
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn socks4_literal_ip_request_parses() {
        let mut buf = vec![4, 1]; // ver, CONNECT
        buf.extend_from_slice(&80_u16.to_be_bytes());
        buf.extend_from_slice(&[93, 184, 216, 34]);
        buf.push(0); // empty userid, NUL-terminated

        let (req, consumed) = parse_request(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(req.version(), SocksVersion::V4);
        assert_eq!(req.command(), SocksCmd::CONNECT);
        assert_eq!(req.addr(), &SocksAddr::Ip(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(req.port(), 80);
    }

    #[test]
    fn socks4a_hostname_request_splits_exit_suffix() {
        let mut buf = vec![4, 1];
        buf.extend_from_slice(&443_u16.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 1]); // signals SOCKS4a
        buf.push(0); // empty userid
        buf.extend_from_slice(b"example.com.relay9.exit\0");

        let (req, _) = parse_request(&buf).unwrap();
        assert_eq!(req.addr(), &SocksAddr::Hostname("example.com".into()));
        assert_eq!(req.dest_modifier(), &DestModifier::ExitNode("relay9".into()));
    }

    #[test]
    fn socks5_domain_name_request_parses() {
        let mut buf = vec![5, 1, 0, 3]; // ver, CONNECT, rsv, ATYP=domain
        buf.push(11);
        buf.extend_from_slice(b"example.com");
        buf.extend_from_slice(&443_u16.to_be_bytes());

        let (req, consumed) = parse_request(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(req.version(), SocksVersion::V5);
        assert_eq!(req.addr(), &SocksAddr::Hostname("example.com".into()));
        assert_eq!(req.port(), 443);
    }

    #[test]
    fn socks5_bind_is_parsed_but_not_connect() {
        let mut buf = vec![5, 2, 0, 1]; // BIND
        buf.extend_from_slice(&[127, 0, 0, 1]);
        buf.extend_from_slice(&0_u16.to_be_bytes());
        let (req, _) = parse_request(&buf).unwrap();
        assert_eq!(req.command(), SocksCmd::BIND);
    }

    #[test]
    fn method_negotiation_prefers_no_auth() {
        let buf = [5, 2, 0x02, 0x00];
        let (neg, consumed) = parse_method_negotiation(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(neg.methods(), &[0x02, 0x00]);
        assert_eq!(neg.choose_method(), METHOD_NO_AUTH);
    }

    #[test]
    fn method_negotiation_with_no_acceptable_method() {
        let buf = [5, 1, 0x02];
        let (neg, _) = parse_method_negotiation(&buf).unwrap();
        assert_eq!(neg.choose_method(), METHOD_NONE_ACCEPTABLE);
    }
}
