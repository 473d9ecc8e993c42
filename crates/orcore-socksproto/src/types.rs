//! Shared SOCKS types: version, command, address, and the `.onion`/`.exit`
//! destination suffixes Tor layers on top of plain SOCKS (spec §6).

use caret::caret_int;
use std::fmt;
use std::net::Ipv4Addr;

/// Which SOCKS dialect a client spoke.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocksVersion {
    /// SOCKS4 or SOCKS4a (distinguished by the destination address, not
    /// the version byte — both are version 4).
    V4,
    /// SOCKS5.
    V5,
}

caret_int! {
    /// A SOCKS command byte.
    pub struct SocksCmd(u8) {
        /// Open a TCP connection to the destination.
        CONNECT = 1,
        /// Listen for an inbound connection (not supported).
        BIND = 2,
        /// Relay UDP datagrams (not supported).
        UDP_ASSOCIATE = 3,
    }
}

/// A destination address as given by the client: either a literal IPv4
/// address or a hostname to be resolved by the relay side (SOCKS4a, or
/// SOCKS5 with an ATYP of "domain name").
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SocksAddr {
    /// A literal IPv4 address.
    Ip(Ipv4Addr),
    /// A hostname, with any `.onion`/`.exit` suffix already stripped into
    /// [`DestModifier`].
    Hostname(String),
}

impl fmt::Display for SocksAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksAddr::Ip(a) => write!(f, "{a}"),
            SocksAddr::Hostname(h) => write!(f, "{h}"),
        }
    }
}

/// A Tor-specific modifier on a destination hostname, parsed out of a
/// trailing `.onion` or `.exit` suffix per spec §6.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DestModifier {
    /// No special suffix; resolve/connect normally.
    None,
    /// The hostname named a hidden-service `.onion` address.
    Onion,
    /// The hostname named a specific exit relay by nickname, stripped
    /// from a trailing `.<nickname>.exit`.
    ExitNode(String),
}

/// Split a trailing `.onion` or `.exit` suffix off `host`, per spec §6's
/// "usernames in SOCKS4a may carry `.onion` and `.exit` suffixes
/// interpreted by the stream-mux layer" — the same splitting applies
/// wherever a destination hostname can appear (SOCKS4a hostname, SOCKS5
/// domain name).
pub fn split_dest_modifier(host: &str) -> (String, DestModifier) {
    if let Some(base) = host.strip_suffix(".onion") {
        return (format!("{base}.onion"), DestModifier::Onion);
    }
    if let Some(base) = host.strip_suffix(".exit") {
        if let Some((rest, nickname)) = base.rsplit_once('.') {
            return (rest.to_string(), DestModifier::ExitNode(nickname.to_string()));
        }
        return (base.to_string(), DestModifier::ExitNode(String::new()));
    }
    (host.to_string(), DestModifier::None)
}

/// Optional username/password credentials a client presented (SOCKS4's
/// userid field, or SOCKS5 username/password auth).
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct SocksAuth {
    /// The username/userid field, if any.
    pub username: Vec<u8>,
    /// The password field, if any (SOCKS5 only).
    pub password: Vec<u8>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn onion_suffix_is_recognized() {
        let (base, m) = split_dest_modifier("abcdefghijklmnop.onion");
        assert_eq!(base, "abcdefghijklmnop.onion");
        assert_eq!(m, DestModifier::Onion);
    }

    #[test]
    fn exit_suffix_strips_the_nickname() {
        let (base, m) = split_dest_modifier("www.example.com.relay1.exit");
        assert_eq!(base, "www.example.com");
        assert_eq!(m, DestModifier::ExitNode("relay1".into()));
    }

    #[test]
    fn plain_hostname_has_no_modifier() {
        let (base, m) = split_dest_modifier("example.com");
        assert_eq!(base, "example.com");
        assert_eq!(m, DestModifier::None);
    }
}
