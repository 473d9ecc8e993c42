//! `VERSIONS`/`NETINFO`: the link-level administrative handshake an
//! `OrLink` runs once, right after TLS and identity pinning and before
//! any circuit ever uses the link (spec §4.B/§4.C). Neither cell
//! addresses a circuit (`accepts_circid` requires `None` for both), and
//! neither has any effect on the relay-cell dispatch table in §4.F/§4.G
//! — this is purely link bookkeeping.

use crate::err::{Error, Result};
use orcore_cell::{ChanCell, ChanCmd};
use std::net::Ipv4Addr;
use tokio::io::{AsyncRead, AsyncWrite};

/// The one link protocol version this engine speaks. Real Tor negotiates
/// a highest-common version across a list; this workspace has exactly
/// one link protocol revision, so negotiation only has one outcome worth
/// representing: agreement on it, or a `LinkFailure` if the peer doesn't
/// offer it.
pub const LINK_PROTOCOL_VERSION: u16 = 3;

/// Encode a `VERSIONS` cell body: a sequence of big-endian `u16` version
/// numbers this side is willing to speak.
pub fn encode_versions(versions: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(versions.len() * 2);
    for v in versions {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Decode a `VERSIONS` cell body into its list of offered versions.
pub fn decode_versions(body: &[u8]) -> Result<Vec<u16>> {
    if body.len() % 2 != 0 {
        return Err(Error::Cell(orcore_cell::Error::MalformedCell(
            "VERSIONS body has an odd number of bytes",
        )));
    }
    Ok(body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
}

/// A decoded `NETINFO` cell: the conventional Tor shape (spec §2's
/// "Supplemented features") — a timestamp, the address this relay
/// observed the peer connecting from, and the list of addresses this
/// relay believes itself reachable at.
pub struct NetInfo {
    /// Sender's view of the current time (seconds since the epoch).
    pub timestamp: u32,
    /// The address the sender believes the receiver is reachable at.
    pub other_addr: Ipv4Addr,
    /// Addresses the sender believes itself reachable at.
    pub my_addrs: Vec<Ipv4Addr>,
}

/// Encode: `4-byte timestamp ∥ 4-byte other_addr ∥ 1-byte count ∥ count ×
/// 4-byte address`.
pub fn encode_netinfo(info: &NetInfo) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 4 + 1 + info.my_addrs.len() * 4);
    out.extend_from_slice(&info.timestamp.to_be_bytes());
    out.extend_from_slice(&info.other_addr.octets());
    out.push(info.my_addrs.len().min(u8::MAX as usize) as u8);
    for addr in info.my_addrs.iter().take(u8::MAX as usize) {
        out.extend_from_slice(&addr.octets());
    }
    out
}

/// Decode a `NETINFO` body produced by [`encode_netinfo`].
pub fn decode_netinfo(body: &[u8]) -> Result<NetInfo> {
    if body.len() < 4 + 4 + 1 {
        return Err(Error::Cell(orcore_cell::Error::MalformedCell("truncated NETINFO header")));
    }
    let timestamp = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let other_addr = Ipv4Addr::new(body[4], body[5], body[6], body[7]);
    let count = body[8] as usize;
    let rest = &body[9..];
    if rest.len() < count * 4 {
        return Err(Error::Cell(orcore_cell::Error::MalformedCell("truncated NETINFO address list")));
    }
    let my_addrs = rest[..count * 4]
        .chunks_exact(4)
        .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
        .collect();
    Ok(NetInfo { timestamp, other_addr, my_addrs })
}

/// Run the `VERSIONS`/`NETINFO` exchange over an already TLS-handshaken,
/// identity-pinned link. Both sides send `VERSIONS` first, then
/// `NETINFO`; this implementation doesn't special-case which endpoint
/// dialed, since either side can send first without blocking the other
/// (`Framed`'s send/receive buffers aren't coupled).
pub async fn run<S>(
    channel: &mut crate::channel::Channel<S>,
    peer_addr: Ipv4Addr,
    my_addrs: Vec<Ipv4Addr>,
    now: std::time::Instant,
) -> Result<NetInfo>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let versions_body = encode_versions(&[LINK_PROTOCOL_VERSION]);
    let cell = ChanCell::new_var(None, ChanCmd::VERSIONS, versions_body).map_err(Error::from)?;
    channel.send_cell(cell, now).await?;

    let reply = channel
        .recv_cell(now)
        .await?
        .ok_or_else(|| Error::LinkFailure("link closed during VERSIONS exchange".into()))?;
    if reply.cmd() != ChanCmd::VERSIONS {
        return Err(Error::ProtocolViolation("expected VERSIONS as the first cell on a new link".into()));
    }
    let offered = decode_versions(reply.body().as_bytes())?;
    if !offered.contains(&LINK_PROTOCOL_VERSION) {
        return Err(Error::LinkFailure(format!(
            "peer doesn't offer link protocol version {LINK_PROTOCOL_VERSION}"
        )));
    }

    let netinfo_body = encode_netinfo(&NetInfo {
        timestamp: now.elapsed().as_secs() as u32,
        other_addr: peer_addr,
        my_addrs,
    });
    let cell = ChanCell::new_fixed(None, ChanCmd::NETINFO, netinfo_body).map_err(Error::from)?;
    channel.send_cell(cell, now).await?;

    let reply = channel
        .recv_cell(now)
        .await?
        .ok_or_else(|| Error::LinkFailure("link closed during NETINFO exchange".into()))?;
    if reply.cmd() != ChanCmd::NETINFO {
        return Err(Error::ProtocolViolation("expected NETINFO after VERSIONS".into()));
    }
    decode_netinfo(reply.body().as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn versions_round_trip() {
        let body = encode_versions(&[1, 2, 3]);
        assert_eq!(decode_versions(&body).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn netinfo_round_trip() {
        let info = NetInfo {
            timestamp: 1_700_000_000,
            other_addr: Ipv4Addr::new(203, 0, 113, 5),
            my_addrs: vec![Ipv4Addr::new(198, 51, 100, 1), Ipv4Addr::new(198, 51, 100, 2)],
        };
        let body = encode_netinfo(&info);
        let decoded = decode_netinfo(&body).unwrap();
        assert_eq!(decoded.timestamp, info.timestamp);
        assert_eq!(decoded.other_addr, info.other_addr);
        assert_eq!(decoded.my_addrs, info.my_addrs);
    }

    #[tokio::test]
    async fn run_exchanges_versions_and_netinfo_over_a_duplex_pair() {
        let (a, b) = tokio::io::duplex(4096);
        let mut ch_a = crate::channel::Channel::new(a, 1_000_000, 1_000_000, std::time::Instant::now());
        let mut ch_b = crate::channel::Channel::new(b, 1_000_000, 1_000_000, std::time::Instant::now());

        let a_fut = run(&mut ch_a, Ipv4Addr::new(10, 0, 0, 2), vec![Ipv4Addr::new(10, 0, 0, 1)], std::time::Instant::now());
        let b_fut = run(&mut ch_b, Ipv4Addr::new(10, 0, 0, 1), vec![Ipv4Addr::new(10, 0, 0, 2)], std::time::Instant::now());
        let (a_info, b_info) = tokio::join!(a_fut, b_fut);
        assert_eq!(a_info.unwrap().other_addr, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(b_info.unwrap().other_addr, Ipv4Addr::new(10, 0, 0, 1));
    }
}
