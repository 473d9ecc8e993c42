//! OR-links: the TLS-protected duplex connections circuits are routed
//! over (spec §4.C, §3's `OrLink`).
//!
//! This module owns one link's framing, identity pinning, and send-side
//! back-pressure. A link *cache* keyed by peer identity (reusing one
//! link for every circuit that needs it, expiring idle ones) is a
//! separate concern, layered on top by a link manager.

use crate::err::{Error, Result};
use crate::token_bucket::TokenBucket;
use futures_util::{SinkExt, StreamExt};
use orcore_cell::{ChanCell, ChannelCodec};
use orcore_llcrypto::pk::rsa::RsaIdentity;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

/// An OR-link's connection-level state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkState {
    /// TCP connect in flight.
    Connecting,
    /// TLS handshake and identity verification in flight.
    Handshaking,
    /// Handshake complete; identity pinned; ready to carry cells.
    Open,
    /// Draining outbound buffer before tearing down.
    Closing,
}

/// One OR-link: a framed cell stream over an already-established TLS
/// session, plus the bookkeeping spec §3 attaches to `OrLink`.
pub struct Channel<S> {
    framed: Framed<S, ChannelCodec>,
    peer_identity: Option<RsaIdentity>,
    state: LinkState,
    send_bucket: TokenBucket,
    created_at: Instant,
    last_read: Instant,
    last_written: Instant,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected TLS session as a link in `Handshaking`
    /// state (the caller still needs to pin the peer's identity via
    /// [`Channel::pin_identity`] before it's usable).
    pub fn new(tls_session: S, bandwidth_rate: u64, bandwidth_burst: u64, now: Instant) -> Self {
        Channel {
            framed: Framed::new(tls_session, ChannelCodec::new()),
            peer_identity: None,
            state: LinkState::Handshaking,
            send_bucket: TokenBucket::new(bandwidth_rate, bandwidth_burst, now),
            created_at: now,
            last_read: now,
            last_written: now,
        }
    }

    /// This link's current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// The peer's identity digest, once pinned.
    pub fn peer_identity(&self) -> Option<RsaIdentity> {
        self.peer_identity
    }

    /// Pin the peer's identity to `observed`, checked against
    /// `expected` if this link was opened to reach a specific relay.
    /// Per spec §4.C, a mismatch against an expected identity is a fatal
    /// link error; once pinned, the link moves to `Open`.
    pub fn pin_identity(&mut self, observed: RsaIdentity, expected: Option<RsaIdentity>) -> Result<()> {
        use subtle::ConstantTimeEq;
        if let Some(expected) = expected {
            if observed.ct_eq(&expected).unwrap_u8() == 0 {
                return Err(Error::LinkFailure(
                    "peer's TLS identity didn't match the identity this link was dialed for".into(),
                ));
            }
        }
        self.peer_identity = Some(observed);
        self.state = LinkState::Open;
        Ok(())
    }

    /// Refill this link's send-side token bucket for the current time.
    pub fn refill_bucket(&mut self, now: Instant) {
        self.send_bucket.refill(now);
    }

    /// True if the link currently has no send budget — the scheduler
    /// should not consider it writable until the next refill.
    pub fn is_send_blocked(&self) -> bool {
        self.send_bucket.is_empty()
    }

    /// Send one cell, respecting the link's token bucket. Debits
    /// `orcore_cell::CELL_LEN` tokens per cell (the whole on-wire frame,
    /// not just the payload) before writing it.
    pub async fn send_cell(&mut self, cell: ChanCell, now: Instant) -> Result<()> {
        self.refill_bucket(now);
        if !self.send_bucket.try_take(orcore_cell::CELL_LEN as u64) {
            return Err(Error::ProtocolViolation(
                "send_cell called while the link's token bucket is empty".into(),
            ));
        }
        self.framed.send(cell).await.map_err(Error::from)?;
        self.last_written = now;
        Ok(())
    }

    /// Receive the next cell, or `None` on a clean EOF.
    pub async fn recv_cell(&mut self, now: Instant) -> Result<Option<ChanCell>> {
        match self.framed.next().await {
            Some(Ok(cell)) => {
                self.last_read = now;
                Ok(Some(cell))
            }
            Some(Err(e)) => Err(Error::from(e)),
            None => Ok(None),
        }
    }

    /// Mark the link as draining; once the outbound buffer empties, the
    /// caller should drop it.
    pub fn begin_close(&mut self) {
        self.state = LinkState::Closing;
    }

    /// How long since this link was created.
    pub fn age(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// How long since a cell was last read on this link.
    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_read.max(self.last_written))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn fresh_link_starts_handshaking_with_no_identity() {
        let (a, _b) = duplex(4096);
        let ch = Channel::new(a, 1_000_000, 1_000_000, Instant::now());
        assert_eq!(ch.state(), LinkState::Handshaking);
        assert!(ch.peer_identity().is_none());
    }

    #[test]
    fn pin_identity_rejects_a_mismatched_expected_identity() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (a, _b) = duplex(4096);
            let mut ch = Channel::new(a, 1_000_000, 1_000_000, Instant::now());
            let observed = RsaIdentity::from_bytes(&[1; 20]).unwrap();
            let expected = RsaIdentity::from_bytes(&[2; 20]).unwrap();
            assert!(ch.pin_identity(observed, Some(expected)).is_err());
            assert_eq!(ch.state(), LinkState::Handshaking);
        });
    }

    #[test]
    fn pin_identity_with_matching_expectation_opens_the_link() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (a, _b) = duplex(4096);
            let mut ch = Channel::new(a, 1_000_000, 1_000_000, Instant::now());
            let observed = RsaIdentity::from_bytes(&[3; 20]).unwrap();
            ch.pin_identity(observed, Some(observed)).unwrap();
            assert_eq!(ch.state(), LinkState::Open);
            assert_eq!(ch.peer_identity(), Some(observed));
        });
    }
}
