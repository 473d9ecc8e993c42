//! `ChanMgr`: get-or-launch caching of OR-links by peer identity (spec
//! §4.C), grounded on the open/building/join pattern of a channel
//! manager, adapted here to drive concrete TLS dialing directly rather
//! than through a runtime-abstraction trait.

use crate::connector::{self, LinkTarget, OrStream};
use crate::err::{Error, Result};
use crate::map::{BuildResult, ChannelMap, JoinAction};
use crate::SharedChannel;
use orcore_llcrypto::pk::rsa::RsaIdentity;
use rand::Rng;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Bounds for the random "how long may this link sit idle" duration
/// assigned when a link opens, mirroring the teacher's jittered
/// 180..270s window so idle links across a relay don't all expire in
/// the same instant.
const MAX_UNUSED_RANGE: std::ops::Range<u64> = 180..270;

/// Default deadline for dialing a peer and completing TLS.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The per-link send-side token bucket parameters every new link starts
/// with.
#[derive(Clone, Copy, Debug)]
pub struct BandwidthParams {
    /// Bytes per second the bucket refills at.
    pub rate: u64,
    /// Maximum burst the bucket can hold.
    pub burst: u64,
}

/// Caches OR-links by peer identity, launching a new one on a cache miss
/// and deduplicating concurrent requests for the same identity.
pub struct ChanMgr {
    channels: ChannelMap,
    bandwidth: BandwidthParams,
    connect_timeout: Duration,
    my_addrs: Vec<Ipv4Addr>,
}

impl ChanMgr {
    /// A fresh, empty manager. `my_addrs` is advertised in the
    /// `NETINFO` cell every newly-dialed link exchanges (spec §2's
    /// "Supplemented features"): the address(es) this relay believes
    /// itself reachable at.
    pub fn new(bandwidth: BandwidthParams, connect_timeout: Duration, my_addrs: Vec<Ipv4Addr>) -> Self {
        ChanMgr {
            channels: ChannelMap::new(),
            bandwidth,
            connect_timeout,
            my_addrs,
        }
    }

    /// Get an open link to `target`, launching one if none exists yet
    /// (spec §4.C's `get_or_connect`). Concurrent callers asking for the
    /// same identity join the same in-flight build rather than dialing
    /// twice.
    pub async fn get_or_connect(&self, target: LinkTarget) -> Result<SharedChannel> {
        let ident = target
            .expected_identity
            .expect("get_or_connect always dials toward a known identity");

        loop {
            match self.channels.start_or_join(ident) {
                JoinAction::UseExisting(channel) => return Ok(channel),
                JoinAction::Join(mut rx) => match rx.changed().await {
                    Ok(()) => {
                        if let Some(result) = rx.borrow().clone() {
                            return result;
                        }
                        // Spurious wakeup with no value yet; retry the wait.
                        continue;
                    }
                    Err(_) => {
                        // The builder disappeared without publishing a result;
                        // fall through and become the new builder ourselves.
                        continue;
                    }
                },
                JoinAction::Build(tx) => {
                    let result = self.build_and_register(ident, target).await;
                    match &result {
                        Ok(_) => {}
                        Err(_) => self.channels.finish_failed(&ident),
                    }
                    let _ = tx.send(Some(result.clone()));
                    return result;
                }
            }
        }
    }

    async fn build_and_register(&self, ident: RsaIdentity, target: LinkTarget) -> BuildResult {
        debug!(peer = %ident, "dialing OR-link");
        let (tls, observed): (OrStream, RsaIdentity) = connector::dial(target, self.connect_timeout).await?;

        let now = Instant::now();
        let mut channel = orcore_proto::Channel::new(tls, self.bandwidth.rate, self.bandwidth.burst, now);
        channel
            .pin_identity(observed, target.expected_identity)
            .map_err(|e| Error::Proto(ident, e))?;

        orcore_proto::linkhandshake::run(&mut channel, target.addr, self.my_addrs.clone(), now)
            .await
            .map_err(|e| Error::Proto(ident, e))?;

        let shared: SharedChannel = Arc::new(AsyncMutex::new(channel));
        let max_unused = Duration::from_secs(rand::thread_rng().gen_range(MAX_UNUSED_RANGE));
        self.channels.finish_open(ident, shared.clone(), max_unused);
        Ok(shared)
    }

    /// Mark `ident`'s link closed and drop it from the cache (spec
    /// §4.C's `close`). The caller is responsible for actually flushing
    /// and tearing down the link; every circuit that referenced it
    /// observes the next send/recv failing.
    pub fn close(&self, ident: &RsaIdentity) {
        warn!(peer = %ident, "closing OR-link");
        self.channels.remove(ident);
    }

    /// Sweep idle links past their assigned budget. Returns how long
    /// until the next link could plausibly expire, for the scheduler to
    /// use as its next wakeup interval (spec §4.H point 5).
    pub fn expire_idle(&self, now: Instant) -> Duration {
        self.channels.expire_idle(now)
    }

    /// How many links (open or building) this manager currently tracks.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True if this manager tracks no links at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
