//! The relay's top-level, always-alive state: identity, the shared link
//! and circuit caches, this relay's own exit policy, and the per-peer
//! link-reactor dedup that keeps a busy relay from spawning two reactor
//! tasks over what should be one cached link.
//!
//! Grounded on the teacher's `TorRelay` (`arti-relay/src/relay.rs`), minus
//! its generic runtime parameter — this workspace drives everything
//! directly over `tokio` rather than through a runtime-abstraction trait.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use orcore_chanmgr::{BandwidthParams, ChanMgr, SharedChannel};
use orcore_circmgr::CircMgr;
use orcore_llcrypto::pk::rsa::{KeyPair as IdentityKeyPair, RsaIdentity};
use orcore_netdir::{ExitPolicy, RouterSet};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::debug;

use crate::config::RelayConfig;
use crate::table::CircuitTable;

/// Everything a link reactor, the exit handler, or the SOCKS listener
/// needs reach into: identity, link/circuit caches, the router set, and
/// this relay's own exit policy.
pub struct RelayContext {
    /// This relay's configuration, as loaded at startup.
    pub config: RelayConfig,
    /// This relay's long-term identity keypair.
    pub identity: IdentityKeyPair,
    /// Cached OR-links, by peer identity (spec §4.C).
    pub chanmgr: Arc<ChanMgr>,
    /// Origin-side circuit builder, used by the SOCKS listener.
    pub circmgr: Arc<CircMgr>,
    /// Every circuit this relay is currently carrying on behalf of
    /// others, keyed by link.
    pub table: Arc<CircuitTable>,
    /// Routers this relay knows about. A real directory-fetch task would
    /// refresh this continuously; this workspace only ever seeds it once
    /// from static config (see `netdir.rs`).
    pub routers: RwLock<RouterSet>,
    /// This relay's own willingness to exit to a given destination (spec
    /// §4.G, §6), distinct from any peer router's advertised policy.
    pub exit_policy: ExitPolicy,
    /// Peer identities a link reactor task is already running for, so a
    /// freshly-dialed or freshly-accepted link to a peer we're already
    /// talking to doesn't spawn a second reactor racing the first one
    /// for the same cells.
    active_links: AsyncMutex<HashSet<RsaIdentity>>,
}

impl RelayContext {
    /// Build a fresh context around a loaded config and identity keypair.
    pub fn new(
        config: RelayConfig,
        identity: IdentityKeyPair,
        my_addrs: Vec<Ipv4Addr>,
        routers: RouterSet,
        exit_policy: ExitPolicy,
    ) -> Arc<Self> {
        let bandwidth = BandwidthParams { rate: config.bandwidth_rate, burst: config.bandwidth_burst };
        let chanmgr = Arc::new(ChanMgr::new(bandwidth, config.circuit_build_timeout(), my_addrs));
        let circmgr = Arc::new(CircMgr::new(chanmgr.clone(), identity.identity()));
        Arc::new(RelayContext {
            config,
            identity,
            chanmgr,
            circmgr,
            table: Arc::new(CircuitTable::new()),
            routers: RwLock::new(routers),
            exit_policy,
            active_links: AsyncMutex::new(HashSet::new()),
        })
    }

    /// Spawn a link reactor for `channel`/`peer_identity` unless one is
    /// already running for that peer. Idempotent: safe to call from both
    /// the inbound OR-port listener and anywhere a circuit gets extended
    /// onto a fresh downstream link.
    pub async fn ensure_link_reactor(self: &Arc<Self>, peer_identity: RsaIdentity, channel: SharedChannel) {
        let mut guard = self.active_links.lock().await;
        if !guard.insert(peer_identity) {
            return;
        }
        drop(guard);

        let ctx = self.clone();
        tokio::spawn(async move {
            crate::reactor::run(ctx.clone(), channel, peer_identity).await;
            ctx.active_links.lock().await.remove(&peer_identity);
            debug!(peer = %peer_identity, "link reactor exited");
        });
    }
}
