//! The per-relay circuit table: the dispatcher `orcore-circmgr::build`'s
//! own module doc flags as missing ("a dispatcher... doesn't exist yet
//! in this workspace"). Demultiplexes cells arriving on *any* link by
//! circuit ID, routing each to the one [`CircuitEntry`] it belongs to,
//! regardless of which of the circuit's two neighboring links the cell
//! came in on.
//!
//! A pass-through circuit is reachable under two keys once `EXTEND`
//! succeeds — `(prev_link_identity, prev_circ_id)` and
//! `(next_link_identity, next_circ_id)` — both pointing at the same
//! entry, so the link reactor handling cells from either neighbor finds
//! its way to the same shared state.

use std::collections::HashMap;
use std::sync::Arc;

use orcore_cell::CircId;
use orcore_chanmgr::SharedChannel;
use orcore_llcrypto::pk::rsa::RsaIdentity;
use orcore_proto::{CircIdRange, Circuit, CircMap, StreamMap};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

/// Key identifying a circuit on one particular link: the link's peer
/// identity plus the circuit ID it uses on that link.
pub type CircuitKey = (RsaIdentity, CircId);

/// Everything one relay tracks about a circuit it's carrying traffic
/// for, shared between the two link reactors (if any) on its path.
pub struct CircuitEntry {
    /// Protocol-level circuit state and crypto.
    pub circuit: Circuit,
    /// The link and circuit ID this circuit arrived on.
    pub prev_channel: SharedChannel,
    pub prev_identity: RsaIdentity,
    pub prev_circ_id: CircId,
    /// The link and circuit ID this circuit was extended onto, once
    /// `EXTEND` succeeds. `None` if this relay is the circuit's exit.
    pub next_channel: Option<SharedChannel>,
    pub next_identity: Option<RsaIdentity>,
    pub next_circ_id: Option<CircId>,
    /// Streams this relay terminates on this circuit (populated only at
    /// whichever hop recognizes `RELAY_BEGIN`/`RELAY_DATA` — in
    /// practice, the exit).
    pub streams: StreamMap,
    /// The exit's own side-channel from a `RELAY_DATA` cell to the live
    /// TCP socket `RELAY_BEGIN` opened for that stream id — the stream
    /// table tracks flow-control state, not the socket itself, so an
    /// incoming cell's bytes reach their proxy task through this sender.
    pub stream_tx: HashMap<u16, mpsc::UnboundedSender<Vec<u8>>>,
}

/// Reply a pending `CREATE` is waiting on: either the `CREATED` payload,
/// or that the downstream link died before one arrived.
pub enum PendingCreateReply {
    /// The `CREATED` cell's body arrived.
    Created(Vec<u8>),
    /// The link closed, or the peer sent `DESTROY`, before replying.
    LinkFailed,
}

/// Process-wide table of every circuit this relay is currently carrying,
/// keyed by `(link identity, circuit id)` on whichever side(s) it's
/// reachable.
#[derive(Default)]
pub struct CircuitTable {
    entries: AsyncMutex<HashMap<CircuitKey, Arc<AsyncMutex<CircuitEntry>>>>,
    /// One circuit-ID allocator per peer we've ever acted as the near
    /// side of an `EXTEND` toward, so concurrent extends over the same
    /// downstream link don't collide (spec §4.C's per-link ID space).
    next_circ_ids: AsyncMutex<HashMap<RsaIdentity, CircMap<()>>>,
    /// Outstanding `CREATE`s this relay sent onto a downstream link while
    /// servicing an `EXTEND`, keyed by the circuit ID it used there.
    /// A link reactor's own read loop resolves these when the matching
    /// `CREATED` (or a link failure) arrives, rather than the `EXTEND`
    /// handler trying to `recv_cell` itself and racing that reactor.
    pending_creates: AsyncMutex<HashMap<CircuitKey, oneshot::Sender<PendingCreateReply>>>,
}

impl CircuitTable {
    /// An empty table.
    pub fn new() -> Self {
        CircuitTable::default()
    }

    /// Allocate a fresh circuit ID in our half of the space for a new
    /// `EXTEND`'s downstream link to `peer_identity`.
    pub async fn alloc_next_circ_id(&self, my_identity: RsaIdentity, peer_identity: RsaIdentity) -> Option<CircId> {
        let mut guard = self.next_circ_ids.lock().await;
        let map = guard.entry(peer_identity).or_insert_with(|| {
            let range = CircIdRange::for_identities(my_identity.as_bytes(), peer_identity.as_bytes());
            CircMap::new(range)
        });
        map.add_ent(&mut rand::thread_rng(), ())
    }

    /// Register a freshly-created circuit under its upstream key (the
    /// link/circ-id it arrived on).
    pub async fn insert_prev(&self, key: CircuitKey, entry: CircuitEntry) -> Arc<AsyncMutex<CircuitEntry>> {
        let handle = Arc::new(AsyncMutex::new(entry));
        self.entries.lock().await.insert(key, handle.clone());
        handle
    }

    /// Register an already-tracked circuit's downstream key too, once
    /// `EXTEND` succeeds, so cells arriving from the next hop find the
    /// same entry.
    pub async fn insert_next(&self, key: CircuitKey, handle: Arc<AsyncMutex<CircuitEntry>>) {
        self.entries.lock().await.insert(key, handle);
    }

    /// Look up a circuit by whichever key a link reactor received a cell
    /// under.
    pub async fn get(&self, key: &CircuitKey) -> Option<Arc<AsyncMutex<CircuitEntry>>> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Remove both keys (if present) a circuit was registered under.
    /// Called once a circuit is fully torn down (`DESTROY` processed on
    /// both sides).
    pub async fn remove_both(&self, prev: CircuitKey, next: Option<CircuitKey>) {
        let mut guard = self.entries.lock().await;
        guard.remove(&prev);
        if let Some(next) = next {
            guard.remove(&next);
        }
    }

    /// How many distinct circuit entries are live (keys may outnumber
    /// this, since a pass-through circuit registers under two).
    pub async fn approx_len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Register that we're waiting on a `CREATED` for `key` (the circuit
    /// ID we just sent a `CREATE` under on the downstream link), and hand
    /// back the receiving half.
    pub async fn register_pending_create(&self, key: CircuitKey) -> oneshot::Receiver<PendingCreateReply> {
        let (tx, rx) = oneshot::channel();
        self.pending_creates.lock().await.insert(key, tx);
        rx
    }

    /// Resolve a pending `CREATE` registered under `key`, if one is still
    /// waiting. Called by the downstream link's own reactor loop when it
    /// reads a `CREATED` (or `DESTROY`) cell under that circuit ID.
    /// Returns `false` if nothing was waiting (the cell wasn't a reply to
    /// one of our own `CREATE`s).
    pub async fn resolve_pending_create(&self, key: CircuitKey, reply: PendingCreateReply) -> bool {
        if let Some(tx) = self.pending_creates.lock().await.remove(&key) {
            let _ = tx.send(reply);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use orcore_proto::{Circuit, CircuitPurpose};
    use std::sync::Arc as StdArc;
    use tokio::sync::Mutex as TokioMutex;

    fn fake_channel() -> SharedChannel {
        // A channel over a loopback duplex pair, never actually driven in
        // this test; only its existence as a handle is needed.
        let (a, _b) = tokio::io::duplex(4096);
        let ch = orcore_proto::Channel::new(a, 1_000_000, 1_000_000, std::time::Instant::now());
        StdArc::new(TokioMutex::new(ch))
    }

    fn fake_hop_crypto() -> orcore_proto::HopCrypto {
        let material = orcore_llcrypto::kdf::kdf(b"circuit table test secret", 72).unwrap();
        orcore_proto::HopCrypto::from_kdf_output(&material)
    }

    #[tokio::test]
    async fn a_circuit_is_reachable_under_both_keys_once_extended() {
        let table = CircuitTable::new();
        let prev_identity = RsaIdentity::from_bytes(&[1; 20]).unwrap();
        let next_identity = RsaIdentity::from_bytes(&[2; 20]).unwrap();
        let prev_circ_id = CircId::new(10).unwrap();
        let next_circ_id = CircId::new(20).unwrap();

        let circuit = Circuit::new_relay(prev_identity, prev_circ_id, fake_hop_crypto(), CircuitPurpose::General);
        let entry = CircuitEntry {
            circuit,
            prev_channel: fake_channel(),
            prev_identity,
            prev_circ_id,
            next_channel: Some(fake_channel()),
            next_identity: Some(next_identity),
            next_circ_id: Some(next_circ_id),
            streams: StreamMap::new(),
            stream_tx: HashMap::new(),
        };

        let handle = table.insert_prev((prev_identity, prev_circ_id), entry).await;
        table.insert_next((next_identity, next_circ_id), handle).await;

        assert!(table.get(&(prev_identity, prev_circ_id)).await.is_some());
        assert!(table.get(&(next_identity, next_circ_id)).await.is_some());
        assert_eq!(table.approx_len().await, 2);

        table
            .remove_both((prev_identity, prev_circ_id), Some((next_identity, next_circ_id)))
            .await;
        assert!(table.get(&(prev_identity, prev_circ_id)).await.is_none());
        assert!(table.get(&(next_identity, next_circ_id)).await.is_none());
    }
}
