//! `CircMgr`: path selection, first-hop link acquisition, circuit-ID
//! allocation, and retried circuit building (spec §4.D + §4.E glue).

use crate::build;
use crate::err::{Error, Result};
use crate::path;
use crate::timeouts::BuildTimeoutEstimator;
use orcore_cell::CircId;
use orcore_chanmgr::{ChanMgr, LinkTarget, SharedChannel};
use orcore_llcrypto::pk::rsa::RsaIdentity;
use orcore_netdir::{CircuitPurpose, PathPolicy, RouterSet};
use orcore_proto::{Circuit, CircIdRange, CircMap};
use retry_error::RetryError;
use std::collections::HashMap;
use std::sync::Mutex as SyncMutex;
use std::time::Instant;

/// How many times to retry path selection and circuit build before
/// giving up and reporting every failure (spec §4.D point 6: "the caller
/// may retry after the next router-set refresh").
const N_ATTEMPTS: usize = 3;

/// Everything a successful build hands back: the link it rode in on
/// (shared with every other circuit on that link), its ID on that link,
/// and the built circuit state itself.
pub struct BuiltCircuit {
    /// The first-hop link this circuit was built over.
    pub channel: SharedChannel,
    /// This circuit's ID on `channel`.
    pub circ_id: CircId,
    /// The circuit's lifecycle and cryptographic state.
    pub circuit: Circuit,
}

fn map_purpose(p: CircuitPurpose) -> orcore_proto::CircuitPurpose {
    match p {
        CircuitPurpose::General => orcore_proto::CircuitPurpose::General,
        CircuitPurpose::DirectoryFetch => orcore_proto::CircuitPurpose::DirectoryFetch,
    }
}

/// Selects paths, acquires first-hop links, and drives circuit builds.
pub struct CircMgr {
    chanmgr: std::sync::Arc<ChanMgr>,
    my_identity: RsaIdentity,
    circ_ids: SyncMutex<HashMap<RsaIdentity, CircMap<()>>>,
    timeouts: SyncMutex<BuildTimeoutEstimator>,
}

impl CircMgr {
    /// A fresh manager. `my_identity` decides which half of each link's
    /// circuit-ID space this side owns (spec §4.C).
    pub fn new(chanmgr: std::sync::Arc<ChanMgr>, my_identity: RsaIdentity) -> Self {
        CircMgr {
            chanmgr,
            my_identity,
            circ_ids: SyncMutex::new(HashMap::new()),
            timeouts: SyncMutex::new(BuildTimeoutEstimator::new()),
        }
    }

    /// Select a path and build one circuit over it, retrying up to
    /// [`N_ATTEMPTS`] times (fresh path each attempt) before giving up.
    pub async fn get_circuit(
        &self,
        routers: &RouterSet,
        policy: &PathPolicy,
        hop_count: usize,
        purpose: CircuitPurpose,
    ) -> Result<BuiltCircuit> {
        let mut errors = RetryError::in_attempt_to("build a circuit");
        for _ in 0..N_ATTEMPTS {
            match self.build_once(routers, policy, hop_count, purpose).await {
                Ok(built) => return Ok(built),
                Err(e) => errors.push(Box::new(e)),
            }
        }
        Err(Error::RequestFailed(errors))
    }

    async fn build_once(
        &self,
        routers: &RouterSet,
        policy: &PathPolicy,
        hop_count: usize,
        purpose: CircuitPurpose,
    ) -> Result<BuiltCircuit> {
        let mut rng = rand::thread_rng();
        let path = path::choose_path(routers, policy, hop_count, purpose, &mut rng)?;
        let first = &path[0];
        let (addr, or_port) = first.addr_port();
        let target = LinkTarget { addr, or_port, expected_identity: Some(first.identity()) };
        let channel = self.chanmgr.get_or_connect(target).await?;

        let circ_id = self
            .allocate_circ_id(first.identity())
            .ok_or_else(|| Error::Proto(orcore_proto::Error::IdRangeFull))?;

        let timeout = self.timeouts.lock().expect("circmgr lock poisoned").timeout();
        let started = Instant::now();
        let proto_purpose = map_purpose(purpose);

        let result = tokio::time::timeout(
            timeout,
            build::build_origin_circuit(&channel, circ_id, &path, proto_purpose, &mut rng),
        )
        .await;

        match result {
            Ok(Ok(circuit)) => {
                self.timeouts
                    .lock()
                    .expect("circmgr lock poisoned")
                    .note_build_completed(started.elapsed());
                Ok(BuiltCircuit { channel, circ_id, circuit })
            }
            Ok(Err(e)) => {
                self.release_circ_id(first.identity(), circ_id);
                Err(e)
            }
            Err(_) => {
                self.release_circ_id(first.identity(), circ_id);
                Err(Error::BuildTimeout)
            }
        }
    }

    fn allocate_circ_id(&self, peer: RsaIdentity) -> Option<CircId> {
        let mut tables = self.circ_ids.lock().expect("circmgr lock poisoned");
        let range = CircIdRange::for_identities(self.my_identity.as_bytes(), peer.as_bytes());
        let table = tables.entry(peer).or_insert_with(|| CircMap::new(range));
        table.add_ent(&mut rand::thread_rng(), ())
    }

    fn release_circ_id(&self, peer: RsaIdentity, circ_id: CircId) {
        let mut tables = self.circ_ids.lock().expect("circmgr lock poisoned");
        if let Some(table) = tables.get_mut(&peer) {
            table.remove(circ_id);
        }
    }
}
