//! The in-memory router directory (spec §3's `RouterSet`).

use crate::descriptor::RouterDescriptor;
use orcore_llcrypto::pk::rsa::RsaIdentity;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Identity-keyed map of routers, with secondary lookup indices.
///
/// At most one descriptor exists per identity digest; the `(addr, port)`
/// index is allowed to collide (two routers sharing an address is
/// tolerated, not treated as an error) per spec §3's invariant.
#[derive(Default)]
pub struct RouterSet {
    by_identity: HashMap<RsaIdentity, RouterDescriptor>,
    by_nickname: HashMap<String, RsaIdentity>,
    by_addr_port: HashMap<(Ipv4Addr, u16), Vec<RsaIdentity>>,
}

impl RouterSet {
    /// An empty router set.
    pub fn new() -> Self {
        RouterSet::default()
    }

    /// Insert or replace the descriptor for `identity`. The newest arrival
    /// always wins, per spec §3.
    pub fn upsert(&mut self, identity: RsaIdentity, rd: RouterDescriptor) {
        self.remove(identity);
        self.by_nickname.insert(rd.nickname().to_owned(), identity);
        self.by_addr_port.entry(rd.addr_port()).or_default().push(identity);
        self.by_identity.insert(identity, rd);
    }

    /// Remove the descriptor for `identity`, if present.
    pub fn remove(&mut self, identity: RsaIdentity) {
        if let Some(old) = self.by_identity.remove(&identity) {
            self.by_nickname.remove(old.nickname());
            if let Some(v) = self.by_addr_port.get_mut(&old.addr_port()) {
                v.retain(|id| *id != identity);
            }
        }
    }

    /// Look up a router by identity digest.
    pub fn by_identity(&self, identity: RsaIdentity) -> Option<&RouterDescriptor> {
        self.by_identity.get(&identity)
    }

    /// Look up a router by nickname.
    pub fn by_nickname(&self, nickname: &str) -> Option<&RouterDescriptor> {
        self.by_nickname.get(nickname).and_then(|id| self.by_identity(*id))
    }

    /// Look up all routers known at an `(addr, port)` pair.
    pub fn by_addr_port(&self, addr: Ipv4Addr, port: u16) -> Vec<&RouterDescriptor> {
        self.by_addr_port
            .get(&(addr, port))
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_identity(*id))
            .collect()
    }

    /// Iterate over every router currently in the set.
    pub fn iter(&self) -> impl Iterator<Item = &RouterDescriptor> {
        self.by_identity.values()
    }

    /// Number of routers currently in the set.
    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    /// True if the set has no routers.
    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exitpolicy::ExitPolicy;
    use orcore_llcrypto::pk::rsa::generate_identity_keypair;

    fn fake_router(id_byte: u8, nickname: &str) -> (RsaIdentity, RouterDescriptor) {
        let mut rng = rand::rngs::OsRng;
        let kp = generate_identity_keypair(&mut rng).unwrap();
        let identity = RsaIdentity::from_bytes(&[id_byte; 20]).unwrap();
        let rd = RouterDescriptor::new(
            identity,
            nickname.to_string(),
            Ipv4Addr::new(10, 0, 0, id_byte),
            9001,
            kp.public_key(),
            1_000_000,
            vec![],
            ExitPolicy::default(),
            crate::descriptor::RouterFlags::VALID | crate::descriptor::RouterFlags::RUNNING,
        );
        (identity, rd)
    }

    #[test]
    fn upsert_then_lookup_by_all_indices() {
        let mut rs = RouterSet::new();
        let (id, rd) = fake_router(1, "Alice");
        rs.upsert(id, rd);

        assert!(rs.by_identity(id).is_some());
        assert!(rs.by_nickname("Alice").is_some());
        assert_eq!(rs.by_addr_port(Ipv4Addr::new(10, 0, 0, 1), 9001).len(), 1);
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn newest_arrival_replaces_old_by_identity() {
        let mut rs = RouterSet::new();
        let (id, rd1) = fake_router(2, "Bob");
        rs.upsert(id, rd1);
        let (_, rd2) = fake_router(2, "BobTwo");
        rs.upsert(id, rd2);

        assert!(rs.by_nickname("Bob").is_none());
        assert!(rs.by_nickname("BobTwo").is_some());
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn removal_clears_all_indices() {
        let mut rs = RouterSet::new();
        let (id, rd) = fake_router(3, "Carol");
        rs.upsert(id, rd);
        rs.remove(id);
        assert!(rs.by_identity(id).is_none());
        assert!(rs.by_nickname("Carol").is_none());
        assert!(rs.by_addr_port(Ipv4Addr::new(10, 0, 0, 3), 9001).is_empty());
    }
}
