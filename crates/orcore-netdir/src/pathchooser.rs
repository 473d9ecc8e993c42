//! Bandwidth-weighted path selection over a [`RouterSet`] (spec §4.D).

use crate::descriptor::{mutually_in_family, shares_slash16, RouterDescriptor, RouterFlags};
use crate::err::{Error, Result};
use crate::routerset::RouterSet;
use orcore_llcrypto::pk::rsa::RsaIdentity;
use rand::Rng;
use std::net::Ipv4Addr;

/// Per-request path-selection policy, layered over the router set's own
/// flags.
#[derive(Clone, Debug, Default)]
pub struct PathPolicy {
    /// Identities that must never appear in the path.
    pub excluded: Vec<RsaIdentity>,
    /// If nonempty, the first hop must be one of these identities.
    pub entry_guards: Vec<RsaIdentity>,
    /// Destination the final hop must be willing to exit to, if known.
    pub exit_target: Option<(Ipv4Addr, u16)>,
}

/// Why a circuit is being built — reserved for future purpose-specific
/// selection rules; currently only affects nothing beyond bookkeeping in
/// callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitPurpose {
    /// General-purpose circuit; final hop must be flagged `Exit`.
    General,
    /// Circuit used to fetch directory information.
    DirectoryFetch,
}

/// Maximum bandwidth weight any single router contributes, per spec
/// §4.D: "each candidate's weight is `min(declared_bandwidth, 10 MB/s)`".
const MAX_WEIGHT_BYTES_PER_SEC: u64 = 10 * 1024 * 1024;

/// Choose an ordered sequence of `hop_count` routers for a new circuit.
pub fn select_path<R: Rng>(
    routers: &RouterSet,
    policy: &PathPolicy,
    hop_count: usize,
    purpose: CircuitPurpose,
    rng: &mut R,
) -> Result<Vec<RouterDescriptor>> {
    let candidates: Vec<&RouterDescriptor> = routers
        .iter()
        .filter(|r| r.flags().contains(RouterFlags::VALID | RouterFlags::RUNNING))
        .filter(|r| !policy.excluded.contains(&r.identity()))
        .collect();

    if candidates.len() < hop_count {
        return Err(Error::NoSuitablePath("fewer candidates than hop_count"));
    }

    let last = choose_last_hop(&candidates, policy, purpose, rng)?;
    let mut chosen = vec![last];

    if hop_count >= 2 {
        let first = choose_first_hop(&candidates, policy, &chosen, rng)?;
        chosen.insert(0, first);
    }

    while chosen.len() < hop_count {
        let middle = choose_middle_hop(&candidates, &chosen, rng)?;
        // Insert just before the last hop, keeping entry-side order
        // nearest-to-origin first.
        let insert_at = chosen.len() - 1;
        chosen.insert(insert_at, middle);
    }

    Ok(chosen.into_iter().cloned().collect())
}

fn is_compatible(chosen: &[&RouterDescriptor], candidate: &RouterDescriptor) -> bool {
    chosen.iter().all(|c| {
        c.identity() != candidate.identity()
            && !shares_slash16(c, candidate)
            && !mutually_in_family(c, candidate)
    })
}

fn choose_last_hop<'r, R: Rng>(
    candidates: &[&'r RouterDescriptor],
    policy: &PathPolicy,
    purpose: CircuitPurpose,
    rng: &mut R,
) -> Result<&'r RouterDescriptor> {
    let eligible: Vec<&&RouterDescriptor> = candidates
        .iter()
        .filter(|r| !r.flags().contains(RouterFlags::BAD_EXIT))
        .filter(|r| match (purpose, policy.exit_target) {
            (_, Some((addr, port))) => r.permits_exit_to(addr, port),
            (CircuitPurpose::General, None) => r.flags().contains(RouterFlags::EXIT),
            (CircuitPurpose::DirectoryFetch, None) => true,
        })
        .collect();

    weighted_pick(&eligible, rng).ok_or(Error::NoSuitablePath("no eligible exit hop"))
}

fn choose_first_hop<'r, R: Rng>(
    candidates: &[&'r RouterDescriptor],
    policy: &PathPolicy,
    chosen: &[&'r RouterDescriptor],
    rng: &mut R,
) -> Result<&'r RouterDescriptor> {
    if !policy.entry_guards.is_empty() {
        let guards: Vec<&&RouterDescriptor> = candidates
            .iter()
            .filter(|r| policy.entry_guards.contains(&r.identity()))
            .filter(|r| is_compatible(chosen, r))
            .collect();
        return weighted_pick(&guards, rng)
            .ok_or(Error::NoSuitablePath("no configured entry guard usable"));
    }

    let eligible: Vec<&&RouterDescriptor> = candidates
        .iter()
        .filter(|r| {
            r.flags().contains(
                RouterFlags::GUARD
                    | RouterFlags::FAST
                    | RouterFlags::STABLE
                    | RouterFlags::RUNNING
                    | RouterFlags::VALID,
            )
        })
        .filter(|r| is_compatible(chosen, r))
        .collect();
    weighted_pick(&eligible, rng).ok_or(Error::NoSuitablePath("no eligible entry hop"))
}

fn choose_middle_hop<'r, R: Rng>(
    candidates: &[&'r RouterDescriptor],
    chosen: &[&'r RouterDescriptor],
    rng: &mut R,
) -> Result<&'r RouterDescriptor> {
    let eligible: Vec<&&RouterDescriptor> =
        candidates.iter().filter(|r| is_compatible(chosen, r)).collect();
    weighted_pick(&eligible, rng).ok_or(Error::NoSuitablePath("no eligible middle hop"))
}

/// Pick one candidate weighted by `min(bandwidth, 10 MB/s)`, breaking
/// ties uniformly at random.
fn weighted_pick<'r, R: Rng>(
    candidates: &[&&'r RouterDescriptor],
    rng: &mut R,
) -> Option<&'r RouterDescriptor> {
    if candidates.is_empty() {
        return None;
    }
    let weights: Vec<u64> = candidates
        .iter()
        .map(|r| r.bandwidth().min(MAX_WEIGHT_BYTES_PER_SEC).max(1))
        .collect();
    let total: u64 = weights.iter().sum();
    let mut pick = rng.gen_range(0..total);
    for (r, w) in candidates.iter().zip(weights.iter()) {
        if pick < *w {
            return Some(r);
        }
        pick -= *w;
    }
    candidates.last().copied().copied()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exitpolicy::{AddrSpec, ExitPattern, ExitPolicy, PortSpec, Rule};
    use orcore_llcrypto::pk::rsa::generate_identity_keypair;

    fn router(id_byte: u8, flags: RouterFlags, bandwidth: u64) -> RouterDescriptor {
        let mut rng = rand::rngs::OsRng;
        let kp = generate_identity_keypair(&mut rng).unwrap();
        RouterDescriptor::new(
            RsaIdentity::from_bytes(&[id_byte; 20]).unwrap(),
            format!("R{id_byte}"),
            Ipv4Addr::new(10, id_byte, 0, 1),
            9001,
            kp.public_key(),
            bandwidth,
            vec![],
            ExitPolicy::new(vec![ExitPattern {
                rule: Rule::Accept,
                addr: AddrSpec::Wildcard,
                port: PortSpec::Wildcard,
            }]),
            flags,
        )
    }

    #[test]
    fn three_hop_path_has_distinct_non_colliding_routers() {
        let mut rs = RouterSet::new();
        let flags = RouterFlags::VALID
            | RouterFlags::RUNNING
            | RouterFlags::FAST
            | RouterFlags::STABLE
            | RouterFlags::EXIT
            | RouterFlags::GUARD;
        for i in 1..=3u8 {
            let r = router(i, flags, 500_000);
            rs.upsert(r.identity(), r);
        }

        let policy = PathPolicy::default();
        let mut rng = rand::thread_rng();
        let path =
            select_path(&rs, &policy, 3, CircuitPurpose::General, &mut rng).expect("path");
        assert_eq!(path.len(), 3);
        let mut ids: Vec<_> = path.iter().map(|r| r.identity()).collect();
        ids.sort_by_key(|id| *id.as_bytes());
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn too_few_candidates_is_no_suitable_path() {
        let rs = RouterSet::new();
        let policy = PathPolicy::default();
        let mut rng = rand::thread_rng();
        let err = select_path(&rs, &policy, 3, CircuitPurpose::General, &mut rng).unwrap_err();
        assert!(matches!(err, Error::NoSuitablePath(_)));
    }
}
