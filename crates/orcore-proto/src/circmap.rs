//! Per-link circuit-ID allocation (spec §4.C).
//!
//! Each side of an OR-link owns one half of the 16-bit circuit-ID space,
//! split by a lexicographic comparison of the two peers' identity digests:
//! the numerically greater identity allocates with the high bit set, the
//! other with it clear. IDs are drawn uniformly at random within the
//! owned half and retried on collision against whatever's already live on
//! that link.

use orcore_cell::CircId;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use std::collections::HashMap;

/// Number of random draws to attempt before giving up and declaring the
/// owned half of the ID space full.
const N_ATTEMPTS: usize = 16;

/// Which half of the circuit-ID space a side of a link draws from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircIdRange {
    /// IDs with the high bit clear: `0x0001 ..= 0x7fff`.
    Low,
    /// IDs with the high bit set: `0x8000 ..= 0xffff`.
    High,
}

impl CircIdRange {
    /// Decide which half of the space `our_identity` draws from when
    /// talking to `peer_identity`: the numerically greater identity gets
    /// the high half.
    pub fn for_identities(our_identity: &[u8], peer_identity: &[u8]) -> Self {
        if our_identity > peer_identity {
            CircIdRange::High
        } else {
            CircIdRange::Low
        }
    }

    fn sample<R: Rng>(self, rng: &mut R) -> CircId {
        let dist = match self {
            CircIdRange::Low => Uniform::new_inclusive(0x0001_u16, 0x7fff_u16),
            CircIdRange::High => Uniform::new_inclusive(0x8000_u16, 0xffff_u16),
        };
        CircId::new(dist.sample(rng)).expect("sampled range never includes 0")
    }
}

/// The circuit-ID table for one OR-link: which IDs in our half of the
/// space are in use, mapped to whatever handle the caller wants to
/// associate (typically an index into a per-link circuit table).
pub struct CircMap<T> {
    range: CircIdRange,
    entries: HashMap<CircId, T>,
}

impl<T> CircMap<T> {
    /// A fresh, empty table for a link on which we own `range`.
    pub fn new(range: CircIdRange) -> Self {
        CircMap { range, entries: HashMap::new() }
    }

    /// Number of circuit IDs currently allocated in our half of the space.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no IDs are allocated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocate a fresh ID in our half of the space and associate it with
    /// `value`, returning the chosen ID. Fails (returning `None`) if
    /// `N_ATTEMPTS` random draws all collided — in practice only possible
    /// when the owned half is nearly full.
    pub fn add_ent<R: Rng>(&mut self, rng: &mut R, value: T) -> Option<CircId> {
        for _ in 0..N_ATTEMPTS {
            let candidate = self.range.sample(rng);
            if !self.entries.contains_key(&candidate) {
                self.entries.insert(candidate, value);
                return Some(candidate);
            }
        }
        None
    }

    /// Insert `value` at a specific `id`, bypassing random allocation —
    /// used for the far side of a link where the ID was handed to us
    /// (assigned by the peer, in their half of the space).
    pub fn insert_with_id(&mut self, id: CircId, value: T) -> Option<T> {
        self.entries.insert(id, value)
    }

    /// Look up the entry for `id`.
    pub fn get(&self, id: CircId) -> Option<&T> {
        self.entries.get(&id)
    }

    /// Look up the entry for `id`, mutably.
    pub fn get_mut(&mut self, id: CircId) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    /// Remove and return the entry for `id` (circuit torn down).
    pub fn remove(&mut self, id: CircId) -> Option<T> {
        self.entries.remove(&id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn range_choice_depends_on_identity_ordering() {
        let a = [0x01_u8; 20];
        let b = [0x02_u8; 20];
        assert_eq!(CircIdRange::for_identities(&a, &b), CircIdRange::Low);
        assert_eq!(CircIdRange::for_identities(&b, &a), CircIdRange::High);
    }

    #[test]
    fn allocated_ids_stay_within_the_owned_half() {
        let mut rng = rand::thread_rng();
        let mut map: CircMap<()> = CircMap::new(CircIdRange::High);
        for _ in 0..200 {
            let id = map.add_ent(&mut rng, ()).unwrap();
            assert!(CircId::get_or_zero(Some(id)) >= 0x8000);
        }
    }

    #[test]
    fn removed_ids_can_be_reused() {
        let mut rng = rand::thread_rng();
        let mut map = CircMap::new(CircIdRange::Low);
        let id = map.add_ent(&mut rng, "a").unwrap();
        assert_eq!(map.remove(id), Some("a"));
        assert!(map.is_empty());
    }
}
