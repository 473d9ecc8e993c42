//! Path selection glue: adapt `orcore_netdir::select_path`'s result to
//! this crate's error type (spec §4.D).

use crate::err::{Error, Result};
use orcore_netdir::{CircuitPurpose, PathPolicy, RouterDescriptor, RouterSet};
use rand::Rng;

/// Choose an ordered hop sequence for a new circuit.
pub fn choose_path<R: Rng>(
    routers: &RouterSet,
    policy: &PathPolicy,
    hop_count: usize,
    purpose: CircuitPurpose,
    rng: &mut R,
) -> Result<Vec<RouterDescriptor>> {
    orcore_netdir::select_path(routers, policy, hop_count, purpose, rng)
        .map_err(|e| Error::NoPath(e.to_string()))
}
