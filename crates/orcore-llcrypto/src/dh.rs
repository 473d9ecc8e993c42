//! Fixed-group Diffie-Hellman, as used by the legacy circuit-creation
//! handshake.
//!
//! The group is RFC 2409 §6.2's 1024-bit MODP group ("the second Oakley
//! group") with generator 2. There is exactly one group; it is not
//! negotiated, so unlike a modern DH API there is no `Group` type here,
//! only a key pair within the one fixed group.

use crate::{Error, Result};
use num_bigint_dig::BigUint;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

/// Length in bytes of a public Diffie-Hellman value in this group.
pub const DH_LEN: usize = 128;

/// The RFC 2409 §6.2 1024-bit safe prime.
const PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404",
    "DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C",
    "245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406",
    "B7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE",
    "65381FFFFFFFFFFFFFFFF",
);

/// Generator for the group.
const GENERATOR: u8 = 2;

/// Our half of a Diffie-Hellman exchange: a private exponent together with
/// the fixed group parameters.
pub struct Dh {
    private: BigUint,
}

impl Drop for Dh {
    fn drop(&mut self) {
        // BigUint doesn't implement Zeroize; overwrite what we can reach.
        let words = self.private.to_bytes_le();
        let mut words = words;
        words.zeroize();
    }
}

fn group_prime() -> BigUint {
    BigUint::parse_bytes(PRIME_HEX.as_bytes(), 16).expect("static DH prime constant is valid hex")
}

fn group_generator() -> BigUint {
    BigUint::from(GENERATOR)
}

impl Dh {
    /// Generate a fresh private exponent and return the handshake state.
    pub fn new<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        // A private exponent the same bit-length as the prime is generous
        // but simple, and matches the historical implementation's choice
        // not to use a shorter exponent for this group.
        let mut bytes = vec![0_u8; DH_LEN];
        rng.fill_bytes(&mut bytes);
        // Clamp below the prime by clearing the top bit; astronomically
        // unlikely to matter, but keeps us strictly below `p`.
        bytes[0] &= 0x7f;
        let private = BigUint::from_bytes_be(&bytes);
        Dh { private }
    }

    /// Our public value, `g^x mod p`, encoded as a fixed-width big-endian
    /// byte string.
    pub fn public_key(&self) -> [u8; DH_LEN] {
        let p = group_generator().modpow(&self.private, &group_prime());
        let bytes = p.to_bytes_be();
        let mut out = [0_u8; DH_LEN];
        out[DH_LEN - bytes.len()..].copy_from_slice(&bytes);
        out
    }

    /// Complete the exchange given the peer's public value, producing the
    /// shared secret `peer_public^x mod p`.
    ///
    /// Rejects peer values of 0, 1, or `p - 1`: these produce a shared
    /// secret that doesn't depend on our private exponent at all, which
    /// would let a malicious peer force a known key.
    pub fn derive_shared_secret(&self, peer_public: &[u8]) -> Result<Vec<u8>> {
        if peer_public.len() != DH_LEN {
            return Err(Error::BadDhPublic);
        }
        let y = BigUint::from_bytes_be(peer_public);
        let p = group_prime();
        if y <= BigUint::from(1_u8) || y >= &p - BigUint::from(1_u8) {
            return Err(Error::BadDhPublic);
        }
        let secret = y.modpow(&self.private, &p);
        let bytes = secret.to_bytes_be();
        let mut out = vec![0_u8; DH_LEN];
        out[DH_LEN - bytes.len()..].copy_from_slice(&bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn both_sides_agree_on_a_shared_secret() {
        let mut rng = rand::rngs::OsRng;
        let alice = Dh::new(&mut rng);
        let bob = Dh::new(&mut rng);

        let alice_secret = alice.derive_shared_secret(&bob.public_key()).unwrap();
        let bob_secret = bob.derive_shared_secret(&alice.public_key()).unwrap();
        assert_eq!(alice_secret, bob_secret);
    }

    #[test]
    fn degenerate_peer_values_are_rejected() {
        let mut rng = rand::rngs::OsRng;
        let alice = Dh::new(&mut rng);

        let mut zero = [0_u8; DH_LEN];
        assert!(alice.derive_shared_secret(&zero).is_err());

        zero[DH_LEN - 1] = 1;
        assert!(alice.derive_shared_secret(&zero).is_err());
    }

    #[test]
    fn wrong_length_public_value_is_rejected() {
        let mut rng = rand::rngs::OsRng;
        let alice = Dh::new(&mut rng);
        assert!(alice.derive_shared_secret(&[1, 2, 3]).is_err());
    }
}
