//! RSA identity keys.
//!
//! Identity keys are 1024-bit RSA keys (public exponent 65537). A relay's
//! identity "fingerprint" is the SHA-1 digest of its public key's PKCS#1
//! DER encoding — the same convention the historical Tor protocol uses, so
//! that a relay's identity can be compared and logged as a short, fixed-size
//! value instead of carrying the whole public key around.

use crate::d::{sha1, SHA1_LEN};
use crate::{Error, Result};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use subtle::{Choice, ConstantTimeEq};

/// Bit length of a Tor RSA identity key.
pub const RSA_KEY_BITS: usize = 1024;

/// The public exponent used for all identity keys.
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

/// Length in bytes of an [`RsaIdentity`].
pub const RSA_ID_LEN: usize = SHA1_LEN;

/// The SHA-1 digest of a relay's RSA identity public key.
///
/// This is a fixed-size value, suitable for use as a hash-map key or for
/// constant-time comparison; it is not itself a key, only a fingerprint.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct RsaIdentity {
    id: [u8; RSA_ID_LEN],
}

impl RsaIdentity {
    /// Wrap a raw 20-byte digest as an identity.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RSA_ID_LEN {
            return None;
        }
        let mut id = [0_u8; RSA_ID_LEN];
        id.copy_from_slice(bytes);
        Some(RsaIdentity { id })
    }

    /// Compute the identity fingerprint of a public key.
    pub fn from_public_key(pk: &RsaPublicKey) -> Result<Self> {
        let der = pk
            .to_pkcs1_der()
            .map_err(|e| Error::Rsa(format!("encoding public key: {e}")))?;
        Ok(RsaIdentity {
            id: sha1(der.as_bytes()),
        })
    }

    /// View the raw bytes of this identity.
    pub fn as_bytes(&self) -> &[u8] {
        &self.id
    }
}

impl ConstantTimeEq for RsaIdentity {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.id.ct_eq(&other.id)
    }
}

impl fmt::Display for RsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", hex::encode_upper(self.id))
    }
}

impl fmt::Debug for RsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RsaIdentity({self})")
    }
}

/// An RSA identity keypair: the private key, plus its cached fingerprint.
pub struct KeyPair {
    private: RsaPrivateKey,
    identity: RsaIdentity,
}

impl KeyPair {
    /// Wrap an existing private key, computing its fingerprint.
    pub fn from_private_key(private: RsaPrivateKey) -> Result<Self> {
        let public = RsaPublicKey::from(&private);
        let identity = RsaIdentity::from_public_key(&public)?;
        Ok(KeyPair { private, identity })
    }

    /// This keypair's public half.
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.private)
    }

    /// This keypair's private half.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// This keypair's identity fingerprint.
    pub fn identity(&self) -> RsaIdentity {
        self.identity
    }
}

/// Generate a fresh 1024-bit RSA identity keypair.
///
/// This is slow (a few hundred milliseconds is typical); callers on a
/// relay's startup path should expect that and not call it from a hot
/// loop.
pub fn generate_identity_keypair<R: rand::CryptoRng + rand::RngCore>(
    rng: &mut R,
) -> Result<KeyPair> {
    let private = RsaPrivateKey::new(rng, RSA_KEY_BITS)
        .map_err(|e| Error::Rsa(format!("key generation failed: {e}")))?;
    KeyPair::from_private_key(private)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_roundtrips_through_bytes() {
        let bytes = [0x42_u8; RSA_ID_LEN];
        let id = RsaIdentity::from_bytes(&bytes).unwrap();
        assert_eq!(id.as_bytes(), &bytes[..]);
        assert_eq!(format!("{id}").len(), RSA_ID_LEN * 2 + 1);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(RsaIdentity::from_bytes(&[0; 19]).is_none());
        assert!(RsaIdentity::from_bytes(&[0; 21]).is_none());
    }

    #[test]
    fn generated_keypair_has_a_stable_identity() {
        let mut rng = rand::rngs::OsRng;
        let kp = generate_identity_keypair(&mut rng).unwrap();
        let id_again = RsaIdentity::from_public_key(&kp.public_key()).unwrap();
        assert_eq!(kp.identity().as_bytes(), id_again.as_bytes());
    }
}
