//! The legacy (SHA-1-based) key derivation function.
//!
//! Given a shared secret, derives as many key-schedule bytes as needed by
//! repeatedly hashing the secret with an incrementing one-byte counter:
//! `SHA1(secret || 0x00) || SHA1(secret || 0x01) || ...`, truncated to the
//! requested length. Because the counter is one byte, this can never
//! produce more than 255 digests' worth of output.

use crate::d::{Sha1, SHA1_LEN};
use crate::{Error, Result};
use digest::Digest;
use orcore_bytes::SecretBuf;

/// Largest number of bytes this KDF can ever produce.
pub const MAX_KDF_OUTPUT: usize = 255 * SHA1_LEN;

/// Derive `want_bytes` of key material from `secret`.
pub fn kdf(secret: &[u8], want_bytes: usize) -> Result<SecretBuf> {
    if want_bytes > MAX_KDF_OUTPUT {
        return Err(Error::KdfOutputTooLarge(want_bytes));
    }
    let mut out = SecretBuf::with_capacity(want_bytes);
    let mut counter: u8 = 0;
    while out.len() < want_bytes {
        let mut h = Sha1::new();
        h.update(secret);
        h.update([counter]);
        let digest = h.finalize();
        out.extend_from_slice(&digest);
        counter = counter
            .checked_add(1)
            .expect("MAX_KDF_OUTPUT bounds the counter to at most 255 iterations");
    }
    out.truncate_to(want_bytes);
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn output_is_deterministic_and_of_requested_length() {
        let a = kdf(b"shared secret material", 70).unwrap();
        let b = kdf(b"shared secret material", 70).unwrap();
        assert_eq!(&*a, &*b);
        assert_eq!(a.len(), 70);
    }

    #[test]
    fn longer_requests_extend_rather_than_reshuffle() {
        let short = kdf(b"xyz", 20).unwrap();
        let long = kdf(b"xyz", 40).unwrap();
        assert_eq!(&short[..], &long[..20]);
    }

    #[test]
    fn over_budget_requests_are_rejected() {
        assert!(kdf(b"xyz", MAX_KDF_OUTPUT + 1).is_err());
    }
}
