//! The "TAP" hybrid public-key encryption scheme.
//!
//! CREATE cells carry an "onion skin": a Diffie-Hellman public value,
//! encrypted to the target relay's RSA identity key. A 1024-bit RSA key can
//! only directly encrypt a little over 100 bytes even with no padding at
//! all, which isn't enough room for padding plus a 128-byte DH public value,
//! so the protocol falls back to hybrid encryption: an ephemeral AES key is
//! RSA-encrypted alongside as much of the message as fits, and the rest of
//! the message is AES-CTR-encrypted under that key.
//!
//! Three padding modes exist because they were added to the historical
//! protocol at different times: OAEP is the original, PKCS#1 v1.5 is a
//! faster variant used in a handful of cell types, and "no padding" (raw
//! RSA) is used where the input is already a fixed-format encrypted blob
//! that provides its own integrity (nested hybrid-encrypted CREATE2 cells).

use crate::cipher::SeekableAesCtr;
use crate::{Error, Result};
use num_bigint_dig::BigUint;
use rand::{CryptoRng, RngCore};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// Length in bytes of the ephemeral AES key used in hybrid mode.
const KEY_LEN: usize = 16;

/// Which padding scheme to apply to the RSA-encrypted portion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Padding {
    /// RSA-OAEP with SHA-1, the historical default.
    Oaep,
    /// RSA PKCS#1 v1.5 encryption padding.
    Pkcs1,
    /// No padding at all: the plaintext (or hybrid header) occupies the
    /// full width of the modulus.
    None,
}

impl Padding {
    /// Bytes of overhead this padding scheme imposes on an RSA block.
    fn overhead(self) -> usize {
        match self {
            // 2 hash-length blocks plus 2 bytes of fixed overhead; SHA-1 is
            // 20 bytes, so 2*20 + 2.
            Padding::Oaep => 42,
            Padding::Pkcs1 => 11,
            Padding::None => 0,
        }
    }
}

/// Hybrid-encrypt `plaintext` to `pk` using `padding`.
///
/// If `plaintext` is short enough to fit directly in one RSA block under
/// `padding`, the result is a single RSA-encrypted block. Otherwise the
/// result is an RSA block (carrying a fresh AES key and a prefix of the
/// plaintext) followed by the AES-CTR encryption of the remaining
/// plaintext.
pub fn pk_hybrid_encrypt<R: CryptoRng + RngCore>(
    pk: &RsaPublicKey,
    plaintext: &[u8],
    padding: Padding,
    rng: &mut R,
) -> Result<Vec<u8>> {
    let modulus_len = pk.size();
    let direct_cap = modulus_len.saturating_sub(padding.overhead());

    if plaintext.len() <= direct_cap {
        return rsa_encrypt_block(pk, plaintext, padding, rng);
    }

    let prefix_cap = direct_cap.checked_sub(KEY_LEN).ok_or(Error::MessageTooLong)?;
    let mut key = [0_u8; KEY_LEN];
    rng.fill_bytes(&mut key);
    if padding == Padding::None {
        // Keep the hybrid header numerically below the modulus: clear the
        // top bit of the key so `key || prefix`, read as a big-endian
        // integer, can't exceed n.
        key[0] &= 0x7f;
    }

    let (prefix, rest) = plaintext.split_at(prefix_cap);
    let mut header = Vec::with_capacity(KEY_LEN + prefix.len());
    header.extend_from_slice(&key);
    header.extend_from_slice(prefix);

    let mut out = rsa_encrypt_block(pk, &header, padding, rng)?;

    let mut tail = rest.to_vec();
    let mut ctr = SeekableAesCtr::new(&key);
    ctr.apply_keystream(&mut tail);
    out.extend_from_slice(&tail);
    Ok(out)
}

/// Reverse of [`pk_hybrid_encrypt`].
pub fn pk_hybrid_decrypt(
    sk: &RsaPrivateKey,
    ciphertext: &[u8],
    padding: Padding,
) -> Result<Vec<u8>> {
    let modulus_len = sk.size();
    if ciphertext.len() < modulus_len {
        return Err(Error::CiphertextTooShort);
    }
    let (block, tail) = ciphertext.split_at(modulus_len);
    let decoded = rsa_decrypt_block(sk, block, padding)?;

    if ciphertext.len() == modulus_len {
        return Ok(decoded);
    }

    if decoded.len() < KEY_LEN {
        return Err(Error::CiphertextTooShort);
    }
    let (key_bytes, prefix) = decoded.split_at(KEY_LEN);
    let mut key = [0_u8; KEY_LEN];
    key.copy_from_slice(key_bytes);

    let mut rest = tail.to_vec();
    let mut ctr = SeekableAesCtr::new(&key);
    ctr.apply_keystream(&mut rest);

    let mut out = Vec::with_capacity(prefix.len() + rest.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(&rest);
    Ok(out)
}

fn rsa_encrypt_block<R: CryptoRng + RngCore>(
    pk: &RsaPublicKey,
    data: &[u8],
    padding: Padding,
    rng: &mut R,
) -> Result<Vec<u8>> {
    match padding {
        Padding::Oaep => pk
            .encrypt(rng, Oaep::new::<sha1::Sha1>(), data)
            .map_err(|e| Error::Rsa(format!("OAEP encrypt: {e}"))),
        Padding::Pkcs1 => pk
            .encrypt(rng, Pkcs1v15Encrypt, data)
            .map_err(|e| Error::Rsa(format!("PKCS1 encrypt: {e}"))),
        Padding::None => raw_rsa_encrypt(pk, data),
    }
}

fn rsa_decrypt_block(sk: &RsaPrivateKey, block: &[u8], padding: Padding) -> Result<Vec<u8>> {
    match padding {
        Padding::Oaep => sk
            .decrypt(Oaep::new::<sha1::Sha1>(), block)
            .map_err(|e| Error::Rsa(format!("OAEP decrypt: {e}"))),
        Padding::Pkcs1 => sk
            .decrypt(Pkcs1v15Encrypt, block)
            .map_err(|e| Error::Rsa(format!("PKCS1 decrypt: {e}"))),
        Padding::None => raw_rsa_decrypt(sk, block),
    }
}

/// Raw (unpadded) RSA encryption: `c = m^e mod n`.
///
/// The `rsa` crate's high-level API always applies padding, so reaching
/// the bare modular exponentiation means going through its key-parts
/// accessors directly.
fn raw_rsa_encrypt(pk: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>> {
    let modulus_len = pk.size();
    if data.len() > modulus_len {
        return Err(Error::MessageTooLong);
    }
    let m = BigUint::from_bytes_be(data);
    if &m >= pk.n() {
        return Err(Error::MessageTooLong);
    }
    let c = m.modpow(pk.e(), pk.n());
    Ok(left_pad(&c.to_bytes_be(), modulus_len))
}

/// Raw (unpadded) RSA decryption: `m = c^d mod n`.
fn raw_rsa_decrypt(sk: &RsaPrivateKey, block: &[u8]) -> Result<Vec<u8>> {
    let modulus_len = sk.size();
    let c = BigUint::from_bytes_be(block);
    if &c >= sk.n() {
        return Err(Error::Rsa("ciphertext not reduced mod n".into()));
    }
    let d = sk.d();
    let m = c.modpow(d, sk.n());
    Ok(left_pad(&m.to_bytes_be(), modulus_len))
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes.to_vec();
    }
    let mut out = vec![0_u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pk::rsa::generate_identity_keypair;

    #[test]
    fn oaep_roundtrips_short_message() {
        let mut rng = rand::rngs::OsRng;
        let kp = generate_identity_keypair(&mut rng).unwrap();
        let msg = b"a short onion skin";
        let ct = pk_hybrid_encrypt(&kp.public_key(), msg, Padding::Oaep, &mut rng).unwrap();
        let pt = pk_hybrid_decrypt(kp.private_key(), &ct, Padding::Oaep).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn hybrid_mode_roundtrips_long_message() {
        let mut rng = rand::rngs::OsRng;
        let kp = generate_identity_keypair(&mut rng).unwrap();
        let msg = vec![0xab_u8; 200];
        let ct = pk_hybrid_encrypt(&kp.public_key(), &msg, Padding::Pkcs1, &mut rng).unwrap();
        assert!(ct.len() > kp.public_key().size());
        let pt = pk_hybrid_decrypt(kp.private_key(), &ct, Padding::Pkcs1).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn raw_mode_roundtrips_with_cleared_top_bit() {
        let mut rng = rand::rngs::OsRng;
        let kp = generate_identity_keypair(&mut rng).unwrap();
        let msg = vec![0x11_u8; 150];
        let ct = pk_hybrid_encrypt(&kp.public_key(), &msg, Padding::None, &mut rng).unwrap();
        let pt = pk_hybrid_decrypt(kp.private_key(), &ct, Padding::None).unwrap();
        assert_eq!(pt, msg);
    }
}
