//! The TAP circuit-creation handshake (spec §4.E).
//!
//! A `CREATE`/`CREATE2`-equivalent exchange runs once per hop: the client
//! (whoever is extending the circuit by one hop) generates a fresh DH key,
//! hybrid-encrypts its public value to the target's onion key, and the
//! target replies with its own DH public value plus a key-confirmation tag.
//! Both sides then derive the same 72 bytes of per-hop key material from
//! the shared secret.

use crate::crypto::{hop_material_from_shared_secret, key_confirmation_tag, HopCrypto};
use crate::err::{Error, Result};
use orcore_llcrypto::dh::{Dh, DH_LEN};
use orcore_llcrypto::pk::tap::{pk_hybrid_decrypt, pk_hybrid_encrypt, Padding};
use rand::{CryptoRng, RngCore};
use rsa::{RsaPrivateKey, RsaPublicKey};

/// Length in bytes of the key-confirmation tag in a `CREATED` payload.
pub const AUTH_TAG_LEN: usize = 20;

/// Length in bytes of a `CREATE`/`RELAY_EXTEND` onion skin, for every
/// onion key this workspace generates: a 1024-bit RSA modulus (128
/// bytes) is too small to directly OAEP-encrypt a 128-byte DH public
/// value (86 usable bytes after OAEP's 42 bytes of overhead), so
/// [`orcore_llcrypto::pk::tap::pk_hybrid_encrypt`] falls back to hybrid
/// mode: one 128-byte RSA block carrying the AES key plus a 70-byte
/// prefix, followed by 58 AES-CTR-encrypted tail bytes. A receiver
/// slicing a onion skin out of a zero-padded fixed-length cell body
/// needs to know this exact length up front, the same way
/// [`ClientHandshake::finish`] already knows `CREATED`'s fixed
/// `DH_LEN + AUTH_TAG_LEN`.
pub const CREATE_ONION_SKIN_LEN: usize = 186;

/// The client side of a create handshake, after generating its DH keypair
/// but before hearing back from the target hop.
pub struct ClientHandshake {
    dh: Dh,
}

/// What a completed create handshake hands back to its caller: the keyed
/// crypto state for the new hop, ready to push onto an [`crate::crypto::OriginCrypt`].
pub struct HandshakeOutput {
    /// The new hop's layered crypto state.
    pub hop_crypto: HopCrypto,
}

impl ClientHandshake {
    /// Start a handshake against `target_onion_key`, producing the bytes to
    /// send as a `CREATE` cell's payload (or embed in a `RELAY_EXTEND`).
    pub fn begin<R: CryptoRng + RngCore>(
        target_onion_key: &RsaPublicKey,
        rng: &mut R,
    ) -> Result<(Self, Vec<u8>)> {
        let dh = Dh::new(rng);
        let onion_skin = pk_hybrid_encrypt(target_onion_key, &dh.public_key(), Padding::Oaep, rng)
            .map_err(Error::from)?;
        Ok((ClientHandshake { dh }, onion_skin))
    }

    /// Finish the handshake given the target's `CREATED`/`EXTENDED` reply:
    /// `g^y (128 bytes) ∥ key-confirmation tag (20 bytes)`.
    pub fn finish(self, reply: &[u8]) -> Result<HandshakeOutput> {
        if reply.len() != DH_LEN + AUTH_TAG_LEN {
            return Err(Error::ProtocolViolation(format!(
                "create reply was {} bytes, expected {}",
                reply.len(),
                DH_LEN + AUTH_TAG_LEN
            )));
        }
        let (peer_public, tag) = reply.split_at(DH_LEN);
        let shared_secret = self.dh.derive_shared_secret(peer_public).map_err(Error::from)?;
        let kdf_output = hop_material_from_shared_secret(&shared_secret).map_err(Error::from)?;
        let expected_tag = key_confirmation_tag(&kdf_output);
        if tag != expected_tag {
            return Err(Error::BadHandshakeAuth);
        }
        Ok(HandshakeOutput {
            hop_crypto: HopCrypto::from_kdf_output(&kdf_output),
        })
    }
}

/// The relay side of a create handshake: given an inbound `CREATE`
/// payload and this relay's own onion keypair, produce the `CREATED`
/// reply payload and the keyed crypto state for this hop.
pub fn respond<R: CryptoRng + RngCore>(
    onion_private_key: &RsaPrivateKey,
    onion_skin: &[u8],
    rng: &mut R,
) -> Result<(Vec<u8>, HopCrypto)> {
    let client_public = pk_hybrid_decrypt(onion_private_key, onion_skin, Padding::Oaep).map_err(Error::from)?;
    if client_public.len() != DH_LEN {
        return Err(Error::ProtocolViolation(format!(
            "onion skin decrypted to {} bytes, expected a {}-byte DH public value",
            client_public.len(),
            DH_LEN
        )));
    }
    let dh = Dh::new(rng);
    let shared_secret = dh.derive_shared_secret(&client_public).map_err(Error::from)?;
    let kdf_output = hop_material_from_shared_secret(&shared_secret).map_err(Error::from)?;
    let tag = key_confirmation_tag(&kdf_output);

    let mut reply = Vec::with_capacity(DH_LEN + AUTH_TAG_LEN);
    reply.extend_from_slice(&dh.public_key());
    reply.extend_from_slice(&tag);

    Ok((reply, HopCrypto::from_kdf_output(&kdf_output)))
}

#[cfg(test)]
mod test {
    use super::*;
    use orcore_llcrypto::pk::rsa::generate_identity_keypair;

    #[test]
    fn client_and_relay_derive_matching_hop_crypto() {
        let mut rng = rand::rngs::OsRng;
        let relay_keys = generate_identity_keypair(&mut rng).unwrap();

        let (client, onion_skin) =
            ClientHandshake::begin(&relay_keys.public_key(), &mut rng).unwrap();
        let (created_payload, mut relay_hop) =
            respond(relay_keys.private_key(), &onion_skin, &mut rng).unwrap();
        let HandshakeOutput { hop_crypto: mut client_hop } =
            client.finish(&created_payload).unwrap();

        // Both sides keyed the same forward/backward AES-CTR streams: a
        // cell one side originates forward should decrypt clean on the
        // other (keystreams derived from the same `Kf`/`Kb` XOR to zero
        // when you apply them both in sequence).
        let mut buf = [0x42_u8; orcore_cell::CELL_DATA_LEN];
        let original = buf;
        client_hop.xor_forward(&mut buf);
        relay_hop.xor_forward(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn truncated_created_reply_is_rejected() {
        let mut rng = rand::rngs::OsRng;
        let relay_keys = generate_identity_keypair(&mut rng).unwrap();
        let (client, _onion_skin) =
            ClientHandshake::begin(&relay_keys.public_key(), &mut rng).unwrap();
        assert!(client.finish(&[0_u8; 10]).is_err());
    }

    #[test]
    fn tampered_confirmation_tag_is_rejected() {
        let mut rng = rand::rngs::OsRng;
        let relay_keys = generate_identity_keypair(&mut rng).unwrap();
        let (client, onion_skin) =
            ClientHandshake::begin(&relay_keys.public_key(), &mut rng).unwrap();
        let (mut created_payload, _relay_hop) =
            respond(relay_keys.private_key(), &onion_skin, &mut rng).unwrap();
        let last = created_payload.len() - 1;
        created_payload[last] ^= 0xff;
        assert!(matches!(client.finish(&created_payload), Err(Error::BadHandshakeAuth)));
    }
}
