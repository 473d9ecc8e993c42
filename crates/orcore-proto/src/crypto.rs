//! Per-hop relay-cell cryptography (spec §4.F).
//!
//! Each hop of a circuit owns one pair of AES-CTR keys and one pair of
//! rolling SHA-1 digests — one of each per direction. "Forward" means away
//! from the circuit's origin (the direction a `BEGIN`/`DATA` cell
//! travels); "backward" means toward the origin (the direction a
//! `CONNECTED`/`EXTENDED`/`DATA` reply travels).
//!
//! AES-CTR is its own inverse, so the same keystream XOR both "decrypts" a
//! cell a peer encrypted and "encrypts" one we originate; this module
//! exposes that as a single [`HopCrypto::xor_forward`]/[`xor_backward`]
//! pair rather than separate encrypt/decrypt functions.

use orcore_cell::CELL_DATA_LEN;
use orcore_llcrypto::cipher::SeekableAesCtr;
use orcore_llcrypto::d::{sha1, Sha1, SHA1_LEN};

/// Length of the KDF output consumed per hop: two (key, digest-seed) pairs.
pub const HOP_KEY_MATERIAL_LEN: usize = 2 * (16 + SHA1_LEN);

/// A rolling per-direction digest: the truncated SHA-1 of every
/// zero-digest-field relay payload ever sent in one direction on one hop.
#[derive(Clone)]
pub struct RollingDigest {
    running: Sha1,
}

impl RollingDigest {
    /// Start a new rolling digest seeded with `Df`/`Db` from the handshake.
    pub fn new(seed: &[u8]) -> Self {
        use orcore_llcrypto::d::Digest;
        let mut running = Sha1::new();
        running.update(seed);
        RollingDigest { running }
    }

    /// Feed `zeroed_payload` (a relay payload with its digest field zeroed)
    /// into the running hash, and return the new truncated digest.
    pub fn advance(&mut self, zeroed_payload: &[u8]) -> [u8; 4] {
        use orcore_llcrypto::d::Digest;
        self.running.update(zeroed_payload);
        let full = self.running.clone().finalize();
        let mut out = [0_u8; 4];
        out.copy_from_slice(&full[..4]);
        out
    }
}

/// The cryptographic state one hop of a circuit holds for a single layer:
/// one AES-CTR keystream and one rolling digest per direction.
pub struct HopCrypto {
    fwd_cipher: SeekableAesCtr,
    bwd_cipher: SeekableAesCtr,
    fwd_digest: RollingDigest,
    bwd_digest: RollingDigest,
}

impl HopCrypto {
    /// Build a hop's crypto state from the 72 bytes of KDF output the
    /// create/extend handshake derived for it: `Kf(16) ∥ Df(20) ∥ Kb(16) ∥
    /// Db(20)`.
    pub fn from_kdf_output(material: &[u8]) -> Self {
        assert_eq!(material.len(), HOP_KEY_MATERIAL_LEN, "wrong KDF output length for a hop");
        let mut kf = [0_u8; 16];
        kf.copy_from_slice(&material[0..16]);
        let df = &material[16..36];
        let mut kb = [0_u8; 16];
        kb.copy_from_slice(&material[36..52]);
        let db = &material[52..72];
        HopCrypto {
            fwd_cipher: SeekableAesCtr::new(&kf),
            bwd_cipher: SeekableAesCtr::new(&kb),
            fwd_digest: RollingDigest::new(df),
            bwd_digest: RollingDigest::new(db),
        }
    }

    /// XOR `payload` with this hop's forward keystream. Used both to peel
    /// this hop's layer off an inbound forward cell, and to add this hop's
    /// layer when an origin is constructing an outbound forward cell.
    pub fn xor_forward(&mut self, payload: &mut [u8; CELL_DATA_LEN]) {
        self.fwd_cipher.apply_keystream(payload);
    }

    /// XOR `payload` with this hop's backward keystream.
    pub fn xor_backward(&mut self, payload: &mut [u8; CELL_DATA_LEN]) {
        self.bwd_cipher.apply_keystream(payload);
    }

    /// Stamp `payload`'s `recognized`/`digest` fields as the originator of
    /// a forward-direction cell at this hop (only the target hop of an
    /// outbound relay message does this).
    pub fn originate_forward(&mut self, payload: &mut [u8; CELL_DATA_LEN]) {
        let zeroed = orcore_cell::RelayMsg::zero_digest_field(payload);
        let digest = self.fwd_digest.advance(&zeroed);
        *payload = orcore_cell::RelayMsg::with_recognized_and_digest(payload, u32::from_be_bytes(digest));
    }

    /// Stamp `payload` as the originator of a backward-direction cell.
    pub fn originate_backward(&mut self, payload: &mut [u8; CELL_DATA_LEN]) {
        let zeroed = orcore_cell::RelayMsg::zero_digest_field(payload);
        let digest = self.bwd_digest.advance(&zeroed);
        *payload = orcore_cell::RelayMsg::with_recognized_and_digest(payload, u32::from_be_bytes(digest));
    }

    /// Test whether a just-forward-decrypted `payload` is recognized at
    /// this hop: `recognized == 0` and the rolling forward digest agrees.
    pub fn check_recognized_forward(&mut self, payload: &[u8; CELL_DATA_LEN]) -> bool {
        check_recognized(&mut self.fwd_digest, payload)
    }

    /// Test whether a just-backward-decrypted `payload` is recognized at
    /// this hop.
    pub fn check_recognized_backward(&mut self, payload: &[u8; CELL_DATA_LEN]) -> bool {
        check_recognized(&mut self.bwd_digest, payload)
    }
}

fn check_recognized(digest: &mut RollingDigest, payload: &[u8; CELL_DATA_LEN]) -> bool {
    if orcore_cell::RelayMsg::peek_recognized(payload) != 0 {
        return false;
    }
    let zeroed = orcore_cell::RelayMsg::zero_digest_field(payload);
    let expected = digest.advance(&zeroed);
    orcore_cell::RelayMsg::peek_digest(payload) == u32::from_be_bytes(expected)
}

/// The layered cryptographic state an origin circuit holds: one
/// [`HopCrypto`] per hop of its `cpath`, ordered nearest to farthest.
#[derive(Default)]
pub struct OriginCrypt {
    hops: Vec<HopCrypto>,
}

impl OriginCrypt {
    /// An origin crypt state with no hops yet (grows as `EXTEND` completes).
    pub fn new() -> Self {
        OriginCrypt { hops: Vec::new() }
    }

    /// Append the next hop's freshly derived crypto state.
    pub fn push_hop(&mut self, hop: HopCrypto) {
        self.hops.push(hop);
    }

    /// Number of hops currently keyed.
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// True if no hop has completed its handshake yet.
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Drop every hop beyond (and including) `from_index` — used when a
    /// `TRUNCATE`/`TRUNCATED` exchange shortens the path.
    pub fn truncate(&mut self, from_index: usize) {
        self.hops.truncate(from_index);
    }

    /// Encrypt an outbound forward cell addressed to hop `target`: the
    /// target hop stamps `recognized`/digest and encrypts, then every hop
    /// nearer the origin adds one more layer of forward encryption.
    pub fn encrypt_forward(&mut self, target: usize, payload: &mut [u8; CELL_DATA_LEN]) {
        self.hops[target].originate_forward(payload);
        self.hops[target].xor_forward(payload);
        for hop in self.hops[..target].iter_mut().rev() {
            hop.xor_forward(payload);
        }
    }

    /// Decrypt an inbound backward cell, peeling each hop's layer from
    /// nearest to farthest until one recognizes it. Returns the
    /// recognizing hop's index, or `None` if no layer recognized it.
    pub fn decrypt_backward(&mut self, payload: &mut [u8; CELL_DATA_LEN]) -> Option<usize> {
        for (i, hop) in self.hops.iter_mut().enumerate() {
            hop.xor_backward(payload);
            if hop.check_recognized_backward(payload) {
                return Some(i);
            }
        }
        None
    }
}

/// Derive the two 72-byte (forward, backward) KDF half-outputs used by a
/// `HopCrypto` from a raw TAP shared secret, per spec §4.E.
pub fn hop_material_from_shared_secret(shared_secret: &[u8]) -> orcore_llcrypto::Result<orcore_bytes::SecretBuf> {
    orcore_llcrypto::kdf::kdf(shared_secret, HOP_KEY_MATERIAL_LEN)
}

/// Compute the key-confirmation tag sent in a `CREATED` cell:
/// `SHA1(kdf_output[0..20])`.
pub fn key_confirmation_tag(kdf_output: &[u8]) -> [u8; SHA1_LEN] {
    sha1(&kdf_output[..SHA1_LEN])
}
