//! Stream ciphers.
//!
//! Tor's relay-cell crypto uses AES-128 in counter mode as a raw stream
//! cipher: there's no authentication at this layer (that's what the
//! rolling digest in the relay-cell header is for), and the same
//! keystream is consumed incrementally across many cells.

use ::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};

/// AES-128 in counter mode, big-endian counter — the cipher used for every
/// per-hop relay-cell crypto layer.
pub type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Number of bytes in one AES block, and so one step of the CTR counter.
pub const BLOCK_LEN: usize = 16;

/// An AES-CTR keystream with a counter that can be read, set, or nudged
/// forward or backward.
///
/// Ordinary streaming use (`apply_keystream`) never needs this, but a
/// relay recovering from a backed-up flow-control window needs to
/// re-derive a keystream segment it has already produced, which means
/// winding the counter back to where it was.
pub struct SeekableAesCtr {
    inner: Aes128Ctr,
}

impl SeekableAesCtr {
    /// Construct a new keystream from a 16-byte key, with the counter at
    /// an all-zero IV.
    pub fn new(key: &[u8; 16]) -> Self {
        let inner = Aes128Ctr::new(key.into(), &[0_u8; 16].into());
        SeekableAesCtr { inner }
    }

    /// XOR `data` in place with the next `data.len()` bytes of keystream,
    /// advancing the counter.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }

    /// Current counter position, in cipher blocks.
    pub fn block_counter(&self) -> u64 {
        self.inner.current_pos()
    }

    /// Move the counter to an absolute block position.
    pub fn seek_to_block(&mut self, block: u64) {
        self.inner.seek(block);
    }

    /// Move the counter forward (positive `delta`) or backward (negative
    /// `delta`), in units of cipher blocks.
    ///
    /// Panics if the adjustment would underflow past block zero; callers
    /// are expected to keep `delta` within a range they know is safe for
    /// the window sizes involved.
    pub fn adjust_block_counter(&mut self, delta: i64) {
        let cur = self.block_counter() as i128;
        let next = cur + delta as i128;
        assert!(next >= 0, "AES-CTR counter adjustment underflowed");
        self.seek_to_block(next as u64);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keystream_is_position_addressable() {
        let key = [7_u8; 16];
        let mut a = SeekableAesCtr::new(&key);
        let mut buf_a = [0_u8; 64];
        a.apply_keystream(&mut buf_a);

        // Re-derive the second half by seeking a fresh cipher forward.
        let mut b = SeekableAesCtr::new(&key);
        b.seek_to_block(2);
        let mut buf_b = [0_u8; 32];
        b.apply_keystream(&mut buf_b);
        assert_eq!(&buf_a[32..], &buf_b[..]);
    }

    #[test]
    fn adjust_moves_counter_both_ways() {
        let mut c = SeekableAesCtr::new(&[1_u8; 16]);
        c.adjust_block_counter(5);
        assert_eq!(c.block_counter(), 5);
        c.adjust_block_counter(-2);
        assert_eq!(c.block_counter(), 3);
    }
}
