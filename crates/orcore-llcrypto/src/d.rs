//! Digest algorithms.

/// SHA-1, used throughout the legacy handshake and relay-cell digests.
///
/// Re-exported so callers don't need a direct dependency on the `sha1`
/// crate, and so we have one place to swap the implementation if needed.
pub use sha1::Sha1;

pub use digest::Digest;

/// Length in bytes of a SHA-1 digest.
pub const SHA1_LEN: usize = 20;

/// Compute `SHA1(input)` in one shot.
pub fn sha1(input: &[u8]) -> [u8; SHA1_LEN] {
    let mut h = Sha1::new();
    h.update(input);
    h.finalize().into()
}
