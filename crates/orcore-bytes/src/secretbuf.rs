//! A `Vec<u8>`-like buffer that zeroizes its contents on drop or reallocation.

use crate::Writer;
use std::ops::{Deref, DerefMut};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Default starting capacity; sized for a typical KDF input (DH secret plus
/// context bytes).
const DEFAULT_CAPACITY: usize = 256;

/// A [`Writer`] for accumulating secret material (KDF inputs, handshake
/// seeds) that zeroizes its buffer on drop, and on every reallocation.
#[derive(Zeroize, ZeroizeOnDrop, Debug, Clone, Eq, PartialEq)]
pub struct SecretBuf(Vec<u8>);

impl Default for SecretBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretBuf {
    /// Construct an empty buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Construct an empty buffer that can hold `capacity` bytes without
    /// reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Shorten the buffer to `len` bytes, zeroizing whatever is dropped.
    ///
    /// No-op if `len` is greater than or equal to the current length.
    pub fn truncate_to(&mut self, len: usize) {
        if len < self.0.len() {
            self.0[len..].zeroize();
            self.0.truncate(len);
        }
    }

    /// Append `slice`, zeroizing the old backing storage if growing the
    /// buffer requires a reallocation.
    pub fn extend_from_slice(&mut self, slice: &[u8]) {
        let new_len = self.0.len() + slice.len();
        if new_len > self.0.capacity() {
            let new_capacity = std::cmp::max(self.0.capacity() * 2, new_len);
            let mut new_vec = Vec::with_capacity(new_capacity);
            new_vec.extend_from_slice(&self.0[..]);
            let mut old_vec = std::mem::replace(&mut self.0, new_vec);
            old_vec.zeroize();
        }
        self.0.extend_from_slice(slice);
    }
}

impl From<Vec<u8>> for SecretBuf {
    fn from(v: Vec<u8>) -> Self {
        SecretBuf(v)
    }
}

impl Deref for SecretBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for SecretBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl Writer for SecretBuf {
    fn write_all(&mut self, b: &[u8]) {
        self.extend_from_slice(b);
    }
}
