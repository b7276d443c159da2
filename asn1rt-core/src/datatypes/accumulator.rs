//! Growable byte buffer that decoded content octets are appended to

use crate::error::{Asn1Error, Asn1Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};

/// First allocation size; each growth doubles from here
const INITIAL_CAPACITY: usize = 16;

/// Owned, append-only byte buffer
///
/// Once anything has been appended, the storage always holds one extra
/// zero byte past the logical end ([`as_bytes_with_nul`](Self::as_bytes_with_nul)).
/// Capacity doubles on growth and never shrinks while the buffer is in use,
/// so appending from many small input fragments stays amortized.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    buf: Vec<u8>,
    len: usize,
}

impl Accumulator {
    /// Create an empty accumulator without allocating
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of existing bytes
    pub fn from_vec(mut bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        bytes.push(0);
        Self { buf: bytes, len }
    }

    /// Logical length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated storage, including the trailing zero byte
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    /// The content followed by its zero terminator
    ///
    /// An accumulator that never allocated returns an empty slice.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf
    }

    /// Append `bytes` to the end of the buffer
    ///
    /// # Error Handling
    /// Returns `ResourceExhausted` if the new size overflows `usize` or the
    /// allocation fails. The buffer is left unchanged in that case.
    pub fn append(&mut self, bytes: &[u8]) -> Asn1Result<()> {
        if bytes.is_empty() && !self.buf.is_empty() {
            return Ok(());
        }

        let new_len = self
            .len
            .checked_add(bytes.len())
            .ok_or_else(|| Asn1Error::exhausted("accumulated length overflows usize"))?;
        // Room for the terminator as well
        let needed = new_len
            .checked_add(1)
            .ok_or_else(|| Asn1Error::exhausted("accumulated length overflows usize"))?;

        if needed > self.buf.capacity() {
            let mut target = self.buf.capacity().max(INITIAL_CAPACITY);
            while target < needed {
                target = target
                    .checked_mul(2)
                    .ok_or_else(|| Asn1Error::exhausted("buffer growth overflows usize"))?;
            }
            self.buf
                .try_reserve_exact(target - self.buf.len())
                .map_err(|e| Asn1Error::exhausted(format!("cannot grow buffer to {} bytes: {}", target, e)))?;
        }

        self.buf.truncate(self.len);
        self.buf.extend_from_slice(bytes);
        self.buf.push(0);
        self.len = new_len;
        Ok(())
    }

    /// Drop the content, keeping the allocation
    pub fn clear(&mut self) {
        self.buf.clear();
        self.len = 0;
    }

    /// Copy the content out into a plain vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Give up the storage, without the terminator
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.truncate(self.len);
        self.buf
    }
}

impl PartialEq for Accumulator {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Accumulator {}

impl Hash for Accumulator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl AsRef<[u8]> for Accumulator {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Serialize for Accumulator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes::Bytes::new(self.as_slice()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Accumulator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        Ok(Accumulator::from_vec(bytes.into_vec()))
    }
}
