//! Bit cursor for Unaligned PER
//!
//! Bits are written and read most significant first. Unaligned PER never
//! pads to octet boundaries; only the final octet of an encoding carries
//! zero padding.

use asn1rt_core::{DecodeError, DecodeResult};
use bitvec::prelude::*;
use bytes::Bytes;

/// UPER bit writer
#[derive(Debug, Clone, Default)]
pub struct PerEncoder {
    buffer: BitVec<u8, Msb0>,
}

impl PerEncoder {
    pub fn new() -> Self {
        Self {
            buffer: BitVec::new(),
        }
    }

    pub fn with_capacity(bits: usize) -> Self {
        Self {
            buffer: BitVec::with_capacity(bits),
        }
    }

    /// Get current bit position
    pub fn bit_position(&self) -> usize {
        self.buffer.len()
    }

    /// Write a single bit
    pub fn write_bit(&mut self, bit: bool) {
        self.buffer.push(bit);
    }

    /// Write the low `num_bits` bits of `value` (MSB first)
    pub fn write_bits(&mut self, value: u64, num_bits: usize) {
        debug_assert!(num_bits <= 64);
        for i in (0..num_bits).rev() {
            self.buffer.push((value >> i) & 1 == 1);
        }
    }

    /// Write whole octets at the current (possibly unaligned) position
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_bitslice(bytes.view_bits::<Msb0>());
    }

    /// Encoded bits so far
    pub fn as_bits(&self) -> &BitSlice<u8, Msb0> {
        &self.buffer
    }

    /// Get the encoded bytes, zero padded to a whole octet
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buffer.into_vec())
    }
}

/// UPER bit reader over a fully buffered input
///
/// Reading past the end yields `WouldBlock`; the caller may retry the
/// whole decode with a longer buffer.
#[derive(Debug, Clone)]
pub struct PerDecoder<'a> {
    data: &'a BitSlice<u8, Msb0>,
    position: usize,
}

impl<'a> PerDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data: BitSlice::from_slice(data),
            position: 0,
        }
    }

    /// Get current bit position
    pub fn bit_position(&self) -> usize {
        self.position
    }

    /// Get remaining bits
    pub fn remaining_bits(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    fn take(&mut self, num_bits: usize) -> DecodeResult<&'a BitSlice<u8, Msb0>> {
        if num_bits > self.remaining_bits() {
            return Err(DecodeError::WouldBlock);
        }
        let bits = &self.data[self.position..self.position + num_bits];
        self.position += num_bits;
        Ok(bits)
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> DecodeResult<bool> {
        let bits = self.take(1)?;
        Ok(bits[0])
    }

    /// Read `num_bits` bits as a value (MSB first)
    pub fn read_bits(&mut self, num_bits: usize) -> DecodeResult<u64> {
        debug_assert!(num_bits <= 64);
        let bits = self.take(num_bits)?;
        Ok(bits.iter().by_vals().fold(0u64, |acc, bit| (acc << 1) | u64::from(bit)))
    }

    /// Read whole octets from the current (possibly unaligned) position
    pub fn read_bytes(&mut self, num_bytes: usize) -> DecodeResult<Vec<u8>> {
        let num_bits = num_bytes.checked_mul(8).ok_or(DecodeError::WouldBlock)?;
        let bits = self.take(num_bits)?;
        Ok(bits
            .chunks(8)
            .map(|octet| octet.iter().by_vals().fold(0u8, |acc, bit| (acc << 1) | u8::from(bit)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_bits() {
        let mut encoder = PerEncoder::new();
        encoder.write_bit(true);
        encoder.write_bits(0b101, 3);
        encoder.write_bits(0xABCD, 16);
        assert_eq!(encoder.bit_position(), 20);

        let bytes = encoder.into_bytes();
        assert_eq!(bytes.as_ref(), &[0xDA, 0xBC, 0xD0]);

        let mut decoder = PerDecoder::new(&bytes);
        assert!(decoder.read_bit().unwrap());
        assert_eq!(decoder.read_bits(3).unwrap(), 0b101);
        assert_eq!(decoder.read_bits(16).unwrap(), 0xABCD);
        assert_eq!(decoder.remaining_bits(), 4);
    }

    #[test]
    fn test_unaligned_bytes() {
        let mut encoder = PerEncoder::new();
        encoder.write_bits(0, 4);
        encoder.write_bytes(&[0xFF, 0x0F]);
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.as_ref(), &[0x0F, 0xF0, 0xF0]);

        let mut decoder = PerDecoder::new(&bytes);
        decoder.read_bits(4).unwrap();
        assert_eq!(decoder.read_bytes(2).unwrap(), vec![0xFF, 0x0F]);
    }

    #[test]
    fn test_underflow_would_block() {
        let mut decoder = PerDecoder::new(&[0xAA]);
        assert_eq!(decoder.read_bits(9), Err(DecodeError::WouldBlock));
        // A failed read does not move the cursor
        assert_eq!(decoder.bit_position(), 0);
        assert_eq!(decoder.read_bytes(2), Err(DecodeError::WouldBlock));
        assert_eq!(decoder.read_bits(8).unwrap(), 0xAA);
        assert_eq!(decoder.read_bit(), Err(DecodeError::WouldBlock));
    }
}
