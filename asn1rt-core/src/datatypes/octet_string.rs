//! In-memory value of the OCTET STRING family

use crate::datatypes::accumulator::Accumulator;
use crate::datatypes::subvariant::Subvariant;
use crate::error::{Asn1Error, Asn1Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Octets shown per line by the `Display` hex dump
const DUMP_LINE_OCTETS: usize = 16;

/// Value of an OCTET STRING, BIT STRING, ANY or wide-character string
///
/// The value does not know which encoding rules produced it or will
/// consume it: it is an owned buffer plus the BIT STRING unused-bits count.
///
/// # Invariants
/// - `bits_unused` is in `0..=7` and is 0 for an empty BIT STRING
/// - for a BIT STRING, the low `bits_unused` bits of the last byte are zero
///   once a decode has completed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawOctetString")]
pub struct OctetString {
    subvariant: Subvariant,
    buf: Accumulator,
    bits_unused: u8,
}

/// Serialized form, checked before it becomes an [`OctetString`]
#[derive(Deserialize)]
struct RawOctetString {
    subvariant: Subvariant,
    buf: Accumulator,
    bits_unused: u8,
}

impl TryFrom<RawOctetString> for OctetString {
    type Error = Asn1Error;

    fn try_from(raw: RawOctetString) -> Asn1Result<Self> {
        let mut value = Self {
            subvariant: raw.subvariant,
            buf: raw.buf,
            bits_unused: 0,
        };
        value.set_bits_unused(raw.bits_unused)?;
        value.mask_unused_bits();
        Ok(value)
    }
}

impl OctetString {
    /// Create an empty value of the given subvariant
    pub fn new(subvariant: Subvariant) -> Self {
        Self {
            subvariant,
            buf: Accumulator::new(),
            bits_unused: 0,
        }
    }

    /// Create a value holding a copy of `bytes`
    pub fn from_buf(subvariant: Subvariant, bytes: &[u8]) -> Self {
        Self {
            subvariant,
            buf: Accumulator::from_vec(bytes.to_vec()),
            bits_unused: 0,
        }
    }

    /// Create a BIT STRING from bytes and the count of unused trailing bits
    ///
    /// The unused bits of the last byte are cleared.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if `bits_unused > 7`, or if it is
    /// non-zero for an empty buffer.
    pub fn bit_string(bytes: &[u8], bits_unused: u8) -> Asn1Result<Self> {
        let mut value = Self::from_buf(Subvariant::BitString, bytes);
        value.set_bits_unused(bits_unused)?;
        value.mask_unused_bits();
        Ok(value)
    }

    pub fn subvariant(&self) -> Subvariant {
        self.subvariant
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// The content followed by a zero byte, as kept by the accumulator
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        self.buf.as_bytes_with_nul()
    }

    /// Count of unused bits in the last byte (BIT STRING only, else 0)
    pub fn bits_unused(&self) -> u8 {
        self.bits_unused
    }

    /// Number of significant bits of a BIT STRING
    pub fn bit_len(&self) -> usize {
        (self.len() * 8).saturating_sub(self.bits_unused as usize)
    }

    /// Set the count of unused trailing bits
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the count is above 7, if it is
    /// non-zero for an empty value, or if the value is not a BIT STRING.
    pub fn set_bits_unused(&mut self, bits_unused: u8) -> Asn1Result<()> {
        if bits_unused != 0 && !self.subvariant.has_unused_bits_octet() {
            return Err(Asn1Error::constraint(format!(
                "{} has no unused bits",
                self.subvariant
            )));
        }
        Self::check_bits_unused(self.len(), bits_unused)?;
        self.bits_unused = bits_unused;
        Ok(())
    }

    /// Validate an unused-bits count against a content length
    pub fn check_bits_unused(len: usize, bits_unused: u8) -> Asn1Result<()> {
        if bits_unused > 7 {
            return Err(Asn1Error::constraint(format!(
                "unused bits count {} outside 0..=7",
                bits_unused
            )));
        }
        if len == 0 && bits_unused != 0 {
            return Err(Asn1Error::constraint(format!(
                "empty BIT STRING declares {} unused bits",
                bits_unused
            )));
        }
        Ok(())
    }

    /// Zero the unused low bits of the last byte (DER canonical form)
    ///
    /// Does nothing while the count is outside `1..=7`.
    pub fn mask_unused_bits(&mut self) {
        let bits_unused = self.bits_unused;
        if !(1..=7).contains(&bits_unused) {
            return;
        }
        if let Some(last) = self.buf.as_mut_slice().last_mut() {
            *last &= 0xFFu8 << bits_unused;
        }
    }

    /// Replace the content with a copy of `bytes`
    ///
    /// The unused-bits count is reset to 0.
    pub fn set_from_buf(&mut self, bytes: &[u8]) -> Asn1Result<()> {
        self.buf.clear();
        self.bits_unused = 0;
        self.buf.append(bytes)
    }

    /// Drop the content, keeping the subvariant
    pub fn clear(&mut self) {
        self.buf.clear();
        self.bits_unused = 0;
    }

    /// Append content octets
    pub fn append(&mut self, bytes: &[u8]) -> Asn1Result<()> {
        self.buf.append(bytes)
    }

    /// Store an unused-bits octet read from the wire without validating it
    ///
    /// Decoders validate the final count once all content is in.
    pub fn put_unused_bits_octet(&mut self, octet: u8) {
        self.bits_unused = octet;
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.buf.to_vec()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.into_vec()
    }
}

impl PartialOrd for OctetString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lexicographic on the common prefix, then the shorter value is smaller
impl Ord for OctetString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes()
            .cmp(other.as_bytes())
            .then(self.bits_unused.cmp(&other.bits_unused).reverse())
            .then(self.subvariant.name().cmp(other.subvariant.name()))
    }
}

impl AsRef<[u8]> for OctetString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Hex dump: `41 42 43`, with a new line every 16 octets for longer values
impl fmt::Display for OctetString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.as_bytes();
        let multiline = bytes.len() > DUMP_LINE_OCTETS;
        for (i, byte) in bytes.iter().enumerate() {
            if i % DUMP_LINE_OCTETS == 0 {
                if multiline {
                    writeln!(f)?;
                }
            } else {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_buf() {
        let value = OctetString::from_buf(Subvariant::OctetString, b"hello");
        assert_eq!(value.as_bytes(), b"hello");
        assert_eq!(value.len(), 5);
        assert_eq!(value.as_bytes_with_nul(), b"hello\0");
        assert_eq!(value.bits_unused(), 0);
    }

    #[test]
    fn test_bit_string_masks_last_byte() {
        let value = OctetString::bit_string(&[0xAA, 0xFF], 3).unwrap();
        assert_eq!(value.as_bytes(), &[0xAA, 0xF8]);
        assert_eq!(value.bit_len(), 13);
    }

    #[test]
    fn test_bit_string_invalid_unused_bits() {
        assert!(matches!(
            OctetString::bit_string(&[0xFF], 8),
            Err(Asn1Error::ConstraintViolation(_))
        ));
        assert!(matches!(
            OctetString::bit_string(&[], 1),
            Err(Asn1Error::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_unused_bits_rejected_for_octet_string() {
        let mut value = OctetString::from_buf(Subvariant::OctetString, &[1]);
        assert!(value.set_bits_unused(2).is_err());
        assert!(value.set_bits_unused(0).is_ok());
    }

    #[test]
    fn test_set_from_buf_replaces() {
        let mut value = OctetString::bit_string(&[0xF0], 4).unwrap();
        value.set_from_buf(&[1, 2, 3]).unwrap();
        assert_eq!(value.as_bytes(), &[1, 2, 3]);
        assert_eq!(value.bits_unused(), 0);
        value.clear();
        assert!(value.is_empty());
        assert_eq!(value.subvariant(), Subvariant::BitString);
    }

    #[test]
    fn test_ordering() {
        let a = OctetString::from_buf(Subvariant::OctetString, b"abc");
        let b = OctetString::from_buf(Subvariant::OctetString, b"abd");
        let c = OctetString::from_buf(Subvariant::OctetString, b"ab");
        assert!(a < b);
        assert!(c < a);
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_display_short() {
        let value = OctetString::from_buf(Subvariant::OctetString, &[0x41, 0x0B, 0xFF]);
        assert_eq!(value.to_string(), "41 0B FF");
    }

    #[test]
    fn test_display_multiline() {
        let value = OctetString::from_buf(Subvariant::OctetString, &[0u8; 17]);
        let dump = value.to_string();
        assert_eq!(dump.lines().filter(|l| !l.is_empty()).count(), 2);
        assert!(dump.starts_with('\n'));
    }

    #[test]
    fn test_serde_roundtrip() {
        let value = OctetString::bit_string(&[0x80], 7).unwrap();
        let json = serde_json::to_string(&value).unwrap();
        let back: OctetString = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_deserialize_rejects_invalid_unused_bits() {
        let mut json = serde_json::to_value(OctetString::bit_string(&[0x80], 7).unwrap()).unwrap();
        json["bits_unused"] = serde_json::json!(8);
        assert!(serde_json::from_value::<OctetString>(json).is_err());

        let mut json = serde_json::to_value(OctetString::from_buf(Subvariant::OctetString, &[1])).unwrap();
        json["bits_unused"] = serde_json::json!(3);
        assert!(serde_json::from_value::<OctetString>(json).is_err());
    }

    #[test]
    fn test_mask_ignores_out_of_range_count() {
        let mut value = OctetString::from_buf(Subvariant::BitString, &[0xFF]);
        value.put_unused_bits_octet(8);
        value.mask_unused_bits();
        assert_eq!(value.as_bytes(), &[0xFF]);
        assert!(OctetString::check_bits_unused(value.len(), value.bits_unused()).is_err());
    }
}
