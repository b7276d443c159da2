//! Unaligned PER codec for OCTET STRING and the wide-character strings
//!
//! An encoding is an optional extension bit, a length determinant and the
//! units (octets or characters) themselves:
//!
//! ```text
//! size constraint         length determinant
//! ---------------         ------------------
//! SIZE(n), n < 64K        none
//! SIZE(lb..ub), ub < 64K  ceil(log2(ub - lb + 1)) bits holding len - lb
//! otherwise               0xxxxxxx           len < 128
//!                         10xxxxxx xxxxxxxx  len < 16K
//!                         11mmmmmm           m * 16K units follow, then
//!                                            another determinant
//! ```
//!
//! PER is not self-describing: decoding must use the constraints that
//! were used for encoding.

use crate::per::bits::{PerDecoder, PerEncoder};
use crate::per::constraints::{CharacterMap, PerConstraint, PerConstraints};
use asn1rt_core::{Asn1Error, Asn1Result, DecodeError, DecodeResult, OctetString, Subvariant};

/// Units per length fragment (X.691 11.9.3.8)
const FRAGMENT_UNITS: usize = 16384;

/// Largest fragment multiplier `m`
const MAX_FRAGMENTS: usize = 4;

/// How each unit is turned into bits
#[derive(Debug, Clone, Copy)]
enum UnitCodec<'c> {
    /// The value itself; `bounds` is `None` when every value of `bits` is
    /// permitted
    Direct { bits: usize, bounds: Option<(i64, i64)> },
    /// A code from the permitted alphabet table
    Table { bits: usize, map: &'c dyn CharacterMap },
    /// `value - lower_bound`
    Remapped { bits: usize, lower_bound: i64, upper_bound: i64 },
}

impl<'c> UnitCodec<'c> {
    /// Pick the unit strategy for the given constraints (X.691 30.5.7)
    fn select(constraints: &'c PerConstraints, unit_bits: usize, canonical_bits: usize) -> Self {
        let value = &constraints.value;
        if !value.is_constrained() {
            return UnitCodec::Direct {
                bits: canonical_bits,
                bounds: None,
            };
        }

        let (lower_bound, upper_bound) = (value.lower_bound, value.upper_bound);
        // Units are at most 32 bits wide
        let limit = 1i64 << unit_bits;
        if upper_bound < limit {
            let covers_all = unit_bits == canonical_bits && lower_bound <= 0 && upper_bound == limit - 1;
            return UnitCodec::Direct {
                bits: unit_bits,
                bounds: (!covers_all).then_some((lower_bound, upper_bound)),
            };
        }

        match constraints.alphabet.as_deref() {
            Some(map) => UnitCodec::Table {
                bits: map.code_bits(),
                map,
            },
            None => UnitCodec::Remapped {
                bits: unit_bits,
                lower_bound,
                upper_bound,
            },
        }
    }

    fn bulk(&self, canonical_bits: usize) -> bool {
        matches!(self, UnitCodec::Direct { bits, bounds: None } if *bits == canonical_bits)
    }

    fn encode(&self, value: u32) -> Asn1Result<(u64, usize)> {
        let out_of_range = |lower_bound: i64, upper_bound: i64| {
            Asn1Error::constraint(format!(
                "unit value {} outside {}..={}",
                value, lower_bound, upper_bound
            ))
        };
        let value_i64 = i64::from(value);

        match *self {
            UnitCodec::Direct { bits, bounds } => {
                if let Some((lower_bound, upper_bound)) = bounds {
                    if !(lower_bound..=upper_bound).contains(&value_i64) {
                        return Err(out_of_range(lower_bound, upper_bound));
                    }
                }
                Ok((u64::from(value), bits))
            }
            UnitCodec::Table { bits, map } => map
                .value_to_code(value)
                .map(|code| (u64::from(code), bits))
                .ok_or_else(|| Asn1Error::constraint(format!("unit value {} not in the permitted alphabet", value))),
            UnitCodec::Remapped {
                bits,
                lower_bound,
                upper_bound,
            } => {
                if !(lower_bound..=upper_bound).contains(&value_i64) {
                    return Err(out_of_range(lower_bound, upper_bound));
                }
                Ok((value_i64.abs_diff(lower_bound), bits))
            }
        }
    }

    fn bits(&self) -> usize {
        match *self {
            UnitCodec::Direct { bits, .. } | UnitCodec::Table { bits, .. } | UnitCodec::Remapped { bits, .. } => bits,
        }
    }

    fn decode(&self, code: u64) -> Asn1Result<i64> {
        // Codes are at most 32 bits wide
        let code = code as i64;
        match *self {
            UnitCodec::Direct { bounds, .. } => {
                if let Some((lower_bound, upper_bound)) = bounds {
                    if !(lower_bound..=upper_bound).contains(&code) {
                        return Err(Asn1Error::constraint(format!(
                            "decoded unit {} outside {}..={}",
                            code, lower_bound, upper_bound
                        )));
                    }
                }
                Ok(code)
            }
            UnitCodec::Table { map, .. } => u32::try_from(code)
                .ok()
                .and_then(|code| map.code_to_value(code))
                .map(i64::from)
                .ok_or_else(|| Asn1Error::constraint(format!("code {} is not in the permitted alphabet", code))),
            UnitCodec::Remapped {
                lower_bound,
                upper_bound,
                ..
            } => {
                code.checked_add(lower_bound)
                    .filter(|value| *value <= upper_bound)
                    .ok_or_else(|| {
                        Asn1Error::constraint(format!(
                            "decoded code {} is outside {}..={}",
                            code, lower_bound, upper_bound
                        ))
                    })
            }
        }
    }
}

/// Width of an unconstrained unit
fn canonical_unit_bits(subvariant: Subvariant) -> Asn1Result<usize> {
    match subvariant {
        Subvariant::BitString | Subvariant::Any => Err(Asn1Error::unsupported(format!(
            "PER is not implemented for {}",
            subvariant
        ))),
        _ => Ok(8 * subvariant.unit_size()),
    }
}

/// Unit width before any extension fallback
///
/// A value constraint needing more bits than an unconstrained unit is
/// `Unsupported`.
fn constrained_unit_bits(constraints: &PerConstraints, canonical_bits: usize) -> Asn1Result<usize> {
    let value = &constraints.value;
    if !value.is_constrained() {
        return Ok(canonical_bits);
    }
    let bits = value.range_bits();
    if bits > canonical_bits {
        return Err(Asn1Error::unsupported(format!(
            "value constraint {}..={} needs {} bits, wider than a {}-bit unit",
            value.lower_bound, value.upper_bound, bits, canonical_bits
        )));
    }
    Ok(bits)
}

fn unit_value(unit: &[u8]) -> u32 {
    unit.iter().fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte))
}

fn put_units(
    encoder: &mut PerEncoder,
    bytes: &[u8],
    unit_size: usize,
    codec: &UnitCodec<'_>,
    canonical_bits: usize,
) -> Asn1Result<()> {
    if codec.bulk(canonical_bits) {
        encoder.write_bytes(bytes);
        return Ok(());
    }
    for unit in bytes.chunks_exact(unit_size) {
        let (code, bits) = codec.encode(unit_value(unit))?;
        encoder.write_bits(code, bits);
    }
    Ok(())
}

fn get_units(
    decoder: &mut PerDecoder<'_>,
    count: usize,
    unit_size: usize,
    codec: &UnitCodec<'_>,
    canonical_bits: usize,
    value: &mut OctetString,
) -> DecodeResult<()> {
    let num_bytes = count
        .checked_mul(unit_size)
        .ok_or_else(|| Asn1Error::exhausted("unit count overflows usize"))?;

    if codec.bulk(canonical_bits) {
        let bytes = decoder.read_bytes(num_bytes)?;
        value.append(&bytes)?;
        return Ok(());
    }

    // Check availability first so a short input never allocates for `count`
    if decoder.remaining_bits() < count.saturating_mul(codec.bits()) {
        return Err(DecodeError::WouldBlock);
    }
    let limit = 1i64 << canonical_bits;
    let mut bytes = Vec::with_capacity(num_bytes);
    for _ in 0..count {
        let unit = codec.decode(decoder.read_bits(codec.bits())?)?;
        if !(0..limit).contains(&unit) {
            return Err(Asn1Error::constraint(format!(
                "unit value {} does not fit {} bits",
                unit, canonical_bits
            ))
            .into());
        }
        let unit = unit.to_be_bytes();
        bytes.extend_from_slice(&unit[unit.len() - unit_size..]);
    }
    value.append(&bytes)?;
    Ok(())
}

/// Write a semi-constrained length determinant
///
/// # Returns
/// How many of `length` units the determinant covers, and whether a
/// terminating zero length must follow them.
fn put_length(encoder: &mut PerEncoder, length: usize) -> (usize, bool) {
    if length < 128 {
        encoder.write_bits(length as u64, 8);
        return (length, false);
    }
    if length < FRAGMENT_UNITS {
        encoder.write_bits(0x8000 | length as u64, 16);
        return (length, false);
    }

    let fragments = (length / FRAGMENT_UNITS).min(MAX_FRAGMENTS);
    let covered = fragments * FRAGMENT_UNITS;
    encoder.write_bits(0xC0 | fragments as u64, 8);
    (covered, covered == length)
}

/// Read a semi-constrained length determinant
///
/// # Returns
/// The number of units that follow, and whether another determinant
/// follows them.
fn get_length(decoder: &mut PerDecoder<'_>) -> DecodeResult<(usize, bool)> {
    let first = decoder.read_bits(8)? as usize;
    if first & 0x80 == 0 {
        return Ok((first & 0x7F, false));
    }
    if first & 0x40 == 0 {
        let second = decoder.read_bits(8)? as usize;
        return Ok((((first & 0x3F) << 8) | second, false));
    }

    let fragments = first & 0x3F;
    if !(1..=MAX_FRAGMENTS).contains(&fragments) {
        return Err(Asn1Error::malformed(format!("invalid fragment multiplier {}", fragments)).into());
    }
    Ok((fragments * FRAGMENT_UNITS, true))
}

/// Encode a value with the unaligned Packed Encoding Rules
///
/// # Arguments
/// * `value` - OCTET STRING or wide-character string value
/// * `constraints` - The type's PER-visible constraints
/// * `encoder` - Bit sink
///
/// # Error Handling
/// - `Unsupported` for BIT STRING and open type values
/// - `ConstraintViolation` if the size or a unit is outside the constraints,
///   or a wide string is not a whole number of characters
pub fn encode_per(value: &OctetString, constraints: &PerConstraints, encoder: &mut PerEncoder) -> Asn1Result<()> {
    let subvariant = value.subvariant();
    let canonical_bits = canonical_unit_bits(subvariant)?;
    let unit_size = subvariant.unit_size();
    if value.len() % unit_size != 0 {
        return Err(Asn1Error::constraint(format!(
            "{} of {} bytes is not a whole number of {}-byte characters",
            subvariant,
            value.len(),
            unit_size
        )));
    }

    let units = value.len() / unit_size;
    let units_i64 = i64::try_from(units).map_err(|_| Asn1Error::exhausted("size does not fit i64"))?;

    let mut size = constraints.size;
    let mut unit_bits = constrained_unit_bits(constraints, canonical_bits)?;
    let mut extended = false;
    if !size.contains(units_i64) {
        if !(size.extensible && size.is_constrained()) {
            return Err(Asn1Error::constraint(format!(
                "size {} outside {}..={}",
                units, size.lower_bound, size.upper_bound
            )));
        }
        extended = true;
        size = PerConstraint::semi_constrained(0);
        unit_bits = canonical_bits;
    }
    if constraints.size.extensible {
        encoder.write_bit(extended);
    }

    let codec = UnitCodec::select(constraints, unit_bits, canonical_bits);
    let start = encoder.bit_position();

    match size.effective_bits() {
        Some(bits) => {
            encoder.write_bits(units_i64.abs_diff(size.lower_bound), bits);
            put_units(encoder, value.as_bytes(), unit_size, &codec, canonical_bits)?;
        }
        None => {
            if units == 0 {
                put_length(encoder, 0);
            }
            let mut rest = value.as_bytes();
            while !rest.is_empty() {
                let (covered, need_terminator) = put_length(encoder, rest.len() / unit_size);
                let (fragment, tail) = rest.split_at(covered * unit_size);
                put_units(encoder, fragment, unit_size, &codec, canonical_bits)?;
                rest = tail;
                if need_terminator {
                    put_length(encoder, 0);
                }
            }
        }
    }

    log::trace!(
        "UPER encoded {} units of {} into {} bits ({:?})",
        units,
        subvariant,
        encoder.bit_position() - start,
        codec
    );
    Ok(())
}

/// Decode a value with the unaligned Packed Encoding Rules
///
/// # Error Handling
/// - `WouldBlock` if the input ends early; decoding is one-shot, so the
///   caller retries with a longer buffer
/// - `Malformed` for an invalid fragment multiplier
/// - `ConstraintViolation` if the size or a unit is outside the constraints
/// - `Unsupported` for BIT STRING and open type subvariants
pub fn decode_per(
    subvariant: Subvariant,
    constraints: &PerConstraints,
    decoder: &mut PerDecoder<'_>,
) -> DecodeResult<OctetString> {
    let canonical_bits = canonical_unit_bits(subvariant)?;
    let unit_size = subvariant.unit_size();

    let mut size = constraints.size;
    let mut unit_bits = constrained_unit_bits(constraints, canonical_bits)?;
    if constraints.size.extensible && decoder.read_bit()? {
        size = PerConstraint::semi_constrained(0);
        unit_bits = canonical_bits;
    }

    let codec = UnitCodec::select(constraints, unit_bits, canonical_bits);
    let mut value = OctetString::new(subvariant);

    let units = match size.effective_bits() {
        Some(bits) => {
            let units = i64::try_from(decoder.read_bits(bits)?)
                .ok()
                .and_then(|offset| offset.checked_add(size.lower_bound))
                .ok_or_else(|| Asn1Error::constraint("size outside the i64 range"))?;
            let count = usize::try_from(units)
                .map_err(|_| Asn1Error::constraint(format!("negative size {}", units)))?;
            if !size.contains(units) {
                return Err(Asn1Error::constraint(format!(
                    "size {} outside {}..={}",
                    units, size.lower_bound, size.upper_bound
                ))
                .into());
            }
            get_units(decoder, count, unit_size, &codec, canonical_bits, &mut value)?;
            count
        }
        None => {
            let mut total = 0usize;
            loop {
                let (count, more) = get_length(decoder)?;
                get_units(decoder, count, unit_size, &codec, canonical_bits, &mut value)?;
                total += count;
                if !more {
                    break;
                }
            }
            let total_i64 = i64::try_from(total).map_err(|_| Asn1Error::exhausted("size does not fit i64"))?;
            if !size.contains(total_i64) {
                return Err(Asn1Error::constraint(format!(
                    "size {} below {}",
                    total, size.lower_bound
                ))
                .into());
            }
            total
        }
    };

    log::trace!("UPER decoded {} units of {} ({:?})", units, subvariant, codec);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::per::constraints::PermittedAlphabet;

    fn octets(bytes: &[u8]) -> OctetString {
        OctetString::from_buf(Subvariant::OctetString, bytes)
    }

    fn encode(value: &OctetString, constraints: &PerConstraints) -> Vec<u8> {
        let mut encoder = PerEncoder::new();
        encode_per(value, constraints, &mut encoder).unwrap();
        encoder.into_bytes().to_vec()
    }

    fn round_trip(value: &OctetString, constraints: &PerConstraints) -> Vec<u8> {
        let bytes = encode(value, constraints);
        let mut decoder = PerDecoder::new(&bytes);
        let decoded = decode_per(value.subvariant(), constraints, &mut decoder).unwrap();
        assert_eq!(&decoded, value);
        bytes
    }

    #[test]
    fn test_semi_constrained_lengths() {
        let constraints = PerConstraints::new();
        for len in [0usize, 1, 127, 128, 16383, 16384, 16385, 65536, 81920, 100_000] {
            let bytes: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
            let encoded = round_trip(&octets(&bytes), &constraints);

            match len {
                0 => assert_eq!(encoded, vec![0x00]),
                1 => assert_eq!(encoded[0], 0x01),
                127 => assert_eq!(encoded[0], 0x7F),
                128 => assert_eq!(&encoded[..2], &[0x80, 0x80]),
                16384 => {
                    assert_eq!(encoded[0], 0xC1);
                    assert_eq!(encoded.len(), 1 + 16384 + 1);
                    assert_eq!(*encoded.last().unwrap(), 0x00);
                }
                16385 => {
                    assert_eq!(encoded[0], 0xC1);
                    assert_eq!(encoded[1 + 16384], 0x01);
                    assert_eq!(encoded.len(), 1 + 16384 + 1 + 1);
                }
                65536 => {
                    assert_eq!(encoded[0], 0xC4);
                    assert_eq!(encoded.len(), 1 + 65536 + 1);
                }
                81920 => {
                    assert_eq!(encoded[0], 0xC4);
                    assert_eq!(encoded[1 + 65536], 0xC1);
                    assert_eq!(encoded.len(), 1 + 65536 + 1 + 16384 + 1);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_constrained_length() {
        let constraints = PerConstraints::new().with_size(PerConstraint::constrained(1, 8));
        let encoded = round_trip(&octets(&[0xAB, 0xCD]), &constraints);
        // 3-bit length (2 - 1) then 16 bits of content
        assert_eq!(encoded, vec![0x35, 0x79, 0xA0]);
    }

    #[test]
    fn test_fixed_size_has_no_length() {
        let constraints = PerConstraints::new().with_size(PerConstraint::fixed(3));
        let encoded = round_trip(&octets(&[1, 2, 3]), &constraints);
        assert_eq!(encoded, vec![1, 2, 3]);

        let mut encoder = PerEncoder::new();
        let result = encode_per(&octets(&[1, 2]), &constraints, &mut encoder);
        assert!(matches!(result, Err(Asn1Error::ConstraintViolation(_))));
    }

    #[test]
    fn test_extensible_size() {
        let constraints = PerConstraints::new().with_size(PerConstraint::constrained(1, 2).extensible());

        // In the root: extension bit 0, one length bit
        let encoded = round_trip(&octets(&[0xFF]), &constraints);
        assert_eq!(encoded, vec![0b0011_1111, 0b1100_0000]);

        // Outside the root: extension bit 1, semi-constrained length
        let encoded = round_trip(&octets(&[1, 2, 3]), &constraints);
        assert_eq!(encoded[0], 0x81);
        assert_eq!(encoded.len(), 5);
    }

    #[test]
    fn test_direct_narrow_units() {
        // Values 0..=127 fit 7 bits unchanged
        let constraints = PerConstraints::new()
            .with_value(PerConstraint::constrained(0, 127))
            .with_size(PerConstraint::fixed(2));
        let encoded = round_trip(&octets(b"AB"), &constraints);
        assert_eq!(encoded, vec![0x83, 0x08]);

        let mut encoder = PerEncoder::new();
        let result = encode_per(&octets(&[0x41, 0x80]), &constraints, &mut encoder);
        assert!(matches!(result, Err(Asn1Error::ConstraintViolation(_))));
    }

    #[test]
    fn test_remapped_units() {
        // 200..=215 does not fit 4 bits directly, so it is shifted down
        let constraints = PerConstraints::new()
            .with_value(PerConstraint::constrained(200, 215))
            .with_size(PerConstraint::fixed(2));
        let encoded = round_trip(&octets(&[200, 215]), &constraints);
        assert_eq!(encoded, vec![0x0F]);

        let mut encoder = PerEncoder::new();
        let result = encode_per(&octets(&[199, 200]), &constraints, &mut encoder);
        assert!(matches!(result, Err(Asn1Error::ConstraintViolation(_))));
    }

    #[test]
    fn test_table_units() {
        let constraints = PerConstraints::new()
            .with_alphabet(PermittedAlphabet::from_chars("ACEGIK"))
            .with_size(PerConstraint::fixed(3));
        let encoded = round_trip(&octets(b"AEK"), &constraints);
        // Codes 0, 2, 5 in 3 bits each
        assert_eq!(encoded, vec![0b0000_1010, 0b1000_0000]);

        let mut encoder = PerEncoder::new();
        let result = encode_per(&octets(b"ABC"), &constraints, &mut encoder);
        assert!(matches!(result, Err(Asn1Error::ConstraintViolation(_))));

        // Code 7 is not in the table
        let mut decoder = PerDecoder::new(&[0b1110_0000, 0x00]);
        let result = decode_per(Subvariant::OctetString, &constraints, &mut decoder);
        assert!(matches!(result, Err(DecodeError::Fail(Asn1Error::ConstraintViolation(_)))));
    }

    #[test]
    fn test_wide_chars() {
        let value = OctetString::from_buf(Subvariant::WideChar16, &[0x00, 0x41, 0x04, 0x10]);
        let encoded = round_trip(&value, &PerConstraints::new());
        assert_eq!(encoded, vec![0x02, 0x00, 0x41, 0x04, 0x10]);

        let value = OctetString::from_buf(Subvariant::WideChar32, &[0, 0, 0, 0x41]);
        let constraints = PerConstraints::new()
            .with_value(PerConstraint::constrained(0, 0x7F))
            .with_size(PerConstraint::fixed(1));
        let encoded = round_trip(&value, &constraints);
        assert_eq!(encoded, vec![0x82]);

        let broken = OctetString::from_buf(Subvariant::WideChar16, &[0x00, 0x41, 0x00]);
        let mut encoder = PerEncoder::new();
        let result = encode_per(&broken, &PerConstraints::new(), &mut encoder);
        assert!(matches!(result, Err(Asn1Error::ConstraintViolation(_))));
    }

    #[test]
    fn test_unsupported_subvariants() {
        let mut encoder = PerEncoder::new();
        let value = OctetString::new(Subvariant::BitString);
        assert!(matches!(
            encode_per(&value, &PerConstraints::new(), &mut encoder),
            Err(Asn1Error::Unsupported(_))
        ));

        let mut decoder = PerDecoder::new(&[0x00]);
        assert!(matches!(
            decode_per(Subvariant::Any, &PerConstraints::new(), &mut decoder),
            Err(DecodeError::Fail(Asn1Error::Unsupported(_)))
        ));
    }

    #[test]
    fn test_value_constraint_wider_than_unit() {
        let constraints = PerConstraints::new().with_value(PerConstraint::constrained(i64::MIN, i64::MAX));
        let mut encoder = PerEncoder::new();
        assert!(matches!(
            encode_per(&octets(&[1]), &constraints, &mut encoder),
            Err(Asn1Error::Unsupported(_))
        ));

        let mut decoder = PerDecoder::new(&[0x01, 0x01]);
        assert!(matches!(
            decode_per(Subvariant::OctetString, &constraints, &mut decoder),
            Err(DecodeError::Fail(Asn1Error::Unsupported(_)))
        ));

        // Nine bits do not fit an octet, but they fit a 16-bit character
        let constraints = PerConstraints::new()
            .with_value(PerConstraint::constrained(0, 300))
            .with_size(PerConstraint::fixed(1));
        let mut encoder = PerEncoder::new();
        assert!(matches!(
            encode_per(&octets(&[1]), &constraints, &mut encoder),
            Err(Asn1Error::Unsupported(_))
        ));
        let encoded = round_trip(&OctetString::from_buf(Subvariant::WideChar16, &[0x01, 0x2C]), &constraints);
        assert_eq!(encoded, vec![0x96, 0x00]);
    }

    #[test]
    fn test_decode_short_input() {
        let mut decoder = PerDecoder::new(&[0x05, 1, 2]);
        let result = decode_per(Subvariant::OctetString, &PerConstraints::new(), &mut decoder);
        assert_eq!(result, Err(DecodeError::WouldBlock));
    }

    #[test]
    fn test_decode_bad_fragment_multiplier() {
        let mut decoder = PerDecoder::new(&[0xC5, 0x00]);
        let result = decode_per(Subvariant::OctetString, &PerConstraints::new(), &mut decoder);
        assert!(matches!(result, Err(DecodeError::Fail(Asn1Error::Malformed(_)))));
    }

    #[test]
    fn test_decode_size_out_of_range() {
        // 3-bit length field holds 7, one more than the upper bound
        let constraints = PerConstraints::new().with_size(PerConstraint::constrained(0, 6));
        let mut decoder = PerDecoder::new(&[0b1110_0000]);
        let result = decode_per(Subvariant::OctetString, &constraints, &mut decoder);
        assert!(matches!(result, Err(DecodeError::Fail(Asn1Error::ConstraintViolation(_)))));
    }
}
