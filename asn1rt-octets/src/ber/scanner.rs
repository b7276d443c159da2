//! Tag and length field scanner
//!
//! Both functions scan from the start of the window they are given and keep
//! no state between calls. A resumed decoder simply scans the same header
//! again once more bytes have arrived, which keeps resumption correct for
//! any fragmentation of the input.

use crate::ber::types::{BerLength, BerTag, BerTagClass};
use asn1rt_core::{Asn1Error, DecodeError, DecodeResult};

/// Maximum continuation octets of a long-form tag number (fits `u32`)
const MAX_TAG_CONTINUATION_OCTETS: usize = 5;

/// Scan one BER tag field
///
/// # Returns
/// `Ok((tag, consumed))` on success, `WouldBlock` if the window ends inside
/// the tag field.
///
/// # Error Handling
/// Returns `Malformed` if:
/// - the first continuation octet is `0x80` (non-minimal, X.690 8.1.2.4.2)
/// - the long form encodes a number below 31
/// - the tag number does not fit `u32`
pub fn fetch_tag(window: &[u8]) -> DecodeResult<(BerTag, usize)> {
    let first_byte = *window.first().ok_or(DecodeError::WouldBlock)?;
    let class = BerTagClass::from_bits(first_byte);
    let constructed = (first_byte & 0x20) != 0;
    let tag_bits = first_byte & 0x1F;

    if tag_bits < 31 {
        return Ok((BerTag::new(class, constructed, tag_bits as u32), 1));
    }

    let mut tag_number = 0u32;
    for (i, &byte) in window[1..].iter().enumerate() {
        if i == 0 && byte == 0x80 {
            return Err(Asn1Error::malformed("tag number has a leading zero octet").into());
        }
        if i >= MAX_TAG_CONTINUATION_OCTETS || tag_number > (u32::MAX >> 7) {
            return Err(Asn1Error::malformed("tag number does not fit 32 bits").into());
        }
        tag_number = (tag_number << 7) | (byte & 0x7F) as u32;

        if byte & 0x80 == 0 {
            if tag_number < 31 {
                return Err(Asn1Error::malformed(format!(
                    "tag number {} uses the long form",
                    tag_number
                ))
                .into());
            }
            return Ok((BerTag::new(class, constructed, tag_number), i + 2));
        }
    }

    Err(DecodeError::WouldBlock)
}

/// Scan one BER length field
///
/// # Arguments
/// * `window` - Bytes starting at the length field
/// * `constructed` - Whether the TLV is constructed; only constructed
///   encodings may use the indefinite form
///
/// # Returns
/// `Ok((length, consumed))` on success, `WouldBlock` if the window ends
/// inside the length field.
///
/// # Error Handling
/// - `Malformed` for the reserved `0xFF` first octet, or an indefinite
///   length on a primitive encoding
/// - `ResourceExhausted` if the length does not fit `usize`
pub fn fetch_length(window: &[u8], constructed: bool) -> DecodeResult<(BerLength, usize)> {
    let first_byte = *window.first().ok_or(DecodeError::WouldBlock)?;

    if first_byte & 0x80 == 0 {
        return Ok((BerLength::Short(first_byte), 1));
    }

    let num_bytes = (first_byte & 0x7F) as usize;
    if num_bytes == 0 {
        if !constructed {
            return Err(Asn1Error::malformed("indefinite length on a primitive encoding").into());
        }
        return Ok((BerLength::Indefinite, 1));
    }
    if num_bytes == 0x7F {
        return Err(Asn1Error::malformed("reserved length octet 0xFF").into());
    }

    let octets = window.get(1..=num_bytes).ok_or(DecodeError::WouldBlock)?;
    let mut length = 0usize;
    for &byte in octets {
        if length > (usize::MAX >> 8) {
            return Err(Asn1Error::exhausted(format!(
                "length of {} octets does not fit usize",
                num_bytes
            ))
            .into());
        }
        length = (length << 8) | byte as usize;
    }

    Ok((BerLength::new(length), 1 + num_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_short_tag() {
        let (tag, consumed) = fetch_tag(&[0x24, 0x80]).unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(tag, BerTag::universal(true, 4));
    }

    #[test]
    fn test_fetch_long_tag() {
        let (tag, consumed) = fetch_tag(&[0xBF, 0x97, 0x38, 0x05]).unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(tag, BerTag::context_specific(true, 3000));
    }

    #[test]
    fn test_fetch_tag_would_block() {
        assert_eq!(fetch_tag(&[]), Err(DecodeError::WouldBlock));
        assert_eq!(fetch_tag(&[0x9F]), Err(DecodeError::WouldBlock));
        assert_eq!(fetch_tag(&[0x9F, 0x81]), Err(DecodeError::WouldBlock));
    }

    #[test]
    fn test_fetch_tag_malformed() {
        assert!(matches!(
            fetch_tag(&[0x9F, 0x80, 0x01]),
            Err(DecodeError::Fail(Asn1Error::Malformed(_)))
        ));
        assert!(matches!(
            fetch_tag(&[0x9F, 0x05]),
            Err(DecodeError::Fail(Asn1Error::Malformed(_)))
        ));
        assert!(matches!(
            fetch_tag(&[0x9F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]),
            Err(DecodeError::Fail(Asn1Error::Malformed(_)))
        ));
    }

    #[test]
    fn test_fetch_short_length() {
        assert_eq!(fetch_length(&[0x05], false), Ok((BerLength::Short(5), 1)));
    }

    #[test]
    fn test_fetch_long_length() {
        assert_eq!(fetch_length(&[0x82, 0x01, 0x00], false), Ok((BerLength::Long(256), 3)));
        // Leading zero octets are tolerated in BER
        assert_eq!(fetch_length(&[0x82, 0x00, 0x05], false), Ok((BerLength::Short(5), 3)));
    }

    #[test]
    fn test_fetch_length_would_block() {
        assert_eq!(fetch_length(&[], true), Err(DecodeError::WouldBlock));
        assert_eq!(fetch_length(&[0x82, 0x01], true), Err(DecodeError::WouldBlock));
    }

    #[test]
    fn test_fetch_indefinite_length() {
        assert_eq!(fetch_length(&[0x80], true), Ok((BerLength::Indefinite, 1)));
        assert!(matches!(
            fetch_length(&[0x80], false),
            Err(DecodeError::Fail(Asn1Error::Malformed(_)))
        ));
    }

    #[test]
    fn test_fetch_reserved_length() {
        assert!(matches!(
            fetch_length(&[0xFF], true),
            Err(DecodeError::Fail(Asn1Error::Malformed(_)))
        ));
    }

    #[test]
    fn test_fetch_length_overflow() {
        let mut window = vec![0x80 | 9];
        window.extend_from_slice(&[0xFF; 9]);
        assert!(matches!(
            fetch_length(&window, false),
            Err(DecodeError::Fail(Asn1Error::ResourceExhausted(_)))
        ));
    }
}
