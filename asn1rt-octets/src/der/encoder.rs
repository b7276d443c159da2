//! DER encoder for the OCTET STRING family
//!
//! # Usage Example
//!
//! ```rust
//! use asn1rt_core::{OctetString, Subvariant};
//! use asn1rt_octets::ber::TagMode;
//! use asn1rt_octets::der::DerEncoder;
//!
//! let value = OctetString::from_buf(Subvariant::OctetString, b"hi");
//! let mut encoder = DerEncoder::new();
//! encoder.encode(&value, TagMode::Declared, None).unwrap();
//! assert_eq!(encoder.as_bytes(), &[0x04, 0x02, b'h', b'i']);
//! ```

use crate::ber::types::{BerLength, BerTag, TagMode};
use asn1rt_core::{Asn1Error, Asn1Result, OctetString, Subvariant};
use bytes::{BufMut, Bytes, BytesMut};

/// Content octets of a value as they go on the wire
///
/// BIT STRING content is the unused-bits octet followed by the buffer with
/// the padding bits of the last byte cleared.
struct Content<'a> {
    leading: Option<u8>,
    body: &'a [u8],
    last_mask: u8,
}

impl<'a> Content<'a> {
    fn of(value: &'a OctetString) -> Self {
        match value.subvariant() {
            Subvariant::BitString => {
                let bits_unused = if value.is_empty() {
                    0
                } else {
                    value.bits_unused() & 0x07
                };
                Self {
                    leading: Some(bits_unused),
                    body: value.as_bytes(),
                    last_mask: 0xFF << bits_unused,
                }
            }
            _ => Self {
                leading: None,
                body: value.as_bytes(),
                last_mask: 0xFF,
            },
        }
    }

    fn len(&self) -> usize {
        self.body.len() + usize::from(self.leading.is_some())
    }

    fn write(&self, sink: &mut BytesMut) {
        if let Some(octet) = self.leading {
            sink.put_u8(octet);
        }
        if let Some((&last, init)) = self.body.split_last() {
            sink.put_slice(init);
            sink.put_u8(last & self.last_mask);
        }
    }
}

/// Size of a TLV with `content_len` content octets
fn tlv_len(tag: &BerTag, content_len: usize) -> Asn1Result<usize> {
    tag.encoded_len()
        .checked_add(BerLength::new(content_len).encoded_len())
        .and_then(|header| header.checked_add(content_len))
        .ok_or_else(|| Asn1Error::exhausted("encoded size overflows usize"))
}

fn put_header(sink: &mut BytesMut, tag: &BerTag, content_len: usize) {
    sink.put_slice(&tag.encode());
    sink.put_slice(&BerLength::new(content_len).encode());
}

fn required_tag(tag_mode: TagMode, tag: Option<BerTag>) -> Asn1Result<BerTag> {
    tag.ok_or_else(|| Asn1Error::unsupported(format!("{:?} tagging requires a tag", tag_mode)))
}

/// Encode a value with the Distinguished Encoding Rules
///
/// The encoding is always primitive with a definite, minimal length.
///
/// # Arguments
/// * `value` - Value to encode
/// * `tag_mode` - Which outer tag to write
/// * `tag` - The IMPLICIT or EXPLICIT tag; ignored for `TagMode::Declared`
/// * `sink` - Output buffer, or `None` to only compute the size
///
/// # Returns
/// The number of bytes written (or that would be written).
///
/// # Error Handling
/// - `Unsupported` for an implicitly tagged open type, or a missing tag
/// - `ResourceExhausted` if the size overflows `usize`
pub fn encode_der(
    value: &OctetString,
    tag_mode: TagMode,
    tag: Option<BerTag>,
    sink: Option<&mut BytesMut>,
) -> Asn1Result<usize> {
    let content = Content::of(value);
    let universal = BerTag::for_subvariant(value.subvariant());

    // Innermost TLV: the open type is already a complete encoding
    let inner_len = match universal {
        Some(universal) => tlv_len(&universal, content.len())?,
        None => content.len(),
    };

    let total = match tag_mode {
        TagMode::Declared => inner_len,
        TagMode::Implicit => {
            if universal.is_none() {
                return Err(Asn1Error::unsupported("an open type cannot be implicitly tagged"));
            }
            tlv_len(&required_tag(tag_mode, tag)?, content.len())?
        }
        TagMode::Explicit => tlv_len(&required_tag(tag_mode, tag)?.with_constructed(true), inner_len)?,
    };

    let Some(sink) = sink else {
        return Ok(total);
    };
    sink.reserve(total);

    match (tag_mode, universal) {
        (TagMode::Implicit, _) => {
            let tag = required_tag(tag_mode, tag)?.with_constructed(false);
            put_header(sink, &tag, content.len());
        }
        (TagMode::Explicit, _) => {
            let tag = required_tag(tag_mode, tag)?.with_constructed(true);
            put_header(sink, &tag, inner_len);
            if let Some(universal) = universal {
                put_header(sink, &universal, content.len());
            }
        }
        (TagMode::Declared, Some(universal)) => put_header(sink, &universal, content.len()),
        (TagMode::Declared, None) => {}
    }
    content.write(sink);

    log::trace!(
        "DER encoded {} of {} bytes into {} bytes ({:?})",
        value.subvariant(),
        value.len(),
        total,
        tag_mode
    );
    Ok(total)
}

/// Reusable DER output buffer
///
/// Successive values are appended back to back.
#[derive(Debug, Default)]
pub struct DerEncoder {
    buffer: BytesMut,
}

impl DerEncoder {
    /// Create a new DER encoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create a new DER encoder with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Append the DER encoding of `value`
    ///
    /// # Returns
    /// The number of bytes appended.
    pub fn encode(&mut self, value: &OctetString, tag_mode: TagMode, tag: Option<BerTag>) -> Asn1Result<usize> {
        encode_der(value, tag_mode, tag, Some(&mut self.buffer))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get a reference to the encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Clear the encoder buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the encoded bytes
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}
