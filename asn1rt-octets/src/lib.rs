//! BER/DER/Unaligned PER codecs for the ASN.1 OCTET STRING family
//!
//! One encoding-agnostic [`OctetString`](asn1rt_core::OctetString) value
//! moves between its owned buffer and three encoding rules:
//!
//! - [`ber`]: resumable decoding of primitive and constructed encodings,
//!   definite and indefinite lengths, any nesting depth
//! - [`der`]: canonical encoding
//! - [`per`]: unaligned PER encoding and decoding
//!
//! OCTET STRING, BIT STRING, the open type (ANY) and the BMPString and
//! UniversalString wide-character strings are covered.
//!
//! # TODO
//!
//! - [ ] CER encoding (segmented constructed strings above 1000 octets)
//! - [ ] PER for BIT STRING

pub mod ber;
pub mod der;
pub mod per;


pub use ber::{BerDecoder, BerLength, BerTag, BerTagClass, DecodeOutcome, DecodeStatus, TagMode, decode_ber};
pub use der::{DerEncoder, encode_der};
pub use per::{PerConstraint, PerConstraints, PerDecoder, PerEncoder, PermittedAlphabet, decode_per, encode_per};
