//! BER (Basic Encoding Rules) decoding for the OCTET STRING family
//!
//! # ASN.1 BER Encoding Overview
//!
//! Each value is a TLV (Tag-Length-Value) triplet:
//!
//! ```text
//! [Tag] [Length] [Value]
//! ```
//!
//! ## Tag Encoding
//!
//! ```text
//! Bits: 8 7 6 5 4 3 2 1
//!       C C P T T T T T
//! ```
//! Where:
//! - CC = Class (00=Universal, 01=Application, 10=Context, 11=Private)
//! - P = Primitive (0) or Constructed (1)
//! - TTTTT = Tag number (0-30), or 11111 for a multi-octet tag number
//!
//! ## Length Encoding
//!
//! - **Short form** (1 byte): lengths 0-127
//! - **Long form**: `0x80 | n` followed by `n` big-endian length octets
//! - **Indefinite form** (`0x80`): constructed encodings only, the content
//!   ends with an End-Of-Content marker `00 00`
//!
//! ## Constructed Strings
//!
//! A string may be split into segments, each a nested TLV of the same
//! universal type, nested to any depth:
//!
//! ```text
//! 24 80                  OCTET STRING, constructed, indefinite
//!    04 03 01 02 03        segment
//!    04 05 04 05 06 07 08  segment
//! 00 00                  End-Of-Content
//! ```
//!
//! The decoder concatenates the segment contents. It can stop at any byte
//! and continue when more input arrives; see [`BerDecoder`].

pub mod decoder;
pub mod scanner;
pub mod stack;
pub mod types;

pub use decoder::{BerDecoder, DecodeOutcome, DecodeStatus, decode_ber};
pub use scanner::{fetch_length, fetch_tag};
pub use stack::{ExpectationStack, Frame};
pub use types::{BerLength, BerTag, BerTagClass, TagMode};
