//! Core types for the ASN.1 OCTET STRING family codecs
//!
//! This crate provides the encoding-agnostic value type, the error
//! taxonomy and the decoder limits shared by the BER/DER/PER codecs.

pub mod config;
pub mod datatypes;
pub mod error;

pub use config::CodecConfig;
pub use datatypes::{Accumulator, OctetString, Subvariant};
pub use error::{Asn1Error, Asn1Result, DecodeError, DecodeResult};
