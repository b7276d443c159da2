//! DER (Distinguished Encoding Rules) encoder
//!
//! DER is the canonical subset of BER (X.690 clause 10): definite lengths
//! in the minimum number of octets, and the primitive form for string
//! types. Every DER encoding produced here is accepted by [`crate::ber`].

pub mod encoder;

pub use encoder::{DerEncoder, encode_der};
