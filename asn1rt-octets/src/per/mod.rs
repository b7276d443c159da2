//! Unaligned PER (Packed Encoding Rules, ITU-T X.691)
//!
//! PER carries no tags and only the length information the constraints
//! leave open, so every call needs the type's [`PerConstraints`].
//!
//! # Usage Example
//!
//! ```rust
//! use asn1rt_core::{OctetString, Subvariant};
//! use asn1rt_octets::per::{PerConstraint, PerConstraints, PerDecoder, PerEncoder, decode_per, encode_per};
//!
//! let constraints = PerConstraints::new().with_size(PerConstraint::constrained(1, 8));
//! let value = OctetString::from_buf(Subvariant::OctetString, &[0xAB, 0xCD]);
//!
//! let mut encoder = PerEncoder::new();
//! encode_per(&value, &constraints, &mut encoder).unwrap();
//! let bytes = encoder.into_bytes();
//!
//! let mut decoder = PerDecoder::new(&bytes);
//! let decoded = decode_per(Subvariant::OctetString, &constraints, &mut decoder).unwrap();
//! assert_eq!(decoded, value);
//! ```

pub mod bits;
pub mod codec;
pub mod constraints;

pub use bits::{PerDecoder, PerEncoder};
pub use codec::{decode_per, encode_per};
pub use constraints::{CharacterMap, ConstraintKind, PerConstraint, PerConstraints, PermittedAlphabet};
