//! Value types of the OCTET STRING family

pub mod accumulator;
pub mod octet_string;
pub mod subvariant;

pub use accumulator::Accumulator;
pub use octet_string::OctetString;
pub use subvariant::{
    Subvariant, TAG_BIT_STRING, TAG_BMP_STRING, TAG_OCTET_STRING, TAG_UNIVERSAL_STRING,
};
