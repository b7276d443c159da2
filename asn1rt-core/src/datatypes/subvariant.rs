//! Members of the OCTET STRING type family

use serde::{Deserialize, Serialize};
use std::fmt;

/// UNIVERSAL 3
pub const TAG_BIT_STRING: u32 = 3;
/// UNIVERSAL 4
pub const TAG_OCTET_STRING: u32 = 4;
/// UNIVERSAL 28
pub const TAG_UNIVERSAL_STRING: u32 = 28;
/// UNIVERSAL 30
pub const TAG_BMP_STRING: u32 = 30;

/// Which member of the OCTET STRING family a value represents
///
/// The subvariant is fixed when the value is created. It decides:
/// - the UNIVERSAL tag expected on the wire (none for `Any`)
/// - whether BER/DER content starts with an unused-bits octet (`BitString`)
/// - the size of one PER character unit (1, 2 or 4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subvariant {
    /// Plain OCTET STRING
    OctetString,
    /// BIT STRING, content prefixed by the unused-bits octet
    BitString,
    /// Open type: the value holds a complete TLV encoding
    Any,
    /// BMPString, 2 bytes per character
    WideChar16,
    /// UniversalString, 4 bytes per character
    WideChar32,
}

impl Subvariant {
    /// UNIVERSAL tag number of the subvariant, `None` for the open type
    pub fn universal_tag_number(self) -> Option<u32> {
        match self {
            Subvariant::OctetString => Some(TAG_OCTET_STRING),
            Subvariant::BitString => Some(TAG_BIT_STRING),
            Subvariant::Any => None,
            Subvariant::WideChar16 => Some(TAG_BMP_STRING),
            Subvariant::WideChar32 => Some(TAG_UNIVERSAL_STRING),
        }
    }

    /// Bytes per PER character unit
    pub fn unit_size(self) -> usize {
        match self {
            Subvariant::WideChar16 => 2,
            Subvariant::WideChar32 => 4,
            _ => 1,
        }
    }

    /// Whether BER/DER content carries a leading unused-bits octet
    pub fn has_unused_bits_octet(self) -> bool {
        self == Subvariant::BitString
    }

    /// ASN.1 type name, used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Subvariant::OctetString => "OCTET STRING",
            Subvariant::BitString => "BIT STRING",
            Subvariant::Any => "ANY",
            Subvariant::WideChar16 => "BMPString",
            Subvariant::WideChar32 => "UniversalString",
        }
    }
}

impl fmt::Display for Subvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
