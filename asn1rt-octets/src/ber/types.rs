//! BER encoding types (Tag, Length)

use asn1rt_core::Subvariant;

/// BER Tag Class
///
/// ASN.1 defines four tag classes:
/// - **Universal**: Standard ASN.1 types (OCTET STRING, BIT STRING, etc.)
/// - **Application**: Application-specific types
/// - **Context-specific**: Context-dependent types (used in SEQUENCE/SET)
/// - **Private**: Private/implementation-specific types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BerTagClass {
    /// Universal class (00)
    Universal = 0,
    /// Application class (01)
    Application = 1,
    /// Context-specific class (10)
    ContextSpecific = 2,
    /// Private class (11)
    Private = 3,
}

impl BerTagClass {
    /// Get tag class from bits (bits 7-6 of tag byte)
    pub fn from_bits(bits: u8) -> Self {
        match (bits >> 6) & 0x03 {
            0 => BerTagClass::Universal,
            1 => BerTagClass::Application,
            2 => BerTagClass::ContextSpecific,
            _ => BerTagClass::Private,
        }
    }

    /// Convert tag class to bits (for encoding)
    pub fn to_bits(self) -> u8 {
        (self as u8) << 6
    }
}

/// BER Tag
///
/// A BER tag identifies the type of an ASN.1 value. It consists of:
/// - **Class**: Universal, Application, Context-specific, or Private
/// - **Constructed/Primitive**: Whether the value is constructed (contains other values)
/// - **Tag Number**: The actual tag number (0-30 for short form, or extended)
///
/// # Encoding Format
///
/// Short form (tag number 0-30):
/// ```text
/// Bits: 8 7 6 5 4 3 2 1
///       C C P T T T T T
/// ```
///
/// Extended form (tag number > 30):
/// ```text
/// First byte:  C C P 1 1 1 1 1  (all tag bits set to 1)
/// Following bytes: 1 T T T T T T T  (continuation bytes, last byte has bit 7 = 0)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BerTag {
    /// Tag class
    class: BerTagClass,
    /// Whether this is a constructed type
    constructed: bool,
    /// Tag number
    number: u32,
}

impl BerTag {
    /// Create a new BER tag
    ///
    /// # Arguments
    /// * `class` - Tag class
    /// * `constructed` - Whether this is a constructed type
    /// * `number` - Tag number
    pub fn new(class: BerTagClass, constructed: bool, number: u32) -> Self {
        Self {
            class,
            constructed,
            number,
        }
    }

    /// Create a Universal class tag
    pub fn universal(constructed: bool, number: u32) -> Self {
        Self::new(BerTagClass::Universal, constructed, number)
    }

    /// Create an Application class tag
    pub fn application(constructed: bool, number: u32) -> Self {
        Self::new(BerTagClass::Application, constructed, number)
    }

    /// Create a Context-specific class tag
    pub fn context_specific(constructed: bool, number: u32) -> Self {
        Self::new(BerTagClass::ContextSpecific, constructed, number)
    }

    /// Create a Private class tag
    pub fn private(constructed: bool, number: u32) -> Self {
        Self::new(BerTagClass::Private, constructed, number)
    }

    /// Primitive UNIVERSAL tag of a subvariant, `None` for the open type
    pub fn for_subvariant(subvariant: Subvariant) -> Option<Self> {
        subvariant
            .universal_tag_number()
            .map(|number| Self::universal(false, number))
    }

    /// Get tag class
    pub fn class(&self) -> BerTagClass {
        self.class
    }

    /// Check if tag is constructed
    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    /// Get tag number
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The same tag with the constructed bit set or cleared
    pub fn with_constructed(self, constructed: bool) -> Self {
        Self {
            constructed,
            ..self
        }
    }

    /// Compare class and number, ignoring the primitive/constructed bit
    ///
    /// X.690 allows most string types in both forms, so the form is not part
    /// of the tag identity.
    pub fn matches(&self, other: &BerTag) -> bool {
        self.class == other.class && self.number == other.number
    }

    /// Number of octets `encode()` produces
    pub fn encoded_len(&self) -> usize {
        if self.number <= 30 {
            1
        } else {
            let significant_bits = 32 - self.number.leading_zeros() as usize;
            1 + significant_bits.div_ceil(7)
        }
    }

    /// Encode tag to bytes
    ///
    /// # Encoding Strategy
    /// - If tag number <= 30: Use short form (1 byte)
    /// - If tag number > 30: Use extended form (multiple bytes)
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.encoded_len());

        // Build first byte: class (2 bits) + constructed (1 bit) + tag (5 bits)
        let class_bits = self.class.to_bits();
        let constructed_bit = if self.constructed { 0x20 } else { 0x00 };

        if self.number <= 30 {
            result.push(class_bits | constructed_bit | (self.number as u8 & 0x1F));
        } else {
            result.push(class_bits | constructed_bit | 0x1F);

            // Encode tag number in continuation bytes
            let mut remaining = self.number;
            let mut bytes = Vec::new();
            while remaining > 0 {
                bytes.push((remaining & 0x7F) as u8);
                remaining >>= 7;
            }

            // Reverse bytes and set continuation bit (bit 7) on all but last
            for (i, &byte) in bytes.iter().rev().enumerate() {
                if i < bytes.len() - 1 {
                    result.push(byte | 0x80);
                } else {
                    result.push(byte);
                }
            }
        }

        result
    }
}

/// How the outermost tag of a value is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TagMode {
    /// The subvariant's own UNIVERSAL tag
    #[default]
    Declared,
    /// A caller-supplied tag replaces the UNIVERSAL one
    Implicit,
    /// A caller-supplied constructed tag wraps the UNIVERSAL encoding
    Explicit,
}

/// BER Length
///
/// BER length can be encoded in three forms:
/// - **Short form**: For lengths 0-127 (1 byte)
/// - **Long form**: For lengths > 127 (2-127 bytes)
/// - **Indefinite form**: `0x80`, constructed encodings only; the content
///   is closed by an End-Of-Content marker (`00 00`)
///
/// # Encoding Format
///
/// Short form:
/// ```text
/// Byte: 0 L L L L L L L
/// ```
///
/// Long form:
/// ```text
/// First byte:  1 N N N N N N N  (N = number of length bytes)
/// Following bytes: L L L L L L L L  (big-endian length value)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BerLength {
    /// Short form: length 0-127
    Short(u8),
    /// Long form: length > 127, encoded with length-of-length
    Long(usize),
    /// Indefinite form, terminated by End-Of-Content
    Indefinite,
}

impl BerLength {
    /// Create a new definite BER length
    ///
    /// Automatically chooses short or long form based on the length value.
    pub fn new(length: usize) -> Self {
        if length < 128 {
            BerLength::Short(length as u8)
        } else {
            BerLength::Long(length)
        }
    }

    /// Get the length value, `None` for the indefinite form
    pub fn definite(&self) -> Option<usize> {
        match self {
            BerLength::Short(l) => Some(*l as usize),
            BerLength::Long(l) => Some(*l),
            BerLength::Indefinite => None,
        }
    }

    pub fn is_indefinite(&self) -> bool {
        matches!(self, BerLength::Indefinite)
    }

    /// Number of octets `encode()` produces
    pub fn encoded_len(&self) -> usize {
        match self {
            BerLength::Short(_) | BerLength::Indefinite => 1,
            BerLength::Long(length) => {
                let significant_bits = usize::BITS as usize - length.leading_zeros() as usize;
                1 + significant_bits.div_ceil(8).max(1)
            }
        }
    }

    /// Encode length to bytes
    ///
    /// Long form always uses the minimum number of length octets, as DER
    /// requires.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            BerLength::Short(length) => vec![*length],
            BerLength::Indefinite => vec![0x80],
            BerLength::Long(length) => {
                let num_bytes = self.encoded_len() - 1;

                // First byte: bit 7 = 1, bits 6-0 = number of length bytes
                let mut result = Vec::with_capacity(num_bytes + 1);
                result.push(0x80 | (num_bytes as u8));

                // Encode length in big-endian format
                for i in (0..num_bytes).rev() {
                    result.push(((*length >> (i * 8)) & 0xFF) as u8);
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ber_tag_short_form() {
        let tag = BerTag::universal(false, 4);
        let encoded = tag.encode();
        assert_eq!(encoded, vec![0x04]);
        assert_eq!(tag.encoded_len(), 1);
    }

    #[test]
    fn test_ber_tag_constructed() {
        let tag = BerTag::universal(true, 4);
        assert_eq!(tag.encode(), vec![0x24]);
    }

    #[test]
    fn test_ber_tag_extended() {
        let tag = BerTag::context_specific(true, 3000);
        assert_eq!(tag.encode(), vec![0xBF, 0x97, 0x38]);
        assert_eq!(tag.encoded_len(), 3);

        let tag = BerTag::application(false, 31);
        assert_eq!(tag.encode(), vec![0x5F, 0x1F]);
        assert_eq!(tag.encoded_len(), 2);
    }

    #[test]
    fn test_tag_matches_ignores_form() {
        let primitive = BerTag::universal(false, 4);
        let constructed = BerTag::universal(true, 4);
        assert!(primitive.matches(&constructed));
        assert!(!primitive.matches(&BerTag::context_specific(false, 4)));
        assert!(!primitive.matches(&BerTag::universal(false, 3)));
    }

    #[test]
    fn test_tag_for_subvariant() {
        assert_eq!(
            BerTag::for_subvariant(Subvariant::BitString),
            Some(BerTag::universal(false, 3))
        );
        assert_eq!(BerTag::for_subvariant(Subvariant::Any), None);
    }

    #[test]
    fn test_ber_length_short() {
        let length = BerLength::new(100);
        assert_eq!(length.encode(), vec![100]);
        assert_eq!(length.definite(), Some(100));
    }

    #[test]
    fn test_ber_length_long() {
        assert_eq!(BerLength::new(128).encode(), vec![0x81, 0x80]);
        assert_eq!(BerLength::new(1000).encode(), vec![0x82, 0x03, 0xE8]);
        assert_eq!(BerLength::new(65536).encode(), vec![0x83, 0x01, 0x00, 0x00]);
        assert_eq!(BerLength::new(65536).encoded_len(), 4);
    }

    #[test]
    fn test_ber_length_indefinite() {
        assert_eq!(BerLength::Indefinite.encode(), vec![0x80]);
        assert_eq!(BerLength::Indefinite.definite(), None);
        assert!(BerLength::Indefinite.is_indefinite());
    }
}
