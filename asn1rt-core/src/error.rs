use thiserror::Error;

/// Failure kinds shared by every encoding rule
///
/// A failure is terminal for the session that produced it. "Need more
/// input" is not a failure and lives in [`DecodeError::WouldBlock`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Asn1Error {
    /// Bad tag or length octets, reserved length patterns, unexpected tags
    #[error("Malformed encoding: {0}")]
    Malformed(String),

    /// Content exceeding an enclosing TLV, PER values out of range,
    /// invalid BIT STRING unused-bits counts
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Length arithmetic or buffer growth overflowed, or a configured
    /// limit was hit
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The operation is not defined for this kind of value
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl Asn1Error {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Asn1Error::Malformed(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Asn1Error::ConstraintViolation(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        Asn1Error::ResourceExhausted(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Asn1Error::Unsupported(msg.into())
    }
}

/// Result of a decoding step
///
/// `WouldBlock` means the step needs at least one more byte (or bit) at the
/// same logical position. Decoders keep their progress in their own
/// session state, so the caller just calls again with more input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("More input required")]
    WouldBlock,

    #[error(transparent)]
    Fail(#[from] Asn1Error),
}

impl DecodeError {
    /// Check whether this is the non-error "need more input" outcome
    pub fn is_would_block(&self) -> bool {
        matches!(self, DecodeError::WouldBlock)
    }
}

/// Result type alias for encoding and value operations
pub type Asn1Result<T> = Result<T, Asn1Error>;

/// Result type alias for decoding steps
pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_wraps_kind() {
        let err: DecodeError = Asn1Error::malformed("bad tag").into();
        assert_eq!(err, DecodeError::Fail(Asn1Error::Malformed("bad tag".to_string())));
        assert!(!err.is_would_block());
        assert_eq!(err.to_string(), "Malformed encoding: bad tag");
    }

    #[test]
    fn test_would_block_display() {
        assert!(DecodeError::WouldBlock.is_would_block());
        assert_eq!(DecodeError::WouldBlock.to_string(), "More input required");
    }
}
