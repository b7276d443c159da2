//! Resource limits applied by the decoders

use serde::{Deserialize, Serialize};

/// Limits for one decoding session
///
/// The default places no limits beyond the platform's `usize`. An
/// embedding application typically deserializes this from its own
/// configuration file:
///
/// ```
/// use asn1rt_core::CodecConfig;
///
/// let config: CodecConfig = serde_json::from_str(r#"{ "max_depth": 32 }"#).unwrap();
/// assert_eq!(config.max_depth, Some(32));
/// assert_eq!(config.max_length, None);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum nesting depth of constructed BER encodings
    pub max_depth: Option<usize>,
    /// Maximum decoded value length in bytes
    pub max_length: Option<usize>,
}

impl CodecConfig {
    /// No limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Check a nesting depth against the limit
    pub fn depth_allowed(&self, depth: usize) -> bool {
        self.max_depth.is_none_or(|max| depth <= max)
    }

    /// Check a value length against the limit
    pub fn length_allowed(&self, length: usize) -> bool {
        self.max_length.is_none_or(|max| length <= max)
    }
}
