//! Error types for the memory log
//!
//! Tier errors are recoverable: the log degrades to the other tier or to an
//! empty result and never hands them to pipeline callers.

/// Memory log errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// A tier could not be read
    #[error("memory read failed ({tier}): {message}")]
    Read {
        /// `"cache"` or `"durable"`
        tier: &'static str,
        /// Backend's description
        message: String,
    },

    /// A tier could not be written
    #[error("memory write failed ({tier}): {message}")]
    Write {
        /// `"cache"` or `"durable"`
        tier: &'static str,
        /// Backend's description
        message: String,
    },

    /// Record content could not be (de)serialized
    #[error("memory serialization failed: {0}")]
    Serialization(String),
}

impl MemoryError {
    /// Create read error
    #[inline]
    pub fn read(tier: &'static str, message: impl Into<String>) -> Self {
        Self::Read {
            tier,
            message: message.into(),
        }
    }

    /// Create write error
    #[inline]
    pub fn write(tier: &'static str, message: impl Into<String>) -> Self {
        Self::Write {
            tier,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
