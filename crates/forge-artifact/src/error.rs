//! Error types for artifact storage
//!
//! Provides error handling for:
//! - Durable store uploads
//! - Fallback cache resolution (including TTL expiry)
//! - Batch acquisition (total loss is the only fatal case)

/// Storage tier errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Durable store did not accept or return the object
    #[error("durable store unavailable: {0}")]
    Unavailable(String),

    /// Fallback entry has expired or was evicted
    #[error("fallback entry expired: {0}")]
    FallbackExpired(String),

    /// Input could not be decoded into bytes
    #[error("undecodable input: {0}")]
    Undecodable(String),

    /// Operation abandoned because the run was cancelled
    #[error("storage operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Create unavailable error
    #[inline]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

/// Batch acquisition errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// Not a single artifact could be stored in any tier
    #[error("no artifacts acquired from {attempted} input(s)")]
    NothingAcquired {
        /// Number of inputs offered
        attempted: usize,
        /// Per-input rejection reasons
        rejected: Vec<(usize, String)>,
    },

    /// Cancelled before any artifact was stored
    #[error("acquisition cancelled before any artifact was stored")]
    Cancelled,
}

impl AcquireError {
    /// Whether the caller's cancellation caused the failure
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = StoreError::unavailable("connection reset");
        assert_eq!(err.to_string(), "durable store unavailable: connection reset");
        assert_eq!(
            StoreError::FallbackExpired("base64-1-0".into()).to_string(),
            "fallback entry expired: base64-1-0"
        );
    }

    #[test]
    fn acquire_error_classification() {
        assert!(AcquireError::Cancelled.is_cancellation());
        let err = AcquireError::NothingAcquired {
            attempted: 3,
            rejected: vec![],
        };
        assert!(!err.is_cancellation());
        assert!(err.to_string().contains("3 input"));
    }
}
