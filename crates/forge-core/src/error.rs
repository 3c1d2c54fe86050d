//! Error types for the product pipeline
//!
//! Three layers:
//! - [`ToolError`]: what an external tool reports
//! - [`StageError`]: what the stage runner reports for one stage
//! - [`PipelineError`]: what escapes the orchestrator
//!
//! Only acquisition loss, cancellation before any artifact, an empty
//! processed set, and configuration faults ever become a `PipelineError`;
//! every other stage failure degrades to a default contribution.

use forge_artifact::AcquireError;

/// Errors reported by tool implementations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Tool rejected its input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Tool ran and failed
    #[error("tool failed: {0}")]
    Failed(String),

    /// Tool output could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Tool observed cancellation and stopped
    #[error("tool call cancelled")]
    Cancelled,
}

impl ToolError {
    /// Create failure
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Check if the tool stopped because of cancellation
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors from running one stage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    /// No tool registered for the capability
    #[error("no tool registered for capability {capability}")]
    ToolNotFound {
        /// Capability that was looked up
        capability: String,
    },

    /// Stage cancelled before it finished
    #[error("stage {stage} cancelled after {elapsed_ms}ms")]
    Cancelled {
        /// Stage name
        stage: String,
        /// Time spent before cancellation
        elapsed_ms: u64,
    },

    /// Tool failed
    #[error("stage {stage} failed: {cause}")]
    Execution {
        /// Stage name
        stage: String,
        /// Tool's error
        #[source]
        cause: ToolError,
    },
}

impl StageError {
    /// Name of the failed stage, if it got as far as starting
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::ToolNotFound { .. } => None,
            Self::Cancelled { stage, .. } | Self::Execution { stage, .. } => Some(stage),
        }
    }

    /// Check if cancellation ended the stage
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if the error must abort the run
    ///
    /// Registry misconfiguration is never retried or substituted.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. })
    }
}

/// Errors that abort a pipeline run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// Not a single artifact could be stored
    #[error("artifact acquisition failed: no artifacts from {attempted} input(s)")]
    ArtifactAcquisition {
        /// Inputs offered
        attempted: usize,
        /// Per-input rejection reasons
        rejected: Vec<(usize, String)>,
    },

    /// Cancelled before any artifact was stored
    #[error("run cancelled before any artifact was acquired")]
    Cancelled,

    /// Every artifact was dropped during processing
    #[error("image processing produced no usable images from {attempted} artifact(s)")]
    ProcessingExhausted {
        /// Artifacts handed to processing
        attempted: usize,
    },

    /// Required capability missing from the registry
    #[error("no tool registered for capability {0}")]
    ToolNotFound(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Create configuration error
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if caller cancellation aborted the run
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Memory-log action recording this failure
    #[must_use]
    pub fn lifecycle_action(&self) -> &'static str {
        match self {
            Self::ArtifactAcquisition { .. } => "ErrorProductGenerationArtifacts",
            Self::Cancelled => "ErrorProductGenerationCancelled",
            Self::ProcessingExhausted { .. } => "ErrorProductGenerationProcessing",
            Self::ToolNotFound(_) | Self::Config(_) | Self::Internal(_) => "ErrorProductGeneration",
        }
    }
}

impl From<AcquireError> for PipelineError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::NothingAcquired {
                attempted,
                rejected,
            } => Self::ArtifactAcquisition {
                attempted,
                rejected,
            },
            AcquireError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<StageError> for PipelineError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::ToolNotFound { capability } => Self::ToolNotFound(capability),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_predicates() {
        let missing = StageError::ToolNotFound {
            capability: "VisionAnalysis".into(),
        };
        assert!(missing.is_fatal());
        assert_eq!(missing.stage(), None);

        let cancelled = StageError::Cancelled {
            stage: "WebScrape".into(),
            elapsed_ms: 12,
        };
        assert!(cancelled.is_cancellation());
        assert!(!cancelled.is_fatal());
        assert_eq!(cancelled.stage(), Some("WebScrape"));
    }

    #[test]
    fn acquisition_errors_map_to_lifecycle_actions() {
        let lost: PipelineError = AcquireError::NothingAcquired {
            attempted: 3,
            rejected: vec![],
        }
        .into();
        assert_eq!(lost.lifecycle_action(), "ErrorProductGenerationArtifacts");

        let cancelled: PipelineError = AcquireError::Cancelled.into();
        assert!(cancelled.is_cancellation());
        assert_eq!(cancelled.lifecycle_action(), "ErrorProductGenerationCancelled");
    }

    #[test]
    fn execution_error_keeps_cause() {
        let err = StageError::Execution {
            stage: "MarketAnalysis".into(),
            cause: ToolError::failed("quota exceeded"),
        };
        assert_eq!(err.to_string(), "stage MarketAnalysis failed: tool failed: quota exceeded");
        assert!(std::error::Error::source(&err).is_some());
    }
}
