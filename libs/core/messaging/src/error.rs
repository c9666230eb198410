//! Error types for event publishing.

use std::time::Duration;
use thiserror::Error;

/// Whether retrying the same publish later could succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Broker unreachable or slow
    Transient,
    /// The event itself is unacceptable
    Permanent,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

/// Failure to hand an event to the broker.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker rejected event on '{topic}': {reason}")]
    Rejected { topic: String, reason: String },

    #[error("No acknowledgement for '{topic}' within {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PublishError::Unavailable(_) | PublishError::Timeout { .. } => {
                ErrorCategory::Transient
            }
            PublishError::Rejected { .. } | PublishError::Serialization(_) => {
                ErrorCategory::Permanent
            }
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Unavailable(_) => "unavailable",
            PublishError::Rejected { .. } => "rejected",
            PublishError::Timeout { .. } => "timeout",
            PublishError::Serialization(_) => "serialization",
        }
    }
}
