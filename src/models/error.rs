//! Error types for kyc-triage.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected per-request failures (empty context, unknown label)
//! - I^B materialized: Classifier infrastructure failures (network, timeout, 429)
//! - K_i violated: Internal invariant violations (policy table, task join)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for kyc-triage.
#[derive(Debug, Error)]
pub enum TriageError {
    // ═══════════════════════════════════════════════════════════════════
    // FATAL — Startup only, the process must not serve requests
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unrecognized risk label from classifier: {label:?}")]
    UnrecognizedRiskLabel { label: String },

    #[error("Classifier rejected the request (status {status}): {message}")]
    ClassifierRejected { status: u16, message: String },

    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(#[from] UnavailableCause),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Recommendation policy violated: {0}")]
    PolicyViolation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why the classifier could not produce a label. Every cause is retryable.
#[derive(Debug, Error)]
pub enum UnavailableCause {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited{}", .retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<f64> },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server error (status {status}): {message}")]
    ServerError { status: u16, message: String },
}

/// Inspectable error classification, stable across the library and batch output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InvalidInput,
    ClassifierUnavailable,
    UnrecognizedRiskLabel,
    ClassifierRejected,
    MalformedResponse,
    PolicyViolation,
    Io,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ClassifierUnavailable => "classifier_unavailable",
            ErrorKind::UnrecognizedRiskLabel => "unrecognized_risk_label",
            ErrorKind::ClassifierRejected => "classifier_rejected",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::PolicyViolation => "policy_violation",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl TriageError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::UnrecognizedRiskLabel { .. } => ErrorKind::UnrecognizedRiskLabel,
            Self::ClassifierRejected { .. } => ErrorKind::ClassifierRejected,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::ClassifierUnavailable(_) => ErrorKind::ClassifierUnavailable,
            Self::Io { .. } => ErrorKind::Io,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only transient classifier failures qualify. An unrecognized label is a
    /// classifier contract violation and is not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ClassifierUnavailable(_))
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::ClassifierUnavailable(UnavailableCause::RateLimited { retry_after_secs }) => {
                *retry_after_secs
            }
            _ => None,
        }
    }
}

/// Result type alias for kyc-triage.
pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        let timeout = TriageError::from(UnavailableCause::Timeout(Duration::from_secs(5)));
        assert!(timeout.is_retryable());
        assert_eq!(timeout.kind(), ErrorKind::ClassifierUnavailable);

        let label = TriageError::UnrecognizedRiskLabel {
            label: "Unknown".to_string(),
        };
        assert!(!label.is_retryable());
        assert_eq!(label.kind(), ErrorKind::UnrecognizedRiskLabel);

        assert!(!TriageError::InvalidInput("empty".to_string()).is_retryable());
        assert!(!TriageError::MalformedResponse("no choices".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = TriageError::from(UnavailableCause::RateLimited {
            retry_after_secs: Some(2.5),
        });
        assert_eq!(err.retry_after(), Some(2.5));
        assert!(err.to_string().contains("retry after 2.5s"));

        let err = TriageError::from(UnavailableCause::ServerError {
            status: 503,
            message: "busy".to_string(),
        });
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnrecognizedRiskLabel).unwrap();
        assert_eq!(json, "\"unrecognized_risk_label\"");
        assert_eq!(
            ErrorKind::ClassifierUnavailable.to_string(),
            "classifier_unavailable"
        );
    }
}
