//! Request and decision types.
//!
//! K_i: These types represent the core data flow through the pipeline.

use super::{Result, RiskLevel, TriageError, VerificationStep};
use serde::Serialize;
use std::fmt;

/// Applicant description submitted for triage.
///
/// K_i: Never empty. The only constructors reject blank, non-UTF-8 and
/// null input, so an empty context cannot reach the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext(String);

impl UserContext {
    /// Build a context from free-form text.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(TriageError::InvalidInput(
                "user context is empty".to_string(),
            ));
        }
        Ok(Self(text))
    }

    /// Build a context from raw bytes (request body, file, stdin).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let text = String::from_utf8(bytes).map_err(|e| {
            TriageError::InvalidInput(format!("user context is not valid UTF-8: {e}"))
        })?;
        Self::new(text)
    }

    /// Build a context from a JSON payload.
    ///
    /// Strings are taken verbatim; any other value is serialized to compact JSON.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Null => Err(TriageError::InvalidInput(
                "user context is null".to_string(),
            )),
            serde_json::Value::String(s) => Self::new(s.as_str()),
            other => Self::new(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of a triage request.
///
/// Immutable once built; `required_steps` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDecision {
    risk_level: RiskLevel,
    required_steps: Vec<VerificationStep>,
}

impl VerificationDecision {
    pub(crate) fn new(
        risk_level: RiskLevel,
        required_steps: Vec<VerificationStep>,
    ) -> Result<Self> {
        if required_steps.is_empty() {
            return Err(TriageError::PolicyViolation(format!(
                "no verification steps resolved for {risk_level}"
            )));
        }
        Ok(Self {
            risk_level,
            required_steps,
        })
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn required_steps(&self) -> &[VerificationStep] {
        &self.required_steps
    }
}

impl fmt::Display for VerificationDecision {
    /// `Risk=<level>; Recommended verification requirements: <steps>.`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<&str> = self.required_steps.iter().map(|s| s.as_str()).collect();
        write!(
            f,
            "Risk={}; Recommended verification requirements: {}.",
            self.risk_level,
            steps.join(", ")
        )
    }
}
