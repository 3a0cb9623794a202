//! Risk tiers and verification steps.
//!
//! K_i: The tier set is closed. `RiskLevel::parse` is the only way an
//! untyped classifier label becomes a `RiskLevel`.

use super::{Result, TriageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete risk tier assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// All tiers, lowest to highest.
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    /// Normalize and validate a raw classifier label.
    ///
    /// Surrounding whitespace is ignored and matching is case-insensitive.
    /// Anything other than exactly one of the three labels is rejected;
    /// there is no partial matching and no fallback tier.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim();
        if normalized.eq_ignore_ascii_case("low") {
            Ok(Self::Low)
        } else if normalized.eq_ignore_ascii_case("medium") {
            Ok(Self::Medium)
        } else if normalized.eq_ignore_ascii_case("high") {
            Ok(Self::High)
        } else {
            Err(TriageError::UnrecognizedRiskLabel {
                label: raw.to_string(),
            })
        }
    }

    /// Canonical label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RiskLevel {
    type Error = TriageError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic verification requirement.
///
/// Variant order is rigor order: comparing two steps tells which is stricter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VerificationStep {
    #[serde(rename = "document verification")]
    DocumentVerification,
    #[serde(rename = "liveness check")]
    LivenessCheck,
    #[serde(rename = "human review")]
    HumanReview,
}

impl VerificationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentVerification => "document verification",
            Self::LivenessCheck => "liveness check",
            Self::HumanReview => "human review",
        }
    }
}

impl fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
