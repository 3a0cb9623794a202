//! Risk tier → verification requirements.
//!
//! Epistemic foundation:
//! - K_i: Every tier maps to a non-empty, rigor-ordered step list
//! - K_i: The table is built once and never mutated
//! - B_i: A table handed in by an embedder may be incomplete → checked on build

use crate::models::{Result, RiskLevel, TriageError, VerificationStep};
use std::collections::HashMap;

/// Immutable lookup table from risk tier to required verification steps.
///
/// Share it behind an `Arc`; resolution takes `&self` and performs no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationPolicy {
    table: HashMap<RiskLevel, Vec<VerificationStep>>,
}

impl RecommendationPolicy {
    /// The canonical policy.
    ///
    /// | Tier   | Steps                                                 |
    /// |--------|-------------------------------------------------------|
    /// | Low    | document verification                                 |
    /// | Medium | document verification, liveness check                 |
    /// | High   | document verification, liveness check, human review   |
    pub fn canonical() -> Self {
        use crate::models::VerificationStep::*;

        let table = HashMap::from([
            (RiskLevel::Low, vec![DocumentVerification]),
            (RiskLevel::Medium, vec![DocumentVerification, LivenessCheck]),
            (
                RiskLevel::High,
                vec![DocumentVerification, LivenessCheck, HumanReview],
            ),
        ]);

        Self { table }
    }

    /// Build a policy from explicit entries.
    ///
    /// Every tier needs exactly one entry with at least one step, no step
    /// repeated, listed in increasing rigor.
    pub fn new(
        entries: impl IntoIterator<Item = (RiskLevel, Vec<VerificationStep>)>,
    ) -> Result<Self> {
        let mut table = HashMap::new();

        for (level, steps) in entries {
            if steps.is_empty() {
                return Err(TriageError::PolicyViolation(format!(
                    "{level} has no verification steps"
                )));
            }
            if !steps.windows(2).all(|pair| pair[0] < pair[1]) {
                return Err(TriageError::PolicyViolation(format!(
                    "{level} steps must be unique and in increasing rigor"
                )));
            }
            if table.insert(level, steps).is_some() {
                return Err(TriageError::PolicyViolation(format!(
                    "{level} is mapped more than once"
                )));
            }
        }

        if let Some(missing) = RiskLevel::ALL.iter().find(|l| !table.contains_key(*l)) {
            return Err(TriageError::PolicyViolation(format!(
                "{missing} has no mapping"
            )));
        }

        Ok(Self { table })
    }

    /// Required steps for a tier, in order.
    ///
    /// Fails loudly instead of returning an empty list.
    pub fn resolve(&self, risk: RiskLevel) -> Result<&[VerificationStep]> {
        match self.table.get(&risk) {
            Some(steps) if !steps.is_empty() => Ok(steps),
            Some(_) => Err(TriageError::PolicyViolation(format!(
                "{risk} resolved to no verification steps"
            ))),
            None => Err(TriageError::PolicyViolation(format!(
                "{risk} has no mapping"
            ))),
        }
    }

    /// Entries ordered by tier.
    pub fn entries(&self) -> impl Iterator<Item = (RiskLevel, &[VerificationStep])> + '_ {
        RiskLevel::ALL
            .into_iter()
            .filter_map(|level| self.table.get(&level).map(|s| (level, s.as_slice())))
    }
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self::canonical()
    }
}
