//! kyc-triage - Risk-based identity verification triage.
//!
//! ## Architecture
//!
//! A single request flows through four stages:
//! - **Classifier**: Sends the applicant context to a chat-completions deployment
//! - **Validator**: Admits the raw label only if it is Low, Medium or High
//! - **Policy**: Maps the tier to an ordered list of verification steps
//! - **Orchestrator**: Runs the stages and returns a decision or an error
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Closed enums for tiers and steps, immutable policy table
//! - B_i (Beliefs): Classifier output is untrusted until `RiskLevel::parse`
//! - I^R (Resolvable): Endpoint, deployment, credential, prompt from config
//! - I^B (Bounded): Timeouts and rate limits surface as retryable errors

pub mod client;
pub mod models;
pub mod pipeline;
pub mod policy;

// Re-exports for convenience
pub use client::{ChatClassifier, ClassificationTask, RiskClassifier};
pub use models::{
    Config, ConfigError, ErrorKind, Result, RiskLevel, TriageError, UserContext,
    VerificationDecision, VerificationStep,
};
pub use pipeline::{BatchRunner, RetryPolicy, VerificationOrchestrator};
pub use policy::RecommendationPolicy;
