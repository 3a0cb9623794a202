//! Core data models for kyc-triage.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Closed enums for tiers and steps
//! - B_i (Beliefs): Classifier output, wrapped in Result until validated
//! - I^R (Resolvable): Endpoint, deployment and credentials from config
//! - I^B (Bounded): Error variants the caller may retry

mod config;
mod decision;
mod error;
mod risk;

pub use config::*;
pub use decision::*;
pub use error::*;
pub use risk::*;
