//! Classifier client module.

mod classifier;
mod llm_client;
mod prompt;

pub use classifier::*;
pub use llm_client::*;
pub use prompt::*;

#[cfg(test)]
pub(crate) use classifier::fakes;
