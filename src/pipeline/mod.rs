//! Pipeline module - orchestration, retry and batch triage.

mod batch;
mod orchestrator;
mod retry;

pub use batch::*;
pub use orchestrator::*;
pub use retry::*;
