//! Recommendation policy module.

mod recommendation;

pub use recommendation::*;
