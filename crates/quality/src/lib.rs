//! Task completion gate.
//!
//! Decides whether a task may move to done: every acceptance criterion must
//! be verified, and when the project enforces it the owning track must have
//! at least one ADR.

#![warn(missing_docs)]

pub mod blocked;
pub mod gate;

pub use blocked::{BlockReason, BlockingCriterion, CompletionBlocked};
pub use gate::CompletionGate;
