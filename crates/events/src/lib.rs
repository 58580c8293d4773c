//! Domain event emission for the roadmap repository.
//!
//! [`EventEmittingRepository`] wraps any [`roadmap_storage::Repository`],
//! derives events from the before/after state of each successful mutation
//! and hands them to an [`EventBus`] in the background. Publication is best
//! effort: a failing or slow sink never fails the mutation.

#![warn(missing_docs)]

pub mod bus;
pub mod decorator;
pub mod derive;
pub mod webhook;

pub use bus::{EventBus, LogEventBus, PublishError, RecordingEventBus};
pub use decorator::EventEmittingRepository;
pub use webhook::WebhookEventBus;
