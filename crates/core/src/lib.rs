//! Roadmap core data models.
//!
//! This crate defines the planning entities (roadmaps, tracks, tasks,
//! iterations, acceptance criteria and ADRs), their field invariants,
//! rank ordering, domain events and configuration values.

#![warn(missing_docs)]

// Identity and shared behaviour
mod id;
mod entity;
mod error;

// Planning entities
mod roadmap;
mod track;
mod task;
mod iteration;
mod criterion;
mod adr;

// Ordering, events, configuration
mod ordering;
mod event;
mod config;

// Re-exports
pub use id::*;
pub use entity::{field_map, Entity};
pub use error::{ValidationError, ValidationResult};

pub use roadmap::{Roadmap, RoadmapWithTracks};
pub use track::{Track, TrackStatus, TrackWithTasks};
pub use task::{Task, TaskStatus, TaskWithCriteria, TASK_RANK_MAX, TASK_RANK_MIN};
pub use iteration::{Iteration, IterationStatus};
pub use criterion::{AcceptanceCriterion, CriterionStatus, VerificationType};
pub use adr::{Adr, AdrStatus};

pub use ordering::{
    neighbor_index, plan_move, reorder_pair, sort_by_rank, MoveDirection, RankChange, Ranked,
    DEFAULT_RANK,
};
pub use event::{
    AdrChange, BusEvent, CriterionOutcome, DomainEvent, EntityRef, EntitySnapshot,
    IterationMilestone, StatusChange, TaskMilestone, TrackMilestone, DEFAULT_EVENT_NAMESPACE,
};
pub use config::{AdrConfig, Config, EventConfig, ProjectSettings};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
