//! Persistence for roadmap planning data.
//!
//! This crate provides the [`Repository`] contract and its SQLite
//! implementation, which enforces the planning invariants, plus the id
//! sequence allocator and the pairwise reorder operations.

#![warn(missing_docs)]

pub mod error;
pub mod reorder;
mod rows;
pub mod schema;
pub mod sequence;
pub mod sqlite_repository;
pub mod trait_;

pub use error::{RepoError, Result};
pub use reorder::{move_iteration, move_task, move_track};
pub use sequence::SequenceAllocator;
pub use sqlite_repository::SqliteRepository;
pub use trait_::{CriterionFilter, Repository, TaskFilter, TrackFilter, PROJECT_CODE_KEY};
