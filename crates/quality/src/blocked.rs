//! Why a task could not be completed.

use roadmap_core::{AcceptanceCriterion, CriterionStatus};
use serde::Serialize;

/// A criterion standing in the way of completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingCriterion {
    /// Criterion id
    pub id: String,
    /// What it requires
    pub description: String,
    /// Its current status
    pub status: CriterionStatus,
    /// Failure reason or notes, verbatim
    pub notes: String,
}

impl From<&AcceptanceCriterion> for BlockingCriterion {
    fn from(ac: &AcceptanceCriterion) -> Self {
        Self {
            id: ac.id.clone(),
            description: ac.description.clone(),
            status: ac.status,
            notes: ac.notes.clone(),
        }
    }
}

/// The refusal reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    /// Some criteria failed or are not verified yet
    UnmetCriteria {
        /// Criteria in the failed state
        failed: Vec<BlockingCriterion>,
        /// Criteria neither verified nor failed
        unverified: Vec<BlockingCriterion>,
    },
    /// ADRs are enforced and the track has none
    MissingAdr {
        /// The track lacking an ADR
        track_id: String,
    },
}

/// A transition to done was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("task {task_id} cannot be marked done: {}", describe(.reason))]
pub struct CompletionBlocked {
    /// The task whose completion was refused
    pub task_id: String,
    /// Why
    pub reason: BlockReason,
}

impl CompletionBlocked {
    /// Every blocking criterion, failed ones first.
    pub fn criteria(&self) -> Vec<&BlockingCriterion> {
        match &self.reason {
            BlockReason::UnmetCriteria { failed, unverified } => {
                failed.iter().chain(unverified.iter()).collect()
            }
            BlockReason::MissingAdr { .. } => Vec::new(),
        }
    }

    /// True when the refusal is about a missing ADR.
    pub fn is_missing_adr(&self) -> bool {
        matches!(self.reason, BlockReason::MissingAdr { .. })
    }
}

fn describe(reason: &BlockReason) -> String {
    match reason {
        BlockReason::UnmetCriteria { failed, unverified } => {
            let mut parts = Vec::new();
            if !failed.is_empty() {
                let list: Vec<String> = failed
                    .iter()
                    .map(|ac| {
                        if ac.notes.is_empty() {
                            ac.id.clone()
                        } else {
                            format!("{} ({})", ac.id, ac.notes)
                        }
                    })
                    .collect();
                parts.push(format!("{} failed acceptance criteria: {}", failed.len(), list.join(", ")));
            }
            if !unverified.is_empty() {
                let list: Vec<&str> = unverified.iter().map(|ac| ac.id.as_str()).collect();
                parts.push(format!(
                    "{} unverified acceptance criteria: {}",
                    unverified.len(),
                    list.join(", ")
                ));
            }
            parts.join("; ")
        }
        BlockReason::MissingAdr { track_id } => {
            format!("track {track_id} has no ADR and ADRs are required before completion")
        }
    }
}
