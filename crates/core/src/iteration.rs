//! Iteration model - a time-boxed group of tasks.

use serde::{Deserialize, Serialize};

use crate::entity::{field_map, Entity};
use crate::error::{require_text, ValidationError, ValidationResult};
use crate::id::EntityKind;
use crate::ordering::{Ranked, DEFAULT_RANK};
use crate::Time;

/// Iteration status. At most one iteration is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationStatus {
    /// Not started yet
    Planned,
    /// The iteration being worked on
    Current,
    /// Finished
    Complete,
}

impl IterationStatus {
    /// Stored and displayed literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            IterationStatus::Planned => "planned",
            IterationStatus::Current => "current",
            IterationStatus::Complete => "complete",
        }
    }
}

impl std::fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IterationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(IterationStatus::Planned),
            "current" => Ok(IterationStatus::Current),
            "complete" => Ok(IterationStatus::Complete),
            other => Err(ValidationError::InvalidStatus {
                field: "iteration status",
                value: other.to_string(),
            }),
        }
    }
}

/// A planning unit keyed by a project-unique number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// Positive number; 0 asks the repository for the next free one
    pub number: i64,

    /// Short name
    pub name: String,

    /// What the iteration aims at
    pub goal: String,

    /// What it should deliver
    pub deliverable: String,

    /// Member task ids
    pub task_ids: Vec<String>,

    /// Current status
    pub status: IterationStatus,

    /// Order among iterations, lower first
    pub rank: i64,

    /// When it became current
    pub started_at: Option<Time>,

    /// When it was completed
    pub completed_at: Option<Time>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Iteration {
    /// Create a planned iteration. Pass 0 to take the next free number.
    pub fn new(
        number: i64,
        name: impl Into<String>,
        goal: impl Into<String>,
        deliverable: impl Into<String>,
    ) -> ValidationResult<Self> {
        let now = chrono::Utc::now();
        let iteration = Self {
            number,
            name: name.into(),
            goal: goal.into(),
            deliverable: deliverable.into(),
            task_ids: Vec::new(),
            status: IterationStatus::Planned,
            rank: DEFAULT_RANK,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        if number < 0 {
            return Err(ValidationError::InvalidIterationNumber(number));
        }
        require_text(&iteration.name, "iteration", "name")?;
        Ok(iteration)
    }

    /// Set the rank.
    pub fn with_rank(mut self, rank: i64) -> ValidationResult<Self> {
        self.rank = rank;
        if rank < 0 {
            return Err(self.rank_error());
        }
        Ok(self)
    }

    /// Add a member task. Duplicates are ignored.
    pub fn add_task(&mut self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        if !self.task_ids.contains(&task_id) {
            self.task_ids.push(task_id);
        }
    }

    /// Remove a member task. Returns whether it was present.
    pub fn remove_task(&mut self, task_id: &str) -> bool {
        let before = self.task_ids.len();
        self.task_ids.retain(|t| t != task_id);
        before != self.task_ids.len()
    }

    /// planned -> current
    pub fn start(&mut self, at: Time) -> ValidationResult<()> {
        if self.status != IterationStatus::Planned {
            return Err(self.transition_error(format!(
                "only planned iterations can be started (status is {})",
                self.status
            )));
        }
        self.status = IterationStatus::Current;
        self.started_at = Some(at);
        Ok(())
    }

    /// current -> complete
    pub fn complete(&mut self, at: Time) -> ValidationResult<()> {
        if self.status != IterationStatus::Current {
            return Err(self.transition_error(format!(
                "only the current iteration can be completed (status is {})",
                self.status
            )));
        }
        self.status = IterationStatus::Complete;
        self.completed_at = Some(at);
        Ok(())
    }

    /// Check field invariants of a stored iteration.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.number <= 0 {
            return Err(ValidationError::InvalidIterationNumber(self.number));
        }
        require_text(&self.name, "iteration", "name")?;
        if self.rank < 0 {
            return Err(self.rank_error());
        }
        Ok(())
    }

    fn transition_error(&self, reason: String) -> ValidationError {
        ValidationError::InvalidTransition {
            entity: "iteration",
            id: self.number.to_string(),
            reason,
        }
    }

    fn rank_error(&self) -> ValidationError {
        ValidationError::RankOutOfRange {
            entity: "iteration",
            rank: self.rank,
            allowed: ">= 0",
        }
    }
}

impl Entity for Iteration {
    fn id(&self) -> String {
        self.number.to_string()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Iteration
    }

    fn progress(&self) -> f64 {
        match self.status {
            IterationStatus::Complete => 1.0,
            IterationStatus::Current => 0.5,
            IterationStatus::Planned => 0.0,
        }
    }

    fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        field_map(self)
    }
}

impl Ranked for Iteration {
    type TieBreak = i64;
    const ENTITY: &'static str = "iteration";

    fn rank(&self) -> i64 {
        self.rank
    }

    fn set_rank(&mut self, rank: i64) {
        self.rank = rank;
    }

    fn tie_break(&self) -> i64 {
        self.number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_lifecycle() {
        let mut iteration = Iteration::new(1, "Sprint 1", "MVP", "CLI").unwrap();
        assert_eq!(iteration.status, IterationStatus::Planned);
        assert!(iteration.complete(Utc::now()).is_err());

        iteration.start(Utc::now()).unwrap();
        assert_eq!(iteration.status, IterationStatus::Current);
        assert!(iteration.started_at.is_some());
        assert_eq!(iteration.progress(), 0.5);
        assert!(matches!(
            iteration.start(Utc::now()),
            Err(ValidationError::InvalidTransition { .. })
        ));

        iteration.complete(Utc::now()).unwrap();
        assert_eq!(iteration.status, IterationStatus::Complete);
        assert!(iteration.completed_at.is_some());
        assert_eq!(iteration.progress(), 1.0);
    }

    #[test]
    fn test_number_rules() {
        assert!(Iteration::new(-1, "x", "", "").is_err());
        let pending = Iteration::new(0, "x", "", "").unwrap();
        assert_eq!(
            pending.validate(),
            Err(ValidationError::InvalidIterationNumber(0))
        );
        assert_eq!(Entity::id(&Iteration::new(7, "x", "", "").unwrap()), "7");
    }

    #[test]
    fn test_membership_dedup() {
        let mut iteration = Iteration::new(1, "x", "", "").unwrap();
        iteration.add_task("P-task-1");
        iteration.add_task("P-task-1");
        iteration.add_task("P-task-2");
        assert_eq!(iteration.task_ids, vec!["P-task-1", "P-task-2"]);
        assert!(iteration.remove_task("P-task-1"));
        assert!(!iteration.remove_task("P-task-1"));
    }
}
