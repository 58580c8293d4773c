//! Task model - the unit of work gated by acceptance criteria.

use serde::{Deserialize, Serialize};

use crate::criterion::AcceptanceCriterion;
use crate::entity::{field_map, Entity};
use crate::error::{require_text, ValidationError, ValidationResult};
use crate::id::{trailing_number, EntityKind};
use crate::ordering::{Ranked, DEFAULT_RANK};
use crate::Time;

/// Lowest rank a task may hold.
pub const TASK_RANK_MIN: i64 = 1;

/// Highest rank a task may hold.
pub const TASK_RANK_MAX: i64 = 1000;

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Not started
    #[serde(rename = "todo")]
    Todo,
    /// Being worked on
    #[serde(rename = "in-progress")]
    InProgress,
    /// Finished, only reachable through the completion gate
    #[serde(rename = "done")]
    Done,
}

impl TaskStatus {
    /// Stored and displayed literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in-progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(ValidationError::InvalidStatus {
                field: "task status",
                value: other.to_string(),
            }),
        }
    }
}

/// A unit of work owned by exactly one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// `<projectCode>-task-<n>`, empty until the repository assigns one
    pub id: String,

    /// Owning track
    pub track_id: String,

    /// Task title
    pub title: String,

    /// Detailed description
    pub description: String,

    /// Current status
    pub status: TaskStatus,

    /// Order within the track, 1 to 1000
    pub rank: i64,

    /// Working branch, if any
    pub branch: Option<String>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Task {
    /// Create a todo task without an id.
    pub fn new(
        track_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> ValidationResult<Self> {
        let now = chrono::Utc::now();
        let task = Self {
            id: String::new(),
            track_id: track_id.into(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Todo,
            rank: DEFAULT_RANK,
            branch: None,
            created_at: now,
            updated_at: now,
        };
        task.validate()?;
        Ok(task)
    }

    /// Use an explicit id instead of an allocated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the rank.
    pub fn with_rank(mut self, rank: i64) -> ValidationResult<Self> {
        self.rank = rank;
        self.validate()?;
        Ok(self)
    }

    /// Set the working branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Check field invariants. An empty id is allowed before creation.
    pub fn validate(&self) -> ValidationResult<()> {
        require_text(&self.track_id, "task", "track_id")?;
        require_text(&self.title, "task", "title")?;
        if !(TASK_RANK_MIN..=TASK_RANK_MAX).contains(&self.rank) {
            return Err(ValidationError::RankOutOfRange {
                entity: "task",
                rank: self.rank,
                allowed: "1..=1000",
            });
        }
        Ok(())
    }
}

impl Entity for Task {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Task
    }

    fn progress(&self) -> f64 {
        match self.status {
            TaskStatus::Done => 1.0,
            TaskStatus::InProgress => 0.5,
            TaskStatus::Todo => 0.0,
        }
    }

    fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        field_map(self)
    }
}

impl Ranked for Task {
    type TieBreak = (Time, u64, String);
    const ENTITY: &'static str = "task";

    fn rank(&self) -> i64 {
        self.rank
    }

    fn set_rank(&mut self, rank: i64) {
        self.rank = rank;
    }

    fn tie_break(&self) -> Self::TieBreak {
        (self.created_at, trailing_number(&self.id), self.id.clone())
    }
}

/// A task together with its acceptance criteria.
#[derive(Debug, Clone, Serialize)]
pub struct TaskWithCriteria {
    /// The task
    pub task: Task,
    /// Its acceptance criteria in creation order
    pub criteria: Vec<AcceptanceCriterion>,
}
