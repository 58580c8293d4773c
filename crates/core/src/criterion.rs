//! Acceptance criteria - verification requirements on a task.

use serde::{Deserialize, Serialize};

use crate::entity::{field_map, Entity};
use crate::error::{require_text, ValidationError, ValidationResult};
use crate::id::EntityKind;
use crate::Time;

/// How a criterion gets verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationType {
    /// A person checks it
    Manual,
    /// A tool or test checks it
    Automated,
}

impl VerificationType {
    /// Stored and displayed literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationType::Manual => "manual",
            VerificationType::Automated => "automated",
        }
    }
}

impl std::fmt::Display for VerificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(VerificationType::Manual),
            "automated" => Ok(VerificationType::Automated),
            other => Err(ValidationError::InvalidStatus {
                field: "verification type",
                value: other.to_string(),
            }),
        }
    }
}

/// Verification state of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    /// Nothing checked yet
    NotStarted,
    /// Passed an automated check
    AutomaticallyVerified,
    /// Waiting for a person to confirm
    PendingHumanReview,
    /// Confirmed
    Verified,
    /// Checked and failed; needs re-verification
    Failed,
}

impl CriterionStatus {
    /// Stored and displayed literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionStatus::NotStarted => "not_started",
            CriterionStatus::AutomaticallyVerified => "automatically_verified",
            CriterionStatus::PendingHumanReview => "pending_human_review",
            CriterionStatus::Verified => "verified",
            CriterionStatus::Failed => "failed",
        }
    }

    /// Both success states count as verified.
    pub fn is_verified(&self) -> bool {
        matches!(
            self,
            CriterionStatus::Verified | CriterionStatus::AutomaticallyVerified
        )
    }

    /// The failure state.
    pub fn is_failed(&self) -> bool {
        *self == CriterionStatus::Failed
    }
}

impl std::fmt::Display for CriterionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CriterionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(CriterionStatus::NotStarted),
            "automatically_verified" => Ok(CriterionStatus::AutomaticallyVerified),
            "pending_human_review" => Ok(CriterionStatus::PendingHumanReview),
            "verified" => Ok(CriterionStatus::Verified),
            "failed" => Ok(CriterionStatus::Failed),
            other => Err(ValidationError::InvalidStatus {
                field: "acceptance criterion status",
                value: other.to_string(),
            }),
        }
    }
}

/// A verification requirement owned by one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    /// `<projectCode>-ac-<n>`, empty until the repository assigns one
    pub id: String,

    /// Owning task
    pub task_id: String,

    /// What must hold
    pub description: String,

    /// Manual or automated
    pub verification_type: VerificationType,

    /// Verification state
    pub status: CriterionStatus,

    /// Failure reason or verification notes
    pub notes: String,

    /// How to check it
    pub testing_instructions: String,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl AcceptanceCriterion {
    /// Create an unverified criterion without an id.
    pub fn new(
        task_id: impl Into<String>,
        description: impl Into<String>,
        verification_type: VerificationType,
    ) -> ValidationResult<Self> {
        let now = chrono::Utc::now();
        let criterion = Self {
            id: String::new(),
            task_id: task_id.into(),
            description: description.into(),
            verification_type,
            status: CriterionStatus::NotStarted,
            notes: String::new(),
            testing_instructions: String::new(),
            created_at: now,
            updated_at: now,
        };
        criterion.validate()?;
        Ok(criterion)
    }

    /// Use an explicit id instead of an allocated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set testing instructions.
    pub fn with_testing_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.testing_instructions = instructions.into();
        self
    }

    /// Mark as verified by a person.
    pub fn verify(&mut self, notes: impl Into<String>) {
        self.status = CriterionStatus::Verified;
        self.notes = notes.into();
    }

    /// Mark as verified by automation.
    pub fn verify_automatically(&mut self, notes: impl Into<String>) {
        self.status = CriterionStatus::AutomaticallyVerified;
        self.notes = notes.into();
    }

    /// Hand over to a person for review.
    pub fn request_review(&mut self) {
        self.status = CriterionStatus::PendingHumanReview;
    }

    /// Mark as failed with the reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = CriterionStatus::Failed;
        self.notes = reason.into();
    }

    /// Check field invariants. An empty id is allowed before creation.
    pub fn validate(&self) -> ValidationResult<()> {
        require_text(&self.task_id, "acceptance criterion", "task_id")?;
        require_text(&self.description, "acceptance criterion", "description")
    }
}

impl Entity for AcceptanceCriterion {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Criterion
    }

    fn progress(&self) -> f64 {
        match self.status {
            s if s.is_verified() => 1.0,
            CriterionStatus::PendingHumanReview => 0.5,
            _ => 0.0,
        }
    }

    fn is_blocked(&self) -> bool {
        self.status.is_failed()
    }

    fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        field_map(self)
    }
}
