//! Architecture decision records attached to tracks.

use serde::{Deserialize, Serialize};

use crate::entity::{field_map, Entity};
use crate::error::{require_text, ValidationError, ValidationResult};
use crate::id::EntityKind;
use crate::Time;

/// ADR lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdrStatus {
    /// Under discussion
    Proposed,
    /// In force
    Accepted,
    /// No longer applies
    Deprecated,
    /// Replaced by another ADR
    Superseded,
}

impl AdrStatus {
    /// Stored and displayed literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdrStatus::Proposed => "proposed",
            AdrStatus::Accepted => "accepted",
            AdrStatus::Deprecated => "deprecated",
            AdrStatus::Superseded => "superseded",
        }
    }
}

impl std::fmt::Display for AdrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdrStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(AdrStatus::Proposed),
            "accepted" => Ok(AdrStatus::Accepted),
            "deprecated" => Ok(AdrStatus::Deprecated),
            "superseded" => Ok(AdrStatus::Superseded),
            other => Err(ValidationError::InvalidStatus {
                field: "ADR status",
                value: other.to_string(),
            }),
        }
    }
}

/// A recorded design decision owned by one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adr {
    /// `<projectCode>-adr-<n>`, empty until the repository assigns one
    pub id: String,

    /// Owning track
    pub track_id: String,

    /// Decision title
    pub title: String,

    /// Lifecycle status
    pub status: AdrStatus,

    /// Forces at play
    pub context: String,

    /// What was decided
    pub decision: String,

    /// What follows from it
    pub consequences: String,

    /// Options that were considered
    pub alternatives: String,

    /// Replacement ADR, required when superseded
    pub superseded_by: Option<String>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Adr {
    /// Create a proposed ADR without an id.
    pub fn new(
        track_id: impl Into<String>,
        title: impl Into<String>,
        context: impl Into<String>,
        decision: impl Into<String>,
        consequences: impl Into<String>,
    ) -> ValidationResult<Self> {
        let now = chrono::Utc::now();
        let adr = Self {
            id: String::new(),
            track_id: track_id.into(),
            title: title.into(),
            status: AdrStatus::Proposed,
            context: context.into(),
            decision: decision.into(),
            consequences: consequences.into(),
            alternatives: String::new(),
            superseded_by: None,
            created_at: now,
            updated_at: now,
        };
        adr.validate()?;
        Ok(adr)
    }

    /// Use an explicit id instead of an allocated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Record the alternatives considered.
    pub fn with_alternatives(mut self, alternatives: impl Into<String>) -> Self {
        self.alternatives = alternatives.into();
        self
    }

    /// Mark as replaced by `by`.
    pub fn supersede(&mut self, by: impl Into<String>) -> ValidationResult<()> {
        let by = by.into();
        if by.trim().is_empty() {
            return Err(ValidationError::MissingSupersededBy(self.id.clone()));
        }
        if by == self.id {
            return Err(ValidationError::InvalidTransition {
                entity: "adr",
                id: self.id.clone(),
                reason: "an ADR cannot supersede itself".into(),
            });
        }
        self.status = AdrStatus::Superseded;
        self.superseded_by = Some(by);
        Ok(())
    }

    /// Mark as no longer applying.
    pub fn deprecate(&mut self) {
        self.status = AdrStatus::Deprecated;
    }

    /// Check field invariants. An empty id is allowed before creation.
    pub fn validate(&self) -> ValidationResult<()> {
        require_text(&self.track_id, "adr", "track_id")?;
        require_text(&self.title, "adr", "title")?;
        require_text(&self.context, "adr", "context")?;
        require_text(&self.decision, "adr", "decision")?;
        require_text(&self.consequences, "adr", "consequences")?;

        let has_target = self
            .superseded_by
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if self.status == AdrStatus::Superseded && !has_target {
            return Err(ValidationError::MissingSupersededBy(self.id.clone()));
        }
        Ok(())
    }
}

impl Entity for Adr {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Adr
    }

    fn progress(&self) -> f64 {
        match self.status {
            AdrStatus::Accepted => 1.0,
            AdrStatus::Proposed => 0.5,
            _ => 0.0,
        }
    }

    fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        field_map(self)
    }
}
