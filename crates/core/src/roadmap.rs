//! Roadmap model - the root planning scope of a project.

use serde::{Deserialize, Serialize};

use crate::entity::{field_map, Entity};
use crate::error::{require_text, ValidationResult};
use crate::id::{new_roadmap_id, EntityKind};
use crate::track::Track;
use crate::Time;

/// The root scope for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    /// Unique identifier
    pub id: String,

    /// Where the project is heading
    pub vision: String,

    /// How success is judged
    pub success_criteria: String,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Roadmap {
    /// Create a roadmap with a generated id.
    pub fn new(
        vision: impl Into<String>,
        success_criteria: impl Into<String>,
    ) -> ValidationResult<Self> {
        let now = chrono::Utc::now();
        let roadmap = Self {
            id: new_roadmap_id(),
            vision: vision.into(),
            success_criteria: success_criteria.into(),
            created_at: now,
            updated_at: now,
        };
        roadmap.validate()?;
        Ok(roadmap)
    }

    /// Check field invariants.
    pub fn validate(&self) -> ValidationResult<()> {
        require_text(&self.id, "roadmap", "id")?;
        require_text(&self.vision, "roadmap", "vision")
    }
}

impl Entity for Roadmap {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Roadmap
    }

    fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        field_map(self)
    }
}

/// A roadmap together with its tracks in rank order.
#[derive(Debug, Clone, Serialize)]
pub struct RoadmapWithTracks {
    /// The roadmap
    pub roadmap: Roadmap,
    /// Its tracks
    pub tracks: Vec<Track>,
}
