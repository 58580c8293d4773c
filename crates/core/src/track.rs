//! Track model - a scoped body of work inside a roadmap.

use serde::{Deserialize, Serialize};

use crate::entity::{field_map, Entity};
use crate::error::{require_text, ValidationError, ValidationResult};
use crate::id::{trailing_number, validate_track_id, EntityKind};
use crate::ordering::{Ranked, DEFAULT_RANK};
use crate::task::Task;
use crate::Time;

/// Track lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackStatus {
    /// Not yet started
    #[serde(rename = "not-started")]
    NotStarted,
    /// Work under way
    #[serde(rename = "in-progress")]
    InProgress,
    /// Finished
    #[serde(rename = "complete")]
    Complete,
    /// Cannot proceed
    #[serde(rename = "blocked")]
    Blocked,
    /// Waiting on something outside the track
    #[serde(rename = "waiting")]
    Waiting,
}

impl TrackStatus {
    /// Stored and displayed literal.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::NotStarted => "not-started",
            TrackStatus::InProgress => "in-progress",
            TrackStatus::Complete => "complete",
            TrackStatus::Blocked => "blocked",
            TrackStatus::Waiting => "waiting",
        }
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-started" => Ok(TrackStatus::NotStarted),
            "in-progress" => Ok(TrackStatus::InProgress),
            "complete" => Ok(TrackStatus::Complete),
            "blocked" => Ok(TrackStatus::Blocked),
            "waiting" => Ok(TrackStatus::Waiting),
            other => Err(ValidationError::InvalidStatus {
                field: "track status",
                value: other.to_string(),
            }),
        }
    }
}

/// A unit of scoped work owned by a roadmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Caller-chosen id, `track-<lowercase-hyphenated>`
    pub id: String,

    /// Owning roadmap
    pub roadmap_id: String,

    /// Track title
    pub title: String,

    /// Detailed description
    pub description: String,

    /// Current status
    pub status: TrackStatus,

    /// Order among sibling tracks, lower first
    pub rank: i64,

    /// Ids of tracks this one depends on, in insertion order
    pub dependencies: Vec<String>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Track {
    /// Create a not-started track at the default rank.
    pub fn new(
        id: impl Into<String>,
        roadmap_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> ValidationResult<Self> {
        let now = chrono::Utc::now();
        let track = Self {
            id: id.into(),
            roadmap_id: roadmap_id.into(),
            title: title.into(),
            description: description.into(),
            status: TrackStatus::NotStarted,
            rank: DEFAULT_RANK,
            dependencies: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        track.validate()?;
        Ok(track)
    }

    /// Set the rank.
    pub fn with_rank(mut self, rank: i64) -> ValidationResult<Self> {
        self.rank = rank;
        self.validate()?;
        Ok(self)
    }

    /// Declare dependencies.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> ValidationResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            self.add_dependency(dependency)?;
        }
        Ok(self)
    }

    /// Add a dependency edge. Duplicates are ignored.
    pub fn add_dependency(&mut self, dependency: impl Into<String>) -> ValidationResult<()> {
        let dependency = dependency.into();
        if dependency == self.id {
            return Err(ValidationError::SelfDependency(self.id.clone()));
        }
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        Ok(())
    }

    /// Remove a dependency edge. Returns whether it was present.
    pub fn remove_dependency(&mut self, dependency: &str) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| d != dependency);
        before != self.dependencies.len()
    }

    /// Check field invariants.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_track_id(&self.id)?;
        require_text(&self.roadmap_id, "track", "roadmap_id")?;
        require_text(&self.title, "track", "title")?;
        if self.rank < 0 {
            return Err(ValidationError::RankOutOfRange {
                entity: "track",
                rank: self.rank,
                allowed: ">= 0",
            });
        }
        if self.dependencies.iter().any(|d| d == &self.id) {
            return Err(ValidationError::SelfDependency(self.id.clone()));
        }
        Ok(())
    }
}

impl Entity for Track {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Track
    }

    fn progress(&self) -> f64 {
        match self.status {
            TrackStatus::Complete => 1.0,
            TrackStatus::InProgress => 0.5,
            _ => 0.0,
        }
    }

    fn is_blocked(&self) -> bool {
        self.status == TrackStatus::Blocked
    }

    fn fields(&self) -> serde_json::Map<String, serde_json::Value> {
        field_map(self)
    }
}

impl Ranked for Track {
    type TieBreak = (Time, u64, String);
    const ENTITY: &'static str = "track";

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

/// A track together with its tasks in rank order.
#[derive(Debug, Clone, Serialize)]
pub struct TrackWithTasks {
    /// The track
    pub track: Track,
    /// Its tasks
    pub tasks: Vec<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_track_defaults() {
        let track = Track::new("track-core", "roadmap-1", "Core", "").unwrap();
        assert_eq!(track.status, TrackStatus::NotStarted);
        assert_eq!(track.rank, DEFAULT_RANK);
        assert!(track.dependencies.is_empty());
    }

    #[test]
    fn test_rejects_bad_id_and_rank() {
        assert!(matches!(
            Track::new("core", "roadmap-1", "Core", ""),
            Err(ValidationError::InvalidTrackId(_))
        ));
        let track = Track::new("track-core", "roadmap-1", "Core", "").unwrap();
        assert!(matches!(
            track.clone().with_rank(-1),
            Err(ValidationError::RankOutOfRange { .. })
        ));
        assert_eq!(track.with_rank(0).unwrap().rank, 0);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut track = Track::new("track-a", "roadmap-1", "A", "").unwrap();
        assert_eq!(
            track.add_dependency("track-a"),
            Err(ValidationError::SelfDependency("track-a".into()))
        );

        track.dependencies.push("track-a".into());
        assert!(track.validate().is_err());
    }

    #[test]
    fn test_dependencies_keep_order_without_duplicates() {
        let mut track = Track::new("track-a", "roadmap-1", "A", "")
            .unwrap()
            .with_dependencies(["track-c", "track-b", "track-c"])
            .unwrap();
        assert_eq!(track.dependencies, vec!["track-c", "track-b"]);

        assert!(track.remove_dependency("track-c"));
        assert!(!track.remove_dependency("track-c"));
        assert_eq!(track.dependencies, vec!["track-b"]);
    }

    #[test]
    fn test_status_literals() {
        for status in [
            TrackStatus::NotStarted,
            TrackStatus::InProgress,
            TrackStatus::Complete,
            TrackStatus::Blocked,
            TrackStatus::Waiting,
        ] {
            assert_eq!(status.as_str().parse::<TrackStatus>(), Ok(status));
        }
        assert!("done".parse::<TrackStatus>().is_err());
        assert_eq!(
            serde_json::to_value(TrackStatus::NotStarted).unwrap(),
            serde_json::json!("not-started")
        );
    }

    #[test]
    fn test_progress_and_blocked() {
        let mut track = Track::new("track-a", "roadmap-1", "A", "").unwrap();
        assert_eq!(track.progress(), 0.0);
        track.status = TrackStatus::InProgress;
        assert_eq!(track.progress(), 0.5);
        track.status = TrackStatus::Complete;
        assert_eq!(track.progress(), 1.0);
        assert!(!track.is_blocked());
        track.status = TrackStatus::Blocked;
        assert!(track.is_blocked());

        let fields = track.fields();
        assert_eq!(fields["id"], "track-a");
        assert_eq!(fields["status"], "blocked");
        assert_eq!(fields["is_blocked"], true);
        assert_eq!(fields["entity_type"], "track");
    }
}
