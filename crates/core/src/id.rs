//! Identifier formats for roadmap entities.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{ValidationError, ValidationResult};

/// Project code used until one is stored in the project metadata.
pub const DEFAULT_PROJECT_CODE: &str = "RM";

/// The kinds of entity managed by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Root planning scope
    Roadmap,
    /// Scoped body of work
    Track,
    /// Unit of work within a track
    Task,
    /// Time-boxed group of tasks
    Iteration,
    /// Acceptance criterion on a task
    #[serde(rename = "ac")]
    Criterion,
    /// Architecture decision record on a track
    Adr,
}

impl EntityKind {
    /// Short tag used in ids and event names.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Roadmap => "roadmap",
            EntityKind::Track => "track",
            EntityKind::Task => "task",
            EntityKind::Iteration => "iteration",
            EntityKind::Criterion => "ac",
            EntityKind::Adr => "adr",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn track_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^track-[a-z0-9]+(-[a-z0-9]+)*$").expect("track id pattern is valid")
    })
}

fn project_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]*$").expect("project code pattern is valid"))
}

/// Checks a caller-chosen track id against `track-<lowercase-hyphenated>`.
pub fn validate_track_id(id: &str) -> ValidationResult<()> {
    if track_id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTrackId(id.to_string()))
    }
}

/// Checks a project code such as `RM` or `P2`.
pub fn validate_project_code(code: &str) -> ValidationResult<()> {
    if project_code_pattern().is_match(code) {
        Ok(())
    } else {
        Err(ValidationError::InvalidProjectCode(code.to_string()))
    }
}

/// Builds `<projectCode>-<kind>-<n>`.
pub fn format_sequence_id(project_code: &str, kind: EntityKind, n: i64) -> String {
    format!("{}-{}-{}", project_code, kind.as_str(), n)
}

/// Extracts `n` from an id built by [`format_sequence_id`] for the same code and kind.
pub fn parse_sequence_id(id: &str, project_code: &str, kind: EntityKind) -> Option<i64> {
    let rest = id.strip_prefix(project_code)?.strip_prefix('-')?;
    let number = rest.strip_prefix(kind.as_str())?.strip_prefix('-')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

/// The number an id ends with, 0 if none, so `P-task-2` sorts before `P-task-10`.
pub fn trailing_number(id: &str) -> u64 {
    let digits = id.len() - id.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    id[id.len() - digits..].parse().unwrap_or(0)
}

/// Generates a fresh roadmap id.
pub fn new_roadmap_id() -> String {
    format!("roadmap-{}", Ulid::new().to_string().to_lowercase())
}

/// Unique identifier for a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Ulid);

impl EventId {
    /// Generate a new EventId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for EventId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_format() {
        assert!(validate_track_id("track-a").is_ok());
        assert!(validate_track_id("track-core-api-2").is_ok());

        for bad in ["track-", "Track-a", "track-A", "track_a", "a", "track-a--b", "track-a-", "tracka"] {
            assert_eq!(
                validate_track_id(bad),
                Err(ValidationError::InvalidTrackId(bad.to_string())),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_project_code_format() {
        assert!(validate_project_code("RM").is_ok());
        assert!(validate_project_code("P2").is_ok());
        assert!(validate_project_code("rm").is_err());
        assert!(validate_project_code("2P").is_err());
        assert!(validate_project_code("").is_err());
    }

    #[test]
    fn test_sequence_id_roundtrip() {
        let id = format_sequence_id("P", EntityKind::Task, 12);
        assert_eq!(id, "P-task-12");
        assert_eq!(parse_sequence_id(&id, "P", EntityKind::Task), Some(12));
        assert_eq!(parse_sequence_id(&id, "P", EntityKind::Criterion), None);
        assert_eq!(parse_sequence_id("PX-task-3", "P", EntityKind::Task), None);
        assert_eq!(parse_sequence_id("P-task-", "P", EntityKind::Task), None);
        assert_eq!(parse_sequence_id("P-task-+4", "P", EntityKind::Task), None);
        assert_eq!(format_sequence_id("RM", EntityKind::Criterion, 1), "RM-ac-1");
    }

    #[test]
    fn test_trailing_number() {
        assert_eq!(trailing_number("P-task-10"), 10);
        assert_eq!(trailing_number("P2-ac-7"), 7);
        assert_eq!(trailing_number("track-core"), 0);
        assert_eq!(trailing_number(""), 0);
    }

    #[test]
    fn test_roadmap_ids_are_unique() {
        let a = new_roadmap_id();
        let b = new_roadmap_id();
        assert!(a.starts_with("roadmap-"));
        assert_ne!(a, b);
    }
}
