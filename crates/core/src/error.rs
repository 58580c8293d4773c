//! Field-level validation errors.

/// Result of validating an entity or an input value.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// A value broke one of the entity model's invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Track id does not match `track-<lowercase-hyphenated>`
    #[error("invalid track id {0:?}: expected track-<lowercase words separated by hyphens>")]
    InvalidTrackId(String),

    /// Project code does not match `^[A-Z][A-Z0-9]*$`
    #[error("invalid project code {0:?}: expected uppercase letters and digits")]
    InvalidProjectCode(String),

    /// A status literal is not a member of its enum
    #[error("invalid {field} {value:?}")]
    InvalidStatus {
        /// Name of the status field
        field: &'static str,
        /// The rejected literal
        value: String,
    },

    /// Rank outside the allowed range for the entity kind
    #[error("{entity} rank {rank} is out of range ({allowed})")]
    RankOutOfRange {
        /// Entity kind
        entity: &'static str,
        /// The rejected rank
        rank: i64,
        /// Human readable range
        allowed: &'static str,
    },

    /// Iteration numbers are positive
    #[error("invalid iteration number {0}: must be positive")]
    InvalidIterationNumber(i64),

    /// A required text field is empty
    #[error("{entity} {field} must not be empty")]
    EmptyField {
        /// Entity kind
        entity: &'static str,
        /// Field name
        field: &'static str,
    },

    /// A track lists itself as a dependency
    #[error("track {0} cannot depend on itself")]
    SelfDependency(String),

    /// Persisting the dependency set would close a cycle
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle {
        /// Track whose dependencies were being changed
        track_id: String,
        /// The cycle, starting and ending at `track_id`
        path: Vec<String>,
    },

    /// Superseded ADRs must name their replacement
    #[error("ADR {0} is superseded but has no superseded_by id")]
    MissingSupersededBy(String),

    /// A state machine refused the requested transition
    #[error("{entity} {id}: {reason}")]
    InvalidTransition {
        /// Entity kind
        entity: &'static str,
        /// Entity id
        id: String,
        /// Why the transition is not allowed
        reason: String,
    },
}

/// Fails with [`ValidationError::EmptyField`] when `value` is blank.
pub(crate) fn require_text(
    value: &str,
    entity: &'static str,
    field: &'static str,
) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { entity, field });
    }
    Ok(())
}
