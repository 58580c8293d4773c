//! Repository error kinds.

use roadmap_core::ValidationError;
use roadmap_quality::CompletionBlocked;

/// Error type for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;

/// Errors returned by the repository, most specific kind first.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Lookup by id or number found nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Create with an id that is already taken
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A field or graph invariant was violated
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A transition to done was refused
    #[error(transparent)]
    CompletionBlocked(#[from] CompletionBlocked),

    /// The underlying store failed
    #[error("store failure: {0}")]
    Store(String),
}

impl RepoError {
    /// `NotFound` for an entity kind and id.
    pub fn not_found(kind: impl std::fmt::Display, id: impl std::fmt::Display) -> Self {
        RepoError::NotFound(format!("{kind} {id}"))
    }

    /// `AlreadyExists` for an entity kind and id.
    pub fn already_exists(kind: impl std::fmt::Display, id: impl std::fmt::Display) -> Self {
        RepoError::AlreadyExists(format!("{kind} {id}"))
    }

    /// True for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound(_))
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::AlreadyExists(db.message().to_string())
            }
            _ => RepoError::Store(err.to_string()),
        }
    }
}
