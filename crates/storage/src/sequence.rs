//! Per-project, per-kind monotonic counters.

use roadmap_core::{parse_sequence_id, EntityKind};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;

/// Allocates strictly increasing numbers for `(project code, entity kind)`.
///
/// Each number is reserved by one atomic statement before it is returned, so
/// a failed write never hands out an unreserved number and deleted entities
/// never get their number back. The counter row for a pair is seeded above
/// any id of that kind already stored; after that, explicit ids must be
/// reported through [`observe`](Self::observe).
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    pool: SqlitePool,
}

impl SequenceAllocator {
    /// Create an allocator over the repository's pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reserve the next number.
    pub async fn next(&self, project_code: &str, kind: EntityKind) -> Result<i64> {
        let bumped: Option<i64> = sqlx::query_scalar(
            "UPDATE sequences SET value = value + 1
            WHERE project_code = ? AND entity_kind = ?
            RETURNING value",
        )
        .bind(project_code)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let value = match bumped {
            Some(value) => value,
            None => self.seed(project_code, kind).await?,
        };
        debug!(project_code, kind = %kind, value, "sequence allocated");
        Ok(value)
    }

    /// Make sure `n` is never handed out, for ids chosen by the caller.
    pub async fn observe(&self, project_code: &str, kind: EntityKind, n: i64) -> Result<()> {
        sqlx::query(
            "UPDATE sequences SET value = MAX(value, ?)
            WHERE project_code = ? AND entity_kind = ?",
        )
        .bind(n)
        .bind(project_code)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // First allocation for a pair. A concurrent seed of the same pair lands
    // in the conflict branch and takes the number after it.
    async fn seed(&self, project_code: &str, kind: EntityKind) -> Result<i64> {
        let floor = self.highest_existing(project_code, kind).await?;
        Ok(sqlx::query_scalar(
            "INSERT INTO sequences (project_code, entity_kind, value) VALUES (?, ?, ?)
            ON CONFLICT (project_code, entity_kind)
            DO UPDATE SET value = MAX(sequences.value + 1, excluded.value)
            RETURNING value",
        )
        .bind(project_code)
        .bind(kind.as_str())
        .bind(floor + 1)
        .fetch_one(&self.pool)
        .await?)
    }

    /// The last number handed out, 0 if none.
    pub async fn current(&self, project_code: &str, kind: EntityKind) -> Result<i64> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM sequences WHERE project_code = ? AND entity_kind = ?",
        )
        .bind(project_code)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.unwrap_or(0))
    }

    async fn highest_existing(&self, project_code: &str, kind: EntityKind) -> Result<i64> {
        let table = match kind {
            EntityKind::Task => "tasks",
            EntityKind::Criterion => "acceptance_criteria",
            EntityKind::Adr => "adrs",
            _ => return Ok(0),
        };
        let pattern = format!("{}-{}-%", project_code, kind.as_str());
        let ids: Vec<String> = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id LIKE ?"))
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids
            .iter()
            .filter_map(|id| parse_sequence_id(id, project_code, kind))
            .max()
            .unwrap_or(0))
    }
}
