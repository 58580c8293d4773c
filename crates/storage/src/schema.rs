//! SQLite schema.
//!
//! There are no foreign keys: existence of owners is checked by the
//! repository, and deletes never cascade. `created_seq` records insertion
//! order and is the final tie-break of every listing.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS project_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sequences (
        project_code TEXT NOT NULL,
        entity_kind TEXT NOT NULL,
        value INTEGER NOT NULL,
        PRIMARY KEY (project_code, entity_kind)
    )",
    "CREATE TABLE IF NOT EXISTS roadmaps (
        id TEXT PRIMARY KEY,
        vision TEXT NOT NULL,
        success_criteria TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tracks (
        id TEXT PRIMARY KEY,
        roadmap_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL,
        rank INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        created_seq INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS track_dependencies (
        track_id TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (track_id, depends_on_id)
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        track_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL,
        rank INTEGER NOT NULL,
        branch TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        created_seq INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS iterations (
        number INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        goal TEXT NOT NULL,
        deliverable TEXT NOT NULL,
        status TEXT NOT NULL,
        rank INTEGER NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS iteration_tasks (
        iteration_number INTEGER NOT NULL,
        task_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (iteration_number, task_id)
    )",
    "CREATE TABLE IF NOT EXISTS acceptance_criteria (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL,
        description TEXT NOT NULL,
        verification_type TEXT NOT NULL,
        status TEXT NOT NULL,
        notes TEXT NOT NULL,
        testing_instructions TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        created_seq INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS adrs (
        id TEXT PRIMARY KEY,
        track_id TEXT NOT NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        context TEXT NOT NULL,
        decision TEXT NOT NULL,
        consequences TEXT NOT NULL,
        alternatives TEXT NOT NULL,
        superseded_by TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        created_seq INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_tracks_roadmap ON tracks(roadmap_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_track ON tasks(track_id)",
    "CREATE INDEX IF NOT EXISTS idx_iteration_tasks_task ON iteration_tasks(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_ac_task ON acceptance_criteria(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_adrs_track ON adrs(track_id)",
    // at most one current iteration
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_iterations_current
        ON iterations(status) WHERE status = 'current'",
];

/// Create every table and index that does not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = SCHEMA.len(), "schema initialised");
    Ok(())
}
