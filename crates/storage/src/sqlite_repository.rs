//! SQLite repository - the consistency core.
//!
//! Every mutation validates the entity, checks owners exist, and enforces the
//! cross-record invariants (acyclic track dependencies, a single current
//! iteration, the completion gate) before touching the store. Writes that
//! make up one record's logical state (a track and its dependency edges, an
//! iteration and its membership) run in one transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roadmap_core::{
    parse_sequence_id, validate_project_code, AcceptanceCriterion, Adr, AdrConfig, EntityKind,
    Iteration, IterationStatus, Roadmap, Task, TaskStatus, Track, ValidationError,
    DEFAULT_PROJECT_CODE,
};
use roadmap_graph::DependencyGraph;
use roadmap_quality::CompletionGate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{RepoError, Result};
use crate::rows::{self, encode_time, now};
use crate::schema::init_schema;
use crate::sequence::SequenceAllocator;
use crate::trait_::{CriterionFilter, Repository, TaskFilter, TrackFilter, PROJECT_CODE_KEY};

const ROADMAP_COLUMNS: &str = "id, vision, success_criteria, created_at, updated_at";
const TRACK_COLUMNS: &str =
    "id, roadmap_id, title, description, status, rank, created_at, updated_at";
const TASK_COLUMNS: &str =
    "id, track_id, title, description, status, rank, branch, created_at, updated_at";
const JOINED_TASK_COLUMNS: &str = "t.id AS id, t.track_id AS track_id, t.title AS title, \
    t.description AS description, t.status AS status, t.rank AS rank, t.branch AS branch, \
    t.created_at AS created_at, t.updated_at AS updated_at";
const ITERATION_COLUMNS: &str = "number, name, goal, deliverable, status, rank, started_at, \
    completed_at, created_at, updated_at";
const JOINED_ITERATION_COLUMNS: &str = "i.number AS number, i.name AS name, i.goal AS goal, \
    i.deliverable AS deliverable, i.status AS status, i.rank AS rank, \
    i.started_at AS started_at, i.completed_at AS completed_at, \
    i.created_at AS created_at, i.updated_at AS updated_at";
const CRITERION_COLUMNS: &str = "id, task_id, description, verification_type, status, notes, \
    testing_instructions, created_at, updated_at";
const ADR_COLUMNS: &str = "id, track_id, title, status, context, decision, consequences, \
    alternatives, superseded_by, created_at, updated_at";

/// SQLite repository implementation.
#[derive(Clone)]
pub struct SqliteRepository {
    /// Database connection pool
    pool: SqlitePool,

    /// Id sequences
    sequences: SequenceAllocator,

    /// Completion gate with the project's ADR flags
    gate: CompletionGate,

    /// Held while a cross-record invariant is checked and written
    invariants: Arc<Mutex<()>>,
}

impl SqliteRepository {
    /// Open (or create) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!(path = %path.as_ref().display(), "opened roadmap database");
        Self::from_pool(pool).await
    }

    /// Create an in-memory database for testing.
    pub async fn in_memory() -> Result<Self> {
        // one connection that never expires, or the database goes with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_schema(&pool).await?;
        Ok(Self {
            sequences: SequenceAllocator::new(pool.clone()),
            pool,
            gate: CompletionGate::default(),
            invariants: Arc::new(Mutex::new(())),
        })
    }

    /// Use the project's ADR enforcement flags.
    pub fn with_adr_config(mut self, adr: AdrConfig) -> Self {
        self.gate = CompletionGate::new(adr);
        self
    }

    /// The connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The id sequence allocator.
    pub fn allocator(&self) -> &SequenceAllocator {
        &self.sequences
    }

    /// The completion gate in use.
    pub fn gate(&self) -> &CompletionGate {
        &self.gate
    }

    /// Close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // === Helpers ===

    async fn exists(&self, table: &str, key: &str, id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar(&format!("SELECT 1 FROM {table} WHERE {key} = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn is_present(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let (table, key) = match kind {
            EntityKind::Roadmap => ("roadmaps", "id"),
            EntityKind::Track => ("tracks", "id"),
            EntityKind::Task => ("tasks", "id"),
            EntityKind::Iteration => ("iterations", "number"),
            EntityKind::Criterion => ("acceptance_criteria", "id"),
            EntityKind::Adr => ("adrs", "id"),
        };
        self.exists(table, key, id).await
    }

    async fn require(&self, kind: EntityKind, id: &str) -> Result<()> {
        if self.is_present(kind, id).await? {
            Ok(())
        } else {
            Err(RepoError::not_found(kind, id))
        }
    }

    async fn dependency_map(&self) -> Result<HashMap<String, Vec<String>>> {
        let rows = sqlx::query(
            "SELECT track_id, depends_on_id FROM track_dependencies ORDER BY track_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let from: String = row.try_get("track_id")?;
            let to: String = row.try_get("depends_on_id")?;
            map.entry(from).or_default().push(to);
        }
        Ok(map)
    }

    async fn dependency_graph(&self) -> Result<DependencyGraph> {
        let map = self.dependency_map().await?;
        Ok(DependencyGraph::from_edges(map.into_iter().flat_map(
            |(from, deps)| deps.into_iter().map(move |to| (from.clone(), to)),
        )))
    }

    async fn dependencies_of(&self, track_id: &str) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT depends_on_id FROM track_dependencies WHERE track_id = ? ORDER BY position",
        )
        .bind(track_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// New dependencies must name existing tracks; edges already stored are
    /// kept even if their target has since been deleted.
    async fn check_new_dependencies(&self, track: &Track, previous: &[String]) -> Result<()> {
        for dependency in &track.dependencies {
            if dependency == &track.id {
                return Err(ValidationError::SelfDependency(track.id.clone()).into());
            }
            if !previous.contains(dependency) {
                self.require(EntityKind::Track, dependency).await?;
            }
        }
        let graph = self.dependency_graph().await?;
        graph.check_dependencies(&track.id, &track.dependencies)?;
        Ok(())
    }

    async fn membership_map(&self) -> Result<HashMap<i64, Vec<String>>> {
        let rows = sqlx::query(
            "SELECT iteration_number, task_id FROM iteration_tasks
            ORDER BY iteration_number, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut map: HashMap<i64, Vec<String>> = HashMap::new();
        for row in rows {
            let number: i64 = row.try_get("iteration_number")?;
            let task_id: String = row.try_get("task_id")?;
            map.entry(number).or_default().push(task_id);
        }
        Ok(map)
    }

    async fn members_of(&self, number: i64) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT task_id FROM iteration_tasks WHERE iteration_number = ? ORDER BY position",
        )
        .bind(number)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn check_new_members(&self, iteration: &Iteration, previous: &[String]) -> Result<()> {
        for task_id in &iteration.task_ids {
            if !previous.contains(task_id) {
                self.require(EntityKind::Task, task_id).await?;
            }
        }
        Ok(())
    }

    /// Refuses to make `iteration` current while another one is.
    async fn check_single_current(&self, iteration: &Iteration) -> Result<()> {
        if iteration.status != IterationStatus::Current {
            return Ok(());
        }
        let other: Option<i64> = sqlx::query_scalar(
            "SELECT number FROM iterations WHERE status = 'current' AND number != ?",
        )
        .bind(iteration.number)
        .fetch_optional(&self.pool)
        .await?;

        match other {
            Some(current) => Err(ValidationError::InvalidTransition {
                entity: "iteration",
                id: iteration.number.to_string(),
                reason: format!("iteration {current} is already current"),
            }
            .into()),
            None => Ok(()),
        }
    }

    async fn run_gate(&self, task: &Task) -> Result<()> {
        let criteria = self.list_criteria(&CriterionFilter::for_task(&task.id)).await?;
        let adrs = if self.gate.requires_adr() {
            self.list_adrs(Some(&task.track_id)).await?
        } else {
            Vec::new()
        };
        self.gate.evaluate(task, &criteria, &adrs)?;
        Ok(())
    }

    async fn assign_id(&self, id: &str, kind: EntityKind) -> Result<String> {
        if id.is_empty() {
            return self.allocate_id(kind).await;
        }
        if self.is_present(kind, id).await? {
            return Err(RepoError::already_exists(kind, id));
        }
        let code = self.project_code().await?;
        if let Some(n) = parse_sequence_id(id, &code, kind) {
            self.sequences.observe(&code, kind, n).await?;
        }
        Ok(id.to_string())
    }

    async fn fetch_tasks(&self, mut query: QueryBuilder<'_, Sqlite>) -> Result<Vec<Task>> {
        query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::task)
            .collect()
    }

    async fn fetch_iterations(&self, mut query: QueryBuilder<'_, Sqlite>) -> Result<Vec<Iteration>> {
        let found = query.build().fetch_all(&self.pool).await?;
        let mut members = self.membership_map().await?;
        found
            .iter()
            .map(|row| {
                let number: i64 = row.try_get("number")?;
                rows::iteration(row, members.remove(&number).unwrap_or_default())
            })
            .collect()
    }
}

async fn replace_dependencies(
    conn: &mut SqliteConnection,
    track_id: &str,
    dependencies: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM track_dependencies WHERE track_id = ?")
        .bind(track_id)
        .execute(&mut *conn)
        .await?;
    for (position, dependency) in dependencies.iter().enumerate() {
        sqlx::query(
            "INSERT INTO track_dependencies (track_id, depends_on_id, position) VALUES (?, ?, ?)",
        )
        .bind(track_id)
        .bind(dependency)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn replace_members(conn: &mut SqliteConnection, number: i64, task_ids: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM iteration_tasks WHERE iteration_number = ?")
        .bind(number)
        .execute(&mut *conn)
        .await?;
    for (position, task_id) in task_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO iteration_tasks (iteration_number, task_id, position) VALUES (?, ?, ?)",
        )
        .bind(number)
        .bind(task_id)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl Repository for SqliteRepository {
    // === Roadmap operations ===

    async fn create_roadmap(&self, mut roadmap: Roadmap) -> Result<Roadmap> {
        roadmap.validate()?;
        if self.is_present(EntityKind::Roadmap, &roadmap.id).await? {
            return Err(RepoError::already_exists(EntityKind::Roadmap, &roadmap.id));
        }
        roadmap.created_at = now();
        roadmap.updated_at = roadmap.created_at;

        sqlx::query(
            "INSERT INTO roadmaps (id, vision, success_criteria, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&roadmap.id)
        .bind(&roadmap.vision)
        .bind(&roadmap.success_criteria)
        .bind(encode_time(&roadmap.created_at))
        .bind(encode_time(&roadmap.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_roadmap(&roadmap.id).await
    }

    async fn get_roadmap(&self, id: &str) -> Result<Roadmap> {
        let row = sqlx::query(&format!("SELECT {ROADMAP_COLUMNS} FROM roadmaps WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => rows::roadmap(&row),
            None => Err(RepoError::not_found(EntityKind::Roadmap, id)),
        }
    }

    async fn get_active_roadmap(&self) -> Result<Option<Roadmap>> {
        let row = sqlx::query(&format!(
            "SELECT {ROADMAP_COLUMNS} FROM roadmaps ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(rows::roadmap).transpose()
    }

    async fn update_roadmap(&self, roadmap: Roadmap) -> Result<Roadmap> {
        roadmap.validate()?;
        self.require(EntityKind::Roadmap, &roadmap.id).await?;

        sqlx::query(
            "UPDATE roadmaps SET vision = ?, success_criteria = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&roadmap.vision)
        .bind(&roadmap.success_criteria)
        .bind(encode_time(&now()))
        .bind(&roadmap.id)
        .execute(&self.pool)
        .await?;

        self.get_roadmap(&roadmap.id).await
    }

    // === Track operations ===

    async fn create_track(&self, mut track: Track) -> Result<Track> {
        track.validate()?;
        if self.is_present(EntityKind::Track, &track.id).await? {
            return Err(RepoError::already_exists(EntityKind::Track, &track.id));
        }
        self.require(EntityKind::Roadmap, &track.roadmap_id).await?;

        let _guard = self.invariants.lock().await;
        self.check_new_dependencies(&track, &[]).await?;
        track.created_at = now();
        track.updated_at = track.created_at;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO tracks (id, roadmap_id, title, description, status, rank, created_at, updated_at,
            created_seq) VALUES (?, ?, ?, ?, ?, ?, ?, ?,
            (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM tracks))",
        )
        .bind(&track.id)
        .bind(&track.roadmap_id)
        .bind(&track.title)
        .bind(&track.description)
        .bind(track.status.as_str())
        .bind(track.rank)
        .bind(encode_time(&track.created_at))
        .bind(encode_time(&track.updated_at))
        .execute(&mut *tx)
        .await?;
        replace_dependencies(&mut tx, &track.id, &track.dependencies).await?;
        tx.commit().await?;

        debug!(track_id = %track.id, dependencies = track.dependencies.len(), "track created");
        self.get_track(&track.id).await
    }

    async fn get_track(&self, id: &str) -> Result<Track> {
        let row = sqlx::query(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let dependencies = self.dependencies_of(id).await?;
                rows::track(&row, dependencies)
            }
            None => Err(RepoError::not_found(EntityKind::Track, id)),
        }
    }

    async fn list_tracks(&self, filter: &TrackFilter) -> Result<Vec<Track>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE 1 = 1"));
        if let Some(roadmap_id) = &filter.roadmap_id {
            query.push(" AND roadmap_id = ").push_bind(roadmap_id.clone());
        }
        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut statuses = query.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(status.as_str());
            }
            statuses.push_unseparated(")");
        }
        query.push(" ORDER BY rank, created_seq");

        let found = query.build().fetch_all(&self.pool).await?;
        let mut edges = self.dependency_map().await?;
        found
            .iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                rows::track(row, edges.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn update_track(&self, track: Track) -> Result<Track> {
        track.validate()?;
        let old = self.get_track(&track.id).await?;
        if old.roadmap_id != track.roadmap_id {
            self.require(EntityKind::Roadmap, &track.roadmap_id).await?;
        }

        let dependencies_changed = old.dependencies != track.dependencies;
        let _guard = if dependencies_changed {
            let guard = self.invariants.lock().await;
            self.check_new_dependencies(&track, &old.dependencies).await?;
            Some(guard)
        } else {
            None
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE tracks SET roadmap_id = ?, title = ?, description = ?, status = ?, rank = ?,
            updated_at = ? WHERE id = ?",
        )
        .bind(&track.roadmap_id)
        .bind(&track.title)
        .bind(&track.description)
        .bind(track.status.as_str())
        .bind(track.rank)
        .bind(encode_time(&now()))
        .bind(&track.id)
        .execute(&mut *tx)
        .await?;
        if dependencies_changed {
            replace_dependencies(&mut tx, &track.id, &track.dependencies).await?;
        }
        tx.commit().await?;

        self.get_track(&track.id).await
    }

    async fn delete_track(&self, id: &str) -> Result<()> {
        self.require(EntityKind::Track, id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM track_dependencies WHERE track_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(track_id = id, "track deleted");
        Ok(())
    }

    async fn add_track_dependency(&self, track_id: &str, depends_on: &str) -> Result<Track> {
        if track_id == depends_on {
            return Err(ValidationError::SelfDependency(track_id.to_string()).into());
        }
        let _guard = self.invariants.lock().await;
        let mut track = self.get_track(track_id).await?;
        self.require(EntityKind::Track, depends_on).await?;
        if track.dependencies.iter().any(|d| d == depends_on) {
            return Ok(track);
        }

        let previous = track.dependencies.clone();
        track.add_dependency(depends_on)?;
        self.check_new_dependencies(&track, &previous).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO track_dependencies (track_id, depends_on_id, position) VALUES (?, ?, ?)",
        )
        .bind(track_id)
        .bind(depends_on)
        .bind(previous.len() as i64)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE tracks SET updated_at = ? WHERE id = ?")
            .bind(encode_time(&now()))
            .bind(track_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(track_id, depends_on, "dependency added");
        self.get_track(track_id).await
    }

    async fn remove_track_dependency(&self, track_id: &str, depends_on: &str) -> Result<Track> {
        let track = self.get_track(track_id).await?;
        if !track.dependencies.iter().any(|d| d == depends_on) {
            return Err(RepoError::NotFound(format!(
                "dependency {track_id} -> {depends_on}"
            )));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM track_dependencies WHERE track_id = ? AND depends_on_id = ?")
            .bind(track_id)
            .bind(depends_on)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE tracks SET updated_at = ? WHERE id = ?")
            .bind(encode_time(&now()))
            .bind(track_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(track_id, depends_on, "dependency removed");
        self.get_track(track_id).await
    }

    async fn validate_no_cycles(&self, track_id: &str) -> Result<()> {
        self.require(EntityKind::Track, track_id).await?;
        let graph = self.dependency_graph().await?;
        match graph.cycle_through(track_id) {
            Some(path) => Err(ValidationError::DependencyCycle {
                track_id: track_id.to_string(),
                path,
            }
            .into()),
            None => Ok(()),
        }
    }

    // === Task operations ===

    async fn create_task(&self, mut task: Task) -> Result<Task> {
        task.validate()?;
        self.require(EntityKind::Track, &task.track_id).await?;
        task.id = self.assign_id(&task.id, EntityKind::Task).await?;

        let _guard = self.invariants.lock().await;
        if CompletionGate::applies(TaskStatus::Todo, task.status) {
            self.run_gate(&task).await?;
        }
        task.created_at = now();
        task.updated_at = task.created_at;

        sqlx::query(
            "INSERT INTO tasks (id, track_id, title, description, status, rank, branch, created_at,
            updated_at, created_seq) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?,
            (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM tasks))",
        )
        .bind(&task.id)
        .bind(&task.track_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.rank)
        .bind(&task.branch)
        .bind(encode_time(&task.created_at))
        .bind(encode_time(&task.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(task_id = %task.id, track_id = %task.track_id, "task created");
        self.get_task(&task.id).await
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => rows::task(&row),
            None => Err(RepoError::not_found(EntityKind::Task, id)),
        }
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1"));
        if let Some(track_id) = &filter.track_id {
            query.push(" AND track_id = ").push_bind(track_id.clone());
        }
        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut statuses = query.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(status.as_str());
            }
            statuses.push_unseparated(")");
        }
        query.push(" ORDER BY rank, created_seq");
        self.fetch_tasks(query).await
    }

    async fn update_task(&self, task: Task) -> Result<Task> {
        task.validate()?;
        let old = self.get_task(&task.id).await?;
        if old.track_id != task.track_id {
            self.require(EntityKind::Track, &task.track_id).await?;
        }

        let _guard = if CompletionGate::applies(old.status, task.status) {
            let guard = self.invariants.lock().await;
            self.run_gate(&task).await?;
            Some(guard)
        } else {
            None
        };

        sqlx::query(
            "UPDATE tasks SET track_id = ?, title = ?, description = ?, status = ?, rank = ?,
            branch = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&task.track_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.rank)
        .bind(&task.branch)
        .bind(encode_time(&now()))
        .bind(&task.id)
        .execute(&self.pool)
        .await?;

        self.get_task(&task.id).await
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        self.require(EntityKind::Task, id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM iteration_tasks WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(task_id = id, "task deleted");
        Ok(())
    }

    async fn move_task_to_track(&self, task_id: &str, track_id: &str) -> Result<Task> {
        let mut task = self.get_task(task_id).await?;
        self.require(EntityKind::Track, track_id).await?;
        task.track_id = track_id.to_string();
        self.update_task(task).await
    }

    async fn list_backlog_tasks(&self) -> Result<Vec<Task>> {
        let query = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks
            WHERE status != 'done' AND id NOT IN (SELECT task_id FROM iteration_tasks)
            ORDER BY rank, created_seq"
        ));
        self.fetch_tasks(query).await
    }

    async fn check_task_completion(&self, task_id: &str) -> Result<()> {
        let task = self.get_task(task_id).await?;
        self.run_gate(&task).await
    }

    // === Iteration operations ===

    async fn create_iteration(&self, mut iteration: Iteration) -> Result<Iteration> {
        let _guard = self.invariants.lock().await;
        if iteration.number == 0 {
            iteration.number = self.next_iteration_number().await?;
        }
        iteration.validate()?;
        let number = iteration.number.to_string();
        if self.is_present(EntityKind::Iteration, &number).await? {
            return Err(RepoError::already_exists(EntityKind::Iteration, number));
        }
        self.check_new_members(&iteration, &[]).await?;
        self.check_single_current(&iteration).await?;
        iteration.created_at = now();
        iteration.updated_at = iteration.created_at;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO iterations (number, name, goal, deliverable, status, rank, started_at,
            completed_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(iteration.number)
        .bind(&iteration.name)
        .bind(&iteration.goal)
        .bind(&iteration.deliverable)
        .bind(iteration.status.as_str())
        .bind(iteration.rank)
        .bind(iteration.started_at.as_ref().map(encode_time))
        .bind(iteration.completed_at.as_ref().map(encode_time))
        .bind(encode_time(&iteration.created_at))
        .bind(encode_time(&iteration.updated_at))
        .execute(&mut *tx)
        .await?;
        replace_members(&mut tx, iteration.number, &iteration.task_ids).await?;
        tx.commit().await?;

        debug!(number = iteration.number, "iteration created");
        self.get_iteration(iteration.number).await
    }

    async fn get_iteration(&self, number: i64) -> Result<Iteration> {
        let row = sqlx::query(&format!(
            "SELECT {ITERATION_COLUMNS} FROM iterations WHERE number = ?"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => rows::iteration(&row, self.members_of(number).await?),
            None => Err(RepoError::not_found(EntityKind::Iteration, number)),
        }
    }

    async fn get_current_iteration(&self) -> Result<Option<Iteration>> {
        let number: Option<i64> =
            sqlx::query_scalar("SELECT number FROM iterations WHERE status = 'current'")
                .fetch_optional(&self.pool)
                .await?;
        match number {
            Some(number) => Ok(Some(self.get_iteration(number).await?)),
            None => Ok(None),
        }
    }

    async fn list_iterations(&self) -> Result<Vec<Iteration>> {
        let query = QueryBuilder::new(format!(
            "SELECT {ITERATION_COLUMNS} FROM iterations ORDER BY rank, number"
        ));
        self.fetch_iterations(query).await
    }

    async fn update_iteration(&self, iteration: Iteration) -> Result<Iteration> {
        iteration.validate()?;
        let _guard = self.invariants.lock().await;
        let old = self.get_iteration(iteration.number).await?;
        self.check_new_members(&iteration, &old.task_ids).await?;
        self.check_single_current(&iteration).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE iterations SET name = ?, goal = ?, deliverable = ?, status = ?, rank = ?,
            started_at = ?, completed_at = ?, updated_at = ? WHERE number = ?",
        )
        .bind(&iteration.name)
        .bind(&iteration.goal)
        .bind(&iteration.deliverable)
        .bind(iteration.status.as_str())
        .bind(iteration.rank)
        .bind(iteration.started_at.as_ref().map(encode_time))
        .bind(iteration.completed_at.as_ref().map(encode_time))
        .bind(encode_time(&now()))
        .bind(iteration.number)
        .execute(&mut *tx)
        .await?;
        if old.task_ids != iteration.task_ids {
            replace_members(&mut tx, iteration.number, &iteration.task_ids).await?;
        }
        tx.commit().await?;

        self.get_iteration(iteration.number).await
    }

    async fn delete_iteration(&self, number: i64) -> Result<()> {
        self.require(EntityKind::Iteration, &number.to_string()).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM iteration_tasks WHERE iteration_number = ?")
            .bind(number)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM iterations WHERE number = ?")
            .bind(number)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(number, "iteration deleted");
        Ok(())
    }

    async fn add_task_to_iteration(&self, number: i64, task_id: &str) -> Result<Iteration> {
        let mut iteration = self.get_iteration(number).await?;
        self.require(EntityKind::Task, task_id).await?;
        if iteration.task_ids.iter().any(|t| t == task_id) {
            return Ok(iteration);
        }
        iteration.add_task(task_id);
        self.update_iteration(iteration).await
    }

    async fn remove_task_from_iteration(&self, number: i64, task_id: &str) -> Result<Iteration> {
        let mut iteration = self.get_iteration(number).await?;
        if !iteration.remove_task(task_id) {
            return Err(RepoError::NotFound(format!(
                "task {task_id} in iteration {number}"
            )));
        }
        self.update_iteration(iteration).await
    }

    async fn get_iteration_tasks(&self, number: i64) -> Result<Vec<Task>> {
        self.require(EntityKind::Iteration, &number.to_string()).await?;
        let mut query = QueryBuilder::new(format!(
            "SELECT {JOINED_TASK_COLUMNS} FROM tasks t
            JOIN iteration_tasks m ON m.task_id = t.id
            WHERE m.iteration_number = "
        ));
        query.push_bind(number);
        query.push(" ORDER BY t.rank, t.created_seq");
        self.fetch_tasks(query).await
    }

    async fn start_iteration(&self, number: i64) -> Result<Iteration> {
        let mut iteration = self.get_iteration(number).await?;
        iteration.start(now())?;
        self.update_iteration(iteration).await
    }

    async fn complete_iteration(&self, number: i64) -> Result<Iteration> {
        let mut iteration = self.get_iteration(number).await?;
        iteration.complete(now())?;
        self.update_iteration(iteration).await
    }

    async fn list_iterations_for_task(&self, task_id: &str) -> Result<Vec<Iteration>> {
        self.require(EntityKind::Task, task_id).await?;
        let mut query = QueryBuilder::new(format!(
            "SELECT {JOINED_ITERATION_COLUMNS} FROM iterations i
            JOIN iteration_tasks m ON m.iteration_number = i.number
            WHERE m.task_id = "
        ));
        query.push_bind(task_id.to_string());
        query.push(" ORDER BY i.rank, i.number");
        self.fetch_iterations(query).await
    }

    async fn next_iteration_number(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COALESCE(MAX(number), 0) + 1 FROM iterations")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    // === Acceptance criterion operations ===

    async fn create_criterion(&self, mut criterion: AcceptanceCriterion) -> Result<AcceptanceCriterion> {
        criterion.validate()?;
        self.require(EntityKind::Task, &criterion.task_id).await?;
        criterion.id = self.assign_id(&criterion.id, EntityKind::Criterion).await?;
        criterion.created_at = now();
        criterion.updated_at = criterion.created_at;

        let _guard = self.invariants.lock().await;
        sqlx::query(
            "INSERT INTO acceptance_criteria (id, task_id, description, verification_type, status,
            notes, testing_instructions, created_at, updated_at, created_seq)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?,
            (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM acceptance_criteria))",
        )
        .bind(&criterion.id)
        .bind(&criterion.task_id)
        .bind(&criterion.description)
        .bind(criterion.verification_type.as_str())
        .bind(criterion.status.as_str())
        .bind(&criterion.notes)
        .bind(&criterion.testing_instructions)
        .bind(encode_time(&criterion.created_at))
        .bind(encode_time(&criterion.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_criterion(&criterion.id).await
    }

    async fn get_criterion(&self, id: &str) -> Result<AcceptanceCriterion> {
        let row = sqlx::query(&format!(
            "SELECT {CRITERION_COLUMNS} FROM acceptance_criteria WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => rows::criterion(&row),
            None => Err(RepoError::not_found(EntityKind::Criterion, id)),
        }
    }

    async fn list_criteria(&self, filter: &CriterionFilter) -> Result<Vec<AcceptanceCriterion>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {CRITERION_COLUMNS} FROM acceptance_criteria WHERE 1 = 1"
        ));
        if let Some(task_id) = &filter.task_id {
            query.push(" AND task_id = ").push_bind(task_id.clone());
        }
        if let Some(track_id) = &filter.track_id {
            query
                .push(" AND task_id IN (SELECT id FROM tasks WHERE track_id = ")
                .push_bind(track_id.clone())
                .push(")");
        }
        if let Some(number) = filter.iteration {
            query
                .push(" AND task_id IN (SELECT task_id FROM iteration_tasks WHERE iteration_number = ")
                .push_bind(number)
                .push(")");
        }
        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut statuses = query.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(status.as_str());
            }
            statuses.push_unseparated(")");
        }
        query.push(" ORDER BY created_seq");

        query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::criterion)
            .collect()
    }

    async fn update_criterion(&self, criterion: AcceptanceCriterion) -> Result<AcceptanceCriterion> {
        criterion.validate()?;
        let old = self.get_criterion(&criterion.id).await?;
        if old.task_id != criterion.task_id {
            self.require(EntityKind::Task, &criterion.task_id).await?;
        }

        let _guard = self.invariants.lock().await;
        sqlx::query(
            "UPDATE acceptance_criteria SET task_id = ?, description = ?, verification_type = ?,
            status = ?, notes = ?, testing_instructions = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&criterion.task_id)
        .bind(&criterion.description)
        .bind(criterion.verification_type.as_str())
        .bind(criterion.status.as_str())
        .bind(&criterion.notes)
        .bind(&criterion.testing_instructions)
        .bind(encode_time(&now()))
        .bind(&criterion.id)
        .execute(&self.pool)
        .await?;

        self.get_criterion(&criterion.id).await
    }

    async fn delete_criterion(&self, id: &str) -> Result<()> {
        self.require(EntityKind::Criterion, id).await?;
        sqlx::query("DELETE FROM acceptance_criteria WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // === ADR operations ===

    async fn create_adr(&self, mut adr: Adr) -> Result<Adr> {
        adr.validate()?;
        self.require(EntityKind::Track, &adr.track_id).await?;
        if let Some(by) = &adr.superseded_by {
            self.require(EntityKind::Adr, by).await?;
        }
        adr.id = self.assign_id(&adr.id, EntityKind::Adr).await?;
        adr.created_at = now();
        adr.updated_at = adr.created_at;

        sqlx::query(
            "INSERT INTO adrs (id, track_id, title, status, context, decision, consequences,
            alternatives, superseded_by, created_at, updated_at, created_seq)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM adrs))",
        )
        .bind(&adr.id)
        .bind(&adr.track_id)
        .bind(&adr.title)
        .bind(adr.status.as_str())
        .bind(&adr.context)
        .bind(&adr.decision)
        .bind(&adr.consequences)
        .bind(&adr.alternatives)
        .bind(&adr.superseded_by)
        .bind(encode_time(&adr.created_at))
        .bind(encode_time(&adr.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(adr_id = %adr.id, track_id = %adr.track_id, "ADR created");
        self.get_adr(&adr.id).await
    }

    async fn get_adr(&self, id: &str) -> Result<Adr> {
        let row = sqlx::query(&format!("SELECT {ADR_COLUMNS} FROM adrs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => rows::adr(&row),
            None => Err(RepoError::not_found(EntityKind::Adr, id)),
        }
    }

    async fn list_adrs(&self, track_id: Option<&str>) -> Result<Vec<Adr>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ADR_COLUMNS} FROM adrs"));
        if let Some(track_id) = track_id {
            query.push(" WHERE track_id = ").push_bind(track_id.to_string());
        }
        query.push(" ORDER BY created_seq");

        query
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(rows::adr)
            .collect()
    }

    async fn update_adr(&self, adr: Adr) -> Result<Adr> {
        adr.validate()?;
        let old = self.get_adr(&adr.id).await?;
        if old.track_id != adr.track_id {
            self.require(EntityKind::Track, &adr.track_id).await?;
        }
        if old.superseded_by != adr.superseded_by {
            if let Some(by) = &adr.superseded_by {
                self.require(EntityKind::Adr, by).await?;
            }
        }

        sqlx::query(
            "UPDATE adrs SET track_id = ?, title = ?, status = ?, context = ?, decision = ?,
            consequences = ?, alternatives = ?, superseded_by = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&adr.track_id)
        .bind(&adr.title)
        .bind(adr.status.as_str())
        .bind(&adr.context)
        .bind(&adr.decision)
        .bind(&adr.consequences)
        .bind(&adr.alternatives)
        .bind(&adr.superseded_by)
        .bind(encode_time(&now()))
        .bind(&adr.id)
        .execute(&self.pool)
        .await?;

        self.get_adr(&adr.id).await
    }

    async fn supersede_adr(&self, id: &str, by: &str) -> Result<Adr> {
        let mut adr = self.get_adr(id).await?;
        self.require(EntityKind::Adr, by).await?;
        adr.supersede(by)?;
        self.update_adr(adr).await
    }

    async fn deprecate_adr(&self, id: &str) -> Result<Adr> {
        let mut adr = self.get_adr(id).await?;
        adr.deprecate();
        self.update_adr(adr).await
    }

    // === Project operations ===

    async fn get_project_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT value FROM project_metadata WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn set_project_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO project_metadata (key, value) VALUES (?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn project_code(&self) -> Result<String> {
        Ok(self
            .get_project_metadata(PROJECT_CODE_KEY)
            .await?
            .unwrap_or_else(|| DEFAULT_PROJECT_CODE.to_string()))
    }

    async fn set_project_code(&self, code: &str) -> Result<()> {
        validate_project_code(code)?;
        self.set_project_metadata(PROJECT_CODE_KEY, code).await
    }

    async fn next_sequence(&self, kind: EntityKind) -> Result<i64> {
        let code = self.project_code().await?;
        self.sequences.next(&code, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadmap_core::{CriterionStatus, TrackStatus, VerificationType};
    use roadmap_quality::BlockReason;

    async fn setup() -> (SqliteRepository, Roadmap) {
        let repo = SqliteRepository::in_memory().await.unwrap();
        repo.set_project_code("P").await.unwrap();
        let roadmap = repo
            .create_roadmap(Roadmap::new("Ship the planner", "Teams use it daily").unwrap())
            .await
            .unwrap();
        (repo, roadmap)
    }

    async fn track(repo: &SqliteRepository, roadmap: &Roadmap, id: &str) -> Track {
        repo.create_track(Track::new(id, &roadmap.id, id, "").unwrap())
            .await
            .unwrap()
    }

    async fn task(repo: &SqliteRepository, track_id: &str, title: &str) -> Task {
        repo.create_task(Task::new(track_id, title, "").unwrap())
            .await
            .unwrap()
    }

    async fn criterion(
        repo: &SqliteRepository,
        task_id: &str,
        kind: VerificationType,
    ) -> AcceptanceCriterion {
        repo.create_criterion(AcceptanceCriterion::new(task_id, "works", kind).unwrap())
            .await
            .unwrap()
    }

    fn adr(track_id: &str) -> Adr {
        Adr::new(track_id, "Use SQLite", "Need storage", "SQLite", "Single writer").unwrap()
    }

    // === Roadmaps ===

    #[tokio::test]
    async fn test_roadmap_crud_and_active() {
        let (repo, first) = setup().await;
        assert_eq!(repo.get_active_roadmap().await.unwrap(), Some(first.clone()));

        let second = repo
            .create_roadmap(Roadmap::new("Second", "").unwrap())
            .await
            .unwrap();
        assert_eq!(repo.get_active_roadmap().await.unwrap().unwrap().id, second.id);

        let mut changed = first.clone();
        changed.vision = "Sharper vision".into();
        let updated = repo.update_roadmap(changed).await.unwrap();
        assert_eq!(updated.vision, "Sharper vision");
        assert_eq!(updated.created_at, first.created_at);
        assert!(updated.updated_at >= first.updated_at);

        assert!(matches!(
            repo.create_roadmap(first.clone()).await,
            Err(RepoError::AlreadyExists(_))
        ));
        assert!(repo.get_roadmap("roadmap-missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_no_active_roadmap_in_empty_project() {
        let repo = SqliteRepository::in_memory().await.unwrap();
        assert_eq!(repo.get_active_roadmap().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_roadmap_with_tracks_in_rank_order() {
        let (repo, roadmap) = setup().await;
        repo.create_track(Track::new("track-late", &roadmap.id, "Late", "").unwrap().with_rank(900).unwrap())
            .await
            .unwrap();
        repo.create_track(Track::new("track-early", &roadmap.id, "Early", "").unwrap().with_rank(1).unwrap())
            .await
            .unwrap();

        let aggregate = repo.get_roadmap_with_tracks(&roadmap.id).await.unwrap();
        let ids: Vec<&str> = aggregate.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["track-early", "track-late"]);
    }

    // === Tracks and dependencies ===

    #[tokio::test]
    async fn test_reverse_dependency_rejected_and_graph_unchanged() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        repo.create_track(
            Track::new("track-b", &roadmap.id, "B", "")
                .unwrap()
                .with_dependencies(["track-a"])
                .unwrap(),
        )
        .await
        .unwrap();

        let err = repo.add_track_dependency("track-a", "track-b").await.unwrap_err();
        match err {
            RepoError::Validation(ValidationError::DependencyCycle { track_id, path }) => {
                assert_eq!(track_id, "track-a");
                assert_eq!(path, vec!["track-a", "track-b", "track-a"]);
            }
            other => panic!("expected a cycle error, got {other:?}"),
        }

        assert!(repo.get_track_dependencies("track-a").await.unwrap().is_empty());
        assert_eq!(repo.get_track_dependencies("track-b").await.unwrap(), vec!["track-a"]);
    }

    #[tokio::test]
    async fn test_update_track_rechecks_cycles() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        track(&repo, &roadmap, "track-b").await;
        track(&repo, &roadmap, "track-c").await;
        repo.add_track_dependency("track-b", "track-a").await.unwrap();
        repo.add_track_dependency("track-c", "track-b").await.unwrap();

        let mut a = repo.get_track("track-a").await.unwrap();
        a.dependencies = vec!["track-c".into()];
        a.title = "renamed".into();
        assert!(matches!(
            repo.update_track(a).await,
            Err(RepoError::Validation(ValidationError::DependencyCycle { .. }))
        ));

        let a = repo.get_track("track-a").await.unwrap();
        assert_eq!(a.title, "track-a");
        assert!(a.dependencies.is_empty());
        repo.validate_no_cycles("track-a").await.unwrap();
    }

    #[tokio::test]
    async fn test_dependency_sequence_keeps_graph_acyclic() {
        let (repo, roadmap) = setup().await;
        let ids = ["track-a", "track-b", "track-c", "track-d"];
        for id in ids {
            track(&repo, &roadmap, id).await;
        }

        let mut accepted = 0;
        let mut rejected = 0;
        for from in ids {
            for to in ids {
                match repo.add_track_dependency(from, to).await {
                    Ok(_) => accepted += 1,
                    Err(RepoError::Validation(_)) => rejected += 1,
                    Err(other) => panic!("unexpected error {other:?}"),
                }
            }
        }
        // a total order of four tracks has six edges
        assert_eq!(accepted, 6);
        assert_eq!(rejected, 10);
        for id in ids {
            repo.validate_no_cycles(id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_dependency_edge_rules() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        track(&repo, &roadmap, "track-b").await;

        assert!(matches!(
            repo.add_track_dependency("track-a", "track-a").await,
            Err(RepoError::Validation(ValidationError::SelfDependency(_)))
        ));
        assert!(repo.add_track_dependency("track-a", "track-zzz").await.unwrap_err().is_not_found());

        repo.add_track_dependency("track-a", "track-b").await.unwrap();
        let again = repo.add_track_dependency("track-a", "track-b").await.unwrap();
        assert_eq!(again.dependencies, vec!["track-b"]);

        let removed = repo.remove_track_dependency("track-a", "track-b").await.unwrap();
        assert!(removed.dependencies.is_empty());
        assert!(repo
            .remove_track_dependency("track-a", "track-b")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_create_track_checks_owner_and_id() {
        let (repo, roadmap) = setup().await;
        assert!(repo
            .create_track(Track::new("track-x", "roadmap-nope", "X", "").unwrap())
            .await
            .unwrap_err()
            .is_not_found());

        track(&repo, &roadmap, "track-x").await;
        assert!(matches!(
            repo.create_track(Track::new("track-x", &roadmap.id, "X", "").unwrap()).await,
            Err(RepoError::AlreadyExists(_))
        ));

        let mut bad = Track::new("track-y", &roadmap.id, "Y", "").unwrap();
        bad.id = "Track_Y".into();
        assert!(matches!(
            repo.create_track(bad).await,
            Err(RepoError::Validation(ValidationError::InvalidTrackId(_)))
        ));
    }

    #[tokio::test]
    async fn test_list_tracks_by_status_and_stable_ties() {
        let (repo, roadmap) = setup().await;
        for id in ["track-c", "track-a", "track-b"] {
            track(&repo, &roadmap, id).await;
        }
        let mut blocked = repo.get_track("track-a").await.unwrap();
        blocked.status = TrackStatus::Blocked;
        repo.update_track(blocked).await.unwrap();

        let all = repo.list_tracks(&TrackFilter::for_roadmap(&roadmap.id)).await.unwrap();
        let ids: Vec<String> = all.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["track-c", "track-a", "track-b"]);
        for _ in 0..3 {
            let again = repo.list_tracks(&TrackFilter::for_roadmap(&roadmap.id)).await.unwrap();
            assert_eq!(again, all);
        }

        let filter = TrackFilter {
            statuses: vec![TrackStatus::Blocked, TrackStatus::Complete],
            ..TrackFilter::for_roadmap(&roadmap.id)
        };
        let found = repo.list_tracks(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "track-a");
    }

    #[tokio::test]
    async fn test_delete_track_does_not_cascade() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        track(&repo, &roadmap, "track-b").await;
        repo.add_track_dependency("track-a", "track-b").await.unwrap();
        let t = task(&repo, "track-a", "orphan me").await;

        repo.delete_track("track-a").await.unwrap();
        assert!(repo.get_track("track-a").await.unwrap_err().is_not_found());
        assert_eq!(repo.get_task(&t.id).await.unwrap().track_id, "track-a");
        assert!(repo.delete_track("track-a").await.unwrap_err().is_not_found());

        // the deleted track's edges went with it
        track(&repo, &roadmap, "track-a").await;
        repo.add_track_dependency("track-b", "track-a").await.unwrap();
    }

    // === Tasks ===

    #[tokio::test]
    async fn test_task_ids_come_from_the_sequence() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;

        let first = task(&repo, "track-a", "one").await;
        let second = task(&repo, "track-a", "two").await;
        assert_eq!(first.id, "P-task-1");
        assert_eq!(second.id, "P-task-2");

        repo.delete_task(&second.id).await.unwrap();
        let third = task(&repo, "track-a", "three").await;
        assert_eq!(third.id, "P-task-3");

        let ac = criterion(&repo, &first.id, VerificationType::Manual).await;
        assert_eq!(ac.id, "P-ac-1");
    }

    #[tokio::test]
    async fn test_explicit_task_id_must_be_free() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        repo.create_task(Task::new("track-a", "x", "").unwrap().with_id("P-task-7"))
            .await
            .unwrap();
        assert!(matches!(
            repo.create_task(Task::new("track-a", "y", "").unwrap().with_id("P-task-7")).await,
            Err(RepoError::AlreadyExists(_))
        ));
        // allocation continues above explicit ids
        assert_eq!(task(&repo, "track-a", "z").await.id, "P-task-8");

        repo.create_task(Task::new("track-a", "w", "").unwrap().with_id("P-task-12"))
            .await
            .unwrap();
        assert_eq!(task(&repo, "track-a", "v").await.id, "P-task-13");
    }

    #[tokio::test]
    async fn test_list_tasks_filters() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        track(&repo, &roadmap, "track-b").await;
        let a1 = task(&repo, "track-a", "a1").await;
        let a2 = task(&repo, "track-a", "a2").await;
        task(&repo, "track-b", "b1").await;

        let mut started = a2.clone();
        started.status = TaskStatus::InProgress;
        repo.update_task(started).await.unwrap();

        assert_eq!(repo.list_tasks(&TaskFilter::default()).await.unwrap().len(), 3);
        let in_a = repo.list_tasks(&TaskFilter::for_track("track-a")).await.unwrap();
        assert_eq!(in_a.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&a1.id, &a2.id]);

        let filter = TaskFilter {
            track_id: Some("track-a".into()),
            statuses: vec![TaskStatus::Todo, TaskStatus::Done],
        };
        let todo = repo.list_tasks(&filter).await.unwrap();
        assert_eq!(todo.len(), 1);
        assert_eq!(todo[0].id, a1.id);
    }

    #[tokio::test]
    async fn test_tied_tasks_list_in_creation_order() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        let template = Task::new("track-a", "same", "").unwrap();
        let stale = template.created_at;

        let mut created = Vec::new();
        for _ in 0..12 {
            let t = repo.create_task(template.clone()).await.unwrap();
            assert!(t.created_at >= stale);
            created.push(t.id);
        }
        assert_eq!(created[9], "P-task-10");
        repo.create_iteration(Iteration::new(1, "one", "", "").unwrap()).await.unwrap();
        for id in created.iter().rev() {
            repo.add_task_to_iteration(1, id).await.unwrap();
        }

        let ids = |tasks: Vec<Task>| tasks.into_iter().map(|t| t.id).collect::<Vec<_>>();
        let listed = ids(repo.list_tasks(&TaskFilter::for_track("track-a")).await.unwrap());
        assert_eq!(listed, created);
        assert_eq!(ids(repo.get_iteration_tasks(1).await.unwrap()), created);

        repo.remove_task_from_iteration(1, &created[10]).await.unwrap();
        repo.remove_task_from_iteration(1, &created[1]).await.unwrap();
        assert_eq!(
            ids(repo.list_backlog_tasks().await.unwrap()),
            vec![created[1].clone(), created[10].clone()]
        );
    }

    #[tokio::test]
    async fn test_failed_criterion_blocks_done_with_notes() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        let t = task(&repo, "track-a", "checkout").await;
        let mut ac = criterion(&repo, &t.id, VerificationType::Manual).await;
        ac.fail("X failed on Safari");
        repo.update_criterion(ac.clone()).await.unwrap();

        let mut done = t.clone();
        done.status = TaskStatus::Done;
        let err = repo.update_task(done).await.unwrap_err();
        let RepoError::CompletionBlocked(blocked) = err else {
            panic!("expected CompletionBlocked");
        };
        match blocked.reason {
            BlockReason::UnmetCriteria { failed, unverified } => {
                assert!(unverified.is_empty());
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].id, ac.id);
                assert_eq!(failed[0].notes, "X failed on Safari");
            }
            other => panic!("unexpected reason {other:?}"),
        }
        assert_eq!(repo.get_task(&t.id).await.unwrap().status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn test_unverified_criteria_listed_exactly() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        let t = task(&repo, "track-a", "t").await;
        let verified = criterion(&repo, &t.id, VerificationType::Manual).await;
        let pending = criterion(&repo, &t.id, VerificationType::Manual).await;
        let untouched = criterion(&repo, &t.id, VerificationType::Automated).await;

        let mut v = verified.clone();
        v.verify("ok");
        repo.update_criterion(v).await.unwrap();
        let mut p = pending.clone();
        p.request_review();
        repo.update_criterion(p).await.unwrap();

        let err = repo.check_task_completion(&t.id).await.unwrap_err();
        let RepoError::CompletionBlocked(blocked) = err else {
            panic!("expected CompletionBlocked");
        };
        let ids: Vec<&str> = blocked.criteria().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![pending.id.as_str(), untouched.id.as_str()]);
    }

    #[tokio::test]
    async fn test_verified_criteria_allow_done_and_gate_ignores_other_transitions() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        let t = task(&repo, "track-a", "t").await;
        let ac = criterion(&repo, &t.id, VerificationType::Automated).await;

        let mut started = t.clone();
        started.status = TaskStatus::InProgress;
        repo.update_task(started).await.unwrap();

        let mut auto = ac.clone();
        auto.verify_automatically("ci");
        repo.update_criterion(auto).await.unwrap();

        let mut done = repo.get_task(&t.id).await.unwrap();
        done.status = TaskStatus::Done;
        let done = repo.update_task(done).await.unwrap();
        assert_eq!(done.status, TaskStatus::Done);

        // done -> done and done -> todo bypass the gate
        let mut failed = ac.clone();
        failed.fail("regressed");
        repo.update_criterion(failed).await.unwrap();
        let mut renamed = done.clone();
        renamed.title = "renamed".into();
        repo.update_task(renamed).await.unwrap();
        let mut reopened = repo.get_task(&t.id).await.unwrap();
        reopened.status = TaskStatus::Todo;
        repo.update_task(reopened).await.unwrap();
    }

    #[tokio::test]
    async fn test_adr_enforcement_blocks_until_one_exists() {
        let repo = SqliteRepository::in_memory()
            .await
            .unwrap()
            .with_adr_config(AdrConfig { required: true, enforce_on_task_completion: true });
        let roadmap = repo.create_roadmap(Roadmap::new("v", "s").unwrap()).await.unwrap();
        track(&repo, &roadmap, "track-a").await;
        let first = task(&repo, "track-a", "one").await;
        let second = task(&repo, "track-a", "two").await;

        for t in [&first, &second] {
            let err = repo.check_task_completion(&t.id).await.unwrap_err();
            match err {
                RepoError::CompletionBlocked(blocked) => assert!(blocked.is_missing_adr()),
                other => panic!("unexpected {other:?}"),
            }
        }

        repo.create_adr(adr("track-a")).await.unwrap();
        for t in [first, second] {
            let mut done = t;
            done.status = TaskStatus::Done;
            assert_eq!(repo.update_task(done).await.unwrap().status, TaskStatus::Done);
        }
    }

    #[tokio::test]
    async fn test_required_without_enforcement_does_not_block() {
        let repo = SqliteRepository::in_memory()
            .await
            .unwrap()
            .with_adr_config(AdrConfig { required: true, enforce_on_task_completion: false });
        let roadmap = repo.create_roadmap(Roadmap::new("v", "s").unwrap()).await.unwrap();
        track(&repo, &roadmap, "track-a").await;
        let t = task(&repo, "track-a", "one").await;
        repo.check_task_completion(&t.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_move_task_and_backlog() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        track(&repo, &roadmap, "track-b").await;
        let planned = task(&repo, "track-a", "planned").await;
        let loose = task(&repo, "track-a", "loose").await;
        let finished = task(&repo, "track-a", "finished").await;
        let mut done = finished.clone();
        done.status = TaskStatus::Done;
        repo.update_task(done).await.unwrap();

        let mut iteration = Iteration::new(0, "Sprint", "", "").unwrap();
        iteration.add_task(&planned.id);
        repo.create_iteration(iteration).await.unwrap();

        let backlog = repo.list_backlog_tasks().await.unwrap();
        assert_eq!(backlog.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&loose.id]);

        let moved = repo.move_task_to_track(&loose.id, "track-b").await.unwrap();
        assert_eq!(moved.track_id, "track-b");
        assert!(repo.move_task_to_track(&loose.id, "track-nope").await.unwrap_err().is_not_found());
        assert_eq!(repo.get_track_with_tasks("track-b").await.unwrap().tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_task_keeps_criteria_drops_membership() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        let t = task(&repo, "track-a", "t").await;
        let ac = criterion(&repo, &t.id, VerificationType::Manual).await;
        let mut iteration = Iteration::new(1, "Sprint", "", "").unwrap();
        iteration.add_task(&t.id);
        repo.create_iteration(iteration).await.unwrap();

        repo.delete_task(&t.id).await.unwrap();
        assert!(repo.get_iteration(1).await.unwrap().task_ids.is_empty());
        assert_eq!(repo.get_criterion(&ac.id).await.unwrap().task_id, t.id);
    }

    // === Iterations ===

    #[tokio::test]
    async fn test_single_current_iteration() {
        let (repo, _) = setup().await;
        let first = repo.create_iteration(Iteration::new(0, "one", "", "").unwrap()).await.unwrap();
        let second = repo.create_iteration(Iteration::new(0, "two", "", "").unwrap()).await.unwrap();
        assert_eq!((first.number, second.number), (1, 2));
        assert_eq!(repo.next_iteration_number().await.unwrap(), 3);

        let started = repo.start_iteration(1).await.unwrap();
        assert_eq!(started.status, IterationStatus::Current);
        assert!(started.started_at.is_some());
        assert_eq!(repo.get_current_iteration().await.unwrap().unwrap().number, 1);

        assert!(matches!(
            repo.start_iteration(2).await,
            Err(RepoError::Validation(ValidationError::InvalidTransition { .. }))
        ));
        let mut forced = repo.get_iteration(2).await.unwrap();
        forced.status = IterationStatus::Current;
        assert!(repo.update_iteration(forced).await.is_err());

        let completed = repo.complete_iteration(1).await.unwrap();
        assert_eq!(completed.status, IterationStatus::Complete);
        assert!(completed.completed_at.is_some());
        assert!(repo.complete_iteration(1).await.is_err());

        repo.start_iteration(2).await.unwrap();
        assert_eq!(repo.get_current_iteration().await.unwrap().unwrap().number, 2);
    }

    #[tokio::test]
    async fn test_iteration_membership() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        let a = task(&repo, "track-a", "a").await;
        let b = task(&repo, "track-a", "b").await;
        repo.create_iteration(Iteration::new(4, "four", "", "").unwrap()).await.unwrap();
        repo.create_iteration(Iteration::new(5, "five", "", "").unwrap()).await.unwrap();

        repo.add_task_to_iteration(4, &b.id).await.unwrap();
        let it = repo.add_task_to_iteration(4, &a.id).await.unwrap();
        assert_eq!(it.task_ids, vec![b.id.clone(), a.id.clone()]);
        repo.add_task_to_iteration(5, &a.id).await.unwrap();

        let tasks = repo.get_iteration_tasks(4).await.unwrap();
        assert_eq!(tasks.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&a.id, &b.id]);

        let numbers: Vec<i64> = repo
            .list_iterations_for_task(&a.id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.number)
            .collect();
        assert_eq!(numbers, vec![4, 5]);

        let it = repo.remove_task_from_iteration(4, &b.id).await.unwrap();
        assert_eq!(it.task_ids, vec![a.id.clone()]);
        assert!(repo.remove_task_from_iteration(4, &b.id).await.unwrap_err().is_not_found());
        assert!(repo.add_task_to_iteration(4, "P-task-99").await.unwrap_err().is_not_found());

        repo.delete_iteration(5).await.unwrap();
        assert_eq!(repo.list_iterations_for_task(&a.id).await.unwrap().len(), 1);
        assert!(matches!(
            repo.create_iteration(Iteration::new(4, "dup", "", "").unwrap()).await,
            Err(RepoError::AlreadyExists(_))
        ));
    }

    // === Acceptance criteria ===

    #[tokio::test]
    async fn test_list_criteria_scopes() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        track(&repo, &roadmap, "track-b").await;
        let a = task(&repo, "track-a", "a").await;
        let b = task(&repo, "track-b", "b").await;
        let ac_a = criterion(&repo, &a.id, VerificationType::Manual).await;
        let mut ac_b = criterion(&repo, &b.id, VerificationType::Automated).await;
        ac_b.fail("broken");
        repo.update_criterion(ac_b.clone()).await.unwrap();

        let mut iteration = Iteration::new(1, "one", "", "").unwrap();
        iteration.add_task(&b.id);
        repo.create_iteration(iteration).await.unwrap();

        let by_task = repo.list_criteria(&CriterionFilter::for_task(&a.id)).await.unwrap();
        assert_eq!(by_task, vec![ac_a.clone()]);

        let by_track = repo
            .list_criteria(&CriterionFilter { track_id: Some("track-b".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_track.len(), 1);
        assert_eq!(by_track[0].id, ac_b.id);

        let by_iteration = repo
            .list_criteria(&CriterionFilter { iteration: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_iteration.len(), 1);
        assert_eq!(by_iteration[0].id, ac_b.id);

        let failed = repo
            .list_criteria(&CriterionFilter {
                statuses: vec![CriterionStatus::Failed],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].notes, "broken");

        repo.delete_criterion(&ac_a.id).await.unwrap();
        assert!(repo.get_criterion(&ac_a.id).await.unwrap_err().is_not_found());
        assert!(repo
            .create_criterion(AcceptanceCriterion::new("P-task-404", "x", VerificationType::Manual).unwrap())
            .await
            .unwrap_err()
            .is_not_found());
    }

    // === ADRs ===

    #[tokio::test]
    async fn test_adr_supersede_and_deprecate() {
        let (repo, roadmap) = setup().await;
        track(&repo, &roadmap, "track-a").await;
        let old = repo.create_adr(adr("track-a")).await.unwrap();
        let new = repo.create_adr(adr("track-a")).await.unwrap();
        assert_eq!(old.id, "P-adr-1");
        assert_eq!(new.id, "P-adr-2");

        assert!(repo.supersede_adr(&old.id, "P-adr-9").await.unwrap_err().is_not_found());
        let superseded = repo.supersede_adr(&old.id, &new.id).await.unwrap();
        assert_eq!(superseded.status, roadmap_core::AdrStatus::Superseded);
        assert_eq!(superseded.superseded_by.as_deref(), Some("P-adr-2"));

        let mut broken = superseded.clone();
        broken.superseded_by = None;
        assert!(matches!(
            repo.update_adr(broken).await,
            Err(RepoError::Validation(ValidationError::MissingSupersededBy(_)))
        ));

        let deprecated = repo.deprecate_adr(&new.id).await.unwrap();
        assert_eq!(deprecated.status, roadmap_core::AdrStatus::Deprecated);
        assert_eq!(repo.list_adrs(Some("track-a")).await.unwrap().len(), 2);
        assert!(repo.list_adrs(Some("track-b")).await.unwrap().is_empty());
    }

    // === Project ===

    #[tokio::test]
    async fn test_project_code_and_metadata() {
        let repo = SqliteRepository::in_memory().await.unwrap();
        assert_eq!(repo.project_code().await.unwrap(), DEFAULT_PROJECT_CODE);
        assert!(matches!(
            repo.set_project_code("bad code").await,
            Err(RepoError::Validation(ValidationError::InvalidProjectCode(_)))
        ));
        repo.set_project_code("ACME").await.unwrap();
        assert_eq!(repo.project_code().await.unwrap(), "ACME");
        assert_eq!(repo.allocate_id(EntityKind::Task).await.unwrap(), "ACME-task-1");

        assert_eq!(repo.get_project_metadata("owner").await.unwrap(), None);
        repo.set_project_metadata("owner", "planning").await.unwrap();
        repo.set_project_metadata("owner", "platform").await.unwrap();
        assert_eq!(
            repo.get_project_metadata("owner").await.unwrap().as_deref(),
            Some("platform")
        );
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roadmap.db");
        {
            let repo = SqliteRepository::open(&path).await.unwrap();
            repo.set_project_code("P").await.unwrap();
            let roadmap = repo.create_roadmap(Roadmap::new("v", "s").unwrap()).await.unwrap();
            track(&repo, &roadmap, "track-a").await;
            let t = task(&repo, "track-a", "first").await;
            repo.delete_task(&t.id).await.unwrap();
            repo.close().await;
        }

        let repo = SqliteRepository::open(&path).await.unwrap();
        assert_eq!(repo.get_track("track-a").await.unwrap().title, "track-a");
        assert_eq!(task(&repo, "track-a", "second").await.id, "P-task-2");
    }
}
