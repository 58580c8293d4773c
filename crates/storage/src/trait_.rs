//! Repository trait abstraction.

use async_trait::async_trait;
use roadmap_core::{
    format_sequence_id, AcceptanceCriterion, Adr, CriterionStatus, EntityKind, Iteration, Roadmap,
    RoadmapWithTracks, Task, TaskStatus, TaskWithCriteria, Track, TrackStatus, TrackWithTasks,
};

use crate::error::Result;

/// Metadata key holding the project code.
pub const PROJECT_CODE_KEY: &str = "project_code";

/// Filter for listing tracks. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFilter {
    /// Owning roadmap
    pub roadmap_id: Option<String>,
    /// Status is one of these
    pub statuses: Vec<TrackStatus>,
}

impl TrackFilter {
    /// Tracks of one roadmap.
    pub fn for_roadmap(roadmap_id: impl Into<String>) -> Self {
        Self {
            roadmap_id: Some(roadmap_id.into()),
            ..Default::default()
        }
    }
}

/// Filter for listing tasks. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Owning track
    pub track_id: Option<String>,
    /// Status is one of these
    pub statuses: Vec<TaskStatus>,
}

impl TaskFilter {
    /// Tasks of one track.
    pub fn for_track(track_id: impl Into<String>) -> Self {
        Self {
            track_id: Some(track_id.into()),
            ..Default::default()
        }
    }
}

/// Filter for listing acceptance criteria. Scopes combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriterionFilter {
    /// Owning task
    pub task_id: Option<String>,
    /// Track of the owning task
    pub track_id: Option<String>,
    /// Iteration the owning task belongs to
    pub iteration: Option<i64>,
    /// Status is one of these
    pub statuses: Vec<CriterionStatus>,
}

impl CriterionFilter {
    /// Criteria of one task.
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Default::default()
        }
    }
}

/// The single entry point for reading and mutating planning data.
///
/// Every mutation passes through an implementation of this trait, which
/// enforces the entity invariants, the dependency graph, the single current
/// iteration and the completion gate. Mutators return the stored entity.
/// Dropping a returned future abandons the call; writes already committed
/// stay committed.
#[async_trait]
pub trait Repository: Send + Sync {
    // === Roadmap operations ===

    /// Create a roadmap.
    async fn create_roadmap(&self, roadmap: Roadmap) -> Result<Roadmap>;

    /// Load a roadmap by id.
    async fn get_roadmap(&self, id: &str) -> Result<Roadmap>;

    /// The most recently created roadmap, if any.
    async fn get_active_roadmap(&self) -> Result<Option<Roadmap>>;

    /// Update vision and success criteria.
    async fn update_roadmap(&self, roadmap: Roadmap) -> Result<Roadmap>;

    /// A roadmap with its tracks in rank order.
    async fn get_roadmap_with_tracks(&self, id: &str) -> Result<RoadmapWithTracks> {
        let roadmap = self.get_roadmap(id).await?;
        let tracks = self.list_tracks(&TrackFilter::for_roadmap(id)).await?;
        Ok(RoadmapWithTracks { roadmap, tracks })
    }

    // === Track operations ===

    /// Create a track together with its dependency edges.
    async fn create_track(&self, track: Track) -> Result<Track>;

    /// Load a track by id.
    async fn get_track(&self, id: &str) -> Result<Track>;

    /// Tracks matching the filter, in rank order.
    async fn list_tracks(&self, filter: &TrackFilter) -> Result<Vec<Track>>;

    /// Update a track; a changed dependency set is re-checked for cycles.
    async fn update_track(&self, track: Track) -> Result<Track>;

    /// Delete a track and its own dependency edges.
    async fn delete_track(&self, id: &str) -> Result<()>;

    /// Add one dependency edge.
    async fn add_track_dependency(&self, track_id: &str, depends_on: &str) -> Result<Track>;

    /// Remove one dependency edge.
    async fn remove_track_dependency(&self, track_id: &str, depends_on: &str) -> Result<Track>;

    /// Dependency ids of a track in insertion order.
    async fn get_track_dependencies(&self, track_id: &str) -> Result<Vec<String>> {
        Ok(self.get_track(track_id).await?.dependencies)
    }

    /// Fails with a cycle error if the stored graph has a cycle through the track.
    async fn validate_no_cycles(&self, track_id: &str) -> Result<()>;

    /// A track with its tasks in rank order.
    async fn get_track_with_tasks(&self, id: &str) -> Result<TrackWithTasks> {
        let track = self.get_track(id).await?;
        let tasks = self.list_tasks(&TaskFilter::for_track(id)).await?;
        Ok(TrackWithTasks { track, tasks })
    }

    // === Task operations ===

    /// Create a task; an empty id is replaced by `<code>-task-<n>`.
    async fn create_task(&self, task: Task) -> Result<Task>;

    /// Load a task by id.
    async fn get_task(&self, id: &str) -> Result<Task>;

    /// Tasks matching the filter, in rank order.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Update a task; a change to done goes through the completion gate.
    async fn update_task(&self, task: Task) -> Result<Task>;

    /// Delete a task and its iteration memberships.
    async fn delete_task(&self, id: &str) -> Result<()>;

    /// Move a task to another track.
    async fn move_task_to_track(&self, task_id: &str, track_id: &str) -> Result<Task>;

    /// Tasks not in any iteration and not done.
    async fn list_backlog_tasks(&self) -> Result<Vec<Task>>;

    /// Runs the completion gate for a task without changing it.
    async fn check_task_completion(&self, task_id: &str) -> Result<()>;

    /// A task with its acceptance criteria.
    async fn get_task_with_criteria(&self, id: &str) -> Result<TaskWithCriteria> {
        let task = self.get_task(id).await?;
        let criteria = self.list_criteria(&CriterionFilter::for_task(id)).await?;
        Ok(TaskWithCriteria { task, criteria })
    }

    // === Iteration operations ===

    /// Create an iteration; number 0 takes the next free number.
    async fn create_iteration(&self, iteration: Iteration) -> Result<Iteration>;

    /// Load an iteration by number.
    async fn get_iteration(&self, number: i64) -> Result<Iteration>;

    /// The current iteration, if any.
    async fn get_current_iteration(&self) -> Result<Option<Iteration>>;

    /// All iterations in rank order.
    async fn list_iterations(&self) -> Result<Vec<Iteration>>;

    /// Update an iteration and its membership.
    async fn update_iteration(&self, iteration: Iteration) -> Result<Iteration>;

    /// Delete an iteration and its membership rows.
    async fn delete_iteration(&self, number: i64) -> Result<()>;

    /// Add a task to an iteration.
    async fn add_task_to_iteration(&self, number: i64, task_id: &str) -> Result<Iteration>;

    /// Remove a task from an iteration.
    async fn remove_task_from_iteration(&self, number: i64, task_id: &str) -> Result<Iteration>;

    /// Member tasks of an iteration in rank order.
    async fn get_iteration_tasks(&self, number: i64) -> Result<Vec<Task>>;

    /// planned -> current, refused while another iteration is current.
    async fn start_iteration(&self, number: i64) -> Result<Iteration>;

    /// current -> complete.
    async fn complete_iteration(&self, number: i64) -> Result<Iteration>;

    /// Iterations a task belongs to.
    async fn list_iterations_for_task(&self, task_id: &str) -> Result<Vec<Iteration>>;

    /// One past the highest iteration number.
    async fn next_iteration_number(&self) -> Result<i64>;

    // === Acceptance criterion operations ===

    /// Create a criterion; an empty id is replaced by `<code>-ac-<n>`.
    async fn create_criterion(&self, criterion: AcceptanceCriterion) -> Result<AcceptanceCriterion>;

    /// Load a criterion by id.
    async fn get_criterion(&self, id: &str) -> Result<AcceptanceCriterion>;

    /// Criteria matching the filter, in creation order.
    async fn list_criteria(&self, filter: &CriterionFilter) -> Result<Vec<AcceptanceCriterion>>;

    /// Update a criterion.
    async fn update_criterion(&self, criterion: AcceptanceCriterion) -> Result<AcceptanceCriterion>;

    /// Delete a criterion.
    async fn delete_criterion(&self, id: &str) -> Result<()>;

    // === ADR operations ===

    /// Create an ADR; an empty id is replaced by `<code>-adr-<n>`.
    async fn create_adr(&self, adr: Adr) -> Result<Adr>;

    /// Load an ADR by id.
    async fn get_adr(&self, id: &str) -> Result<Adr>;

    /// ADRs, optionally of one track, in creation order.
    async fn list_adrs(&self, track_id: Option<&str>) -> Result<Vec<Adr>>;

    /// Update an ADR.
    async fn update_adr(&self, adr: Adr) -> Result<Adr>;

    /// Mark `id` as superseded by the existing ADR `by`.
    async fn supersede_adr(&self, id: &str, by: &str) -> Result<Adr>;

    /// Mark an ADR deprecated.
    async fn deprecate_adr(&self, id: &str) -> Result<Adr>;

    // === Project operations ===

    /// A project metadata value.
    async fn get_project_metadata(&self, key: &str) -> Result<Option<String>>;

    /// Store a project metadata value.
    async fn set_project_metadata(&self, key: &str, value: &str) -> Result<()>;

    /// The stored project code, or the default one.
    async fn project_code(&self) -> Result<String>;

    /// Validate and store the project code.
    async fn set_project_code(&self, code: &str) -> Result<()>;

    /// Reserve the next sequence number for an entity kind.
    async fn next_sequence(&self, kind: EntityKind) -> Result<i64>;

    /// Reserve a `<code>-<kind>-<n>` id.
    async fn allocate_id(&self, kind: EntityKind) -> Result<String> {
        let code = self.project_code().await?;
        let n = self.next_sequence(kind).await?;
        Ok(format_sequence_id(&code, kind, n))
    }
}
