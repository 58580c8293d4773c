//! Event-emitting repository decorator.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use roadmap_core::{
    AcceptanceCriterion, Adr, BusEvent, DomainEvent, EntityKind, EventConfig, Iteration, Roadmap,
    Task, Track,
};
use roadmap_storage::{CriterionFilter, Repository, Result, TaskFilter, TrackFilter};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::derive;

/// Wraps a repository and publishes domain events for its mutations.
///
/// Reads are forwarded untouched. A mutation whose events depend on the
/// previous status reads the entity first. Events are derived only after the
/// wrapped call succeeds and are published on a background task, one at a
/// time and each under its own deadline. Batches are chained so events leave
/// in mutation order. Publish failures are logged and never reach the caller.
pub struct EventEmittingRepository {
    /// Repository doing the work
    inner: Arc<dyn Repository>,

    /// Where events go; `None` disables emission
    bus: Option<Arc<dyn EventBus>>,

    /// Event type prefix and source label
    namespace: String,

    /// Deadline for each publish call
    timeout: Duration,

    /// Last publication batch started
    tail: Mutex<Option<JoinHandle<()>>>,
}

impl EventEmittingRepository {
    /// Wrap `inner`, publishing to `bus` with the given event settings.
    pub fn new(
        inner: Arc<dyn Repository>,
        bus: Option<Arc<dyn EventBus>>,
        config: &EventConfig,
    ) -> Self {
        Self {
            inner,
            bus,
            namespace: config.namespace.clone(),
            timeout: config.publish_timeout(),
            tail: Mutex::new(None),
        }
    }

    /// Override the per-event publish deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The wrapped repository.
    pub fn inner(&self) -> &Arc<dyn Repository> {
        &self.inner
    }

    /// Wait until every publication started so far has finished or timed out.
    pub async fn settle(&self) {
        let last = self.lock_tail().take();
        if let Some(handle) = last {
            if let Err(e) = handle.await {
                warn!(error = %e, "event publisher task failed");
            }
        }
    }

    fn lock_tail(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, events: Vec<DomainEvent>) {
        let Some(bus) = &self.bus else {
            return;
        };
        if events.is_empty() {
            return;
        }

        let batch: Vec<BusEvent> = events
            .iter()
            .map(|event| BusEvent::from_domain(event, &self.namespace))
            .collect();
        let bus = Arc::clone(bus);
        let timeout = self.timeout;

        let mut tail = self.lock_tail();
        let previous = tail.take();
        *tail = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(error = %e, "event publisher task failed");
                }
            }
            for event in batch {
                publish(bus.as_ref(), event, timeout).await;
            }
        }));
    }
}

async fn publish(bus: &dyn EventBus, event: BusEvent, timeout: Duration) {
    let event_type = event.event_type.clone();
    match tokio::time::timeout(timeout, bus.publish(event)).await {
        Ok(Ok(())) => debug!(%event_type, "published event"),
        Ok(Err(e)) => warn!(%event_type, error = %e, "failed to publish event"),
        Err(_) => warn!(
            %event_type,
            timeout_ms = timeout.as_millis() as u64,
            "event publish timed out"
        ),
    }
}

#[async_trait]
impl Repository for EventEmittingRepository {
    // === Roadmap operations ===

    async fn create_roadmap(&self, roadmap: Roadmap) -> Result<Roadmap> {
        let created = self.inner.create_roadmap(roadmap).await?;
        self.emit(derive::created(&created));
        Ok(created)
    }

    async fn get_roadmap(&self, id: &str) -> Result<Roadmap> {
        self.inner.get_roadmap(id).await
    }

    async fn get_active_roadmap(&self) -> Result<Option<Roadmap>> {
        self.inner.get_active_roadmap().await
    }

    async fn update_roadmap(&self, roadmap: Roadmap) -> Result<Roadmap> {
        let updated = self.inner.update_roadmap(roadmap).await?;
        self.emit(derive::updated(&updated));
        Ok(updated)
    }

    // === Track operations ===

    async fn create_track(&self, track: Track) -> Result<Track> {
        let created = self.inner.create_track(track).await?;
        self.emit(derive::created(&created));
        Ok(created)
    }

    async fn get_track(&self, id: &str) -> Result<Track> {
        self.inner.get_track(id).await
    }

    async fn list_tracks(&self, filter: &TrackFilter) -> Result<Vec<Track>> {
        self.inner.list_tracks(filter).await
    }

    async fn update_track(&self, track: Track) -> Result<Track> {
        let old = self.inner.get_track(&track.id).await?;
        let updated = self.inner.update_track(track).await?;
        self.emit(derive::track_changes(&old, &updated));
        Ok(updated)
    }

    async fn delete_track(&self, id: &str) -> Result<()> {
        self.inner.delete_track(id).await?;
        self.emit(derive::deleted(EntityKind::Track, id));
        Ok(())
    }

    async fn add_track_dependency(&self, track_id: &str, depends_on: &str) -> Result<Track> {
        let old = self.inner.get_track(track_id).await.ok();
        let updated = self.inner.add_track_dependency(track_id, depends_on).await?;
        // an edge that already existed is a no-op
        if old.map_or(true, |old| old.dependencies != updated.dependencies) {
            self.emit(derive::updated(&updated));
        }
        Ok(updated)
    }

    async fn remove_track_dependency(&self, track_id: &str, depends_on: &str) -> Result<Track> {
        let updated = self.inner.remove_track_dependency(track_id, depends_on).await?;
        self.emit(derive::updated(&updated));
        Ok(updated)
    }

    async fn get_track_dependencies(&self, track_id: &str) -> Result<Vec<String>> {
        self.inner.get_track_dependencies(track_id).await
    }

    async fn validate_no_cycles(&self, track_id: &str) -> Result<()> {
        self.inner.validate_no_cycles(track_id).await
    }

    // === Task operations ===

    async fn create_task(&self, task: Task) -> Result<Task> {
        let created = self.inner.create_task(task).await?;
        self.emit(derive::created(&created));
        Ok(created)
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        self.inner.get_task(id).await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.inner.list_tasks(filter).await
    }

    async fn update_task(&self, task: Task) -> Result<Task> {
        let old = self.inner.get_task(&task.id).await?;
        let updated = self.inner.update_task(task).await?;
        self.emit(derive::task_changes(&old, &updated));
        Ok(updated)
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        self.inner.delete_task(id).await?;
        self.emit(derive::deleted(EntityKind::Task, id));
        Ok(())
    }

    async fn move_task_to_track(&self, task_id: &str, track_id: &str) -> Result<Task> {
        let old = self.inner.get_task(task_id).await?;
        let moved = self.inner.move_task_to_track(task_id, track_id).await?;
        self.emit(derive::task_changes(&old, &moved));
        Ok(moved)
    }

    async fn list_backlog_tasks(&self) -> Result<Vec<Task>> {
        self.inner.list_backlog_tasks().await
    }

    async fn check_task_completion(&self, task_id: &str) -> Result<()> {
        self.inner.check_task_completion(task_id).await
    }

    // === Iteration operations ===

    async fn create_iteration(&self, iteration: Iteration) -> Result<Iteration> {
        let created = self.inner.create_iteration(iteration).await?;
        self.emit(derive::created(&created));
        Ok(created)
    }

    async fn get_iteration(&self, number: i64) -> Result<Iteration> {
        self.inner.get_iteration(number).await
    }

    async fn get_current_iteration(&self) -> Result<Option<Iteration>> {
        self.inner.get_current_iteration().await
    }

    async fn list_iterations(&self) -> Result<Vec<Iteration>> {
        self.inner.list_iterations().await
    }

    async fn update_iteration(&self, iteration: Iteration) -> Result<Iteration> {
        let old = self.inner.get_iteration(iteration.number).await?;
        let updated = self.inner.update_iteration(iteration).await?;
        self.emit(derive::iteration_changes(&old, &updated));
        Ok(updated)
    }

    async fn delete_iteration(&self, number: i64) -> Result<()> {
        self.inner.delete_iteration(number).await?;
        self.emit(derive::deleted(EntityKind::Iteration, number.to_string()));
        Ok(())
    }

    async fn add_task_to_iteration(&self, number: i64, task_id: &str) -> Result<Iteration> {
        let old = self.inner.get_iteration(number).await.ok();
        let updated = self.inner.add_task_to_iteration(number, task_id).await?;
        if old.map_or(true, |old| old.task_ids != updated.task_ids) {
            self.emit(derive::updated(&updated));
        }
        Ok(updated)
    }

    async fn remove_task_from_iteration(&self, number: i64, task_id: &str) -> Result<Iteration> {
        let updated = self.inner.remove_task_from_iteration(number, task_id).await?;
        self.emit(derive::updated(&updated));
        Ok(updated)
    }

    async fn get_iteration_tasks(&self, number: i64) -> Result<Vec<Task>> {
        self.inner.get_iteration_tasks(number).await
    }

    async fn start_iteration(&self, number: i64) -> Result<Iteration> {
        let old = self.inner.get_iteration(number).await?;
        let started = self.inner.start_iteration(number).await?;
        self.emit(derive::iteration_changes(&old, &started));
        Ok(started)
    }

    async fn complete_iteration(&self, number: i64) -> Result<Iteration> {
        let old = self.inner.get_iteration(number).await?;
        let completed = self.inner.complete_iteration(number).await?;
        self.emit(derive::iteration_changes(&old, &completed));
        Ok(completed)
    }

    async fn list_iterations_for_task(&self, task_id: &str) -> Result<Vec<Iteration>> {
        self.inner.list_iterations_for_task(task_id).await
    }

    async fn next_iteration_number(&self) -> Result<i64> {
        self.inner.next_iteration_number().await
    }

    // === Acceptance criterion operations ===

    async fn create_criterion(&self, criterion: AcceptanceCriterion) -> Result<AcceptanceCriterion> {
        let created = self.inner.create_criterion(criterion).await?;
        self.emit(derive::created(&created));
        Ok(created)
    }

    async fn get_criterion(&self, id: &str) -> Result<AcceptanceCriterion> {
        self.inner.get_criterion(id).await
    }

    async fn list_criteria(&self, filter: &CriterionFilter) -> Result<Vec<AcceptanceCriterion>> {
        self.inner.list_criteria(filter).await
    }

    async fn update_criterion(&self, criterion: AcceptanceCriterion) -> Result<AcceptanceCriterion> {
        let old = self.inner.get_criterion(&criterion.id).await?;
        let updated = self.inner.update_criterion(criterion).await?;
        self.emit(derive::criterion_changes(&old, &updated));
        Ok(updated)
    }

    async fn delete_criterion(&self, id: &str) -> Result<()> {
        self.inner.delete_criterion(id).await?;
        self.emit(derive::deleted(EntityKind::Criterion, id));
        Ok(())
    }

    // === ADR operations ===

    async fn create_adr(&self, adr: Adr) -> Result<Adr> {
        let created = self.inner.create_adr(adr).await?;
        self.emit(derive::created(&created));
        Ok(created)
    }

    async fn get_adr(&self, id: &str) -> Result<Adr> {
        self.inner.get_adr(id).await
    }

    async fn list_adrs(&self, track_id: Option<&str>) -> Result<Vec<Adr>> {
        self.inner.list_adrs(track_id).await
    }

    async fn update_adr(&self, adr: Adr) -> Result<Adr> {
        let old = self.inner.get_adr(&adr.id).await?;
        let updated = self.inner.update_adr(adr).await?;
        self.emit(derive::adr_changes(&old, &updated));
        Ok(updated)
    }

    async fn supersede_adr(&self, id: &str, by: &str) -> Result<Adr> {
        let old = self.inner.get_adr(id).await?;
        let updated = self.inner.supersede_adr(id, by).await?;
        self.emit(derive::adr_changes(&old, &updated));
        Ok(updated)
    }

    async fn deprecate_adr(&self, id: &str) -> Result<Adr> {
        let old = self.inner.get_adr(id).await?;
        let updated = self.inner.deprecate_adr(id).await?;
        self.emit(derive::adr_changes(&old, &updated));
        Ok(updated)
    }

    // === Project operations ===

    async fn get_project_metadata(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_project_metadata(key).await
    }

    async fn set_project_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set_project_metadata(key, value).await
    }

    async fn project_code(&self) -> Result<String> {
        self.inner.project_code().await
    }

    async fn set_project_code(&self, code: &str) -> Result<()> {
        self.inner.set_project_code(code).await
    }

    async fn next_sequence(&self, kind: EntityKind) -> Result<i64> {
        self.inner.next_sequence(kind).await
    }
}
