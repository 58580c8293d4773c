//! Domain events derived from repository mutations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::Entity;
use crate::id::{EntityKind, EventId};
use crate::Time;

/// Default event namespace and source label.
pub const DEFAULT_EVENT_NAMESPACE: &str = "task-manager";

/// Full field set of an entity at the time of the event.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    /// Entity kind
    pub kind: EntityKind,
    /// Entity id
    pub id: String,
    /// All fields, including derived progress and blocked state
    pub fields: Map<String, Value>,
}

impl EntitySnapshot {
    /// Capture an entity.
    pub fn of<E: Entity>(entity: &E) -> Self {
        Self {
            kind: entity.kind(),
            id: entity.id(),
            fields: entity.fields(),
        }
    }
}

/// Identity of a removed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    /// Entity kind
    #[serde(skip)]
    pub kind: EntityKind,
    /// Entity id
    pub id: String,
}

/// A status field changed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    /// Entity kind
    #[serde(skip)]
    pub kind: EntityKind,
    /// Entity id
    pub id: String,
    /// Status before the mutation
    pub old_status: String,
    /// Status after the mutation
    pub new_status: String,
}

/// A track reached a notable status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackMilestone {
    /// Track id
    pub track_id: String,
    /// Owning roadmap
    pub roadmap_id: String,
    /// Track title
    pub title: String,
}

/// A task reached done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskMilestone {
    /// Task id
    pub task_id: String,
    /// Owning track
    pub track_id: String,
    /// Task title
    pub title: String,
}

/// An iteration started or completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationMilestone {
    /// Iteration number
    pub iteration_number: i64,
    /// Iteration name
    pub name: String,
    /// Member task ids
    pub task_ids: Vec<String>,
}

/// An acceptance criterion reached a verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriterionOutcome {
    /// Criterion id
    pub ac_id: String,
    /// Owning task
    pub task_id: String,
    /// Verification notes or failure reason
    pub notes: String,
}

/// An ADR left the accepted set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdrChange {
    /// ADR id
    pub adr_id: String,
    /// Owning track
    pub track_id: String,
    /// Replacement ADR, for supersession
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

/// One discrete domain event.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// An entity was created
    Created(EntitySnapshot),
    /// An entity was changed
    Updated(EntitySnapshot),
    /// An entity was deleted
    Deleted(EntityRef),
    /// A status field changed
    StatusChanged(StatusChange),
    /// Track reached complete
    TrackCompleted(TrackMilestone),
    /// Track reached blocked
    TrackBlocked(TrackMilestone),
    /// Task reached done
    TaskCompleted(TaskMilestone),
    /// Iteration became current
    IterationStarted(IterationMilestone),
    /// Iteration was completed
    IterationCompleted(IterationMilestone),
    /// Criterion verified by a person
    CriterionVerified(CriterionOutcome),
    /// Criterion verified by automation
    CriterionAutomaticallyVerified(CriterionOutcome),
    /// Criterion waiting for human review
    CriterionPendingReview(CriterionOutcome),
    /// Criterion failed
    CriterionFailed(CriterionOutcome),
    /// ADR replaced by another
    AdrSuperseded(AdrChange),
    /// ADR deprecated
    AdrDeprecated(AdrChange),
}

impl DomainEvent {
    /// Kind of the entity the event is about.
    pub fn kind(&self) -> EntityKind {
        match self {
            DomainEvent::Created(s) | DomainEvent::Updated(s) => s.kind,
            DomainEvent::Deleted(r) => r.kind,
            DomainEvent::StatusChanged(c) => c.kind,
            DomainEvent::TrackCompleted(_) | DomainEvent::TrackBlocked(_) => EntityKind::Track,
            DomainEvent::TaskCompleted(_) => EntityKind::Task,
            DomainEvent::IterationStarted(_) | DomainEvent::IterationCompleted(_) => {
                EntityKind::Iteration
            }
            DomainEvent::CriterionVerified(_)
            | DomainEvent::CriterionAutomaticallyVerified(_)
            | DomainEvent::CriterionPendingReview(_)
            | DomainEvent::CriterionFailed(_) => EntityKind::Criterion,
            DomainEvent::AdrSuperseded(_) | DomainEvent::AdrDeprecated(_) => EntityKind::Adr,
        }
    }

    /// Action part of the event type.
    pub fn action(&self) -> &'static str {
        match self {
            DomainEvent::Created(_) => "created",
            DomainEvent::Updated(_) => "updated",
            DomainEvent::Deleted(_) => "deleted",
            DomainEvent::StatusChanged(_) => "status_changed",
            DomainEvent::TrackCompleted(_)
            | DomainEvent::TaskCompleted(_)
            | DomainEvent::IterationCompleted(_) => "completed",
            DomainEvent::TrackBlocked(_) => "blocked",
            DomainEvent::IterationStarted(_) => "started",
            DomainEvent::CriterionVerified(_) => "verified",
            DomainEvent::CriterionAutomaticallyVerified(_) => "automatically_verified",
            DomainEvent::CriterionPendingReview(_) => "pending_review",
            DomainEvent::CriterionFailed(_) => "failed",
            DomainEvent::AdrSuperseded(_) => "superseded",
            DomainEvent::AdrDeprecated(_) => "deprecated",
        }
    }

    /// Dotted type tag, e.g. `task-manager.task.status_changed`.
    pub fn event_type(&self, namespace: &str) -> String {
        format!("{}.{}.{}", namespace, self.kind().as_str(), self.action())
    }

    /// Wire payload. Keys are stable per event type.
    pub fn payload(&self) -> Map<String, Value> {
        match self {
            DomainEvent::Created(s) | DomainEvent::Updated(s) => s.fields.clone(),
            DomainEvent::Deleted(r) => to_map(r),
            DomainEvent::StatusChanged(c) => to_map(c),
            DomainEvent::TrackCompleted(m) | DomainEvent::TrackBlocked(m) => to_map(m),
            DomainEvent::TaskCompleted(m) => to_map(m),
            DomainEvent::IterationStarted(m) | DomainEvent::IterationCompleted(m) => to_map(m),
            DomainEvent::CriterionVerified(o)
            | DomainEvent::CriterionAutomaticallyVerified(o)
            | DomainEvent::CriterionPendingReview(o)
            | DomainEvent::CriterionFailed(o) => to_map(o),
            DomainEvent::AdrSuperseded(c) | DomainEvent::AdrDeprecated(c) => to_map(c),
        }
    }
}

fn to_map<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Transport envelope handed to event sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Unique identifier
    pub id: EventId,

    /// Dotted type tag
    #[serde(rename = "type")]
    pub event_type: String,

    /// Emitting component
    pub source: String,

    /// When the event was derived
    pub timestamp: Time,

    /// Routing labels
    pub labels: BTreeMap<String, String>,

    /// Event fields; consumers ignore keys they do not know
    pub payload: Map<String, Value>,
}

impl BusEvent {
    /// Wrap a domain event for transport.
    pub fn from_domain(event: &DomainEvent, namespace: &str) -> Self {
        let event_type = event.event_type(namespace);
        let mut labels = BTreeMap::new();
        labels.insert("event_type".to_string(), event_type.clone());
        labels.insert("plugin".to_string(), namespace.to_string());

        Self {
            id: EventId::new(),
            event_type,
            source: namespace.to_string(),
            timestamp: chrono::Utc::now(),
            labels,
            payload: event.payload(),
        }
    }
}
