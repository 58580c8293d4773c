//! Event derivation from before/after entity state.
//!
//! Every successful mutation yields an `updated` event. When the status field
//! changed there is also a `status_changed` event, followed by one specific
//! event if the new status is a notable one (a completed track, a done task,
//! a failed criterion, ...).

use roadmap_core::{
    AcceptanceCriterion, Adr, AdrChange, AdrStatus, CriterionOutcome, CriterionStatus,
    DomainEvent, Entity, EntityKind, EntityRef, EntitySnapshot, Iteration, IterationMilestone,
    IterationStatus, StatusChange, Task, TaskMilestone, TaskStatus, Track, TrackMilestone,
    TrackStatus,
};

/// A newly created entity.
pub fn created<E: Entity>(entity: &E) -> Vec<DomainEvent> {
    vec![DomainEvent::Created(EntitySnapshot::of(entity))]
}

/// A change that cannot move the status, such as an edge or membership edit.
pub fn updated<E: Entity>(entity: &E) -> Vec<DomainEvent> {
    vec![DomainEvent::Updated(EntitySnapshot::of(entity))]
}

/// A removed entity.
pub fn deleted(kind: EntityKind, id: impl Into<String>) -> Vec<DomainEvent> {
    vec![DomainEvent::Deleted(EntityRef { kind, id: id.into() })]
}

fn status_changed<E: Entity>(entity: &E, old: &str, new: &str) -> DomainEvent {
    DomainEvent::StatusChanged(StatusChange {
        kind: entity.kind(),
        id: entity.id(),
        old_status: old.to_string(),
        new_status: new.to_string(),
    })
}

/// Events for a track update.
pub fn track_changes(old: &Track, new: &Track) -> Vec<DomainEvent> {
    let mut events = updated(new);
    if old.status == new.status {
        return events;
    }
    events.push(status_changed(new, old.status.as_str(), new.status.as_str()));

    let milestone = || TrackMilestone {
        track_id: new.id.clone(),
        roadmap_id: new.roadmap_id.clone(),
        title: new.title.clone(),
    };
    match new.status {
        TrackStatus::Complete => events.push(DomainEvent::TrackCompleted(milestone())),
        TrackStatus::Blocked => events.push(DomainEvent::TrackBlocked(milestone())),
        _ => {}
    }
    events
}

/// Events for a task update.
pub fn task_changes(old: &Task, new: &Task) -> Vec<DomainEvent> {
    let mut events = updated(new);
    if old.status == new.status {
        return events;
    }
    events.push(status_changed(new, old.status.as_str(), new.status.as_str()));

    if new.status == TaskStatus::Done {
        events.push(DomainEvent::TaskCompleted(TaskMilestone {
            task_id: new.id.clone(),
            track_id: new.track_id.clone(),
            title: new.title.clone(),
        }));
    }
    events
}

/// Events for an iteration update, including start and completion.
pub fn iteration_changes(old: &Iteration, new: &Iteration) -> Vec<DomainEvent> {
    let mut events = updated(new);
    if old.status == new.status {
        return events;
    }
    events.push(status_changed(new, old.status.as_str(), new.status.as_str()));

    let milestone = || IterationMilestone {
        iteration_number: new.number,
        name: new.name.clone(),
        task_ids: new.task_ids.clone(),
    };
    match new.status {
        IterationStatus::Current => events.push(DomainEvent::IterationStarted(milestone())),
        IterationStatus::Complete => events.push(DomainEvent::IterationCompleted(milestone())),
        IterationStatus::Planned => {}
    }
    events
}

/// Events for an acceptance criterion update.
pub fn criterion_changes(old: &AcceptanceCriterion, new: &AcceptanceCriterion) -> Vec<DomainEvent> {
    let mut events = updated(new);
    if old.status == new.status {
        return events;
    }
    events.push(status_changed(new, old.status.as_str(), new.status.as_str()));

    let outcome = CriterionOutcome {
        ac_id: new.id.clone(),
        task_id: new.task_id.clone(),
        notes: new.notes.clone(),
    };
    match new.status {
        CriterionStatus::Verified => events.push(DomainEvent::CriterionVerified(outcome)),
        CriterionStatus::AutomaticallyVerified => {
            events.push(DomainEvent::CriterionAutomaticallyVerified(outcome))
        }
        CriterionStatus::PendingHumanReview => {
            events.push(DomainEvent::CriterionPendingReview(outcome))
        }
        CriterionStatus::Failed => events.push(DomainEvent::CriterionFailed(outcome)),
        CriterionStatus::NotStarted => {}
    }
    events
}

/// Events for an ADR update, including supersession and deprecation.
pub fn adr_changes(old: &Adr, new: &Adr) -> Vec<DomainEvent> {
    let mut events = updated(new);
    if old.status == new.status {
        return events;
    }
    events.push(status_changed(new, old.status.as_str(), new.status.as_str()));

    let change = AdrChange {
        adr_id: new.id.clone(),
        track_id: new.track_id.clone(),
        superseded_by: new.superseded_by.clone(),
    };
    match new.status {
        AdrStatus::Superseded => events.push(DomainEvent::AdrSuperseded(change)),
        AdrStatus::Deprecated => events.push(DomainEvent::AdrDeprecated(change)),
        _ => {}
    }
    events
}
