//! Manual "move up / move down" over any repository.
//!
//! A move updates two records: the moving element, then its neighbour. The
//! two writes are separate; if the second fails the first stays applied,
//! which is still a valid ordering.

use roadmap_core::{
    reorder_pair, IterationStatus, MoveDirection, Ranked, ValidationError, ValidationResult,
};

use crate::error::Result;
use crate::trait_::{Repository, TaskFilter, TrackFilter};

fn locate<T: Ranked + Clone>(
    siblings: &[T],
    is_moving: impl Fn(&T) -> bool,
    direction: MoveDirection,
) -> ValidationResult<Option<(T, T)>> {
    match siblings.iter().position(is_moving) {
        Some(index) => reorder_pair(siblings, index, direction),
        None => Ok(None),
    }
}

/// Move a track one position among the tracks of its roadmap.
///
/// Returns `false` when the track is already at that end of the list.
pub async fn move_track<R>(repo: &R, track_id: &str, direction: MoveDirection) -> Result<bool>
where
    R: Repository + ?Sized,
{
    let track = repo.get_track(track_id).await?;
    let siblings = repo
        .list_tracks(&TrackFilter::for_roadmap(&track.roadmap_id))
        .await?;
    let Some((moving, neighbor)) = locate(&siblings, |t| t.id == track_id, direction)? else {
        return Ok(false);
    };
    moving.validate()?;
    neighbor.validate()?;

    repo.update_track(moving).await?;
    repo.update_track(neighbor).await?;
    Ok(true)
}

/// Move a task one position among the tasks of its track.
pub async fn move_task<R>(repo: &R, task_id: &str, direction: MoveDirection) -> Result<bool>
where
    R: Repository + ?Sized,
{
    let task = repo.get_task(task_id).await?;
    let siblings = repo.list_tasks(&TaskFilter::for_track(&task.track_id)).await?;
    let Some((moving, neighbor)) = locate(&siblings, |t| t.id == task_id, direction)? else {
        return Ok(false);
    };
    moving.validate()?;
    neighbor.validate()?;

    repo.update_task(moving).await?;
    repo.update_task(neighbor).await?;
    Ok(true)
}

/// Move an iteration one position among the iterations not yet complete.
pub async fn move_iteration<R>(repo: &R, number: i64, direction: MoveDirection) -> Result<bool>
where
    R: Repository + ?Sized,
{
    let iteration = repo.get_iteration(number).await?;
    if iteration.status == IterationStatus::Complete {
        return Err(ValidationError::InvalidTransition {
            entity: "iteration",
            id: number.to_string(),
            reason: "completed iterations cannot be reordered".into(),
        }
        .into());
    }

    let siblings: Vec<_> = repo
        .list_iterations()
        .await?
        .into_iter()
        .filter(|i| i.status != IterationStatus::Complete)
        .collect();
    let Some((moving, neighbor)) = locate(&siblings, |i| i.number == number, direction)? else {
        return Ok(false);
    };
    moving.validate()?;
    neighbor.validate()?;

    repo.update_iteration(moving).await?;
    repo.update_iteration(neighbor).await?;
    Ok(true)
}
