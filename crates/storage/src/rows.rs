//! Row decoding and timestamp encoding.

use chrono::{DateTime, SecondsFormat, Utc};
use roadmap_core::{
    AcceptanceCriterion, Adr, Iteration, Roadmap, Task, Time, Track, ValidationError,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{RepoError, Result};

/// Fixed-width RFC 3339 so stored timestamps sort as text.
pub(crate) fn encode_time(time: &Time) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the stored precision.
pub(crate) fn now() -> Time {
    let now = Utc::now();
    decode_time(&encode_time(&now)).unwrap_or(now)
}

pub(crate) fn decode_time(text: &str) -> Result<Time> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepoError::Store(format!("invalid stored timestamp {text:?}: {e}")))
}

fn time(row: &SqliteRow, column: &str) -> Result<Time> {
    let text: String = row.try_get(column)?;
    decode_time(&text)
}

fn optional_time(row: &SqliteRow, column: &str) -> Result<Option<Time>> {
    let text: Option<String> = row.try_get(column)?;
    text.as_deref().map(decode_time).transpose()
}

fn parsed<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    let text: String = row.try_get(column)?;
    text.parse()
        .map_err(|e: ValidationError| RepoError::Store(format!("corrupt {column} column: {e}")))
}

pub(crate) fn roadmap(row: &SqliteRow) -> Result<Roadmap> {
    Ok(Roadmap {
        id: row.try_get("id")?,
        vision: row.try_get("vision")?,
        success_criteria: row.try_get("success_criteria")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

pub(crate) fn track(row: &SqliteRow, dependencies: Vec<String>) -> Result<Track> {
    Ok(Track {
        id: row.try_get("id")?,
        roadmap_id: row.try_get("roadmap_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: parsed(row, "status")?,
        rank: row.try_get("rank")?,
        dependencies,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

pub(crate) fn task(row: &SqliteRow) -> Result<Task> {
    Ok(Task {
        id: row.try_get("id")?,
        track_id: row.try_get("track_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: parsed(row, "status")?,
        rank: row.try_get("rank")?,
        branch: row.try_get("branch")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

pub(crate) fn iteration(row: &SqliteRow, task_ids: Vec<String>) -> Result<Iteration> {
    Ok(Iteration {
        number: row.try_get("number")?,
        name: row.try_get("name")?,
        goal: row.try_get("goal")?,
        deliverable: row.try_get("deliverable")?,
        task_ids,
        status: parsed(row, "status")?,
        rank: row.try_get("rank")?,
        started_at: optional_time(row, "started_at")?,
        completed_at: optional_time(row, "completed_at")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

pub(crate) fn criterion(row: &SqliteRow) -> Result<AcceptanceCriterion> {
    Ok(AcceptanceCriterion {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        description: row.try_get("description")?,
        verification_type: parsed(row, "verification_type")?,
        status: parsed(row, "status")?,
        notes: row.try_get("notes")?,
        testing_instructions: row.try_get("testing_instructions")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

pub(crate) fn adr(row: &SqliteRow) -> Result<Adr> {
    Ok(Adr {
        id: row.try_get("id")?,
        track_id: row.try_get("track_id")?,
        title: row.try_get("title")?,
        status: parsed(row, "status")?,
        context: row.try_get("context")?,
        decision: row.try_get("decision")?,
        consequences: row.try_get("consequences")?,
        alternatives: row.try_get("alternatives")?,
        superseded_by: row.try_get("superseded_by")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_as_text() {
        let early = decode_time("2024-01-01T09:00:00.000001Z").unwrap();
        let late = decode_time("2024-01-01T10:00:00Z").unwrap();
        assert!(encode_time(&early) < encode_time(&late));
        assert_eq!(encode_time(&late), "2024-01-01T10:00:00.000000Z");
        assert_eq!(decode_time(&encode_time(&early)).unwrap(), early);
    }

    #[test]
    fn test_now_roundtrips_exactly() {
        let now = now();
        assert_eq!(decode_time(&encode_time(&now)).unwrap(), now);
    }

    #[test]
    fn test_bad_timestamp_is_store_failure() {
        assert!(matches!(decode_time("yesterday"), Err(RepoError::Store(_))));
    }
}
