//! The completion gate decision procedure.

use roadmap_core::{AcceptanceCriterion, Adr, AdrConfig, Task, TaskStatus};
use tracing::warn;

use crate::blocked::{BlockReason, BlockingCriterion, CompletionBlocked};

/// Decides whether a task may transition to done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionGate {
    adr: AdrConfig,
}

impl CompletionGate {
    /// Create a gate with the project's ADR flags.
    pub fn new(adr: AdrConfig) -> Self {
        Self { adr }
    }

    /// ADR flags in effect.
    pub fn adr_config(&self) -> AdrConfig {
        self.adr
    }

    /// The gate only runs for a change to done from any other status.
    pub fn applies(from: TaskStatus, to: TaskStatus) -> bool {
        to == TaskStatus::Done && from != TaskStatus::Done
    }

    /// Whether the owning track's ADRs must be consulted.
    pub fn requires_adr(&self) -> bool {
        self.adr.enforced_on_completion()
    }

    /// Checks the criteria alone.
    pub fn check_criteria(
        task_id: &str,
        criteria: &[AcceptanceCriterion],
    ) -> Result<(), CompletionBlocked> {
        let mut failed = Vec::new();
        let mut unverified = Vec::new();
        for ac in criteria {
            if ac.status.is_failed() {
                failed.push(BlockingCriterion::from(ac));
            } else if !ac.status.is_verified() {
                unverified.push(BlockingCriterion::from(ac));
            }
        }

        if failed.is_empty() && unverified.is_empty() {
            return Ok(());
        }
        warn!(
            task_id,
            failed = failed.len(),
            unverified = unverified.len(),
            "completion refused: acceptance criteria not met"
        );
        Err(CompletionBlocked {
            task_id: task_id.to_string(),
            reason: BlockReason::UnmetCriteria { failed, unverified },
        })
    }

    /// Runs the whole procedure for `task`.
    ///
    /// `adrs` are the ADRs of the task's track; they are only looked at when
    /// [`requires_adr`](Self::requires_adr) is true.
    pub fn evaluate(
        &self,
        task: &Task,
        criteria: &[AcceptanceCriterion],
        adrs: &[Adr],
    ) -> Result<(), CompletionBlocked> {
        Self::check_criteria(&task.id, criteria)?;

        if self.requires_adr() && adrs.is_empty() {
            warn!(task_id = %task.id, track_id = %task.track_id, "completion refused: track has no ADR");
            return Err(CompletionBlocked {
                task_id: task.id.clone(),
                reason: BlockReason::MissingAdr {
                    track_id: task.track_id.clone(),
                },
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadmap_core::{CriterionStatus, VerificationType};

    fn task() -> Task {
        Task::new("track-a", "Checkout", "").unwrap().with_id("P-task-1")
    }

    fn ac(id: &str, status: CriterionStatus, notes: &str) -> AcceptanceCriterion {
        let mut ac = AcceptanceCriterion::new("P-task-1", format!("criterion {id}"), VerificationType::Manual)
            .unwrap()
            .with_id(id);
        ac.status = status;
        ac.notes = notes.to_string();
        ac
    }

    fn adr() -> Adr {
        Adr::new("track-a", "Use SQLite", "ctx", "dec", "cons").unwrap().with_id("P-adr-1")
    }

    fn enforcing() -> CompletionGate {
        CompletionGate::new(AdrConfig { required: true, enforce_on_task_completion: true })
    }

    #[test]
    fn test_applies_only_to_done_transitions() {
        assert!(CompletionGate::applies(TaskStatus::Todo, TaskStatus::Done));
        assert!(CompletionGate::applies(TaskStatus::InProgress, TaskStatus::Done));
        assert!(!CompletionGate::applies(TaskStatus::Done, TaskStatus::Done));
        assert!(!CompletionGate::applies(TaskStatus::Done, TaskStatus::Todo));
        assert!(!CompletionGate::applies(TaskStatus::Todo, TaskStatus::InProgress));
    }

    #[test]
    fn test_all_verified_passes() {
        let criteria = vec![
            ac("P-ac-1", CriterionStatus::Verified, ""),
            ac("P-ac-2", CriterionStatus::AutomaticallyVerified, ""),
        ];
        assert!(CompletionGate::default().evaluate(&task(), &criteria, &[]).is_ok());
        assert!(CompletionGate::default().evaluate(&task(), &[], &[]).is_ok());
    }

    #[test]
    fn test_partitions_failed_and_unverified() {
        let criteria = vec![
            ac("P-ac-1", CriterionStatus::Verified, ""),
            ac("P-ac-2", CriterionStatus::Failed, "X failed on Safari"),
            ac("P-ac-3", CriterionStatus::PendingHumanReview, ""),
            ac("P-ac-4", CriterionStatus::NotStarted, ""),
        ];
        let blocked = CompletionGate::default()
            .evaluate(&task(), &criteria, &[])
            .unwrap_err();

        assert_eq!(blocked.task_id, "P-task-1");
        match &blocked.reason {
            BlockReason::UnmetCriteria { failed, unverified } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].id, "P-ac-2");
                assert_eq!(failed[0].notes, "X failed on Safari");
                let ids: Vec<&str> = unverified.iter().map(|c| c.id.as_str()).collect();
                assert_eq!(ids, vec!["P-ac-3", "P-ac-4"]);
            }
            other => panic!("unexpected reason {other:?}"),
        }
        assert_eq!(blocked.criteria().len(), 3);
        assert!(blocked.to_string().contains("P-ac-2 (X failed on Safari)"));
    }

    #[test]
    fn test_missing_adr_only_when_both_flags_set() {
        let criteria = vec![ac("P-ac-1", CriterionStatus::Verified, "")];

        let only_required =
            CompletionGate::new(AdrConfig { required: true, enforce_on_task_completion: false });
        assert!(only_required.evaluate(&task(), &criteria, &[]).is_ok());

        let blocked = enforcing().evaluate(&task(), &criteria, &[]).unwrap_err();
        assert!(blocked.is_missing_adr());
        assert_eq!(
            blocked.reason,
            BlockReason::MissingAdr { track_id: "track-a".into() }
        );

        assert!(enforcing().evaluate(&task(), &criteria, &[adr()]).is_ok());
    }

    #[test]
    fn test_criteria_checked_before_adr() {
        let criteria = vec![ac("P-ac-1", CriterionStatus::Failed, "")];
        let blocked = enforcing().evaluate(&task(), &criteria, &[]).unwrap_err();
        assert!(!blocked.is_missing_adr());
    }

    #[test]
    fn test_serializes_for_callers() {
        let blocked = CompletionGate::check_criteria(
            "P-task-1",
            &[ac("P-ac-9", CriterionStatus::Failed, "boom")],
        )
        .unwrap_err();
        let json = serde_json::to_value(&blocked).unwrap();
        assert_eq!(json["reason"]["reason"], "unmet_criteria");
        assert_eq!(json["reason"]["failed"][0]["status"], "failed");
    }
}
