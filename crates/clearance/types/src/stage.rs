//! Stage records: one department's decision for one group or student
//!
//! A StageRecord is a small state machine:
//!
//! ```text
//! Pending ──approve──▶ Approved (terminal)
//!    │  ▲
//! reject resubmit
//!    ▼  │
//!  Rejected
//! ```
//!
//! Every transition appends exactly one [`HistoryEntry`]. Creation does
//! not; a freshly opened stage has an empty history.

use crate::{ActorId, Checklist, ClearanceError, ClearanceResult, StageKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Stage Status ─────────────────────────────────────────────────────

/// Decision status of a stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Waiting for a department decision
    #[default]
    Pending,
    /// Cleared by the department
    Approved,
    /// Sent back with a reason; may be resubmitted
    Rejected,
}

impl StageStatus {
    /// Whether a department has decided
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether `self → to` is an allowed edge
    pub fn can_transition_to(&self, to: StageStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Rejected, Self::Pending)
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Approved => f.write_str("approved"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

// ── History ──────────────────────────────────────────────────────────

/// One immutable entry in a stage's audit trail
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Status entered by this transition
    pub status: StageStatus,
    /// Rejection reason, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Who made the transition
    pub actor: ActorId,
    /// Never earlier than the previous entry's timestamp
    pub timestamp: DateTime<Utc>,
}

// ── Stage Record ─────────────────────────────────────────────────────

/// A department's clearance record for one group or student
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Department and subject
    pub key: StageKey,
    /// Current decision status
    pub status: StageStatus,
    /// Department-specific confirmations
    pub checklist: Checklist,
    /// Set when the upstream stage's approval opened this one
    pub prerequisite_cleared: bool,
    /// Reason of the current rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// When the stage was approved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<DateTime<Utc>>,
    /// How many times a rejection was resubmitted
    pub resubmission_count: u32,
    /// Append-only transition log
    pub history: Vec<HistoryEntry>,
    /// Who opened the stage
    pub opened_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token; 0 until first persisted
    #[serde(default)]
    pub version: u64,
}

impl StageRecord {
    /// Open a stage in `Pending`.
    ///
    /// The checklist must belong to the key's department.
    pub fn open(key: StageKey, checklist: Checklist, opened_by: ActorId) -> ClearanceResult<Self> {
        if checklist.department() != key.department {
            return Err(ClearanceError::Validation(format!(
                "{} checklist cannot open the {}",
                checklist.department(),
                key
            )));
        }
        let now = Utc::now();
        Ok(Self {
            key,
            status: StageStatus::Pending,
            checklist,
            prerequisite_cleared: false,
            rejection_reason: None,
            cleared_at: None,
            resubmission_count: 0,
            history: Vec::new(),
            opened_by,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn with_prerequisite_cleared(mut self) -> Self {
        self.prerequisite_cleared = true;
        self
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Approve the stage with the submitted checklist.
    ///
    /// Nothing changes unless every requirement of the merged checklist
    /// is met.
    pub fn approve(&mut self, submitted: &Checklist, actor: &ActorId) -> ClearanceResult<()> {
        actor.validate()?;
        self.ensure_undecided()?;

        let merged = submitted.merged_onto(&self.checklist)?;
        let missing = merged.missing();
        if !missing.is_empty() {
            return Err(ClearanceError::Precondition(format!(
                "checklist incomplete for {}: {}",
                self.key,
                missing.join(", ")
            )));
        }

        let at = self.next_timestamp();
        self.checklist = merged;
        self.status = StageStatus::Approved;
        self.cleared_at = Some(at);
        self.rejection_reason = None;
        self.append_history(StageStatus::Approved, None, actor, at);
        Ok(())
    }

    /// Reject the stage with a reason staff can act on
    pub fn reject(&mut self, reason: &str, actor: &ActorId) -> ClearanceResult<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ClearanceError::Validation(
                "a rejection needs a reason".into(),
            ));
        }
        actor.validate()?;
        self.ensure_undecided()?;

        if let Checklist::Lab(lab) = &self.checklist {
            if lab.has_nothing_expected() {
                return Err(ClearanceError::Precondition(format!(
                    "{} has no expected items; there is nothing to reject on",
                    self.key
                )));
            }
        }

        let at = self.next_timestamp();
        self.status = StageStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.append_history(StageStatus::Rejected, Some(reason.to_string()), actor, at);
        Ok(())
    }

    /// Put a rejected stage back to `Pending`
    pub fn resubmit(&mut self, actor: &ActorId) -> ClearanceResult<()> {
        actor.validate()?;
        if self.status != StageStatus::Rejected {
            return Err(ClearanceError::InvalidState(format!(
                "{} is {}; only rejected stages can be resubmitted",
                self.key, self.status
            )));
        }

        let at = self.next_timestamp();
        self.status = StageStatus::Pending;
        self.rejection_reason = None;
        self.resubmission_count += 1;
        self.append_history(StageStatus::Pending, None, actor, at);
        Ok(())
    }

    /// Record partial checklist progress without deciding
    pub fn update_checklist(&mut self, submitted: &Checklist) -> ClearanceResult<()> {
        if self.status != StageStatus::Pending {
            return Err(ClearanceError::InvalidState(format!(
                "{} is {}; its checklist can no longer change",
                self.key, self.status
            )));
        }
        self.checklist = submitted.merged_onto(&self.checklist)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replace flags that are derived by the engine rather than entered
    /// by staff. Status and history are untouched.
    pub fn refresh_derived_checklist(&mut self, derived: Checklist) -> ClearanceResult<()> {
        if derived.department() != self.key.department {
            return Err(ClearanceError::Validation(format!(
                "{} checklist cannot refresh the {}",
                derived.department(),
                self.key
            )));
        }
        self.checklist = derived;
        self.updated_at = Utc::now();
        Ok(())
    }

    // ── Query methods ────────────────────────────────────────────────

    pub fn is_approved(&self) -> bool {
        self.status == StageStatus::Approved
    }

    pub fn is_pending(&self) -> bool {
        self.status == StageStatus::Pending
    }

    pub fn last_transition(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn ensure_undecided(&self) -> ClearanceResult<()> {
        if !self.status.is_decided() {
            return Ok(());
        }
        let hint = match self.status {
            StageStatus::Rejected => "; resubmit before deciding again",
            _ => "",
        };
        Err(ClearanceError::AlreadyProcessed(format!(
            "{} was already {}{}",
            self.key, self.status, hint
        )))
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.history.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    fn append_history(
        &mut self,
        status: StageStatus,
        reason: Option<String>,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) {
        self.history.push(HistoryEntry {
            status,
            reason,
            actor: actor.clone(),
            timestamp: at,
        });
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Department, FacultyChecklist, GroupId, LabChecklist, LibraryChecklist};
    use proptest::prelude::*;

    fn staff() -> ActorId {
        ActorId::new("staff-1")
    }

    fn faculty_stage() -> StageRecord {
        let key = StageKey::group(Department::Faculty, GroupId::new("g1")).unwrap();
        StageRecord::open(key, Checklist::empty(Department::Faculty), staff()).unwrap()
    }

    fn lab_stage(expected: u32) -> StageRecord {
        let key = StageKey::group(Department::Lab, GroupId::new("g1")).unwrap();
        StageRecord::open(key, Checklist::Lab(LabChecklist::expecting(expected)), staff())
            .unwrap()
    }

    #[test]
    fn test_open_is_pending_without_history() {
        let stage = faculty_stage();
        assert!(stage.is_pending());
        assert!(stage.history.is_empty());
        assert_eq!(stage.version, 0);
    }

    #[test]
    fn test_open_rejects_foreign_checklist() {
        let key = StageKey::group(Department::Library, GroupId::new("g1")).unwrap();
        let result = StageRecord::open(key, Checklist::empty(Department::Faculty), staff());
        assert!(matches!(result, Err(ClearanceError::Validation(_))));
    }

    #[test]
    fn test_approve_incomplete_checklist_changes_nothing() {
        let mut stage = faculty_stage();
        let before = stage.clone();
        let err = stage
            .approve(&Checklist::empty(Department::Faculty), &staff())
            .unwrap_err();
        assert!(matches!(err, ClearanceError::Precondition(_)));
        assert!(err.reason().contains("soft_copy_received"));
        assert_eq!(stage, before);
    }

    #[test]
    fn test_approve_complete_checklist() {
        let mut stage = faculty_stage();
        stage
            .approve(&Checklist::Faculty(FacultyChecklist::complete()), &staff())
            .unwrap();
        assert!(stage.is_approved());
        assert!(stage.cleared_at.is_some());
        assert_eq!(stage.history.len(), 1);
        assert_eq!(stage.history[0].status, StageStatus::Approved);
        assert_eq!(stage.history[0].actor, staff());
    }

    #[test]
    fn test_approved_is_terminal() {
        let mut stage = faculty_stage();
        stage
            .approve(&Checklist::Faculty(FacultyChecklist::complete()), &staff())
            .unwrap();

        let again = stage.approve(&Checklist::Faculty(FacultyChecklist::complete()), &staff());
        assert!(matches!(again, Err(ClearanceError::AlreadyProcessed(_))));
        let reject = stage.reject("late", &staff());
        assert!(matches!(reject, Err(ClearanceError::AlreadyProcessed(_))));
        let resubmit = stage.resubmit(&staff());
        assert!(matches!(resubmit, Err(ClearanceError::InvalidState(_))));
        assert_eq!(stage.history.len(), 1);
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut stage = faculty_stage();
        let err = stage.reject("   ", &staff()).unwrap_err();
        assert!(matches!(err, ClearanceError::Validation(_)));
        assert!(stage.history.is_empty());
    }

    #[test]
    fn test_reject_then_resubmit() {
        let key = StageKey::group(Department::Library, GroupId::new("g1")).unwrap();
        let mut stage =
            StageRecord::open(key, Checklist::empty(Department::Library), staff()).unwrap();

        stage.reject("missing book", &staff()).unwrap();
        assert_eq!(stage.status, StageStatus::Rejected);
        assert_eq!(stage.rejection_reason.as_deref(), Some("missing book"));

        stage.resubmit(&ActorId::new("student-1")).unwrap();
        assert_eq!(stage.status, StageStatus::Pending);
        assert_eq!(stage.rejection_reason, None);
        assert_eq!(stage.resubmission_count, 1);

        let statuses: Vec<_> = stage.history.iter().map(|h| h.status).collect();
        assert_eq!(statuses, vec![StageStatus::Rejected, StageStatus::Pending]);
        assert_eq!(stage.history[0].reason.as_deref(), Some("missing book"));
    }

    #[test]
    fn test_resubmit_pending_is_invalid() {
        let mut stage = faculty_stage();
        let err = stage.resubmit(&staff()).unwrap_err();
        assert!(matches!(err, ClearanceError::InvalidState(_)));
    }

    #[test]
    fn test_lab_without_items_cannot_be_rejected() {
        let mut stage = lab_stage(0);
        let err = stage.reject("equipment missing", &staff()).unwrap_err();
        assert!(matches!(err, ClearanceError::Precondition(_)));
        assert!(stage.history.is_empty());

        stage
            .approve(&Checklist::Lab(LabChecklist::default()), &staff())
            .unwrap();
        assert!(stage.is_approved());
    }

    #[test]
    fn test_lab_requires_every_item_back() {
        let mut stage = lab_stage(2);
        let submitted = Checklist::Lab(LabChecklist {
            expected_items: 0,
            returned_items: 1,
        });
        let err = stage.approve(&submitted, &staff()).unwrap_err();
        assert!(err.reason().contains("returned_items (1 of 2)"));

        let submitted = Checklist::Lab(LabChecklist {
            expected_items: 0,
            returned_items: 2,
        });
        stage.approve(&submitted, &staff()).unwrap();
        assert!(stage.is_approved());
    }

    #[test]
    fn test_update_checklist_only_while_pending() {
        let key = StageKey::group(Department::Library, GroupId::new("g1")).unwrap();
        let mut stage =
            StageRecord::open(key, Checklist::empty(Department::Library), staff()).unwrap();
        let ticked = Checklist::Library(LibraryChecklist {
            thesis_book_received: true,
        });
        stage.update_checklist(&ticked).unwrap();
        assert_eq!(stage.checklist, ticked);
        assert!(stage.history.is_empty());

        stage.approve(&ticked, &staff()).unwrap();
        assert!(matches!(
            stage.update_checklist(&ticked),
            Err(ClearanceError::InvalidState(_))
        ));
    }

    #[test]
    fn test_status_edges() {
        use StageStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
    }

    #[test]
    fn test_decided_stage_names_its_status() {
        assert!(!StageStatus::Pending.is_decided());

        let key = StageKey::group(Department::Library, GroupId::new("g1")).unwrap();
        let mut stage =
            StageRecord::open(key, Checklist::empty(Department::Library), staff()).unwrap();
        stage.reject("missing book", &staff()).unwrap();
        assert!(stage.status.is_decided());

        let err = stage.reject("again", &staff()).unwrap_err();
        assert!(matches!(err, ClearanceError::AlreadyProcessed(_)));
        assert!(err.reason().ends_with("was already rejected; resubmit before deciding again"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Approve(bool),
        Reject(bool),
        Resubmit,
    }

    fn op_strategy() -> impl Strategy<Value = Vec<Op>> {
        proptest::collection::vec(
            prop_oneof![
                any::<bool>().prop_map(Op::Approve),
                any::<bool>().prop_map(Op::Reject),
                Just(Op::Resubmit),
            ],
            0..24,
        )
    }

    proptest! {
        #[test]
        fn property_history_follows_allowed_edges(ops in op_strategy()) {
            let mut stage = faculty_stage();
            for op in ops {
                let before_status = stage.status;
                let before_len = stage.history.len();
                let result = match op {
                    Op::Approve(complete) => {
                        let checklist = if complete {
                            Checklist::Faculty(FacultyChecklist::complete())
                        } else {
                            Checklist::empty(Department::Faculty)
                        };
                        stage.approve(&checklist, &staff())
                    }
                    Op::Reject(with_reason) => {
                        stage.reject(if with_reason { "incomplete" } else { "" }, &staff())
                    }
                    Op::Resubmit => stage.resubmit(&staff()),
                };
                match result {
                    Ok(()) => {
                        prop_assert!(before_status.can_transition_to(stage.status));
                        prop_assert_eq!(stage.history.len(), before_len + 1);
                    }
                    Err(_) => {
                        prop_assert_eq!(stage.status, before_status);
                        prop_assert_eq!(stage.history.len(), before_len);
                    }
                }
            }

            for pair in stage.history.windows(2) {
                prop_assert!(pair[0].timestamp <= pair[1].timestamp);
                prop_assert!(pair[0].status.can_transition_to(pair[1].status));
            }
            let resubmits = stage
                .history
                .iter()
                .filter(|h| h.status == StageStatus::Pending)
                .count() as u32;
            prop_assert_eq!(stage.resubmission_count, resubmits);
        }
    }
}
