//! Clearance events
//!
//! Announced after a transition has been committed. Delivery is best
//! effort; nothing in the workflow depends on an event being received.

use crate::{
    ActorId, Department, EntryKind, GroupId, LedgerEntryId, StageKey, StudentId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every clearance event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearanceEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Actor who triggered the event, if any
    pub actor: Option<ActorId>,

    /// The actual event
    pub event: ClearanceEvent,
}

impl ClearanceEventEnvelope {
    pub fn new(event: ClearanceEvent, actor: Option<ActorId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            actor,
            event,
        }
    }
}

/// Clearance events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClearanceEvent {
    // ── Stage events ─────────────────────────────────────────────────
    /// Faculty record created for a group
    ClearanceStarted {
        group_id: GroupId,
        members: Vec<StudentId>,
    },

    /// A downstream stage was opened by an upstream approval
    StageOpened { key: StageKey },

    StageApproved { key: StageKey },

    StageRejected { key: StageKey, reason: String },

    StageResubmitted {
        key: StageKey,
        resubmission_count: u32,
    },

    /// All five departments approved the student
    StudentCleared {
        student_id: StudentId,
        group_id: GroupId,
    },

    // ── Ledger events ────────────────────────────────────────────────
    LedgerEntryRecorded {
        entry_id: LedgerEntryId,
        student_id: StudentId,
        kind: EntryKind,
        amount_minor: i64,
    },

    LedgerEntryApproved {
        entry_id: LedgerEntryId,
        student_id: StudentId,
        balance_after_minor: i64,
    },

    LedgerEntryRejected {
        entry_id: LedgerEntryId,
        student_id: StudentId,
        reason: String,
    },

    // ── Eligibility events ───────────────────────────────────────────
    EligibilityRevalidated {
        student_id: StudentId,
        eligible: bool,
        has_passed_all_courses: bool,
    },
}

impl ClearanceEvent {
    /// Short machine name, used as a log field
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClearanceStarted { .. } => "clearance_started",
            Self::StageOpened { .. } => "stage_opened",
            Self::StageApproved { .. } => "stage_approved",
            Self::StageRejected { .. } => "stage_rejected",
            Self::StageResubmitted { .. } => "stage_resubmitted",
            Self::StudentCleared { .. } => "student_cleared",
            Self::LedgerEntryRecorded { .. } => "ledger_entry_recorded",
            Self::LedgerEntryApproved { .. } => "ledger_entry_approved",
            Self::LedgerEntryRejected { .. } => "ledger_entry_rejected",
            Self::EligibilityRevalidated { .. } => "eligibility_revalidated",
        }
    }

    /// Department the event concerns, for stage events
    pub fn department(&self) -> Option<Department> {
        match self {
            Self::StageOpened { key }
            | Self::StageApproved { key }
            | Self::StageRejected { key, .. }
            | Self::StageResubmitted { key, .. } => Some(key.department),
            Self::ClearanceStarted { .. } => Some(Department::Faculty),
            _ => None,
        }
    }
}
