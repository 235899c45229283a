//! Group and student read models
//!
//! Both aggregates mirror StageRecord decisions and are only written by
//! the propagation step. Their derived fields (`phase_one_cleared`,
//! `final_status`) are recomputed on every slot write, never set directly.

use crate::{Department, GroupId, StageStatus, StudentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Status of one department slot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    pub status: StageStatus,
    /// When the slot last changed; `None` while untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl SlotState {
    pub fn at(status: StageStatus, date: DateTime<Utc>) -> Self {
        Self {
            status,
            date: Some(date),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == StageStatus::Approved
    }
}

/// Collapse per-student statuses into one group-level status.
///
/// Approved once everyone is approved, Rejected if anyone is rejected,
/// Pending otherwise. An empty input is Pending.
pub fn roll_up<'a>(statuses: impl IntoIterator<Item = &'a StageStatus>) -> StageStatus {
    let mut any = false;
    let mut all_approved = true;
    for status in statuses {
        any = true;
        match status {
            StageStatus::Rejected => return StageStatus::Rejected,
            StageStatus::Pending => all_approved = false,
            StageStatus::Approved => {}
        }
    }
    if any && all_approved {
        StageStatus::Approved
    } else {
        StageStatus::Pending
    }
}

// ── Group Aggregate ──────────────────────────────────────────────────

/// Per-department progress of a thesis group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregate {
    pub group_id: GroupId,
    pub members: BTreeSet<StudentId>,
    pub clearance_progress: BTreeMap<Department, SlotState>,
    /// True iff Faculty, Library and Lab are all Approved
    pub phase_one_cleared: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl GroupAggregate {
    pub fn new(group_id: GroupId, members: impl IntoIterator<Item = StudentId>) -> Self {
        Self {
            group_id,
            members: members.into_iter().collect(),
            clearance_progress: BTreeMap::new(),
            phase_one_cleared: false,
            updated_at: Utc::now(),
            version: 0,
        }
    }

    /// Write one department's slot and recompute the phase-one flag
    pub fn set_slot(&mut self, department: Department, status: StageStatus, at: DateTime<Utc>) {
        self.clearance_progress
            .insert(department, SlotState::at(status, at));
        self.phase_one_cleared = self.compute_phase_one();
        self.updated_at = at;
    }

    pub fn slot(&self, department: Department) -> Option<&SlotState> {
        self.clearance_progress.get(&department)
    }

    pub fn status_of(&self, department: Department) -> StageStatus {
        self.slot(department)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    pub fn compute_phase_one(&self) -> bool {
        Department::PHASE_ONE
            .iter()
            .all(|d| self.status_of(*d) == StageStatus::Approved)
    }
}

// ── Student Clearance Aggregate ──────────────────────────────────────

/// Overall outcome for one student
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    #[default]
    Incomplete,
    Cleared,
}

/// Per-student view over all five departments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudentClearanceAggregate {
    pub student_id: StudentId,
    pub group_id: GroupId,
    pub faculty: SlotState,
    pub library: SlotState,
    pub lab: SlotState,
    pub finance: SlotState,
    pub examination: SlotState,
    /// Cleared iff all five slots are Approved
    pub final_status: FinalStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl StudentClearanceAggregate {
    pub fn new(student_id: StudentId, group_id: GroupId) -> Self {
        Self {
            student_id,
            group_id,
            faculty: SlotState::default(),
            library: SlotState::default(),
            lab: SlotState::default(),
            finance: SlotState::default(),
            examination: SlotState::default(),
            final_status: FinalStatus::Incomplete,
            updated_at: Utc::now(),
            version: 0,
        }
    }

    pub fn slot(&self, department: Department) -> &SlotState {
        match department {
            Department::Faculty => &self.faculty,
            Department::Library => &self.library,
            Department::Lab => &self.lab,
            Department::Finance => &self.finance,
            Department::Examination => &self.examination,
        }
    }

    fn slot_mut(&mut self, department: Department) -> &mut SlotState {
        match department {
            Department::Faculty => &mut self.faculty,
            Department::Library => &mut self.library,
            Department::Lab => &mut self.lab,
            Department::Finance => &mut self.finance,
            Department::Examination => &mut self.examination,
        }
    }

    /// Write one slot and recompute `final_status`
    pub fn set_slot(&mut self, department: Department, status: StageStatus, at: DateTime<Utc>) {
        *self.slot_mut(department) = SlotState::at(status, at);
        self.final_status = self.compute_final_status();
        self.updated_at = at;
    }

    pub fn phase_one_cleared(&self) -> bool {
        Department::PHASE_ONE
            .iter()
            .all(|d| self.slot(*d).is_approved())
    }

    pub fn compute_final_status(&self) -> FinalStatus {
        if Department::ALL.iter().all(|d| self.slot(*d).is_approved()) {
            FinalStatus::Cleared
        } else {
            FinalStatus::Incomplete
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.final_status == FinalStatus::Cleared
    }
}
