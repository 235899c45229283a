//! Propagation of stage decisions
//!
//! A decision on one StageRecord fans out to the group's progress, to
//! every affected member's clearance record, and (on approval) opens the
//! next stage in the chain:
//!
//! ```text
//! Faculty ─▶ Library ─▶ Lab ─▶ Finance (one per member) ─▶ Examination
//!   group      group     group       student          (eligibility-gated)
//! ```
//!
//! Planning is pure: it takes the state read by the service and returns
//! one [`UnitOfWork`] holding every write, so the whole fan-out commits
//! or nothing does.

use clearance_store::UnitOfWork;
use clearance_types::{
    roll_up, ActorId, Checklist, ClearanceError, ClearanceEvent, ClearanceResult, Department,
    Granularity, Group, GroupAggregate, LabChecklist, ProfileClearanceStatus, StageKey,
    StageRecord, StageStatus, StudentClearanceAggregate, StudentId, StudentProfile, Subject,
};
use std::collections::{BTreeMap, BTreeSet};

/// State read before planning a decision's fan-out
#[derive(Debug, Clone)]
pub struct PropagationContext {
    pub group: Group,
    pub group_aggregate: GroupAggregate,
    /// Clearance records of every group member
    pub members: BTreeMap<StudentId, StudentClearanceAggregate>,
    pub profiles: BTreeMap<StudentId, StudentProfile>,
    /// Downstream stages that already exist
    pub existing: BTreeSet<StageKey>,
}

/// Every write and event produced by one decision
#[derive(Debug, Clone, Default)]
pub struct PropagationPlan {
    pub unit: UnitOfWork,
    pub events: Vec<ClearanceEvent>,
    pub opened: Vec<StageKey>,
    pub cleared: Vec<StudentId>,
}

impl PropagationPlan {
    pub fn student_aggregate(&self, student_id: &StudentId) -> Option<&StudentClearanceAggregate> {
        self.unit
            .student_aggregates
            .iter()
            .find(|a| &a.student_id == student_id)
    }

    /// Add a stage opened outside the group chain
    pub fn open_stage(&mut self, record: StageRecord) {
        self.events.push(ClearanceEvent::StageOpened {
            key: record.key.clone(),
        });
        self.opened.push(record.key.clone());
        self.unit.put_stage(record);
    }
}

/// Plans the fan-out of stage decisions
#[derive(Debug, Default, Clone, Copy)]
pub struct PropagationEngine;

impl PropagationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Stages an approval of `key` would open
    pub fn downstream_keys(
        &self,
        key: &StageKey,
        members: &BTreeSet<StudentId>,
    ) -> ClearanceResult<Vec<StageKey>> {
        let Some(next) = key.department.next() else {
            return Ok(Vec::new());
        };
        match (&key.subject, next.granularity()) {
            (Subject::Group(group_id), Granularity::Group) => {
                Ok(vec![StageKey::group(next, group_id.clone())?])
            }
            (Subject::Group(_), Granularity::Student) => members
                .iter()
                .map(|s| StageKey::student(next, s.clone()))
                .collect(),
            // Examination is opened by the eligibility check, not by the chain
            (Subject::Student(_), _) => Ok(Vec::new()),
        }
    }

    /// Plan the writes for a StageRecord that has just transitioned.
    ///
    /// `record` is the post-transition state; its last history entry
    /// decides which event is announced.
    pub fn plan(
        &self,
        record: &StageRecord,
        ctx: PropagationContext,
        actor: &ActorId,
    ) -> ClearanceResult<PropagationPlan> {
        let PropagationContext {
            group,
            mut group_aggregate,
            mut members,
            profiles,
            existing,
        } = ctx;
        let key = &record.key;
        let department = key.department;
        let status = record.status;
        let at = record.updated_at;

        let mut plan = PropagationPlan::default();
        plan.unit.put_stage(record.clone());
        plan.events.push(transition_event(record)?);

        let affected: Vec<StudentId> = match &key.subject {
            Subject::Group(group_id) => {
                if group_id != &group_aggregate.group_id {
                    return Err(ClearanceError::Consistency(format!(
                        "{} planned against progress of group {}",
                        key, group_aggregate.group_id
                    )));
                }
                group_aggregate.members.iter().cloned().collect()
            }
            Subject::Student(student_id) => vec![student_id.clone()],
        };

        // ── Member fan-out ───────────────────────────────────────────
        for student_id in &affected {
            let aggregate = members.get_mut(student_id).ok_or_else(|| {
                ClearanceError::Consistency(format!(
                    "student {} has no clearance record in group {}",
                    student_id, group_aggregate.group_id
                ))
            })?;
            let was_cleared = aggregate.is_cleared();
            aggregate.set_slot(department, status, at);
            if !was_cleared && aggregate.is_cleared() {
                plan.cleared.push(student_id.clone());
            }
            plan.unit.put_student_aggregate(aggregate.clone());
        }

        // ── Group progress ───────────────────────────────────────────
        let group_status = match department.granularity() {
            Granularity::Group => status,
            Granularity::Student => {
                let statuses: Vec<StageStatus> = group_aggregate
                    .members
                    .iter()
                    .filter_map(|s| members.get(s))
                    .map(|a| a.slot(department).status)
                    .collect();
                roll_up(&statuses)
            }
        };
        group_aggregate.set_slot(department, group_status, at);
        plan.unit.put_group_aggregate(group_aggregate.clone());

        // ── Next stage ───────────────────────────────────────────────
        if status == StageStatus::Approved {
            for next_key in self.downstream_keys(key, &group_aggregate.members)? {
                if existing.contains(&next_key) {
                    continue;
                }
                let checklist = match next_key.department {
                    Department::Lab => Checklist::Lab(LabChecklist::expecting(group.lab_items_expected)),
                    other => Checklist::empty(other),
                };
                let opened = StageRecord::open(next_key, checklist, actor.clone())?
                    .with_prerequisite_cleared();
                plan.open_stage(opened);
            }
        }

        // ── Final clearance ──────────────────────────────────────────
        for student_id in plan.cleared.clone() {
            let mut profile = profiles.get(&student_id).cloned().ok_or_else(|| {
                ClearanceError::Consistency(format!("student {} has no profile", student_id))
            })?;
            profile.clearance_status = ProfileClearanceStatus::Cleared;
            plan.unit.put_profile(profile);
            plan.events.push(ClearanceEvent::StudentCleared {
                student_id,
                group_id: group_aggregate.group_id.clone(),
            });
        }

        Ok(plan)
    }
}

fn transition_event(record: &StageRecord) -> ClearanceResult<ClearanceEvent> {
    let last = record.last_transition().ok_or_else(|| {
        ClearanceError::Consistency(format!("{} has no transition to propagate", record.key))
    })?;
    let key = record.key.clone();
    Ok(match last.status {
        StageStatus::Approved => ClearanceEvent::StageApproved { key },
        StageStatus::Rejected => ClearanceEvent::StageRejected {
            key,
            reason: last.reason.clone().unwrap_or_default(),
        },
        StageStatus::Pending => ClearanceEvent::StageResubmitted {
            key,
            resubmission_count: record.resubmission_count,
        },
    })
}
