//! Seeded, scripted runs of the clearance workflow
//!
//! A seed registers students, groups and course results. A script is an
//! ordered list of operations; each one is applied to the service and its
//! outcome recorded, refusals included, so a run reads as a transcript.

use clearance_engine::{ClearanceService, EntryRequest};
use clearance_store::AggregateStore;
use clearance_types::{
    ActorId, Checklist, ClearanceError, CourseRecord, Department, EntryKind, ErrorKind, Group,
    LedgerEntryId, StageKey, StudentClearanceAggregate, StudentId, StudentProfile, Subject,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Directory data loaded before a script runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub students: Vec<StudentProfile>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub courses: Vec<CourseRecord>,
}

/// One scripted operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Start {
        subject: Subject,
        #[serde(default = "default_start_department")]
        department: Department,
        actor: ActorId,
    },
    Approve {
        department: Department,
        subject: Subject,
        /// Defaults to the checklist recorded on the stage
        #[serde(default)]
        checklist: Option<Checklist>,
        actor: ActorId,
    },
    Reject {
        department: Department,
        subject: Subject,
        reason: String,
        actor: ActorId,
    },
    Resubmit {
        department: Department,
        subject: Subject,
        actor: ActorId,
    },
    UpdateChecklist {
        department: Department,
        subject: Subject,
        checklist: Checklist,
        actor: ActorId,
    },
    /// Record a ledger entry; `label` names it for later steps
    RecordEntry {
        label: String,
        student: StudentId,
        #[serde(default)]
        semester: String,
        kind: EntryKind,
        amount_minor: i64,
        description: String,
    },
    ApproveEntry {
        entry: String,
        actor: ActorId,
    },
    RejectEntry {
        entry: String,
        actor: ActorId,
        reason: String,
    },
    RecordCourse {
        student: StudentId,
        course_code: String,
        passed: bool,
    },
    Evaluate {
        student: StudentId,
    },
    Revalidate {
        student: StudentId,
    },
    Statement {
        student: StudentId,
    },
    History {
        department: Department,
        subject: Subject,
    },
}

fn default_start_department() -> Department {
    Department::Faculty
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Resubmit { .. } => "resubmit",
            Self::UpdateChecklist { .. } => "update_checklist",
            Self::RecordEntry { .. } => "record_entry",
            Self::ApproveEntry { .. } => "approve_entry",
            Self::RejectEntry { .. } => "reject_entry",
            Self::RecordCourse { .. } => "record_course",
            Self::Evaluate { .. } => "evaluate",
            Self::Revalidate { .. } => "revalidate",
            Self::Statement { .. } => "statement",
            Self::History { .. } => "history",
        }
    }
}

/// A refused step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl From<ClearanceError> for StepError {
    fn from(err: ClearanceError) -> Self {
        Self {
            kind: err.kind(),
            reason: err.reason().to_string(),
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub steps: Vec<StepOutcome>,
    pub students: Vec<StudentClearanceAggregate>,
}

/// Applies a seed and a script to one service
pub struct ScriptRunner<'a> {
    service: &'a ClearanceService,
    entries: HashMap<String, LedgerEntryId>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(service: &'a ClearanceService) -> Self {
        Self {
            service,
            entries: HashMap::new(),
        }
    }

    /// Register the seed's directory data. Any failure aborts the run.
    pub async fn apply_seed(&self, seed: Seed) -> Result<(), ClearanceError> {
        for student in seed.students {
            self.service.register_student(student).await?;
        }
        for group in seed.groups {
            self.service.register_group(group).await?;
        }
        for course in seed.courses {
            self.service.record_course_result(course).await?;
        }
        Ok(())
    }

    /// Run every step in order; a refused step does not stop the script
    pub async fn run(&mut self, steps: Vec<Step>) -> Result<RunReport, ClearanceError> {
        let mut outcomes = Vec::with_capacity(steps.len());
        for (index, step) in steps.into_iter().enumerate() {
            let op = step.name().to_string();
            let outcome = match self.apply(step).await {
                Ok(result) => StepOutcome {
                    index,
                    op,
                    result: Some(result),
                    error: None,
                },
                Err(err) => {
                    tracing::info!(index, op = %op, error = %err, "Step refused");
                    StepOutcome {
                        index,
                        op,
                        result: None,
                        error: Some(err.into()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let students = self.service.storage().list_student_aggregates().await?;
        Ok(RunReport {
            steps: outcomes,
            students,
        })
    }

    async fn apply(&mut self, step: Step) -> Result<Value, ClearanceError> {
        let service = self.service;
        match step {
            Step::Start {
                subject,
                department,
                actor,
            } => to_value(service.start_clearance(subject, department, &actor).await?),
            Step::Approve {
                department,
                subject,
                checklist,
                actor,
            } => {
                let key = StageKey::new(department, subject)?;
                let checklist = match checklist {
                    Some(checklist) => checklist,
                    None => service
                        .stage(&key)
                        .await?
                        .map(|record| record.checklist)
                        .unwrap_or_else(|| Checklist::empty(department)),
                };
                to_value(service.approve_stage(&key, checklist, &actor).await?)
            }
            Step::Reject {
                department,
                subject,
                reason,
                actor,
            } => {
                let key = StageKey::new(department, subject)?;
                to_value(service.reject_stage(&key, &reason, &actor).await?)
            }
            Step::Resubmit {
                department,
                subject,
                actor,
            } => {
                let key = StageKey::new(department, subject)?;
                to_value(service.resubmit_stage(&key, &actor).await?)
            }
            Step::UpdateChecklist {
                department,
                subject,
                checklist,
                actor,
            } => {
                let key = StageKey::new(department, subject)?;
                to_value(service.update_checklist(&key, checklist, &actor).await?)
            }
            Step::RecordEntry {
                label,
                student,
                semester,
                kind,
                amount_minor,
                description,
            } => {
                let entry = service
                    .record_ledger_entry(EntryRequest {
                        student_id: student,
                        semester,
                        kind,
                        amount_minor,
                        description,
                    })
                    .await?;
                self.entries.insert(label, entry.id.clone());
                to_value(entry)
            }
            Step::ApproveEntry { entry, actor } => {
                let id = self.entry_id(&entry)?;
                to_value(service.approve_ledger_entry(&id, &actor).await?)
            }
            Step::RejectEntry {
                entry,
                actor,
                reason,
            } => {
                let id = self.entry_id(&entry)?;
                to_value(service.reject_ledger_entry(&id, &actor, &reason).await?)
            }
            Step::RecordCourse {
                student,
                course_code,
                passed,
            } => {
                let record = CourseRecord::new(student, course_code, passed);
                service.record_course_result(record.clone()).await?;
                to_value(record)
            }
            Step::Evaluate { student } => to_value(service.evaluate_eligibility(&student).await?),
            Step::Revalidate { student } => {
                to_value(service.revalidate_eligibility(&student).await?)
            }
            Step::Statement { student } => to_value(service.statement(&student).await?),
            Step::History {
                department,
                subject,
            } => {
                let key = StageKey::new(department, subject)?;
                to_value(service.history(&key).await?)
            }
        }
    }

    fn entry_id(&self, label: &str) -> Result<LedgerEntryId, ClearanceError> {
        self.entries.get(label).cloned().ok_or_else(|| {
            ClearanceError::Validation(format!("no ledger entry labelled '{}' in this script", label))
        })
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ClearanceError> {
    serde_json::to_value(value)
        .map_err(|e| ClearanceError::Validation(format!("cannot render outcome: {}", e)))
}
