//! Identifiers for students, groups, actors, ledger entries and stages

use crate::{ClearanceError, ClearanceResult, Department, Granularity};
use serde::{Deserialize, Serialize};

/// Unique identifier for a student
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a thesis group
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The staff member or student who caused a transition
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Reject blank actor references before they reach the audit trail
    pub fn validate(&self) -> ClearanceResult<()> {
        if self.0.trim().is_empty() {
            return Err(ClearanceError::Validation("actor id must not be empty".into()));
        }
        Ok(())
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ledger entry
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntryId(pub String);

impl LedgerEntryId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Stage addressing ─────────────────────────────────────────────────

/// Who a stage decides for: a whole group or a single student
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Group(GroupId),
    Student(StudentId),
}

impl Subject {
    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Group(_) => Granularity::Group,
            Self::Student(_) => Granularity::Student,
        }
    }

    pub fn as_group(&self) -> Option<&GroupId> {
        match self {
            Self::Group(id) => Some(id),
            Self::Student(_) => None,
        }
    }

    pub fn as_student(&self) -> Option<&StudentId> {
        match self {
            Self::Student(id) => Some(id),
            Self::Group(_) => None,
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group(id) => write!(f, "group {}", id),
            Self::Student(id) => write!(f, "student {}", id),
        }
    }
}

/// Storage key of a stage record: one per (department, subject)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageKey {
    pub department: Department,
    pub subject: Subject,
}

impl StageKey {
    /// Build a key, rejecting subjects of the wrong granularity
    /// (a Faculty decision about a single student, for instance).
    pub fn new(department: Department, subject: Subject) -> ClearanceResult<Self> {
        if department.granularity() != subject.granularity() {
            return Err(ClearanceError::Validation(format!(
                "{} decides per {}, not per {}",
                department,
                department.granularity(),
                subject.granularity()
            )));
        }
        Ok(Self {
            department,
            subject,
        })
    }

    pub fn group(department: Department, group_id: GroupId) -> ClearanceResult<Self> {
        Self::new(department, Subject::Group(group_id))
    }

    pub fn student(department: Department, student_id: StudentId) -> ClearanceResult<Self> {
        Self::new(department, Subject::Student(student_id))
    }
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stage of {}", self.department, self.subject)
    }
}
