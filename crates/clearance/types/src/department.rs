//! Departments and their ordering in the clearance chain

use crate::ClearanceError;
use serde::{Deserialize, Serialize};

/// One clearance gate.
///
/// The declaration order is the approval order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Faculty,
    Library,
    Lab,
    Finance,
    Examination,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Faculty,
        Department::Library,
        Department::Lab,
        Department::Finance,
        Department::Examination,
    ];

    /// Stages that make up phase one
    pub const PHASE_ONE: [Department; 3] =
        [Department::Faculty, Department::Library, Department::Lab];

    /// Whether this department decides for a group or per student
    pub fn granularity(&self) -> Granularity {
        match self {
            Self::Faculty | Self::Library | Self::Lab => Granularity::Group,
            Self::Finance | Self::Examination => Granularity::Student,
        }
    }

    pub fn is_phase_one(&self) -> bool {
        Self::PHASE_ONE.contains(self)
    }

    /// The stage opened by this stage's approval
    pub fn next(&self) -> Option<Department> {
        match self {
            Self::Faculty => Some(Self::Library),
            Self::Library => Some(Self::Lab),
            Self::Lab => Some(Self::Finance),
            Self::Finance => Some(Self::Examination),
            Self::Examination => None,
        }
    }

    /// The stage whose approval opens this one
    pub fn previous(&self) -> Option<Department> {
        match self {
            Self::Faculty => None,
            Self::Library => Some(Self::Faculty),
            Self::Lab => Some(Self::Library),
            Self::Finance => Some(Self::Lab),
            Self::Examination => Some(Self::Finance),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Faculty => "faculty",
            Self::Library => "library",
            Self::Lab => "lab",
            Self::Finance => "finance",
            Self::Examination => "examination",
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Department {
    type Err = ClearanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faculty" => Ok(Self::Faculty),
            "library" => Ok(Self::Library),
            "lab" => Ok(Self::Lab),
            "finance" => Ok(Self::Finance),
            "examination" | "exam" => Ok(Self::Examination),
            other => Err(ClearanceError::Validation(format!(
                "unknown department '{}'",
                other
            ))),
        }
    }
}

/// Decision granularity of a department
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Group,
    Student,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group => f.write_str("group"),
            Self::Student => f.write_str("student"),
        }
    }
}
