//! Directory data the engine reads: students, groups, course results

use crate::{ClearanceError, ClearanceResult, GroupId, StudentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a student stands in the clearance process
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileClearanceStatus {
    /// Not started
    #[default]
    Pending,
    InProgress,
    Cleared,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: StudentId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    pub year_of_study: u8,
    pub program_years: u8,
    #[serde(default)]
    pub clearance_status: ProfileClearanceStatus,
    #[serde(default)]
    pub version: u64,
}

impl StudentProfile {
    pub fn new(id: StudentId, name: impl Into<String>, year_of_study: u8, program_years: u8) -> Self {
        Self {
            id,
            name: name.into(),
            group_id: None,
            year_of_study,
            program_years,
            clearance_status: ProfileClearanceStatus::Pending,
            version: 0,
        }
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// In the graduation year of the programme
    pub fn is_final_year(&self) -> bool {
        self.program_years > 0 && self.year_of_study >= self.program_years
    }

    pub fn validate(&self) -> ClearanceResult<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(ClearanceError::Validation("student id must not be empty".into()));
        }
        if self.program_years == 0 {
            return Err(ClearanceError::Validation(format!(
                "student {} has a programme of zero years",
                self.id
            )));
        }
        Ok(())
    }
}

/// A thesis group
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: BTreeSet<StudentId>,
    /// Lab equipment on loan to the group; seeds the Lab checklist
    #[serde(default)]
    pub lab_items_expected: u32,
    #[serde(default)]
    pub version: u64,
}

impl Group {
    pub fn new(id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            members: BTreeSet::new(),
            lab_items_expected: 0,
            version: 0,
        }
    }

    pub fn with_member(mut self, student_id: StudentId) -> Self {
        self.members.insert(student_id);
        self
    }

    pub fn with_lab_items(mut self, expected: u32) -> Self {
        self.lab_items_expected = expected;
        self
    }

    pub fn validate(&self) -> ClearanceResult<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(ClearanceError::Validation("group id must not be empty".into()));
        }
        if self.members.is_empty() {
            return Err(ClearanceError::Validation(format!(
                "group {} has no members",
                self.id
            )));
        }
        Ok(())
    }
}

/// One course outcome for a student
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub student_id: StudentId,
    pub course_code: String,
    pub passed: bool,
}

impl CourseRecord {
    pub fn new(student_id: StudentId, course_code: impl Into<String>, passed: bool) -> Self {
        Self {
            student_id,
            course_code: course_code.into(),
            passed,
        }
    }
}

/// True when no course record is a failure
pub fn has_passed_all_courses<'a>(records: impl IntoIterator<Item = &'a CourseRecord>) -> bool {
    records.into_iter().all(|r| r.passed)
}
