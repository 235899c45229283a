//! Department checklists
//!
//! Each department requires its own set of confirmations before it can
//! approve. The checklist is a tagged variant so a Library approval can
//! never be submitted with Faculty fields.

use crate::{ClearanceError, ClearanceResult, Department};
use serde::{Deserialize, Serialize};

/// Faculty confirmations for the thesis hand-in
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultyChecklist {
    pub thesis_submitted: bool,
    pub form_signed: bool,
    pub soft_copy_received: bool,
    pub supervisor_corrected: bool,
}

impl FacultyChecklist {
    /// All four confirmations given
    pub fn complete() -> Self {
        Self {
            thesis_submitted: true,
            form_signed: true,
            soft_copy_received: true,
            supervisor_corrected: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryChecklist {
    pub thesis_book_received: bool,
}

/// Lab equipment returns.
///
/// `expected_items` is fixed when the stage opens; only `returned_items`
/// moves afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabChecklist {
    pub expected_items: u32,
    pub returned_items: u32,
}

impl LabChecklist {
    pub fn expecting(expected_items: u32) -> Self {
        Self {
            expected_items,
            returned_items: 0,
        }
    }

    /// Nothing was borrowed, so there is nothing to withhold clearance over
    pub fn has_nothing_expected(&self) -> bool {
        self.expected_items == 0
    }

    pub fn all_returned(&self) -> bool {
        self.returned_items >= self.expected_items
    }
}

/// Finance confirmation. Derived from the ledger at approval time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceChecklist {
    pub graduation_fee_settled: bool,
}

/// Examination flags. Derived from course results and the eligibility gates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExaminationChecklist {
    pub has_passed_all_courses: bool,
    pub can_graduate: bool,
}

/// A department-specific checklist
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "department", rename_all = "snake_case")]
pub enum Checklist {
    Faculty(FacultyChecklist),
    Library(LibraryChecklist),
    Lab(LabChecklist),
    Finance(FinanceChecklist),
    Examination(ExaminationChecklist),
}

impl Checklist {
    /// A checklist with nothing confirmed yet
    pub fn empty(department: Department) -> Self {
        match department {
            Department::Faculty => Self::Faculty(FacultyChecklist::default()),
            Department::Library => Self::Library(LibraryChecklist::default()),
            Department::Lab => Self::Lab(LabChecklist::default()),
            Department::Finance => Self::Finance(FinanceChecklist::default()),
            Department::Examination => Self::Examination(ExaminationChecklist::default()),
        }
    }

    pub fn department(&self) -> Department {
        match self {
            Self::Faculty(_) => Department::Faculty,
            Self::Library(_) => Department::Library,
            Self::Lab(_) => Department::Lab,
            Self::Finance(_) => Department::Finance,
            Self::Examination(_) => Department::Examination,
        }
    }

    /// Names of the requirements that are not yet met
    pub fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        match self {
            Self::Faculty(c) => {
                for (ok, name) in [
                    (c.thesis_submitted, "thesis_submitted"),
                    (c.form_signed, "form_signed"),
                    (c.soft_copy_received, "soft_copy_received"),
                    (c.supervisor_corrected, "supervisor_corrected"),
                ] {
                    if !ok {
                        missing.push(name.to_string());
                    }
                }
            }
            Self::Library(c) => {
                if !c.thesis_book_received {
                    missing.push("thesis_book_received".to_string());
                }
            }
            Self::Lab(c) => {
                if !c.all_returned() {
                    missing.push(format!(
                        "returned_items ({} of {})",
                        c.returned_items, c.expected_items
                    ));
                }
            }
            Self::Finance(c) => {
                if !c.graduation_fee_settled {
                    missing.push("graduation_fee_settled".to_string());
                }
            }
            Self::Examination(c) => {
                if !c.has_passed_all_courses {
                    missing.push("has_passed_all_courses".to_string());
                }
                if !c.can_graduate {
                    missing.push("can_graduate".to_string());
                }
            }
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Apply a submitted checklist on top of the stored one.
    ///
    /// Fails if the departments differ. The stored Lab `expected_items`
    /// always wins over the submitted value.
    pub fn merged_onto(&self, stored: &Checklist) -> ClearanceResult<Checklist> {
        if self.department() != stored.department() {
            return Err(ClearanceError::Validation(format!(
                "{} checklist submitted for the {} stage",
                self.department(),
                stored.department()
            )));
        }
        Ok(match (self, stored) {
            (Self::Lab(submitted), Self::Lab(current)) => Self::Lab(LabChecklist {
                expected_items: current.expected_items,
                returned_items: submitted.returned_items,
            }),
            _ => self.clone(),
        })
    }
}
