//! Examination eligibility
//!
//! Three gates decide whether a student may get an Examination record:
//!
//! 1. **Phase one**: Faculty, Library and Lab approved for the student.
//! 2. **Finance stage**: the student's Finance record approved.
//! 3. **Graduation fee**: remainder within the configured tolerance.
//!
//! Course results do not gate creation; they set the record's
//! `has_passed_all_courses` flag, and `can_graduate` needs every gate
//! plus a clean course record.

use clearance_ledger::{graduation_fee_remaining, FeePolicy};
use clearance_types::{
    format_minor, has_passed_all_courses, ClearanceResult, CourseRecord, Department,
    ExaminationChecklist, LedgerEntry, StageStatus, StudentClearanceAggregate, StudentId,
};
use serde::{Deserialize, Serialize};

/// Outcome of an eligibility evaluation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub student_id: StudentId,
    pub phase_one_cleared: bool,
    #[serde(default)]
    pub finance_approved: bool,
    pub fee_remaining_minor: i64,
    pub fee_settled: bool,
    pub has_passed_all_courses: bool,
    /// Every gate passes
    pub eligible: bool,
    /// Why the student is or is not eligible
    pub reason: String,
    /// Whether this evaluation opened the Examination record
    #[serde(default)]
    pub examination_created: bool,
}

impl EligibilityReport {
    /// Examination flags implied by this report
    pub fn examination_checklist(&self) -> ExaminationChecklist {
        ExaminationChecklist {
            has_passed_all_courses: self.has_passed_all_courses,
            can_graduate: self.eligible && self.has_passed_all_courses,
        }
    }
}

/// Evaluates the Examination gates
#[derive(Debug, Clone)]
pub struct EligibilityEvaluator {
    policy: FeePolicy,
}

impl EligibilityEvaluator {
    pub fn new(policy: FeePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    /// Run every gate over already-loaded state
    pub fn assess(
        &self,
        aggregate: &StudentClearanceAggregate,
        entries: &[LedgerEntry],
        courses: &[CourseRecord],
    ) -> ClearanceResult<EligibilityReport> {
        let phase_one_cleared = aggregate.phase_one_cleared();
        let finance_status = aggregate.slot(Department::Finance).status;
        let finance_approved = finance_status == StageStatus::Approved;
        let fee_remaining_minor = graduation_fee_remaining(entries, &self.policy)?;
        let fee_settled = self.policy.is_settled(fee_remaining_minor);
        let passed = has_passed_all_courses(courses);
        let eligible = phase_one_cleared && finance_approved && fee_settled;

        let mut unmet = Vec::new();
        if !phase_one_cleared {
            let pending: Vec<String> = Department::PHASE_ONE
                .iter()
                .filter(|d| aggregate.slot(**d).status != StageStatus::Approved)
                .map(|d| format!("{} {}", d, aggregate.slot(*d).status))
                .collect();
            unmet.push(format!("phase one incomplete ({})", pending.join(", ")));
        }
        if !finance_approved {
            unmet.push(format!("finance stage {}", finance_status));
        }
        if !fee_settled {
            unmet.push(format!(
                "graduation fee outstanding ({} remaining, tolerance {})",
                format_minor(fee_remaining_minor),
                format_minor(self.policy.tolerance_minor())
            ));
        }
        let reason = if unmet.is_empty() {
            "phase one cleared, finance approved and graduation fee settled".to_string()
        } else {
            unmet.join("; ")
        };

        tracing::debug!(
            student = %aggregate.student_id,
            phase_one_cleared,
            finance_approved,
            fee_remaining_minor,
            eligible,
            "Eligibility assessed"
        );

        Ok(EligibilityReport {
            student_id: aggregate.student_id.clone(),
            phase_one_cleared,
            finance_approved,
            fee_remaining_minor,
            fee_settled,
            has_passed_all_courses: passed,
            eligible,
            reason,
            examination_created: false,
        })
    }
}
