//! Ledger entries
//!
//! Amounts are integer minor units (cents) so balances never accumulate
//! rounding error. An entry never changes after creation except for its
//! decision fields and the stamped `balance_after_minor`.

use crate::{ActorId, ClearanceError, ClearanceResult, LedgerEntryId, StudentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Charge raises what the student owes; Payment lowers it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Charge,
    Payment,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Charge => f.write_str("charge"),
            Self::Payment => f.write_str("payment"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// One append-only financial entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub student_id: StudentId,
    pub semester: String,
    pub kind: EntryKind,
    /// Always non-negative; the sign comes from `kind`
    pub amount_minor: i64,
    pub description: String,
    pub status: EntryStatus,
    /// Approved balance up to and including this entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after_minor: Option<i64>,
    /// Creation order within the ledger, assigned by the store on first commit
    #[serde(default)]
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub version: u64,
}

impl LedgerEntry {
    /// Draft a Pending entry
    pub fn new(
        student_id: StudentId,
        semester: impl Into<String>,
        kind: EntryKind,
        amount_minor: i64,
        description: impl Into<String>,
    ) -> ClearanceResult<Self> {
        if amount_minor < 0 {
            return Err(ClearanceError::Validation(format!(
                "ledger amount must not be negative (got {})",
                format_minor(amount_minor)
            )));
        }
        let description = description.into();
        if description.trim().is_empty() {
            return Err(ClearanceError::Validation(
                "ledger entry needs a description".into(),
            ));
        }
        if student_id.as_str().trim().is_empty() {
            return Err(ClearanceError::Validation(
                "ledger entry needs a student id".into(),
            ));
        }
        Ok(Self {
            id: LedgerEntryId::generate(),
            student_id,
            semester: semester.into(),
            kind,
            amount_minor,
            description,
            status: EntryStatus::Pending,
            balance_after_minor: None,
            sequence: 0,
            created_at: Utc::now(),
            decided_by: None,
            decided_at: None,
            rejection_reason: None,
            version: 0,
        })
    }

    /// Contribution to the balance: positive for charges
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            EntryKind::Charge => self.amount_minor,
            EntryKind::Payment => -self.amount_minor,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == EntryStatus::Approved
    }

    pub fn approve(&mut self, actor: &ActorId) -> ClearanceResult<()> {
        actor.validate()?;
        self.ensure_pending()?;
        self.status = EntryStatus::Approved;
        self.decided_by = Some(actor.clone());
        self.decided_at = Some(Utc::now());
        Ok(())
    }

    pub fn reject(&mut self, actor: &ActorId, reason: &str) -> ClearanceResult<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ClearanceError::Validation(
                "a rejection needs a reason".into(),
            ));
        }
        actor.validate()?;
        self.ensure_pending()?;
        self.status = EntryStatus::Rejected;
        self.decided_by = Some(actor.clone());
        self.decided_at = Some(Utc::now());
        self.rejection_reason = Some(reason.to_string());
        Ok(())
    }

    fn ensure_pending(&self) -> ClearanceResult<()> {
        match self.status {
            EntryStatus::Pending => Ok(()),
            EntryStatus::Approved => Err(ClearanceError::AlreadyProcessed(format!(
                "ledger entry {} was already approved",
                self.id
            ))),
            EntryStatus::Rejected => Err(ClearanceError::AlreadyProcessed(format!(
                "ledger entry {} was already rejected",
                self.id
            ))),
        }
    }
}

/// Render minor units as a two-decimal amount, e.g. `-1` → `-0.01`
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
