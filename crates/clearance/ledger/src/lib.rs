//! Clearance ledger: append-only charges and payments per student.
//!
//! This crate provides the finance-facing ledger API on top of
//! `clearance-store`. Entries are created Pending, decided once by
//! Finance staff, and never edited otherwise. Approving an entry
//! re-stamps `balance_after_minor` on it and on every later approved
//! entry, so the stamp on the latest approved entry always equals the
//! balance recomputed from scratch.

#![deny(unsafe_code)]

mod balance;
mod policy;

pub use balance::{approved_balance, graduation_fee_remaining, latest_stamped_balance, restamp};
pub use policy::{FeePolicy, DEFAULT_GRADUATION_FEE_PATTERN};

use clearance_store::{ClearanceStorage, UnitOfWork};
use clearance_types::{
    ActorId, ClearanceError, ClearanceResult, EntryKind, LedgerEntry, LedgerEntryId, StudentId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Commit attempts before a contended decision gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Input for a new ledger entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRequest {
    pub student_id: StudentId,
    #[serde(default)]
    pub semester: String,
    pub kind: EntryKind,
    pub amount_minor: i64,
    pub description: String,
}

/// A student's ledger with its derived balances
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatement {
    pub student_id: StudentId,
    /// In creation order
    pub entries: Vec<LedgerEntry>,
    pub current_balance_minor: i64,
    pub graduation_fee_remaining_minor: i64,
    pub graduation_fee_settled: bool,
}

/// The finance ledger facade.
pub struct FinanceLedger {
    storage: Arc<dyn ClearanceStorage>,
    policy: FeePolicy,
    max_attempts: u32,
}

impl FinanceLedger {
    pub fn new(storage: Arc<dyn ClearanceStorage>, policy: FeePolicy) -> Self {
        Self {
            storage,
            policy,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    /// Append a Pending entry for a registered student.
    pub async fn record_entry(&self, request: EntryRequest) -> ClearanceResult<LedgerEntry> {
        if self
            .storage
            .get_profile(&request.student_id)
            .await?
            .is_none()
        {
            return Err(ClearanceError::NotFound(format!(
                "student {} not found",
                request.student_id
            )));
        }

        let entry = LedgerEntry::new(
            request.student_id,
            request.semester,
            request.kind,
            request.amount_minor,
            request.description,
        )?;
        let id = entry.id.clone();

        let mut unit = UnitOfWork::new();
        unit.put_ledger_entry(entry);
        let receipt = self.storage.commit(unit).await?;
        let stored = receipt
            .ledger_entry(&id)
            .cloned()
            .ok_or_else(|| ClearanceError::Consistency(format!("ledger entry {} not persisted", id)))?;

        tracing::info!(
            entry = %stored.id.short(),
            student = %stored.student_id,
            kind = %stored.kind,
            amount_minor = stored.amount_minor,
            "Ledger entry recorded"
        );
        Ok(stored)
    }

    /// Approve a Pending entry. First writer wins; every later call fails
    /// with `AlreadyProcessed`.
    pub async fn approve_entry(
        &self,
        id: &LedgerEntryId,
        actor: &ActorId,
    ) -> ClearanceResult<LedgerEntry> {
        for attempt in 1..=self.max_attempts {
            let student_id = self.load(id).await?.student_id;
            let mut entries = self.storage.list_ledger_entries(&student_id).await?;
            let idx = position_of(&entries, id)?;

            entries[idx].approve(actor)?;
            let changed = restamp(&mut entries)?;

            let mut unit = UnitOfWork::new();
            unit.put_ledger_entry(entries[idx].clone());
            for i in changed {
                unit.put_ledger_entry(entries[i].clone());
            }

            match self.storage.commit(unit).await {
                Ok(receipt) => {
                    let approved = receipt.ledger_entry(id).cloned().ok_or_else(|| {
                        ClearanceError::Consistency(format!("ledger entry {} not persisted", id))
                    })?;
                    tracing::info!(
                        entry = %id.short(),
                        student = %student_id,
                        balance_after_minor = approved.balance_after_minor.unwrap_or_default(),
                        "Ledger entry approved"
                    );
                    return Ok(approved);
                }
                Err(err) if err.is_conflict() => {
                    tracing::warn!(entry = %id.short(), attempt, error = %err, "Ledger approval conflicted, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ClearanceError::Consistency(format!(
            "ledger entry {} could not be approved after {} attempts",
            id, self.max_attempts
        )))
    }

    /// Reject a Pending entry. Balances are unaffected.
    pub async fn reject_entry(
        &self,
        id: &LedgerEntryId,
        actor: &ActorId,
        reason: &str,
    ) -> ClearanceResult<LedgerEntry> {
        for attempt in 1..=self.max_attempts {
            let mut entry = self.load(id).await?;
            entry.reject(actor, reason)?;

            let mut unit = UnitOfWork::new();
            unit.put_ledger_entry(entry);
            match self.storage.commit(unit).await {
                Ok(receipt) => {
                    let rejected = receipt.ledger_entry(id).cloned().ok_or_else(|| {
                        ClearanceError::Consistency(format!("ledger entry {} not persisted", id))
                    })?;
                    tracing::info!(entry = %id.short(), student = %rejected.student_id, "Ledger entry rejected");
                    return Ok(rejected);
                }
                Err(err) if err.is_conflict() => {
                    tracing::warn!(entry = %id.short(), attempt, error = %err, "Ledger rejection conflicted, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ClearanceError::Consistency(format!(
            "ledger entry {} could not be rejected after {} attempts",
            id, self.max_attempts
        )))
    }

    pub async fn get_entry(&self, id: &LedgerEntryId) -> ClearanceResult<Option<LedgerEntry>> {
        Ok(self.storage.get_ledger_entry(id).await?)
    }

    /// Entries in creation order with the derived balances.
    pub async fn statement(&self, student_id: &StudentId) -> ClearanceResult<LedgerStatement> {
        let entries = self.storage.list_ledger_entries(student_id).await?;
        let current_balance_minor = approved_balance(&entries)?;
        let graduation_fee_remaining_minor = graduation_fee_remaining(&entries, &self.policy)?;
        Ok(LedgerStatement {
            student_id: student_id.clone(),
            current_balance_minor,
            graduation_fee_remaining_minor,
            graduation_fee_settled: self.policy.is_settled(graduation_fee_remaining_minor),
            entries,
        })
    }

    pub async fn current_balance(&self, student_id: &StudentId) -> ClearanceResult<i64> {
        let entries = self.storage.list_ledger_entries(student_id).await?;
        approved_balance(&entries)
    }

    pub async fn graduation_fee_remaining(&self, student_id: &StudentId) -> ClearanceResult<i64> {
        let entries = self.storage.list_ledger_entries(student_id).await?;
        graduation_fee_remaining(&entries, &self.policy)
    }

    async fn load(&self, id: &LedgerEntryId) -> ClearanceResult<LedgerEntry> {
        self.storage
            .get_ledger_entry(id)
            .await?
            .ok_or_else(|| ClearanceError::NotFound(format!("ledger entry {} not found", id)))
    }
}

fn position_of(entries: &[LedgerEntry], id: &LedgerEntryId) -> ClearanceResult<usize> {
    entries.iter().position(|e| &e.id == id).ok_or_else(|| {
        ClearanceError::Consistency(format!(
            "ledger entry {} is missing from its student's statement",
            id
        ))
    })
}
