//! Balance arithmetic over a student's entries
//!
//! Only Approved entries count. Balances are recomputed from the whole
//! history rather than incremented, so an entry approved out of order
//! still yields the right figures. Sums are checked; a ledger whose total
//! leaves the `i64` range is refused rather than wrapped.

use crate::FeePolicy;
use clearance_types::{ClearanceError, ClearanceResult, LedgerEntry};

fn add_signed(running: i64, entry: &LedgerEntry) -> ClearanceResult<i64> {
    running.checked_add(entry.signed_amount()).ok_or_else(|| {
        ClearanceError::Validation(format!(
            "ledger balance of student {} overflows at entry {}",
            entry.student_id,
            entry.id.short()
        ))
    })
}

/// Σ approved charges − Σ approved payments
pub fn approved_balance<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> ClearanceResult<i64> {
    entries
        .into_iter()
        .filter(|e| e.is_approved())
        .try_fold(0i64, add_signed)
}

/// Same formula, restricted to entries the policy recognises as the
/// graduation fee
pub fn graduation_fee_remaining<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    policy: &FeePolicy,
) -> ClearanceResult<i64> {
    approved_balance(
        entries
            .into_iter()
            .filter(|e| policy.matches(&e.description)),
    )
}

/// Stamp `balance_after_minor` on every approved entry, walking the
/// entries in creation order. Returns the indices whose stamp changed.
///
/// `entries` must already be sorted by `sequence`. On overflow nothing
/// is stamped.
pub fn restamp(entries: &mut [LedgerEntry]) -> ClearanceResult<Vec<usize>> {
    let mut running = 0i64;
    let mut stamps = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        if !entry.is_approved() {
            continue;
        }
        running = add_signed(running, entry)?;
        if entry.balance_after_minor != Some(running) {
            stamps.push((idx, running));
        }
    }
    let mut changed = Vec::with_capacity(stamps.len());
    for (idx, balance) in stamps {
        entries[idx].balance_after_minor = Some(balance);
        changed.push(idx);
    }
    Ok(changed)
}

/// The stamp on the latest approved entry, or 0 with none approved
pub fn latest_stamped_balance(entries: &[LedgerEntry]) -> i64 {
    entries
        .iter()
        .filter(|e| e.is_approved())
        .max_by_key(|e| e.sequence)
        .and_then(|e| e.balance_after_minor)
        .unwrap_or(0)
}
