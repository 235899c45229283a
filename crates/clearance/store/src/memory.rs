//! In-memory reference implementation of the clearance storage traits.
//!
//! All state sits behind one lock so a unit of work is validated and
//! applied as a single step. Deterministic and test-friendly.

use crate::traits::{AggregateStore, DirectoryStore, LedgerStore, StageStore, UnitOfWorkStore};
use crate::{CommitReceipt, StoreError, StoreResult, UnitOfWork};
use async_trait::async_trait;
use clearance_types::{
    CourseRecord, Department, Group, GroupAggregate, GroupId, LedgerEntry, LedgerEntryId,
    StageKey, StageRecord, StudentClearanceAggregate, StudentId, StudentProfile,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct StoreState {
    stages: BTreeMap<StageKey, StageRecord>,
    group_aggregates: BTreeMap<GroupId, GroupAggregate>,
    student_aggregates: BTreeMap<StudentId, StudentClearanceAggregate>,
    profiles: BTreeMap<StudentId, StudentProfile>,
    groups: BTreeMap<GroupId, Group>,
    courses: BTreeMap<(StudentId, String), CourseRecord>,
    ledger: HashMap<LedgerEntryId, LedgerEntry>,
    next_sequence: u64,
    commits: u64,
}

/// In-memory clearance storage adapter.
#[derive(Default)]
pub struct InMemoryClearanceStore {
    state: RwLock<StoreState>,
}

impl InMemoryClearanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> StoreResult<u64> {
        Ok(self.read()?.commits)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("clearance store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("clearance store lock poisoned".to_string()))
    }
}

fn check_version(what: &str, stored: Option<u64>, staged: u64) -> StoreResult<()> {
    let stored = stored.unwrap_or(0);
    if stored == staged {
        return Ok(());
    }
    if staged == 0 {
        Err(StoreError::Conflict(format!("{} already exists", what)))
    } else if stored == 0 {
        Err(StoreError::Conflict(format!("{} no longer exists", what)))
    } else {
        Err(StoreError::Conflict(format!(
            "{} changed concurrently: expected version {}, found {}",
            what, staged, stored
        )))
    }
}

fn check_history_appended(stored: &StageRecord, staged: &StageRecord) -> StoreResult<()> {
    let prefix_kept = staged.history.len() >= stored.history.len()
        && staged.history[..stored.history.len()] == stored.history[..];
    if !prefix_kept {
        return Err(StoreError::InvalidInput(format!(
            "history of the {} may only be appended to",
            stored.key
        )));
    }
    Ok(())
}

fn check_ledger_immutable(stored: &LedgerEntry, staged: &LedgerEntry) -> StoreResult<()> {
    let unchanged = stored.student_id == staged.student_id
        && stored.kind == staged.kind
        && stored.amount_minor == staged.amount_minor
        && stored.description == staged.description
        && stored.semester == staged.semester
        && stored.created_at == staged.created_at;
    if !unchanged {
        return Err(StoreError::InvalidInput(format!(
            "ledger entry {} is append-only; only its decision may change",
            stored.id
        )));
    }
    Ok(())
}

impl StoreState {
    fn validate(&self, unit: &UnitOfWork) -> StoreResult<()> {
        for record in &unit.stages {
            let stored = self.stages.get(&record.key);
            check_version(
                &format!("the {}", record.key),
                stored.map(|r| r.version),
                record.version,
            )?;
            if let Some(stored) = stored {
                check_history_appended(stored, record)?;
            }
        }
        for agg in &unit.group_aggregates {
            check_version(
                &format!("progress of group {}", agg.group_id),
                self.group_aggregates.get(&agg.group_id).map(|a| a.version),
                agg.version,
            )?;
        }
        for agg in &unit.student_aggregates {
            check_version(
                &format!("clearance of student {}", agg.student_id),
                self.student_aggregates
                    .get(&agg.student_id)
                    .map(|a| a.version),
                agg.version,
            )?;
        }
        for profile in &unit.profiles {
            check_version(
                &format!("profile of student {}", profile.id),
                self.profiles.get(&profile.id).map(|p| p.version),
                profile.version,
            )?;
        }
        for group in &unit.groups {
            check_version(
                &format!("group {}", group.id),
                self.groups.get(&group.id).map(|g| g.version),
                group.version,
            )?;
        }
        for entry in &unit.ledger_entries {
            let stored = self.ledger.get(&entry.id);
            check_version(
                &format!("ledger entry {}", entry.id),
                stored.map(|e| e.version),
                entry.version,
            )?;
            if let Some(stored) = stored {
                check_ledger_immutable(stored, entry)?;
            }
        }
        Ok(())
    }

    fn apply(&mut self, unit: UnitOfWork) -> CommitReceipt {
        let mut receipt = CommitReceipt::default();

        for mut record in unit.stages {
            record.version += 1;
            self.stages.insert(record.key.clone(), record.clone());
            receipt.stages.push(record);
        }
        for mut agg in unit.group_aggregates {
            agg.version += 1;
            self.group_aggregates
                .insert(agg.group_id.clone(), agg.clone());
            receipt.group_aggregates.push(agg);
        }
        for mut agg in unit.student_aggregates {
            agg.version += 1;
            self.student_aggregates
                .insert(agg.student_id.clone(), agg.clone());
            receipt.student_aggregates.push(agg);
        }
        for mut profile in unit.profiles {
            profile.version += 1;
            self.profiles.insert(profile.id.clone(), profile.clone());
            receipt.profiles.push(profile);
        }
        for mut group in unit.groups {
            group.version += 1;
            self.groups.insert(group.id.clone(), group.clone());
            receipt.groups.push(group);
        }
        for mut entry in unit.ledger_entries {
            if entry.version == 0 {
                self.next_sequence += 1;
                entry.sequence = self.next_sequence;
            }
            entry.version += 1;
            self.ledger.insert(entry.id.clone(), entry.clone());
            receipt.ledger_entries.push(entry);
        }

        self.commits += 1;
        receipt
    }
}

#[async_trait]
impl StageStore for InMemoryClearanceStore {
    async fn get_stage(&self, key: &StageKey) -> StoreResult<Option<StageRecord>> {
        Ok(self.read()?.stages.get(key).cloned())
    }

    async fn list_stages(&self, department: Department) -> StoreResult<Vec<StageRecord>> {
        Ok(self
            .read()?
            .stages
            .values()
            .filter(|r| r.key.department == department)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AggregateStore for InMemoryClearanceStore {
    async fn get_group_aggregate(&self, group_id: &GroupId) -> StoreResult<Option<GroupAggregate>> {
        Ok(self.read()?.group_aggregates.get(group_id).cloned())
    }

    async fn get_student_aggregate(
        &self,
        student_id: &StudentId,
    ) -> StoreResult<Option<StudentClearanceAggregate>> {
        Ok(self.read()?.student_aggregates.get(student_id).cloned())
    }

    async fn list_student_aggregates(&self) -> StoreResult<Vec<StudentClearanceAggregate>> {
        Ok(self.read()?.student_aggregates.values().cloned().collect())
    }
}

#[async_trait]
impl DirectoryStore for InMemoryClearanceStore {
    async fn get_profile(&self, student_id: &StudentId) -> StoreResult<Option<StudentProfile>> {
        Ok(self.read()?.profiles.get(student_id).cloned())
    }

    async fn get_group(&self, group_id: &GroupId) -> StoreResult<Option<Group>> {
        Ok(self.read()?.groups.get(group_id).cloned())
    }

    async fn upsert_course_record(&self, record: CourseRecord) -> StoreResult<()> {
        if record.course_code.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "course record needs a course code".to_string(),
            ));
        }
        let mut guard = self.write()?;
        if !guard.profiles.contains_key(&record.student_id) {
            return Err(StoreError::NotFound(format!(
                "student {} not found",
                record.student_id
            )));
        }
        guard.courses.insert(
            (record.student_id.clone(), record.course_code.clone()),
            record,
        );
        Ok(())
    }

    async fn list_course_records(&self, student_id: &StudentId) -> StoreResult<Vec<CourseRecord>> {
        Ok(self
            .read()?
            .courses
            .values()
            .filter(|r| &r.student_id == student_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryClearanceStore {
    async fn get_ledger_entry(&self, id: &LedgerEntryId) -> StoreResult<Option<LedgerEntry>> {
        Ok(self.read()?.ledger.get(id).cloned())
    }

    async fn list_ledger_entries(&self, student_id: &StudentId) -> StoreResult<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .read()?
            .ledger
            .values()
            .filter(|e| &e.student_id == student_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }
}

#[async_trait]
impl UnitOfWorkStore for InMemoryClearanceStore {
    async fn commit(&self, unit: UnitOfWork) -> StoreResult<CommitReceipt> {
        let mut guard = self.write()?;
        guard.validate(&unit)?;
        let writes = unit.len();
        let receipt = guard.apply(unit);
        tracing::trace!(writes, commit = guard.commits, "unit of work committed");
        Ok(receipt)
    }
}
