//! Staged multi-record writes
//!
//! A [`UnitOfWork`] collects every record an operation touches. Each
//! record carries the version it was read at (`0` for a record that must
//! not exist yet); the store commits all of them or none.

use clearance_types::{
    Group, GroupAggregate, LedgerEntry, StageRecord, StudentClearanceAggregate, StudentProfile,
};

/// Records staged for one atomic commit
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    pub stages: Vec<StageRecord>,
    pub group_aggregates: Vec<GroupAggregate>,
    pub student_aggregates: Vec<StudentClearanceAggregate>,
    pub profiles: Vec<StudentProfile>,
    pub groups: Vec<Group>,
    pub ledger_entries: Vec<LedgerEntry>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a record write, replacing an earlier staging of the same key
    pub fn put_stage(&mut self, record: StageRecord) -> &mut Self {
        self.stages.retain(|r| r.key != record.key);
        self.stages.push(record);
        self
    }

    pub fn put_group_aggregate(&mut self, aggregate: GroupAggregate) -> &mut Self {
        self.group_aggregates
            .retain(|a| a.group_id != aggregate.group_id);
        self.group_aggregates.push(aggregate);
        self
    }

    pub fn put_student_aggregate(&mut self, aggregate: StudentClearanceAggregate) -> &mut Self {
        self.student_aggregates
            .retain(|a| a.student_id != aggregate.student_id);
        self.student_aggregates.push(aggregate);
        self
    }

    pub fn put_profile(&mut self, profile: StudentProfile) -> &mut Self {
        self.profiles.retain(|p| p.id != profile.id);
        self.profiles.push(profile);
        self
    }

    pub fn put_group(&mut self, group: Group) -> &mut Self {
        self.groups.retain(|g| g.id != group.id);
        self.groups.push(group);
        self
    }

    pub fn put_ledger_entry(&mut self, entry: LedgerEntry) -> &mut Self {
        self.ledger_entries.retain(|e| e.id != entry.id);
        self.ledger_entries.push(entry);
        self
    }

    pub fn staged_stage(&self, key: &clearance_types::StageKey) -> Option<&StageRecord> {
        self.stages.iter().find(|r| &r.key == key)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
            + self.group_aggregates.len()
            + self.student_aggregates.len()
            + self.profiles.len()
            + self.groups.len()
            + self.ledger_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The records as persisted by a successful commit, with their new
/// versions (and ledger sequence numbers) filled in
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    pub stages: Vec<StageRecord>,
    pub group_aggregates: Vec<GroupAggregate>,
    pub student_aggregates: Vec<StudentClearanceAggregate>,
    pub profiles: Vec<StudentProfile>,
    pub groups: Vec<Group>,
    pub ledger_entries: Vec<LedgerEntry>,
}

impl CommitReceipt {
    pub fn stage(&self, key: &clearance_types::StageKey) -> Option<&StageRecord> {
        self.stages.iter().find(|r| &r.key == key)
    }

    pub fn ledger_entry(&self, id: &clearance_types::LedgerEntryId) -> Option<&LedgerEntry> {
        self.ledger_entries.iter().find(|e| &e.id == id)
    }
}
