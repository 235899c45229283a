use crate::{CommitReceipt, StoreResult, UnitOfWork};
use async_trait::async_trait;
use clearance_types::{
    CourseRecord, Department, Group, GroupAggregate, GroupId, LedgerEntry, LedgerEntryId,
    StageKey, StageRecord, StudentClearanceAggregate, StudentId, StudentProfile,
};

/// Storage interface for department stage records.
#[async_trait]
pub trait StageStore: Send + Sync {
    async fn get_stage(&self, key: &StageKey) -> StoreResult<Option<StageRecord>>;

    /// All stages of one department, ordered by key.
    async fn list_stages(&self, department: Department) -> StoreResult<Vec<StageRecord>>;
}

/// Storage interface for the group and student read models.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn get_group_aggregate(&self, group_id: &GroupId) -> StoreResult<Option<GroupAggregate>>;

    async fn get_student_aggregate(
        &self,
        student_id: &StudentId,
    ) -> StoreResult<Option<StudentClearanceAggregate>>;

    async fn list_student_aggregates(&self) -> StoreResult<Vec<StudentClearanceAggregate>>;
}

/// Storage interface for students, groups and course results.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn get_profile(&self, student_id: &StudentId) -> StoreResult<Option<StudentProfile>>;

    async fn get_group(&self, group_id: &GroupId) -> StoreResult<Option<Group>>;

    /// Insert or replace the result for `(student_id, course_code)`.
    async fn upsert_course_record(&self, record: CourseRecord) -> StoreResult<()>;

    async fn list_course_records(&self, student_id: &StudentId) -> StoreResult<Vec<CourseRecord>>;
}

/// Storage interface for ledger entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_ledger_entry(&self, id: &LedgerEntryId) -> StoreResult<Option<LedgerEntry>>;

    /// A student's entries in creation order.
    async fn list_ledger_entries(&self, student_id: &StudentId) -> StoreResult<Vec<LedgerEntry>>;
}

/// Atomic multi-record commit.
#[async_trait]
pub trait UnitOfWorkStore: Send + Sync {
    /// Apply every staged write, or none.
    ///
    /// Fails with `StoreError::Conflict` when any record's version differs
    /// from the stored one.
    async fn commit(&self, unit: UnitOfWork) -> StoreResult<CommitReceipt>;
}

/// Unified storage bundle used by the clearance engine.
pub trait ClearanceStorage:
    StageStore + AggregateStore + DirectoryStore + LedgerStore + UnitOfWorkStore + Send + Sync
{
}

impl<T> ClearanceStorage for T where
    T: StageStore + AggregateStore + DirectoryStore + LedgerStore + UnitOfWorkStore + Send + Sync
{
}
