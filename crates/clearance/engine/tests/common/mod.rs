//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use clearance_engine::{ClearanceService, EngineConfig, EntryRequest, EventSink, SinkError};
use clearance_store::{
    AggregateStore, ClearanceStorage, CommitReceipt, DirectoryStore, InMemoryClearanceStore,
    LedgerStore, StageStore, StoreError, StoreResult, UnitOfWork, UnitOfWorkStore,
};
use clearance_types::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub fn staff(name: &str) -> ActorId {
    ActorId::new(name)
}

pub fn group_key(department: Department, group_id: &GroupId) -> StageKey {
    StageKey::group(department, group_id.clone()).unwrap()
}

pub fn student_key(department: Department, student_id: &StudentId) -> StageKey {
    StageKey::student(department, student_id.clone()).unwrap()
}

/// Register `size` final-year students as group g1
pub async fn seed_group(
    service: &ClearanceService,
    size: usize,
    lab_items: u32,
) -> (GroupId, Vec<StudentId>) {
    let group_id = GroupId::new("g1");
    let students: Vec<StudentId> = (1..=size).map(|i| StudentId::new(format!("s{}", i))).collect();
    let mut group = Group::new(group_id.clone(), "Thesis A").with_lab_items(lab_items);
    for id in &students {
        service
            .register_student(StudentProfile::new(id.clone(), format!("Student {}", id), 4, 4))
            .await
            .unwrap();
        group = group.with_member(id.clone());
    }
    service.register_group(group).await.unwrap();
    (group_id, students)
}

pub async fn seeded_service(
    config: EngineConfig,
    size: usize,
    lab_items: u32,
) -> (ClearanceService, GroupId, Vec<StudentId>) {
    let service = ClearanceService::in_memory(config).unwrap();
    let (group_id, students) = seed_group(&service, size, lab_items).await;
    (service, group_id, students)
}

pub async fn start(service: &ClearanceService, group_id: &GroupId) -> StageRecord {
    service
        .start_clearance(Subject::Group(group_id.clone()), Department::Faculty, &staff("faculty-1"))
        .await
        .unwrap()
}

/// Start clearance and approve Faculty, Library and Lab
pub async fn clear_phase_one(service: &ClearanceService, group_id: &GroupId, lab_items: u32) {
    start(service, group_id).await;
    service
        .approve_stage(
            &group_key(Department::Faculty, group_id),
            Checklist::Faculty(FacultyChecklist::complete()),
            &staff("faculty-1"),
        )
        .await
        .unwrap();
    service
        .approve_stage(
            &group_key(Department::Library, group_id),
            Checklist::Library(LibraryChecklist {
                thesis_book_received: true,
            }),
            &staff("library-1"),
        )
        .await
        .unwrap();
    service
        .approve_stage(
            &group_key(Department::Lab, group_id),
            Checklist::Lab(LabChecklist {
                expected_items: 0,
                returned_items: lab_items,
            }),
            &staff("lab-1"),
        )
        .await
        .unwrap();
}

/// Record and approve a graduation-fee charge and payment
pub async fn pay_fee(service: &ClearanceService, student_id: &StudentId, charge: i64, paid: i64) {
    let finance = staff("finance-1");
    let charge = service
        .record_ledger_entry(EntryRequest {
            student_id: student_id.clone(),
            semester: "2025-2".into(),
            kind: EntryKind::Charge,
            amount_minor: charge,
            description: "Graduation fee".into(),
        })
        .await
        .unwrap();
    service.approve_ledger_entry(&charge.id, &finance).await.unwrap();
    if paid > 0 {
        let payment = service
            .record_ledger_entry(EntryRequest {
                student_id: student_id.clone(),
                semester: "2025-2".into(),
                kind: EntryKind::Payment,
                amount_minor: paid,
                description: "Graduation fee payment".into(),
            })
            .await
            .unwrap();
        service.approve_ledger_entry(&payment.id, &finance).await.unwrap();
    }
}

// ── Store wrappers ───────────────────────────────────────────────────

/// How a [`FlakyStore`] fails its next commits
#[derive(Clone, Copy, Debug)]
pub enum Fault {
    Conflict,
    Backend,
}

/// In-memory store whose next `n` commits fail without writing
pub struct FlakyStore {
    inner: InMemoryClearanceStore,
    failures: AtomicU32,
    fault: Fault,
    pub attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: InMemoryClearanceStore::new(),
            failures: AtomicU32::new(0),
            fault,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
        self.attempts.store(0, Ordering::SeqCst);
    }

    pub fn commit_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageStore for FlakyStore {
    async fn get_stage(&self, key: &StageKey) -> StoreResult<Option<StageRecord>> {
        self.inner.get_stage(key).await
    }

    async fn list_stages(&self, department: Department) -> StoreResult<Vec<StageRecord>> {
        self.inner.list_stages(department).await
    }
}

#[async_trait]
impl AggregateStore for FlakyStore {
    async fn get_group_aggregate(&self, group_id: &GroupId) -> StoreResult<Option<GroupAggregate>> {
        self.inner.get_group_aggregate(group_id).await
    }

    async fn get_student_aggregate(
        &self,
        student_id: &StudentId,
    ) -> StoreResult<Option<StudentClearanceAggregate>> {
        self.inner.get_student_aggregate(student_id).await
    }

    async fn list_student_aggregates(&self) -> StoreResult<Vec<StudentClearanceAggregate>> {
        self.inner.list_student_aggregates().await
    }
}

#[async_trait]
impl DirectoryStore for FlakyStore {
    async fn get_profile(&self, student_id: &StudentId) -> StoreResult<Option<StudentProfile>> {
        self.inner.get_profile(student_id).await
    }

    async fn get_group(&self, group_id: &GroupId) -> StoreResult<Option<Group>> {
        self.inner.get_group(group_id).await
    }

    async fn upsert_course_record(&self, record: CourseRecord) -> StoreResult<()> {
        self.inner.upsert_course_record(record).await
    }

    async fn list_course_records(&self, student_id: &StudentId) -> StoreResult<Vec<CourseRecord>> {
        self.inner.list_course_records(student_id).await
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn get_ledger_entry(&self, id: &LedgerEntryId) -> StoreResult<Option<LedgerEntry>> {
        self.inner.get_ledger_entry(id).await
    }

    async fn list_ledger_entries(&self, student_id: &StudentId) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.list_ledger_entries(student_id).await
    }
}

#[async_trait]
impl UnitOfWorkStore for FlakyStore {
    async fn commit(&self, unit: UnitOfWork) -> StoreResult<CommitReceipt> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(match self.fault {
                Fault::Conflict => StoreError::Conflict("injected conflict".into()),
                Fault::Backend => StoreError::Backend("injected outage".into()),
            });
        }
        self.inner.commit(unit).await
    }
}

pub fn flaky_service(fault: Fault, config: EngineConfig) -> (ClearanceService, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new(fault));
    let storage: Arc<dyn ClearanceStorage> = store.clone();
    (ClearanceService::new(storage, config).unwrap(), store)
}

// ── Sinks ────────────────────────────────────────────────────────────

/// A notification collaborator that is always down
pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn publish(&self, _envelope: ClearanceEventEnvelope) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("push gateway unreachable".into()))
    }
}

/// A notification collaborator that accepts the call and never answers
pub struct HangingSink;

#[async_trait]
impl EventSink for HangingSink {
    async fn publish(&self, _envelope: ClearanceEventEnvelope) -> Result<(), SinkError> {
        std::future::pending().await
    }
}
