//! The clearance service
//!
//! Every operation reads fresh state, applies the transition to a copy,
//! plans the full fan-out and commits it as one unit of work. A conflict
//! means someone else wrote first: the operation starts over from a fresh
//! read, where the state machine turns a lost race on the same stage into
//! `AlreadyProcessed`. Retries are bounded by
//! `propagation.max_commit_attempts`; running out surfaces `Consistency`.
//!
//! Events go to the sink only after a successful commit.

use crate::config::EngineConfig;
use crate::eligibility::{EligibilityEvaluator, EligibilityReport};
use crate::propagation::{PropagationContext, PropagationEngine, PropagationPlan};
use crate::sink::{EventSink, NoopSink};
use clearance_ledger::{EntryRequest, FinanceLedger, LedgerStatement};
use clearance_store::{ClearanceStorage, CommitReceipt, InMemoryClearanceStore, UnitOfWork};
use clearance_types::{
    format_minor, ActorId, Checklist, ClearanceError, ClearanceEvent, ClearanceEventEnvelope,
    ClearanceResult, CourseRecord, Department, FinanceChecklist, Group, GroupAggregate, GroupId,
    HistoryEntry, LedgerEntry, LedgerEntryId, ProfileClearanceStatus, StageKey, StageRecord,
    StudentClearanceAggregate, StudentId, StudentProfile, Subject,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A decision on a stage
#[derive(Debug, Clone)]
enum StageAction {
    Approve(Checklist),
    Reject(String),
    Resubmit,
}

impl StageAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Approve(_) => "approve",
            Self::Reject(_) => "reject",
            Self::Resubmit => "resubmit",
        }
    }
}

/// Actor recorded for transitions the engine makes on its own
pub const SYSTEM_ACTOR: &str = "system";

fn system_actor() -> ActorId {
    ActorId::new(SYSTEM_ACTOR)
}

/// Outcome of a commit attempt
enum Attempt<T> {
    Done(T),
    Retry,
}

/// The graduation clearance workflow service.
pub struct ClearanceService {
    storage: Arc<dyn ClearanceStorage>,
    ledger: FinanceLedger,
    evaluator: EligibilityEvaluator,
    propagation: PropagationEngine,
    sink: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl ClearanceService {
    /// Create a service over an explicit storage adapter
    pub fn new(storage: Arc<dyn ClearanceStorage>, config: EngineConfig) -> ClearanceResult<Self> {
        config.validate()?;
        let policy = config.fee_policy()?;
        let ledger = FinanceLedger::new(Arc::clone(&storage), policy.clone())
            .with_max_attempts(config.propagation.max_commit_attempts);
        Ok(Self {
            storage,
            ledger,
            evaluator: EligibilityEvaluator::new(policy),
            propagation: PropagationEngine::new(),
            sink: Arc::new(NoopSink),
            config,
        })
    }

    /// Create a service backed by in-memory storage
    pub fn in_memory(config: EngineConfig) -> ClearanceResult<Self> {
        Self::new(Arc::new(InMemoryClearanceStore::new()), config)
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn ClearanceStorage> {
        Arc::clone(&self.storage)
    }

    pub fn ledger(&self) -> &FinanceLedger {
        &self.ledger
    }

    fn attempts(&self) -> u32 {
        self.config.propagation.max_commit_attempts.max(1)
    }

    // ── Directory ────────────────────────────────────────────────────

    /// Register a student. Group membership is assigned by
    /// [`register_group`](Self::register_group).
    pub async fn register_student(&self, profile: StudentProfile) -> ClearanceResult<StudentProfile> {
        profile.validate()?;
        if profile.group_id.is_some() {
            return Err(ClearanceError::Validation(format!(
                "student {} must be registered without a group; groups assign their members",
                profile.id
            )));
        }
        let mut profile = profile;
        profile.version = 0;
        profile.clearance_status = ProfileClearanceStatus::Pending;

        let mut unit = UnitOfWork::new();
        unit.put_profile(profile.clone());
        let receipt = self.storage.commit(unit).await.map_err(|err| {
            if err.is_conflict() {
                ClearanceError::Validation(format!("student {} is already registered", profile.id))
            } else {
                err.into()
            }
        })?;

        tracing::info!(student = %profile.id, "Student registered");
        receipt
            .profiles
            .into_iter()
            .next()
            .ok_or_else(|| ClearanceError::Consistency(format!("profile {} not persisted", profile.id)))
    }

    /// Register a group and assign its members to it
    pub async fn register_group(&self, group: Group) -> ClearanceResult<Group> {
        group.validate()?;
        for attempt in 1..=self.attempts() {
            if self.storage.get_group(&group.id).await?.is_some() {
                return Err(ClearanceError::Validation(format!(
                    "group {} is already registered",
                    group.id
                )));
            }

            let mut unit = UnitOfWork::new();
            for member in &group.members {
                let mut profile = self.require_profile(member).await?;
                if let Some(existing) = &profile.group_id {
                    return Err(ClearanceError::Precondition(format!(
                        "student {} already belongs to group {}",
                        member, existing
                    )));
                }
                profile.group_id = Some(group.id.clone());
                unit.put_profile(profile);
            }
            let mut staged = group.clone();
            staged.version = 0;
            unit.put_group(staged);

            match self.commit(unit, "register_group", attempt).await? {
                Attempt::Done(receipt) => {
                    tracing::info!(group = %group.id, members = group.members.len(), "Group registered");
                    return receipt.groups.into_iter().next().ok_or_else(|| {
                        ClearanceError::Consistency(format!("group {} not persisted", group.id))
                    });
                }
                Attempt::Retry => continue,
            }
        }
        Err(self.exhausted(&format!("registration of group {}", group.id)))
    }

    /// Insert or replace a course result
    pub async fn record_course_result(&self, record: CourseRecord) -> ClearanceResult<()> {
        self.storage.upsert_course_record(record.clone()).await?;
        tracing::debug!(
            student = %record.student_id,
            course = %record.course_code,
            passed = record.passed,
            "Course result recorded"
        );
        Ok(())
    }

    // ── Stage operations ─────────────────────────────────────────────

    /// Open the Faculty stage for a group (or a student's group).
    ///
    /// Only Faculty can be started directly. Every member must be in
    /// their final year with clearance not yet started.
    pub async fn start_clearance(
        &self,
        subject: Subject,
        department: Department,
        actor: &ActorId,
    ) -> ClearanceResult<StageRecord> {
        actor.validate()?;
        if department != Department::Faculty {
            return Err(ClearanceError::Precondition(format!(
                "only the faculty stage can be started; the {} stage opens when {} approves",
                department,
                department
                    .previous()
                    .map(|d| d.as_str())
                    .unwrap_or("its predecessor")
            )));
        }

        let group_id = match &subject {
            Subject::Group(group_id) => group_id.clone(),
            Subject::Student(student_id) => {
                let profile = self.require_profile(student_id).await?;
                profile.group_id.ok_or_else(|| {
                    ClearanceError::Precondition(format!(
                        "student {} does not belong to a group",
                        student_id
                    ))
                })?
            }
        };
        let key = StageKey::group(Department::Faculty, group_id.clone())?;

        for attempt in 1..=self.attempts() {
            if self.storage.get_stage(&key).await?.is_some() {
                return Err(ClearanceError::InvalidState(format!(
                    "clearance already started for group {}",
                    group_id
                )));
            }
            let group = self.require_group(&group_id).await?;

            let mut unit = UnitOfWork::new();
            for member in &group.members {
                let mut profile = self.require_profile(member).await?;
                if profile.group_id.as_ref() != Some(&group_id) {
                    return Err(ClearanceError::Precondition(format!(
                        "student {} does not belong to group {}",
                        member, group_id
                    )));
                }
                if !profile.is_final_year() {
                    return Err(ClearanceError::Precondition(format!(
                        "student {} is in year {} of {}, not the graduation year",
                        member, profile.year_of_study, profile.program_years
                    )));
                }
                if profile.clearance_status != ProfileClearanceStatus::Pending {
                    return Err(ClearanceError::Precondition(format!(
                        "student {} clearance status is {:?}, expected Pending",
                        member, profile.clearance_status
                    )));
                }
                profile.clearance_status = ProfileClearanceStatus::InProgress;
                unit.put_profile(profile);

                let aggregate = match self.storage.get_student_aggregate(member).await? {
                    Some(existing) => existing,
                    None => StudentClearanceAggregate::new(member.clone(), group_id.clone()),
                };
                unit.put_student_aggregate(aggregate);
            }

            let group_aggregate = match self.storage.get_group_aggregate(&group_id).await? {
                Some(existing) => existing,
                None => GroupAggregate::new(group_id.clone(), group.members.iter().cloned()),
            };
            unit.put_group_aggregate(group_aggregate);

            let record = StageRecord::open(
                key.clone(),
                Checklist::empty(Department::Faculty),
                actor.clone(),
            )?;
            unit.put_stage(record);

            match self.commit(unit, "start_clearance", attempt).await? {
                Attempt::Done(receipt) => {
                    tracing::info!(group = %group_id, members = group.members.len(), actor = %actor, "Clearance started");
                    self.publish(
                        vec![ClearanceEvent::ClearanceStarted {
                            group_id: group_id.clone(),
                            members: group.members.iter().cloned().collect(),
                        }],
                        actor,
                    )
                    .await;
                    return receipt.stage(&key).cloned().ok_or_else(|| {
                        ClearanceError::Consistency(format!("{} not persisted", key))
                    });
                }
                Attempt::Retry => continue,
            }
        }
        Err(self.exhausted(&format!("start of clearance for group {}", group_id)))
    }

    /// Approve a stage with the submitted checklist.
    ///
    /// Finance and Examination checklists are derived (from the ledger
    /// and the eligibility gates); the submitted one only has to belong
    /// to the right department.
    pub async fn approve_stage(
        &self,
        key: &StageKey,
        checklist: Checklist,
        actor: &ActorId,
    ) -> ClearanceResult<StageRecord> {
        self.decide(key, StageAction::Approve(checklist), actor).await
    }

    pub async fn reject_stage(
        &self,
        key: &StageKey,
        reason: &str,
        actor: &ActorId,
    ) -> ClearanceResult<StageRecord> {
        self.decide(key, StageAction::Reject(reason.to_string()), actor)
            .await
    }

    pub async fn resubmit_stage(&self, key: &StageKey, actor: &ActorId) -> ClearanceResult<StageRecord> {
        self.decide(key, StageAction::Resubmit, actor).await
    }

    /// Record partial checklist progress on a Pending stage. No history
    /// entry, no propagation.
    pub async fn update_checklist(
        &self,
        key: &StageKey,
        checklist: Checklist,
        actor: &ActorId,
    ) -> ClearanceResult<StageRecord> {
        actor.validate()?;
        if matches!(key.department, Department::Finance | Department::Examination) {
            return Err(ClearanceError::Validation(format!(
                "the {} checklist is derived and cannot be edited",
                key.department
            )));
        }
        for attempt in 1..=self.attempts() {
            let mut record = self.require_stage(key).await?;
            record.update_checklist(&checklist)?;

            let mut unit = UnitOfWork::new();
            unit.put_stage(record);
            match self.commit(unit, "update_checklist", attempt).await? {
                Attempt::Done(receipt) => {
                    tracing::debug!(stage = %key, actor = %actor, "Checklist updated");
                    return receipt
                        .stage(key)
                        .cloned()
                        .ok_or_else(|| ClearanceError::Consistency(format!("{} not persisted", key)));
                }
                Attempt::Retry => continue,
            }
        }
        Err(self.exhausted(&format!("checklist update of the {}", key)))
    }

    async fn decide(
        &self,
        key: &StageKey,
        action: StageAction,
        actor: &ActorId,
    ) -> ClearanceResult<StageRecord> {
        actor.validate()?;
        for attempt in 1..=self.attempts() {
            let mut record = self.require_stage(key).await?;

            let transition = match &action {
                StageAction::Approve(submitted) => {
                    let checklist = if record.is_pending() {
                        self.approval_checklist(&record, submitted).await
                    } else {
                        Ok(submitted.clone())
                    };
                    checklist.and_then(|c| record.approve(&c, actor))
                }
                StageAction::Reject(reason) => record.reject(reason, actor),
                StageAction::Resubmit => record.resubmit(actor),
            };
            if let Err(err) = transition {
                tracing::warn!(stage = %key, action = action.name(), actor = %actor, error = %err, "Stage transition refused");
                return Err(err);
            }

            let ctx = self.load_context(&record).await?;
            let mut plan = self.propagation.plan(&record, ctx, actor)?;
            if key.department == Department::Finance && record.is_approved() {
                self.plan_examination_handoff(&mut plan, key, actor).await?;
            }
            let PropagationPlan {
                unit,
                events,
                opened,
                cleared,
            } = plan;

            match self.commit(unit, action.name(), attempt).await? {
                Attempt::Done(receipt) => {
                    tracing::info!(
                        stage = %key,
                        status = %record.status,
                        actor = %actor,
                        opened = opened.len(),
                        cleared = cleared.len(),
                        "Stage decision committed"
                    );
                    self.publish(events, actor).await;
                    return receipt
                        .stage(key)
                        .cloned()
                        .ok_or_else(|| ClearanceError::Consistency(format!("{} not persisted", key)));
                }
                Attempt::Retry => continue,
            }
        }
        Err(self.exhausted(&format!("propagation of the {}", key)))
    }

    /// The checklist an approval is judged against
    async fn approval_checklist(
        &self,
        record: &StageRecord,
        submitted: &Checklist,
    ) -> ClearanceResult<Checklist> {
        // department mismatch is a validation error for every stage
        submitted.merged_onto(&record.checklist)?;

        let student_id = match (&record.key.department, &record.key.subject) {
            (Department::Finance | Department::Examination, Subject::Student(s)) => s,
            _ => return Ok(submitted.clone()),
        };

        if record.key.department == Department::Finance {
            let remaining = self.ledger.graduation_fee_remaining(student_id).await?;
            if !self.ledger.policy().is_settled(remaining) {
                return Err(ClearanceError::Precondition(format!(
                    "graduation fee not settled for student {}: {} outstanding",
                    student_id,
                    format_minor(remaining)
                )));
            }
            return Ok(Checklist::Finance(FinanceChecklist {
                graduation_fee_settled: true,
            }));
        }

        let report = self.assess(student_id).await?;
        Ok(Checklist::Examination(report.examination_checklist()))
    }

    /// On Finance approval, open the Examination record if every gate passes
    async fn plan_examination_handoff(
        &self,
        plan: &mut PropagationPlan,
        key: &StageKey,
        actor: &ActorId,
    ) -> ClearanceResult<()> {
        let Some(student_id) = key.subject.as_student() else {
            return Ok(());
        };
        let exam_key = StageKey::student(Department::Examination, student_id.clone())?;
        if self.storage.get_stage(&exam_key).await?.is_some() {
            return Ok(());
        }
        let aggregate = plan.student_aggregate(student_id).cloned().ok_or_else(|| {
            ClearanceError::Consistency(format!("student {} missing from the plan", student_id))
        })?;
        let entries = self.storage.list_ledger_entries(student_id).await?;
        let courses = self.storage.list_course_records(student_id).await?;
        let report = self.evaluator.assess(&aggregate, &entries, &courses)?;
        if !report.eligible {
            tracing::info!(student = %student_id, reason = %report.reason, "Examination not opened");
            return Ok(());
        }

        let record = StageRecord::open(
            exam_key,
            Checklist::Examination(report.examination_checklist()),
            actor.clone(),
        )?
        .with_prerequisite_cleared();
        plan.open_stage(record);
        Ok(())
    }

    // ── Eligibility ──────────────────────────────────────────────────

    /// Run the Examination gates; open the Examination record when they
    /// pass and none exists yet.
    pub async fn evaluate_eligibility(&self, student_id: &StudentId) -> ClearanceResult<EligibilityReport> {
        let exam_key = StageKey::student(Department::Examination, student_id.clone())?;
        for attempt in 1..=self.attempts() {
            let mut report = self.assess(student_id).await?;
            if !report.eligible || self.storage.get_stage(&exam_key).await?.is_some() {
                return Ok(report);
            }

            let record = StageRecord::open(
                exam_key.clone(),
                Checklist::Examination(report.examination_checklist()),
                system_actor(),
            )?
            .with_prerequisite_cleared();
            let mut unit = UnitOfWork::new();
            unit.put_stage(record);

            match self.commit(unit, "evaluate_eligibility", attempt).await? {
                Attempt::Done(_) => {
                    report.examination_created = true;
                    tracing::info!(student = %student_id, "Examination opened");
                    self.publish(
                        vec![ClearanceEvent::StageOpened { key: exam_key }],
                        &system_actor(),
                    )
                    .await;
                    return Ok(report);
                }
                Attempt::Retry => continue,
            }
        }
        Err(self.exhausted(&format!("eligibility evaluation of student {}", student_id)))
    }

    /// Re-run the gates and refresh the flags of an existing Examination
    /// record. Its status is left alone; no record is created.
    pub async fn revalidate_eligibility(&self, student_id: &StudentId) -> ClearanceResult<EligibilityReport> {
        let exam_key = StageKey::student(Department::Examination, student_id.clone())?;
        for attempt in 1..=self.attempts() {
            let report = self.assess(student_id).await?;
            let Some(mut record) = self.storage.get_stage(&exam_key).await? else {
                tracing::debug!(student = %student_id, "No examination record to revalidate");
                return Ok(report);
            };

            let derived = Checklist::Examination(report.examination_checklist());
            if record.checklist == derived {
                return Ok(report);
            }
            record.refresh_derived_checklist(derived)?;
            let mut unit = UnitOfWork::new();
            unit.put_stage(record);

            match self.commit(unit, "revalidate_eligibility", attempt).await? {
                Attempt::Done(_) => {
                    tracing::info!(
                        student = %student_id,
                        eligible = report.eligible,
                        passed = report.has_passed_all_courses,
                        "Examination flags revalidated"
                    );
                    self.publish(
                        vec![ClearanceEvent::EligibilityRevalidated {
                            student_id: student_id.clone(),
                            eligible: report.eligible,
                            has_passed_all_courses: report.has_passed_all_courses,
                        }],
                        &system_actor(),
                    )
                    .await;
                    return Ok(report);
                }
                Attempt::Retry => continue,
            }
        }
        Err(self.exhausted(&format!("revalidation of student {}", student_id)))
    }

    async fn assess(&self, student_id: &StudentId) -> ClearanceResult<EligibilityReport> {
        let aggregate = self
            .storage
            .get_student_aggregate(student_id)
            .await?
            .ok_or_else(|| {
                ClearanceError::Precondition(format!(
                    "clearance has not started for student {}",
                    student_id
                ))
            })?;
        let entries = self.storage.list_ledger_entries(student_id).await?;
        let courses = self.storage.list_course_records(student_id).await?;
        self.evaluator.assess(&aggregate, &entries, &courses)
    }

    // ── Ledger ───────────────────────────────────────────────────────

    pub async fn record_ledger_entry(&self, request: EntryRequest) -> ClearanceResult<LedgerEntry> {
        let entry = self.ledger.record_entry(request).await?;
        self.publish(
            vec![ClearanceEvent::LedgerEntryRecorded {
                entry_id: entry.id.clone(),
                student_id: entry.student_id.clone(),
                kind: entry.kind,
                amount_minor: entry.amount_minor,
            }],
            &system_actor(),
        )
        .await;
        Ok(entry)
    }

    pub async fn approve_ledger_entry(
        &self,
        id: &LedgerEntryId,
        actor: &ActorId,
    ) -> ClearanceResult<LedgerEntry> {
        let entry = self.ledger.approve_entry(id, actor).await?;
        self.publish(
            vec![ClearanceEvent::LedgerEntryApproved {
                entry_id: entry.id.clone(),
                student_id: entry.student_id.clone(),
                balance_after_minor: entry.balance_after_minor.unwrap_or_default(),
            }],
            actor,
        )
        .await;
        Ok(entry)
    }

    pub async fn reject_ledger_entry(
        &self,
        id: &LedgerEntryId,
        actor: &ActorId,
        reason: &str,
    ) -> ClearanceResult<LedgerEntry> {
        let entry = self.ledger.reject_entry(id, actor, reason).await?;
        self.publish(
            vec![ClearanceEvent::LedgerEntryRejected {
                entry_id: entry.id.clone(),
                student_id: entry.student_id.clone(),
                reason: entry.rejection_reason.clone().unwrap_or_default(),
            }],
            actor,
        )
        .await;
        Ok(entry)
    }

    pub async fn statement(&self, student_id: &StudentId) -> ClearanceResult<LedgerStatement> {
        self.ledger.statement(student_id).await
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn stage(&self, key: &StageKey) -> ClearanceResult<Option<StageRecord>> {
        Ok(self.storage.get_stage(key).await?)
    }

    /// Transition log of a stage, oldest first
    pub async fn history(&self, key: &StageKey) -> ClearanceResult<Vec<HistoryEntry>> {
        Ok(self.require_stage(key).await?.history)
    }

    pub async fn student_clearance(
        &self,
        student_id: &StudentId,
    ) -> ClearanceResult<Option<StudentClearanceAggregate>> {
        Ok(self.storage.get_student_aggregate(student_id).await?)
    }

    pub async fn group_progress(&self, group_id: &GroupId) -> ClearanceResult<Option<GroupAggregate>> {
        Ok(self.storage.get_group_aggregate(group_id).await?)
    }

    /// Verify that every member mirrors the group's phase-one slots
    pub async fn audit_group(&self, group_id: &GroupId) -> ClearanceResult<()> {
        let Some(group) = self.storage.get_group_aggregate(group_id).await? else {
            return Ok(());
        };
        if group.phase_one_cleared != group.compute_phase_one() {
            return Err(ClearanceError::Consistency(format!(
                "group {} phase-one flag disagrees with its slots",
                group_id
            )));
        }
        for member in &group.members {
            let aggregate = self
                .storage
                .get_student_aggregate(member)
                .await?
                .ok_or_else(|| {
                    ClearanceError::Consistency(format!(
                        "student {} of group {} has no clearance record",
                        member, group_id
                    ))
                })?;
            for dept in Department::PHASE_ONE {
                if aggregate.slot(dept).status != group.status_of(dept) {
                    return Err(ClearanceError::Consistency(format!(
                        "student {} shows {} {} while group {} shows {}",
                        member,
                        dept,
                        aggregate.slot(dept).status,
                        group_id,
                        group.status_of(dept)
                    )));
                }
            }
            if aggregate.final_status != aggregate.compute_final_status() {
                return Err(ClearanceError::Consistency(format!(
                    "student {} final status disagrees with its slots",
                    member
                )));
            }
        }
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn load_context(&self, record: &StageRecord) -> ClearanceResult<PropagationContext> {
        let group_id = match &record.key.subject {
            Subject::Group(group_id) => group_id.clone(),
            Subject::Student(student_id) => {
                self.storage
                    .get_student_aggregate(student_id)
                    .await?
                    .ok_or_else(|| {
                        ClearanceError::Consistency(format!(
                            "student {} has a {} but no clearance record",
                            student_id, record.key.department
                        ))
                    })?
                    .group_id
            }
        };

        let group = self.require_group(&group_id).await?;
        let group_aggregate = self
            .storage
            .get_group_aggregate(&group_id)
            .await?
            .ok_or_else(|| {
                ClearanceError::Consistency(format!("group {} has no clearance progress", group_id))
            })?;

        let mut members = BTreeMap::new();
        let mut profiles = BTreeMap::new();
        for member in &group_aggregate.members {
            if let Some(aggregate) = self.storage.get_student_aggregate(member).await? {
                members.insert(member.clone(), aggregate);
            }
            if let Some(profile) = self.storage.get_profile(member).await? {
                profiles.insert(member.clone(), profile);
            }
        }

        let mut existing = BTreeSet::new();
        if record.is_approved() {
            for next_key in self
                .propagation
                .downstream_keys(&record.key, &group_aggregate.members)?
            {
                if self.storage.get_stage(&next_key).await?.is_some() {
                    existing.insert(next_key);
                }
            }
        }

        Ok(PropagationContext {
            group,
            group_aggregate,
            members,
            profiles,
            existing,
        })
    }

    async fn commit(
        &self,
        unit: UnitOfWork,
        operation: &str,
        attempt: u32,
    ) -> ClearanceResult<Attempt<CommitReceipt>> {
        match self.storage.commit(unit).await {
            Ok(receipt) => Ok(Attempt::Done(receipt)),
            Err(err) if err.is_conflict() => {
                tracing::warn!(operation, attempt, error = %err, "Commit conflicted, retrying from a fresh read");
                Ok(Attempt::Retry)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn exhausted(&self, what: &str) -> ClearanceError {
        tracing::warn!(attempts = self.attempts(), "{} gave up", what);
        ClearanceError::Consistency(format!(
            "{} did not commit after {} attempts; nothing was applied",
            what,
            self.attempts()
        ))
    }

    async fn publish(&self, events: Vec<ClearanceEvent>, actor: &ActorId) {
        for event in events {
            let name = event.name();
            let envelope = ClearanceEventEnvelope::new(event, Some(actor.clone()));
            let delivery = tokio::time::timeout(
                std::time::Duration::from_millis(self.config.propagation.sink_timeout_ms),
                self.sink.publish(envelope),
            )
            .await;
            match delivery {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(event = name, error = %err, "Event sink failed; transition stays committed");
                }
                Err(_) => {
                    tracing::warn!(
                        event = name,
                        timeout_ms = self.config.propagation.sink_timeout_ms,
                        "Event sink timed out; transition stays committed"
                    );
                }
            }
        }
    }

    async fn require_stage(&self, key: &StageKey) -> ClearanceResult<StageRecord> {
        self.storage
            .get_stage(key)
            .await?
            .ok_or_else(|| ClearanceError::NotFound(format!("no {} has been opened", key)))
    }

    async fn require_profile(&self, student_id: &StudentId) -> ClearanceResult<StudentProfile> {
        self.storage
            .get_profile(student_id)
            .await?
            .ok_or_else(|| ClearanceError::NotFound(format!("student {} not found", student_id)))
    }

    async fn require_group(&self, group_id: &GroupId) -> ClearanceResult<Group> {
        self.storage
            .get_group(group_id)
            .await?
            .ok_or_else(|| ClearanceError::NotFound(format!("group {} not found", group_id)))
    }
}
