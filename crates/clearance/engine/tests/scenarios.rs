//! End-to-end clearance scenarios over the in-memory store

mod common;

use clearance_engine::{ClearanceService, EngineConfig, RecordingSink};
use clearance_store::{DirectoryStore, StageStore};
use clearance_types::*;
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn test_incomplete_faculty_checklist_is_refused() {
    let (service, group_id, _) = seeded_service(EngineConfig::default(), 4, 0).await;
    start(&service, &group_id).await;
    let key = group_key(Department::Faculty, &group_id);

    let err = service
        .approve_stage(&key, Checklist::empty(Department::Faculty), &staff("faculty-1"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.reason().contains("thesis_submitted"));
    assert!(err.reason().contains("supervisor_corrected"));
    assert!(service.history(&key).await.unwrap().is_empty());
    assert!(service.stage(&key).await.unwrap().unwrap().is_pending());
}

#[tokio::test]
async fn test_single_missing_flag_is_named() {
    let (service, group_id, _) = seeded_service(EngineConfig::default(), 2, 0).await;
    start(&service, &group_id).await;
    let checklist = Checklist::Faculty(FacultyChecklist {
        soft_copy_received: false,
        ..FacultyChecklist::complete()
    });
    let err = service
        .approve_stage(&group_key(Department::Faculty, &group_id), checklist, &staff("f"))
        .await
        .unwrap_err();
    assert!(err.reason().ends_with("soft_copy_received"));
}

#[tokio::test]
async fn test_faculty_approval_opens_library_for_the_group() {
    let (service, group_id, students) = seeded_service(EngineConfig::default(), 4, 0).await;
    start(&service, &group_id).await;

    let faculty = service
        .approve_stage(
            &group_key(Department::Faculty, &group_id),
            Checklist::Faculty(FacultyChecklist::complete()),
            &staff("faculty-1"),
        )
        .await
        .unwrap();
    assert!(faculty.is_approved());
    assert!(faculty.cleared_at.is_some());

    let library = service
        .stage(&group_key(Department::Library, &group_id))
        .await
        .unwrap()
        .expect("library stage opened");
    assert_eq!(library.status, StageStatus::Pending);
    assert!(library.prerequisite_cleared);

    for student in &students {
        let clearance = service.student_clearance(student).await.unwrap().unwrap();
        assert_eq!(clearance.faculty.status, StageStatus::Approved);
        assert_eq!(clearance.library.status, StageStatus::Pending);
    }
    let progress = service.group_progress(&group_id).await.unwrap().unwrap();
    assert_eq!(progress.status_of(Department::Faculty), StageStatus::Approved);
    assert!(!progress.phase_one_cleared);
    service.audit_group(&group_id).await.unwrap();
}

#[tokio::test]
async fn test_library_rejection_and_resubmission() {
    let (service, group_id, students) = seeded_service(EngineConfig::default(), 4, 0).await;
    start(&service, &group_id).await;
    service
        .approve_stage(
            &group_key(Department::Faculty, &group_id),
            Checklist::Faculty(FacultyChecklist::complete()),
            &staff("faculty-1"),
        )
        .await
        .unwrap();
    let library_key = group_key(Department::Library, &group_id);

    let rejected = service
        .reject_stage(&library_key, "missing book", &staff("library-1"))
        .await
        .unwrap();
    assert_eq!(rejected.rejection_reason.as_deref(), Some("missing book"));
    for student in &students {
        let clearance = service.student_clearance(student).await.unwrap().unwrap();
        assert_eq!(clearance.library.status, StageStatus::Rejected);
    }
    assert!(service
        .stage(&group_key(Department::Lab, &group_id))
        .await
        .unwrap()
        .is_none());

    let resubmitted = service
        .resubmit_stage(&library_key, &staff("s1"))
        .await
        .unwrap();
    assert_eq!(resubmitted.status, StageStatus::Pending);
    assert_eq!(resubmitted.resubmission_count, 1);
    assert_eq!(resubmitted.rejection_reason, None);

    let history = service.history(&library_key).await.unwrap();
    let statuses: Vec<_> = history.iter().map(|h| h.status).collect();
    assert_eq!(statuses, vec![StageStatus::Rejected, StageStatus::Pending]);
    assert_eq!(history[0].actor, staff("library-1"));
    assert_eq!(history[1].actor, staff("s1"));

    for student in &students {
        let clearance = service.student_clearance(student).await.unwrap().unwrap();
        assert_eq!(clearance.library.status, StageStatus::Pending);
    }
}

#[tokio::test]
async fn test_lab_without_items_cannot_be_rejected() {
    let (service, group_id, _) = seeded_service(EngineConfig::default(), 2, 0).await;
    start(&service, &group_id).await;
    service
        .approve_stage(
            &group_key(Department::Faculty, &group_id),
            Checklist::Faculty(FacultyChecklist::complete()),
            &staff("faculty-1"),
        )
        .await
        .unwrap();
    service
        .approve_stage(
            &group_key(Department::Library, &group_id),
            Checklist::Library(LibraryChecklist {
                thesis_book_received: true,
            }),
            &staff("library-1"),
        )
        .await
        .unwrap();

    let lab_key = group_key(Department::Lab, &group_id);
    let err = service
        .reject_stage(&lab_key, "equipment missing", &staff("lab-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(service.history(&lab_key).await.unwrap().is_empty());

    let lab = service
        .approve_stage(&lab_key, Checklist::empty(Department::Lab), &staff("lab-1"))
        .await
        .unwrap();
    assert!(lab.is_approved());
    assert!(service.group_progress(&group_id).await.unwrap().unwrap().phase_one_cleared);
}

#[tokio::test]
async fn test_lab_expectation_comes_from_group_inventory() {
    let (service, group_id, _) = seeded_service(EngineConfig::default(), 2, 3).await;
    start(&service, &group_id).await;
    service
        .approve_stage(
            &group_key(Department::Faculty, &group_id),
            Checklist::Faculty(FacultyChecklist::complete()),
            &staff("f"),
        )
        .await
        .unwrap();
    service
        .approve_stage(
            &group_key(Department::Library, &group_id),
            Checklist::Library(LibraryChecklist {
                thesis_book_received: true,
            }),
            &staff("l"),
        )
        .await
        .unwrap();

    let lab_key = group_key(Department::Lab, &group_id);
    // a caller cannot lower the expectation by submitting zero
    let err = service
        .approve_stage(
            &lab_key,
            Checklist::Lab(LabChecklist {
                expected_items: 0,
                returned_items: 2,
            }),
            &staff("lab-1"),
        )
        .await
        .unwrap_err();
    assert!(err.reason().contains("returned_items (2 of 3)"));

    service
        .update_checklist(
            &lab_key,
            Checklist::Lab(LabChecklist {
                expected_items: 0,
                returned_items: 2,
            }),
            &staff("lab-1"),
        )
        .await
        .unwrap();
    let stored = service.stage(&lab_key).await.unwrap().unwrap();
    assert_eq!(
        stored.checklist,
        Checklist::Lab(LabChecklist {
            expected_items: 3,
            returned_items: 2,
        })
    );
    assert!(stored.history.is_empty());
}

#[tokio::test]
async fn test_fee_residue_with_tolerance() {
    let config = EngineConfig::default().with_fee_tolerance(1);
    let (service, group_id, students) = seeded_service(config, 1, 0).await;
    clear_phase_one(&service, &group_id, 0).await;
    let student = &students[0];
    pay_fee(&service, student, 25_000, 24_999).await;

    assert_eq!(
        service.ledger().graduation_fee_remaining(student).await.unwrap(),
        1
    );
    let report = service.evaluate_eligibility(student).await.unwrap();
    assert!(!report.eligible);
    assert!(report.fee_settled);
    assert!(report.reason.contains("finance stage pending"));

    service
        .approve_stage(
            &student_key(Department::Finance, student),
            Checklist::empty(Department::Finance),
            &staff("finance-1"),
        )
        .await
        .unwrap();
    assert!(service
        .stage(&student_key(Department::Examination, student))
        .await
        .unwrap()
        .is_some());

    let report = service.evaluate_eligibility(student).await.unwrap();
    assert!(report.eligible);
    assert!(report.finance_approved);
    assert!(!report.examination_created);
}

#[tokio::test]
async fn test_rejected_finance_keeps_examination_closed() {
    let (service, group_id, students) = seeded_service(EngineConfig::default(), 1, 0).await;
    clear_phase_one(&service, &group_id, 0).await;
    let student = &students[0];
    let finance_key = student_key(Department::Finance, student);
    let exam_key = student_key(Department::Examination, student);

    service
        .reject_stage(&finance_key, "bursar hold", &staff("finance-1"))
        .await
        .unwrap();
    pay_fee(&service, student, 25_000, 25_000).await;

    let report = service.evaluate_eligibility(student).await.unwrap();
    assert!(report.phase_one_cleared);
    assert!(report.fee_settled);
    assert!(!report.finance_approved);
    assert!(!report.eligible);
    assert!(!report.examination_created);
    assert!(report.reason.contains("finance stage rejected"));
    assert!(service.stage(&exam_key).await.unwrap().is_none());

    let err = service
        .approve_stage(
            &exam_key,
            Checklist::empty(Department::Examination),
            &staff("exam-1"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    service
        .resubmit_stage(&finance_key, &staff("s1"))
        .await
        .unwrap();
    service
        .approve_stage(
            &finance_key,
            Checklist::empty(Department::Finance),
            &staff("finance-1"),
        )
        .await
        .unwrap();
    assert!(service.stage(&exam_key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_fee_residue_without_tolerance() {
    let (service, group_id, students) = seeded_service(EngineConfig::default(), 1, 0).await;
    clear_phase_one(&service, &group_id, 0).await;
    let student = &students[0];
    pay_fee(&service, student, 25_000, 24_999).await;

    let report = service.evaluate_eligibility(student).await.unwrap();
    assert!(!report.eligible);
    assert!(!report.examination_created);
    assert!(report.reason.contains("0.01"));
    assert!(service
        .stage(&student_key(Department::Examination, student))
        .await
        .unwrap()
        .is_none());

    let err = service
        .approve_stage(
            &student_key(Department::Finance, student),
            Checklist::empty(Department::Finance),
            &staff("finance-1"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.reason().contains("0.01 outstanding"));
}

#[tokio::test]
async fn test_full_clearance_to_cleared() {
    let sink = Arc::new(RecordingSink::new());
    let (service, group_id, students) = seeded_service(EngineConfig::default(), 2, 1).await;
    let service = service.with_sink(sink.clone());
    clear_phase_one(&service, &group_id, 1).await;

    for student in &students {
        let finance_key = student_key(Department::Finance, student);
        let finance = service.stage(&finance_key).await.unwrap().unwrap();
        assert!(finance.prerequisite_cleared);

        pay_fee(&service, student, 25_000, 25_000).await;
        service
            .approve_stage(&finance_key, Checklist::empty(Department::Finance), &staff("finance-1"))
            .await
            .unwrap();

        // finance approval hands off to examination once every gate passes
        let exam_key = student_key(Department::Examination, student);
        let exam = service.stage(&exam_key).await.unwrap().unwrap();
        assert_eq!(
            exam.checklist,
            Checklist::Examination(ExaminationChecklist {
                has_passed_all_courses: true,
                can_graduate: true,
            })
        );
        service
            .approve_stage(&exam_key, Checklist::empty(Department::Examination), &staff("exam-1"))
            .await
            .unwrap();

        let clearance = service.student_clearance(student).await.unwrap().unwrap();
        assert_eq!(clearance.final_status, FinalStatus::Cleared);
        let profile = service.storage().get_profile(student).await.unwrap().unwrap();
        assert_eq!(profile.clearance_status, ProfileClearanceStatus::Cleared);
    }

    let progress = service.group_progress(&group_id).await.unwrap().unwrap();
    assert_eq!(progress.status_of(Department::Finance), StageStatus::Approved);
    assert_eq!(progress.status_of(Department::Examination), StageStatus::Approved);
    service.audit_group(&group_id).await.unwrap();

    let names = sink.names();
    assert_eq!(names.iter().filter(|n| **n == "student_cleared").count(), 2);
    assert_eq!(names.iter().filter(|n| **n == "stage_approved").count(), 7);
    assert!(names.contains(&"clearance_started"));
    assert!(names.contains(&"ledger_entry_approved"));
}

#[tokio::test]
async fn test_failed_course_blocks_examination_until_revalidated() {
    let (service, group_id, students) = seeded_service(EngineConfig::default(), 1, 0).await;
    let student = &students[0];
    service
        .record_course_result(CourseRecord::new(student.clone(), "CS499", false))
        .await
        .unwrap();
    clear_phase_one(&service, &group_id, 0).await;
    pay_fee(&service, student, 25_000, 25_000).await;
    service
        .approve_stage(
            &student_key(Department::Finance, student),
            Checklist::empty(Department::Finance),
            &staff("finance-1"),
        )
        .await
        .unwrap();

    let exam_key = student_key(Department::Examination, student);
    let exam = service.stage(&exam_key).await.unwrap().unwrap();
    assert_eq!(
        exam.checklist,
        Checklist::Examination(ExaminationChecklist {
            has_passed_all_courses: false,
            can_graduate: false,
        })
    );
    let err = service
        .approve_stage(&exam_key, Checklist::empty(Department::Examination), &staff("exam-1"))
        .await
        .unwrap_err();
    assert!(err.reason().contains("has_passed_all_courses"));

    // re-exam passed
    service
        .record_course_result(CourseRecord::new(student.clone(), "CS499", true))
        .await
        .unwrap();
    let report = service.revalidate_eligibility(student).await.unwrap();
    assert!(report.has_passed_all_courses);

    let exam = service.stage(&exam_key).await.unwrap().unwrap();
    assert!(exam.is_pending());
    assert!(exam.history.is_empty());
    assert!(exam.checklist.is_complete());

    service
        .approve_stage(&exam_key, Checklist::empty(Department::Examination), &staff("exam-1"))
        .await
        .unwrap();
    assert!(service
        .student_clearance(student)
        .await
        .unwrap()
        .unwrap()
        .is_cleared());
}

#[tokio::test]
async fn test_revalidate_without_examination_record_creates_nothing() {
    let (service, group_id, students) = seeded_service(EngineConfig::default(), 1, 0).await;
    start(&service, &group_id).await;
    let report = service.revalidate_eligibility(&students[0]).await.unwrap();
    assert!(!report.eligible);
    assert!(!report.phase_one_cleared);
    assert!(service
        .stage(&student_key(Department::Examination, &students[0]))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_start_guards() {
    let service = ClearanceService::in_memory(EngineConfig::default()).unwrap();
    service
        .register_student(StudentProfile::new(StudentId::new("s1"), "Ana", 4, 4))
        .await
        .unwrap();
    service
        .register_student(StudentProfile::new(StudentId::new("s2"), "Ben", 3, 4))
        .await
        .unwrap();
    service
        .register_student(StudentProfile::new(StudentId::new("s3"), "Cy", 4, 4))
        .await
        .unwrap();
    service
        .register_group(
            Group::new(GroupId::new("g1"), "Thesis A")
                .with_member(StudentId::new("s1"))
                .with_member(StudentId::new("s2")),
        )
        .await
        .unwrap();
    let actor = staff("faculty-1");

    // not grouped
    let err = service
        .start_clearance(Subject::Student(StudentId::new("s3")), Department::Faculty, &actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    // s2 is not in the graduation year
    let err = service
        .start_clearance(Subject::Student(StudentId::new("s1")), Department::Faculty, &actor)
        .await
        .unwrap_err();
    assert!(err.reason().contains("s2"));

    // only faculty can be started
    let err = service
        .start_clearance(Subject::Group(GroupId::new("g1")), Department::Library, &actor)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    // nothing was opened by the refused attempts
    assert!(service
        .stage(&group_key(Department::Faculty, &GroupId::new("g1")))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_start_twice_is_invalid_state() {
    let (service, group_id, students) = seeded_service(EngineConfig::default(), 2, 0).await;
    start(&service, &group_id).await;
    let profile = service.storage().get_profile(&students[0]).await.unwrap().unwrap();
    assert_eq!(profile.clearance_status, ProfileClearanceStatus::InProgress);

    let err = service
        .start_clearance(Subject::Student(students[1].clone()), Department::Faculty, &staff("f"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_decisions_on_unopened_stage_are_not_found() {
    let (service, group_id, _) = seeded_service(EngineConfig::default(), 2, 0).await;
    start(&service, &group_id).await;
    let err = service
        .approve_stage(
            &group_key(Department::Library, &group_id),
            Checklist::Library(LibraryChecklist {
                thesis_book_received: true,
            }),
            &staff("library-1"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_wrong_department_checklist_is_validation() {
    let (service, group_id, _) = seeded_service(EngineConfig::default(), 2, 0).await;
    start(&service, &group_id).await;
    let err = service
        .approve_stage(
            &group_key(Department::Faculty, &group_id),
            Checklist::Library(LibraryChecklist {
                thesis_book_received: true,
            }),
            &staff("faculty-1"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_approved_stage_cannot_be_rejected_later() {
    let (service, group_id, _) = seeded_service(EngineConfig::default(), 2, 0).await;
    clear_phase_one(&service, &group_id, 0).await;

    let lab = service
        .stage(&group_key(Department::Lab, &group_id))
        .await
        .unwrap()
        .unwrap();
    let err = service
        .reject_stage(&lab.key, "late", &staff("lab-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyProcessed);
    assert_eq!(
        service
            .storage()
            .list_stages(Department::Finance)
            .await
            .unwrap()
            .len(),
        2
    );
}
