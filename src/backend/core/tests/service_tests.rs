//! End-to-end service scenarios against the in-memory store.

mod common;

use chrono::{Duration, Utc};
use std::collections::BTreeSet;

use common::{refresh, register, school, service_with, PASSWORD};
use school_core::config::SchoolConfig;
use school_core::error::ErrorCode;
use school_core::identity::{CoarseRole, LoginRequest, RegistrationRequest};
use school_core::rbac::{can_perform, catalog, NewRole, Permission};
use school_core::school::{
    AssignmentUpdate, AttendanceCorrection, AttendanceStatus, DashboardSummary, EnrollOutcome,
    GradeCorrection, NewAttendance, NewGrade, NewSubmission,
};

// ============================================================================
// Registration and tokens
// ============================================================================

#[tokio::test]
async fn test_register_links_default_role_and_authenticates() {
    let service = common::service().await;
    let member = register(&service, "teacher.ann", CoarseRole::Teacher).await;

    assert_eq!(member.principal.role, Some(CoarseRole::Teacher));
    let linked = member.principal.linked_role.as_ref().unwrap();
    assert_eq!(linked.name, "Teacher");
    assert!(can_perform(&member.principal, Some(catalog::MARK_ATTENDANCE)));
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_input() {
    let service = common::service().await;
    register(&service, "dup", CoarseRole::Student).await;

    let again = RegistrationRequest::new("dup", "another@school.test", PASSWORD);
    assert_eq!(
        service.register(again).await.unwrap_err().code(),
        ErrorCode::Conflict
    );

    let mut mismatch = RegistrationRequest::new("fresh", "fresh@school.test", PASSWORD);
    mismatch.password_confirm = "something-else-9".to_string();
    assert_eq!(
        service.register(mismatch).await.unwrap_err().code(),
        ErrorCode::ValidationError
    );

    let weak = RegistrationRequest::new("weakling", "weak@school.test", "12345678");
    assert_eq!(
        service.register(weak).await.unwrap_err().code(),
        ErrorCode::ValidationError
    );

    let unknown = RegistrationRequest::new("nobody", "nobody@school.test", PASSWORD)
        .with_role_name("Librarian");
    assert_eq!(
        service.register(unknown).await.unwrap_err().code(),
        ErrorCode::ValidationError
    );
}

#[tokio::test]
async fn test_login_reuses_active_token_and_logout_revokes_it() {
    let service = common::service().await;
    let member = register(&service, "reuse", CoarseRole::Student).await;

    let login = || LoginRequest {
        username: "reuse".to_string(),
        password: PASSWORD.to_string(),
    };
    let first = service.login(login()).await.unwrap();
    assert_eq!(first.token, member.token);

    service.logout(&first.token).await.unwrap();
    assert_eq!(
        service.authenticate(&first.token).await.unwrap_err().code(),
        ErrorCode::InvalidToken
    );
    assert_eq!(
        service.logout(&first.token).await.unwrap_err().code(),
        ErrorCode::InvalidToken
    );

    let second = service.login(login()).await.unwrap();
    assert_ne!(second.token, first.token);
    assert!(service.authenticate(&second.token).await.is_ok());
}

#[tokio::test]
async fn test_login_with_wrong_password_is_unauthenticated() {
    let service = common::service().await;
    register(&service, "careful", CoarseRole::Student).await;

    let err = service
        .login(LoginRequest {
            username: "careful".to_string(),
            password: "Wrong-Password-1".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthenticated);
}

// ============================================================================
// Permission graph
// ============================================================================

#[tokio::test]
async fn test_grader_role_grants_capability_after_linking() {
    let school = school().await;
    let admin = &school.admin.principal;
    for code in ["grade:write", "grade:read"] {
        school
            .service
            .create_permission(admin, Permission::new(code, code))
            .await
            .unwrap();
    }
    let grader = school
        .service
        .create_role(admin, NewRole::new("Grader", &["grade:write", "grade:read"]))
        .await
        .unwrap();

    // A student with no linked Role at all.
    let member = register(&school.service, "plain", CoarseRole::Student).await;
    let account_id = member.principal.account_id.unwrap();
    school.service.link_role(admin, account_id, None).await.unwrap();
    let member = refresh(&school.service, &member).await;
    assert!(member.principal.linked_role.is_none());
    assert!(!can_perform(&member.principal, Some("grade:write")));

    let view = school
        .service
        .link_role(admin, account_id, Some(grader.id))
        .await
        .unwrap();
    assert_eq!(view.role, CoarseRole::Student);
    let member = refresh(&school.service, &member).await;
    assert!(can_perform(&member.principal, Some("grade:write")));
}

#[tokio::test]
async fn test_create_role_rejects_unknown_permission_and_duplicates() {
    let school = school().await;
    let admin = &school.admin.principal;

    let err = school
        .service
        .create_role(admin, NewRole::new("Ghost", &["does:not:exist"]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = school
        .service
        .create_role(admin, NewRole::new("teacher", &[catalog::VIEW_CLASSES]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);

    let err = school
        .service
        .create_permission(admin, Permission::new(catalog::VIEW_CLASSES, "dup"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
}

#[tokio::test]
async fn test_deleted_permission_drops_out_of_roles_until_recreated() {
    let school = school().await;
    let admin = &school.admin.principal;
    school
        .service
        .create_permission(admin, Permission::new("grade:write", "Write grades"))
        .await
        .unwrap();
    school
        .service
        .create_role(admin, NewRole::new("Grader", &["grade:write"]))
        .await
        .unwrap();

    async fn grader_codes(school: &common::School) -> BTreeSet<String> {
        school
            .service
            .list_roles(&school.admin.principal)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.name == "Grader")
            .unwrap()
            .permissions
    }

    school.service.delete_permission(admin, "grade:write").await.unwrap();
    assert!(grader_codes(&school).await.is_empty());

    school
        .service
        .create_permission(admin, Permission::new("grade:write", "Write grades"))
        .await
        .unwrap();
    assert!(grader_codes(&school).await.contains("grade:write"));
}

#[tokio::test]
async fn test_linking_admin_category_role_promotes_account() {
    let school = school().await;
    let admin = &school.admin.principal;
    let member = register(&school.service, "promoted", CoarseRole::Teacher).await;

    let roles = school.service.list_roles(admin).await.unwrap();
    let admin_role = roles.iter().find(|r| r.name == "Admin").unwrap();
    let view = school
        .service
        .link_role(admin, member.principal.account_id.unwrap(), Some(admin_role.id))
        .await
        .unwrap();
    assert_eq!(view.role, CoarseRole::Admin);
}

#[tokio::test]
async fn test_non_admin_cannot_manage_roles() {
    let school = school().await;
    let member = register(&school.service, "curious", CoarseRole::Teacher).await;

    let err = school
        .service
        .list_roles(&member.principal)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

// ============================================================================
// Enrollment
// ============================================================================

#[tokio::test]
async fn test_enrollment_respects_capacity() {
    let school = school().await;
    let admin = &school.admin.principal;
    let (_, teacher) = school.teacher("t.one", "E-1").await;
    let (_, first) = school.student("s.one", "S-1").await;
    let (_, second) = school.student("s.two", "S-2").await;
    let subject = school.subject("CHEM").await;
    let class = school.class(&subject, &teacher, 1).await;

    assert_eq!(
        school.service.enroll(admin, class.id, first.id).await.unwrap(),
        EnrollOutcome::Enrolled
    );
    assert_eq!(
        school.service.enroll(admin, class.id, first.id).await.unwrap(),
        EnrollOutcome::AlreadyEnrolled
    );
    assert_eq!(
        school.service.enroll(admin, class.id, second.id).await.unwrap_err().code(),
        ErrorCode::CapacityExceeded
    );

    school.service.unenroll(admin, class.id, first.id).await.unwrap();
    assert_eq!(
        school.service.unenroll(admin, class.id, first.id).await.unwrap_err().code(),
        ErrorCode::NotEnrolled
    );
    assert_eq!(
        school.service.enroll(admin, class.id, second.id).await.unwrap(),
        EnrollOutcome::Enrolled
    );
}

#[tokio::test]
async fn test_teacher_cannot_enroll_into_another_teachers_class() {
    let school = school().await;
    let (_, owner) = school.teacher("t.owner", "E-1").await;
    let (other, _) = school.teacher("t.other", "E-2").await;
    let (_, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("BIO").await;
    let class = school.class(&subject, &owner, 10).await;

    let err = school
        .service
        .enroll(&other.principal, class.id, student.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);
}

// ============================================================================
// Attendance and grades
// ============================================================================

#[tokio::test]
async fn test_attendance_is_unique_and_scoped() {
    let school = school().await;
    let admin = &school.admin.principal;
    let (teacher, teacher_profile) = school.teacher("t.one", "E-1").await;
    let (outsider, _) = school.teacher("t.two", "E-2").await;
    let (pupil, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("MATH").await;
    let class = school.class(&subject, &teacher_profile, 10).await;
    school.service.enroll(admin, class.id, student.id).await.unwrap();

    let request = || NewAttendance {
        student_id: student.id,
        class_id: class.id,
        date: Some(Utc::now().date_naive()),
        status: AttendanceStatus::Present,
        remarks: None,
    };
    let record = school
        .service
        .mark_attendance(&teacher.principal, request())
        .await
        .unwrap();
    assert_eq!(
        school
            .service
            .mark_attendance(&teacher.principal, request())
            .await
            .unwrap_err()
            .code(),
        ErrorCode::Conflict
    );

    let ids = |rows: Vec<school_core::school::Attendance>| {
        rows.into_iter().map(|r| r.id).collect::<Vec<_>>()
    };
    assert_eq!(
        ids(school.service.list_attendance(&teacher.principal).await.unwrap()),
        vec![record.id]
    );
    assert_eq!(
        ids(school.service.list_attendance(&pupil.principal).await.unwrap()),
        vec![record.id]
    );
    assert!(school
        .service
        .list_attendance(&outsider.principal)
        .await
        .unwrap()
        .is_empty());

    // Only the marking teacher or an admin corrects a mark.
    let correction = || AttendanceCorrection {
        status: AttendanceStatus::Late,
        remarks: Some("Bus delay".to_string()),
    };
    assert_eq!(
        school
            .service
            .correct_attendance(&outsider.principal, record.id, correction())
            .await
            .unwrap_err()
            .code(),
        ErrorCode::Forbidden
    );
    let corrected = school
        .service
        .correct_attendance(&teacher.principal, record.id, correction())
        .await
        .unwrap();
    assert_eq!(corrected.status, AttendanceStatus::Late);
}

#[tokio::test]
async fn test_attendance_requires_enrollment() {
    let school = school().await;
    let (teacher, profile) = school.teacher("t.one", "E-1").await;
    let (_, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("ART").await;
    let class = school.class(&subject, &profile, 10).await;

    let err = school
        .service
        .mark_attendance(
            &teacher.principal,
            NewAttendance {
                student_id: student.id,
                class_id: class.id,
                date: None,
                status: AttendanceStatus::Absent,
                remarks: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotEnrolled);
}

#[tokio::test]
async fn test_grades_are_owned_by_student_and_grader() {
    let school = school().await;
    let (teacher, _) = school.teacher("t.one", "E-1").await;
    let (other_teacher, _) = school.teacher("t.two", "E-2").await;
    let (pupil, student) = school.student("s.one", "S-1").await;
    let (classmate, _) = school.student("s.two", "S-2").await;
    let subject = school.subject("HIST").await;

    let grade = school
        .service
        .record_grade(
            &teacher.principal,
            NewGrade {
                student_id: student.id,
                subject_id: subject.id,
                teacher_id: None,
                assignment_name: "Essay".to_string(),
                score: 88.0,
                max_grade: None,
                comments: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(grade.max_grade, 100.0);

    assert!(school.service.get_grade(&pupil.principal, grade.id).await.is_ok());
    assert_eq!(
        school
            .service
            .get_grade(&classmate.principal, grade.id)
            .await
            .unwrap_err()
            .code(),
        ErrorCode::Forbidden
    );

    let correction = || GradeCorrection {
        score: 91.0,
        comments: None,
    };
    assert_eq!(
        school
            .service
            .correct_grade(&other_teacher.principal, grade.id, correction())
            .await
            .unwrap_err()
            .code(),
        ErrorCode::Forbidden
    );
    let corrected = school
        .service
        .correct_grade(&teacher.principal, grade.id, correction())
        .await
        .unwrap();
    assert_eq!(corrected.score, 91.0);

    // Students hold no grading capability at all.
    assert_eq!(
        school
            .service
            .correct_grade(&pupil.principal, grade.id, correction())
            .await
            .unwrap_err()
            .code(),
        ErrorCode::Forbidden
    );
}

#[tokio::test]
async fn test_teacher_without_profile_cannot_grade() {
    let school = school().await;
    let (_, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("GEO").await;
    let bare = register(&school.service, "t.bare", CoarseRole::Teacher).await;

    let err = school
        .service
        .record_grade(
            &bare.principal,
            NewGrade {
                student_id: student.id,
                subject_id: subject.id,
                teacher_id: None,
                assignment_name: "Quiz".to_string(),
                score: 5.0,
                max_grade: Some(10.0),
                comments: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Forbidden);

    // And sees nothing in scoped lists.
    assert!(school
        .service
        .list_grades(&bare.principal)
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// Assignments and submissions
// ============================================================================

#[tokio::test]
async fn test_submission_lateness_is_frozen() {
    let school = school().await;
    let admin = &school.admin.principal;
    let (_, teacher) = school.teacher("t.one", "E-1").await;
    let (pupil, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("PHYS").await;
    let class = school.class(&subject, &teacher, 10).await;
    school.service.enroll(admin, class.id, student.id).await.unwrap();
    let assignment = school.published_assignment(&class, Duration::days(2)).await;

    let submission = school
        .service
        .submit(
            &pupil.principal,
            NewSubmission {
                assignment_id: assignment.id,
                content: "My report".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(!submission.is_late);

    school
        .service
        .update_assignment(
            admin,
            assignment.id,
            AssignmentUpdate {
                status: None,
                due_date: Some(submission.submitted_at - Duration::hours(1)),
            },
        )
        .await
        .unwrap();

    let stored = school
        .service
        .get_submission(&pupil.principal, submission.id)
        .await
        .unwrap();
    assert!(!stored.is_late);
}

#[tokio::test]
async fn test_submissions_are_unique_per_student() {
    let school = school().await;
    let admin = &school.admin.principal;
    let (teacher, teacher_profile) = school.teacher("t.one", "E-1").await;
    let (pupil, student) = school.student("s.one", "S-1").await;
    let (classmate, _) = school.student("s.two", "S-2").await;
    let subject = school.subject("CS").await;
    let class = school.class(&subject, &teacher_profile, 10).await;
    school.service.enroll(admin, class.id, student.id).await.unwrap();
    let assignment = school.published_assignment(&class, -Duration::hours(1)).await;

    let submit = || NewSubmission {
        assignment_id: assignment.id,
        content: "print('hi')".to_string(),
    };
    let submission = school.service.submit(&pupil.principal, submit()).await.unwrap();
    assert!(submission.is_late);
    assert_eq!(
        school
            .service
            .submit(&pupil.principal, submit())
            .await
            .unwrap_err()
            .code(),
        ErrorCode::Conflict
    );

    // Not enrolled.
    assert_eq!(
        school
            .service
            .submit(&classmate.principal, submit())
            .await
            .unwrap_err()
            .code(),
        ErrorCode::NotEnrolled
    );

    // Teachers cannot submit; they see submissions to their own assignments.
    assert_eq!(
        school
            .service
            .submit(&teacher.principal, submit())
            .await
            .unwrap_err()
            .code(),
        ErrorCode::Forbidden
    );
    assert_eq!(
        school
            .service
            .list_submissions(&teacher.principal)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        school
            .service
            .get_submission(&classmate.principal, submission.id)
            .await
            .unwrap_err()
            .code(),
        ErrorCode::Forbidden
    );
}

#[tokio::test]
async fn test_students_only_see_published_assignments() {
    let school = school().await;
    let admin = &school.admin.principal;
    let (_, teacher) = school.teacher("t.one", "E-1").await;
    let (pupil, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("LIT").await;
    let class = school.class(&subject, &teacher, 10).await;
    school.service.enroll(admin, class.id, student.id).await.unwrap();

    let published = school.published_assignment(&class, Duration::days(1)).await;
    school
        .service
        .create_assignment(
            admin,
            school_core::school::NewAssignment {
                class_id: class.id,
                title: "Draft work".to_string(),
                description: String::new(),
                due_date: Utc::now() + Duration::days(3),
                max_points: Some(10.0),
            },
        )
        .await
        .unwrap();

    let visible = school
        .service
        .list_assignments(&pupil.principal)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, published.id);
    assert_eq!(school.service.list_assignments(admin).await.unwrap().len(), 2);
}

// ============================================================================
// Accounts and dashboard
// ============================================================================

#[tokio::test]
async fn test_deleting_account_removes_profile_and_records() {
    let school = school().await;
    let admin = &school.admin.principal;
    let (teacher, teacher_profile) = school.teacher("t.one", "E-1").await;
    let (pupil, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("MUS").await;
    let class = school.class(&subject, &teacher_profile, 10).await;
    school.service.enroll(admin, class.id, student.id).await.unwrap();
    school
        .service
        .mark_attendance(
            &teacher.principal,
            NewAttendance {
                student_id: student.id,
                class_id: class.id,
                date: None,
                status: AttendanceStatus::Present,
                remarks: None,
            },
        )
        .await
        .unwrap();

    school
        .service
        .delete_account(admin, pupil.principal.account_id.unwrap())
        .await
        .unwrap();

    assert!(school.service.list_students(admin).await.unwrap().is_empty());
    assert!(school.service.list_attendance(admin).await.unwrap().is_empty());
    assert_eq!(
        school.service.authenticate(&pupil.token).await.unwrap_err().code(),
        ErrorCode::InvalidToken
    );
}

#[tokio::test]
async fn test_deleting_marker_keeps_student_attendance() {
    let school = school().await;
    let admin = &school.admin.principal;
    let office = register(&school.service, "office", CoarseRole::Admin).await;
    let (_, teacher_profile) = school.teacher("t.one", "E-1").await;
    let (pupil, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("GEO").await;
    let class = school.class(&subject, &teacher_profile, 10).await;
    school.service.enroll(admin, class.id, student.id).await.unwrap();

    let record = school
        .service
        .mark_attendance(
            &office.principal,
            NewAttendance {
                student_id: student.id,
                class_id: class.id,
                date: None,
                status: AttendanceStatus::Absent,
                remarks: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(record.marked_by, office.principal.account_id);

    school
        .service
        .delete_account(admin, office.principal.account_id.unwrap())
        .await
        .unwrap();

    let rows = school.service.list_attendance(&pupil.principal).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, record.id);
    assert_eq!(rows[0].marked_by, None);

    // Only an admin may correct a mark whose author is gone.
    let corrected = school
        .service
        .correct_attendance(
            admin,
            record.id,
            AttendanceCorrection {
                status: AttendanceStatus::Excused,
                remarks: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(corrected.status, AttendanceStatus::Excused);
}

#[tokio::test]
async fn test_dashboard_with_unusable_window_is_configuration_error() {
    let service = service_with(SchoolConfig {
        recent_window_days: i64::MAX,
        ..SchoolConfig::default()
    })
    .await;
    let admin = register(&service, "principal", CoarseRole::Admin).await;

    let err = service.dashboard(&admin.principal).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigurationError);
}

#[tokio::test]
async fn test_dashboard_matches_role() {
    let school = school().await;
    let admin = &school.admin.principal;
    let (teacher, teacher_profile) = school.teacher("t.one", "E-1").await;
    let (pupil, student) = school.student("s.one", "S-1").await;
    let subject = school.subject("ECO").await;
    let class = school.class(&subject, &teacher_profile, 10).await;
    school.service.enroll(admin, class.id, student.id).await.unwrap();

    assert!(matches!(
        school.service.dashboard(admin).await.unwrap(),
        DashboardSummary::Admin { .. }
    ));
    assert!(matches!(
        school.service.dashboard(&teacher.principal).await.unwrap(),
        DashboardSummary::Teacher { .. }
    ));
    assert!(matches!(
        school.service.dashboard(&pupil.principal).await.unwrap(),
        DashboardSummary::Student { .. }
    ));
}
