//! Role-specific dashboard counters.
//!
//! Every counter is computed over rows that went through
//! [`scope_query`](crate::rbac::scope_query) first.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

use super::models::{
    Assignment, AssignmentStatus, Attendance, Class, Grade, StudentProfile, Subject, Submission,
    TeacherProfile,
};
use crate::error::{Result, SchoolError};
use crate::identity::CoarseRole;
use crate::rbac::{scope_query, Principal, RelationSource};

/// Unfiltered rows handed to [`summarize`].
#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub students: Vec<StudentProfile>,
    pub teachers: Vec<TeacherProfile>,
    pub subjects: Vec<Subject>,
    pub classes: Vec<Class>,
    pub attendance: Vec<Attendance>,
    pub grades: Vec<Grade>,
    pub assignments: Vec<Assignment>,
    pub submissions: Vec<Submission>,
    /// `date_joined` of every account.
    pub registrations: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum DashboardSummary {
    Admin {
        total_students: usize,
        total_teachers: usize,
        total_classes: usize,
        total_subjects: usize,
        recent_registrations: usize,
    },
    Teacher {
        my_classes: usize,
        total_students: usize,
        pending_assignments: usize,
        recent_submissions: usize,
    },
    Student {
        enrolled_classes: usize,
        pending_assignments: usize,
        average_grade: Option<f64>,
        attendance_rate: Option<f64>,
    },
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn summarize(
    principal: &Principal,
    data: DashboardData,
    rel: &dyn RelationSource,
    now: DateTime<Utc>,
    recent_window: Duration,
) -> Result<DashboardSummary> {
    let role = match principal.role {
        Some(role) if principal.is_authenticated() => role,
        _ => {
            return Err(SchoolError::unauthenticated(
                "Authentication credentials were not provided",
            ))
        }
    };
    let since = now - recent_window;

    let classes = scope_query(principal, data.classes, rel);
    let assignments = scope_query(principal, data.assignments, rel);
    let submissions = scope_query(principal, data.submissions, rel);

    let summary = match role {
        CoarseRole::Admin => DashboardSummary::Admin {
            total_students: scope_query(principal, data.students, rel).len(),
            total_teachers: scope_query(principal, data.teachers, rel).len(),
            total_classes: classes.len(),
            total_subjects: scope_query(principal, data.subjects, rel).len(),
            recent_registrations: data.registrations.iter().filter(|at| **at >= since).count(),
        },
        CoarseRole::Teacher => {
            let students: HashSet<_> = classes.iter().flat_map(|c| c.students.iter()).collect();
            DashboardSummary::Teacher {
                my_classes: classes.len(),
                total_students: students.len(),
                pending_assignments: assignments
                    .iter()
                    .filter(|a| a.status == AssignmentStatus::Published && a.due_date > now)
                    .count(),
                recent_submissions: submissions.iter().filter(|s| s.submitted_at >= since).count(),
            }
        }
        CoarseRole::Student => {
            let submitted: HashSet<_> = submissions.iter().map(|s| s.assignment_id).collect();
            let grades = scope_query(principal, data.grades, rel);
            let attendance = scope_query(principal, data.attendance, rel);

            let average_grade = (!grades.is_empty()).then(|| {
                round2(grades.iter().map(Grade::percentage).sum::<f64>() / grades.len() as f64)
            });
            let attendance_rate = (!attendance.is_empty()).then(|| {
                let attended = attendance.iter().filter(|a| a.status.is_attended()).count();
                round2(attended as f64 * 100.0 / attendance.len() as f64)
            });

            DashboardSummary::Student {
                enrolled_classes: classes.len(),
                pending_assignments: assignments
                    .iter()
                    .filter(|a| a.due_date > now && !submitted.contains(&a.id))
                    .count(),
                average_grade,
                attendance_rate,
            }
        }
    };

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Account;
    use crate::ids::{AccountId, AssignmentId, AttendanceId, ClassId, GradeId, StudentId, SubjectId, SubmissionId, TeacherId};
    use crate::rbac::RelationSnapshot;
    use crate::school::AttendanceStatus;

    struct Fixture {
        teacher: TeacherId,
        student: StudentId,
        data: DashboardData,
        rel: RelationSnapshot,
    }

    fn fixture() -> Fixture {
        let now = Utc::now();
        let teacher = TeacherId::new();
        let student = StudentId::new();
        let other = StudentId::new();

        let class = Class {
            id: ClassId::new(),
            name: "Chemistry".into(),
            subject_id: SubjectId::new(),
            teacher_id: teacher,
            room_number: None,
            max_capacity: 30,
            students: [student, other].into_iter().collect(),
        };

        let assignment = |status, due_in: Duration| Assignment {
            id: AssignmentId::new(),
            class_id: class.id,
            teacher_id: teacher,
            title: "Worksheet".into(),
            description: String::new(),
            due_date: now + due_in,
            max_points: 10.0,
            status,
            created_at: now,
        };
        let open = assignment(AssignmentStatus::Published, Duration::days(2));
        let done = assignment(AssignmentStatus::Published, Duration::days(3));
        let draft = assignment(AssignmentStatus::Draft, Duration::days(2));

        let grade = |score| Grade {
            id: GradeId::new(),
            student_id: student,
            subject_id: class.subject_id,
            teacher_id: teacher,
            assignment_name: "Quiz".into(),
            score,
            max_grade: 10.0,
            comments: None,
            date_assigned: now,
        };
        let mark = |status| Attendance {
            id: AttendanceId::new(),
            student_id: student,
            class_id: class.id,
            date: now.date_naive(),
            status,
            remarks: None,
            marked_by: Some(AccountId::new()),
            marked_at: now,
        };

        let grades = vec![grade(8.0), grade(9.0)];
        let attendance = vec![
            mark(AttendanceStatus::Present),
            mark(AttendanceStatus::Late),
            mark(AttendanceStatus::Absent),
            mark(AttendanceStatus::Present),
        ];

        let mut rel = RelationSnapshot::new();
        rel.add_class(&class);
        for a in [&open, &done, &draft] {
            rel.add_assignment(a);
        }

        let data = DashboardData {
            classes: vec![class],
            submissions: vec![Submission {
                id: SubmissionId::new(),
                assignment_id: done.id,
                student_id: student,
                content: String::new(),
                submitted_at: now,
                is_late: false,
            }],
            assignments: vec![open, done, draft],
            grades,
            attendance,
            registrations: vec![now, now - Duration::days(30)],
            ..Default::default()
        };

        Fixture { teacher, student, data, rel }
    }

    fn principal(role: CoarseRole) -> Principal {
        Principal::for_account(&Account::new("u", "u@example.com", role, "h"))
    }

    #[test]
    fn test_student_dashboard() {
        let f = fixture();
        let p = principal(CoarseRole::Student).with_student_profile(Some(f.student));
        let summary = summarize(&p, f.data, &f.rel, Utc::now(), Duration::days(7)).unwrap();
        assert_eq!(
            summary,
            DashboardSummary::Student {
                enrolled_classes: 1,
                pending_assignments: 1,
                average_grade: Some(85.0),
                attendance_rate: Some(75.0),
            }
        );
    }

    #[test]
    fn test_teacher_dashboard() {
        let f = fixture();
        let p = principal(CoarseRole::Teacher).with_teacher_profile(Some(f.teacher));
        let summary = summarize(&p, f.data, &f.rel, Utc::now(), Duration::days(7)).unwrap();
        assert_eq!(
            summary,
            DashboardSummary::Teacher {
                my_classes: 1,
                total_students: 2,
                pending_assignments: 2,
                recent_submissions: 1,
            }
        );
    }

    #[test]
    fn test_admin_recent_registrations() {
        let f = fixture();
        let summary =
            summarize(&principal(CoarseRole::Admin), f.data, &f.rel, Utc::now(), Duration::days(7)).unwrap();
        match summary {
            DashboardSummary::Admin { total_classes, recent_registrations, .. } => {
                assert_eq!(total_classes, 1);
                assert_eq!(recent_registrations, 1);
            }
            other => panic!("unexpected summary: {:?}", other),
        }
    }

    #[test]
    fn test_profileless_student_gets_zeroes() {
        let f = fixture();
        let summary =
            summarize(&principal(CoarseRole::Student), f.data, &f.rel, Utc::now(), Duration::days(7)).unwrap();
        assert_eq!(
            summary,
            DashboardSummary::Student {
                enrolled_classes: 0,
                pending_assignments: 0,
                average_grade: None,
                attendance_rate: None,
            }
        );
    }
}
