//! Domain records: profiles, subjects, classes, attendance, grades, assignments
//! and submissions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::SchoolError;
use crate::ids::{
    AccountId, AssignmentId, AttendanceId, ClassId, GradeId, StudentId, SubjectId, SubmissionId,
    TeacherId,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Profiles
// ═══════════════════════════════════════════════════════════════════════════════

/// Student profile, owned one-to-one by an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: StudentId,
    pub account_id: AccountId,
    pub student_number: String,
    pub grade_level: i16,
    pub enrollment_date: NaiveDate,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
}

/// Teacher profile, owned one-to-one by an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherProfile {
    pub id: TeacherId,
    pub account_id: AccountId,
    pub employee_number: String,
    pub department: String,
    pub qualification: Option<String>,
    pub hire_date: NaiveDate,
    pub subjects: BTreeSet<SubjectId>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub credits: i16,
}

/// A class run by one teacher for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub room_number: Option<String>,
    pub max_capacity: u32,
    pub students: BTreeSet<StudentId>,
}

impl Class {
    pub fn is_enrolled(&self, student: StudentId) -> bool {
        self.students.contains(&student)
    }

    pub fn enrolled_count(&self) -> usize {
        self.students.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Attendance
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }

    /// Counts toward the attendance rate.
    pub fn is_attended(&self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = SchoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "late" => Ok(Self::Late),
            "excused" => Ok(Self::Excused),
            other => Err(SchoolError::validation(format!(
                "Unknown attendance status: {}",
                other
            ))),
        }
    }
}

/// One row per (student, class, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: AttendanceId,
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    /// Unset once the marking account is deleted.
    pub marked_by: Option<AccountId>,
    pub marked_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Grades
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub assignment_name: String,
    pub score: f64,
    pub max_grade: f64,
    pub comments: Option<String>,
    pub date_assigned: DateTime<Utc>,
}

impl Grade {
    /// Score as a percentage of `max_grade`, rounded to two decimals.
    pub fn percentage(&self) -> f64 {
        if self.max_grade <= 0.0 {
            return 0.0;
        }
        (self.score / self.max_grade * 10_000.0).round() / 100.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Assignments and Submissions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Draft,
    Published,
    Closed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Closed => "closed",
        }
    }

    /// Draft → Published → Closed, one step at a time.
    pub fn can_transition_to(&self, next: AssignmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Published) | (Self::Published, Self::Closed)
        )
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = SchoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "closed" => Ok(Self::Closed),
            other => Err(SchoolError::validation(format!(
                "Unknown assignment status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub class_id: ClassId,
    pub teacher_id: TeacherId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub max_points: f64,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
}

/// One per (assignment, student). `is_late` is fixed when the row is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment_id: AssignmentId,
    pub student_id: StudentId,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    pub is_late: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_percentage() {
        let grade = Grade {
            id: GradeId::new(),
            student_id: StudentId::new(),
            subject_id: SubjectId::new(),
            teacher_id: TeacherId::new(),
            assignment_name: "Quiz 1".into(),
            score: 17.0,
            max_grade: 20.0,
            comments: None,
            date_assigned: Utc::now(),
        };
        assert_eq!(grade.percentage(), 85.0);
    }

    #[test]
    fn test_assignment_transitions() {
        use AssignmentStatus::*;
        assert!(Draft.can_transition_to(Published));
        assert!(Published.can_transition_to(Closed));
        assert!(!Draft.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Published));
        assert!(!Published.can_transition_to(Published));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Late".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Late);
        assert!("tardy".parse::<AttendanceStatus>().is_err());
        assert_eq!("PUBLISHED".parse::<AssignmentStatus>().unwrap(), AssignmentStatus::Published);
    }

    #[test]
    fn test_attended_statuses() {
        assert!(AttendanceStatus::Present.is_attended());
        assert!(AttendanceStatus::Late.is_attended());
        assert!(!AttendanceStatus::Absent.is_attended());
        assert!(!AttendanceStatus::Excused.is_attended());
    }
}
