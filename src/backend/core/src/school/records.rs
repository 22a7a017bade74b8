//! Create and correct requests for the domain records, with their field rules.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use super::models::{
    Assignment, AssignmentStatus, Attendance, AttendanceStatus, Class, Grade, StudentProfile,
    Subject, TeacherProfile,
};
use crate::error::{Result, SchoolError};
use crate::ids::{
    AccountId, AssignmentId, AttendanceId, ClassId, GradeId, StudentId, SubjectId, TeacherId,
};

fn required(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(SchoolError::validation(format!("{} is required", field)).with_context("field", field))
    } else {
        Ok(())
    }
}

/// `0 ≤ score ≤ max_grade` with a positive `max_grade`.
pub fn validate_score(score: f64, max_grade: f64) -> Result<()> {
    if !max_grade.is_finite() || max_grade <= 0.0 {
        return Err(SchoolError::validation("max_grade must be greater than zero")
            .with_context("field", "max_grade"));
    }
    if !score.is_finite() || score < 0.0 || score > max_grade {
        return Err(SchoolError::validation(format!(
            "Score must be between 0 and {}",
            max_grade
        ))
        .with_context("field", "score"));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Profiles
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudentProfile {
    pub account_id: AccountId,
    pub student_number: String,
    pub grade_level: i16,
    #[serde(default)]
    pub enrollment_date: Option<NaiveDate>,
    #[serde(default)]
    pub guardian_name: Option<String>,
    #[serde(default)]
    pub guardian_phone: Option<String>,
}

impl NewStudentProfile {
    pub fn build(self, today: NaiveDate) -> Result<StudentProfile> {
        required("student_number", &self.student_number)?;
        if !(1..=13).contains(&self.grade_level) {
            return Err(SchoolError::validation("grade_level must be between 1 and 13")
                .with_context("field", "grade_level"));
        }
        Ok(StudentProfile {
            id: StudentId::new(),
            account_id: self.account_id,
            student_number: self.student_number.trim().to_string(),
            grade_level: self.grade_level,
            enrollment_date: self.enrollment_date.unwrap_or(today),
            guardian_name: self.guardian_name,
            guardian_phone: self.guardian_phone,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTeacherProfile {
    pub account_id: AccountId,
    pub employee_number: String,
    pub department: String,
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
    #[serde(default)]
    pub subjects: Vec<SubjectId>,
}

impl NewTeacherProfile {
    pub fn build(self, today: NaiveDate) -> Result<TeacherProfile> {
        required("employee_number", &self.employee_number)?;
        required("department", &self.department)?;
        Ok(TeacherProfile {
            id: TeacherId::new(),
            account_id: self.account_id,
            employee_number: self.employee_number.trim().to_string(),
            department: self.department.trim().to_string(),
            qualification: self.qualification,
            hire_date: self.hire_date.unwrap_or(today),
            subjects: self.subjects.into_iter().collect(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Subjects and Classes
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubject {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_credits")]
    pub credits: i16,
}

fn default_credits() -> i16 {
    1
}

impl NewSubject {
    pub fn build(self) -> Result<Subject> {
        required("code", &self.code)?;
        required("name", &self.name)?;
        if self.credits < 1 {
            return Err(SchoolError::validation("credits must be at least 1")
                .with_context("field", "credits"));
        }
        Ok(Subject {
            id: SubjectId::new(),
            code: self.code.trim().to_uppercase(),
            name: self.name.trim().to_string(),
            description: self.description,
            credits: self.credits,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewClass {
    pub name: String,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    #[serde(default)]
    pub room_number: Option<String>,
    #[serde(default)]
    pub max_capacity: Option<u32>,
}

impl NewClass {
    pub fn build(self, default_capacity: u32) -> Result<Class> {
        required("name", &self.name)?;
        let max_capacity = self.max_capacity.unwrap_or(default_capacity);
        if max_capacity < 1 {
            return Err(SchoolError::validation("max_capacity must be at least 1")
                .with_context("field", "max_capacity"));
        }
        Ok(Class {
            id: ClassId::new(),
            name: self.name.trim().to_string(),
            subject_id: self.subject_id,
            teacher_id: self.teacher_id,
            room_number: self.room_number,
            max_capacity,
            students: Default::default(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Attendance
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct NewAttendance {
    pub student_id: StudentId,
    pub class_id: ClassId,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl NewAttendance {
    pub fn build(self, marked_by: AccountId, now: DateTime<Utc>) -> Attendance {
        Attendance {
            id: AttendanceId::new(),
            student_id: self.student_id,
            class_id: self.class_id,
            date: self.date.unwrap_or_else(|| now.date_naive()),
            status: self.status,
            remarks: self.remarks,
            marked_by: Some(marked_by),
            marked_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceCorrection {
    pub status: AttendanceStatus,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl AttendanceCorrection {
    pub fn apply(self, record: &mut Attendance) {
        record.status = self.status;
        if self.remarks.is_some() {
            record.remarks = self.remarks;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Grades
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct NewGrade {
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    /// Required when an admin records the grade; teachers grade as themselves.
    #[serde(default)]
    pub teacher_id: Option<TeacherId>,
    pub assignment_name: String,
    pub score: f64,
    #[serde(default)]
    pub max_grade: Option<f64>,
    #[serde(default)]
    pub comments: Option<String>,
}

impl NewGrade {
    pub fn build(self, teacher_id: TeacherId, default_max_grade: f64, now: DateTime<Utc>) -> Result<Grade> {
        required("assignment_name", &self.assignment_name)?;
        let max_grade = self.max_grade.unwrap_or(default_max_grade);
        validate_score(self.score, max_grade)?;
        Ok(Grade {
            id: GradeId::new(),
            student_id: self.student_id,
            subject_id: self.subject_id,
            teacher_id,
            assignment_name: self.assignment_name.trim().to_string(),
            score: self.score,
            max_grade,
            comments: self.comments,
            date_assigned: now,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradeCorrection {
    pub score: f64,
    #[serde(default)]
    pub comments: Option<String>,
}

impl GradeCorrection {
    pub fn apply(self, grade: &mut Grade) -> Result<()> {
        validate_score(self.score, grade.max_grade)?;
        grade.score = self.score;
        if self.comments.is_some() {
            grade.comments = self.comments;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Assignments
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub class_id: ClassId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub max_points: Option<f64>,
}

impl NewAssignment {
    /// New assignments start as drafts owned by the class teacher.
    pub fn build(self, class: &Class, default_max_points: f64, now: DateTime<Utc>) -> Result<Assignment> {
        required("title", &self.title)?;
        let max_points = self.max_points.unwrap_or(default_max_points);
        if !max_points.is_finite() || max_points <= 0.0 {
            return Err(SchoolError::validation("max_points must be greater than zero")
                .with_context("field", "max_points"));
        }
        Ok(Assignment {
            id: AssignmentId::new(),
            class_id: class.id,
            teacher_id: class.teacher_id,
            title: self.title.trim().to_string(),
            description: self.description,
            due_date: self.due_date,
            max_points,
            status: AssignmentStatus::Draft,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentUpdate {
    #[serde(default)]
    pub status: Option<AssignmentStatus>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl AssignmentUpdate {
    /// Apply the change, or leave `assignment` untouched on error.
    pub fn apply(self, assignment: &mut Assignment) -> Result<()> {
        if self.due_date.is_some() && assignment.status == AssignmentStatus::Closed {
            return Err(SchoolError::validation(
                "The due date of a closed assignment cannot change",
            ));
        }
        if let Some(next) = self.status {
            if !assignment.status.can_transition_to(next) {
                return Err(SchoolError::validation(format!(
                    "Cannot move assignment from {} to {}",
                    assignment.status, next
                )));
            }
        }

        if let Some(due) = self.due_date {
            assignment.due_date = due;
        }
        if let Some(next) = self.status {
            assignment.status = next;
        }
        Ok(())
    }
}
