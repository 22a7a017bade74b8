//! The scoped domain: profiles, classes, attendance, grades, assignments,
//! submissions, and the dashboard built on top of them.

pub mod dashboard;
pub mod enrollment;
pub mod models;
pub mod records;
pub mod submission;

pub use dashboard::{DashboardData, DashboardSummary};
pub use enrollment::EnrollOutcome;
pub use models::{
    Assignment, AssignmentStatus, Attendance, AttendanceStatus, Class, Grade, StudentProfile,
    Subject, Submission, TeacherProfile,
};
pub use records::{
    AssignmentUpdate, AttendanceCorrection, GradeCorrection, NewAssignment, NewAttendance,
    NewClass, NewGrade, NewStudentProfile, NewSubject, NewTeacherProfile,
};
pub use submission::NewSubmission;
