//! Assignment submission.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::models::{Assignment, AssignmentStatus, Submission};
use crate::error::{Result, SchoolError};
use crate::ids::{AssignmentId, StudentId, SubmissionId};

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubmission {
    pub assignment_id: AssignmentId,
    #[serde(default)]
    pub content: String,
}

/// Build the submission row for `student`.
///
/// The assignment must be published and the student enrolled in its class.
/// Lateness is decided here, against `now`, and stored as-is; later edits to
/// the due date do not touch it. Duplicate detection belongs to the store.
pub fn prepare_submission(
    assignment: &Assignment,
    student: StudentId,
    enrolled: bool,
    content: String,
    now: DateTime<Utc>,
) -> Result<Submission> {
    if assignment.status != AssignmentStatus::Published {
        return Err(SchoolError::validation(format!(
            "Assignment is not open for submissions (status: {})",
            assignment.status
        )));
    }
    if !enrolled {
        return Err(SchoolError::not_enrolled(assignment.class_id, student));
    }

    Ok(Submission {
        id: SubmissionId::new(),
        assignment_id: assignment.id,
        student_id: student,
        content,
        submitted_at: now,
        is_late: now > assignment.due_date,
    })
}
