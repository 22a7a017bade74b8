//! Class enrollment rules.
//!
//! Stores call these while holding whatever makes the check-then-write atomic
//! (the memory store's write guard, a `FOR UPDATE` row lock in Postgres).

use serde::Serialize;

use super::models::Class;
use crate::error::{Result, SchoolError};
use crate::ids::StudentId;

/// Successful enrollment outcomes. Both are `ok` to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollOutcome {
    Enrolled,
    AlreadyEnrolled,
}

/// Decide an enrollment given the class as currently stored.
///
/// Re-enrolling is a no-op even when the class is full.
pub fn check_enroll(class: &Class, student: StudentId) -> Result<EnrollOutcome> {
    check_enroll_counts(class, class.is_enrolled(student), class.enrolled_count())
}

/// Same as [`check_enroll`] for stores that only know the counts.
pub fn check_enroll_counts(
    class: &Class,
    already_enrolled: bool,
    enrolled_count: usize,
) -> Result<EnrollOutcome> {
    if already_enrolled {
        return Ok(EnrollOutcome::AlreadyEnrolled);
    }
    if enrolled_count >= class.max_capacity as usize {
        return Err(SchoolError::capacity_exceeded(class.id, class.max_capacity));
    }
    Ok(EnrollOutcome::Enrolled)
}

/// Unenrolling someone who is not enrolled is an error.
pub fn check_unenroll(class: &Class, student: StudentId) -> Result<()> {
    if class.is_enrolled(student) {
        Ok(())
    } else {
        Err(SchoolError::not_enrolled(class.id, student))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::ids::{ClassId, SubjectId, TeacherId};
    use std::collections::BTreeSet;

    fn class_with(capacity: u32, students: &[StudentId]) -> Class {
        Class {
            id: ClassId::new(),
            name: "Biology".into(),
            subject_id: SubjectId::new(),
            teacher_id: TeacherId::new(),
            room_number: Some("B12".into()),
            max_capacity: capacity,
            students: students.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_capacity_exceeded() {
        let first = StudentId::new();
        let class = class_with(1, &[first]);
        let err = check_enroll(&class, StudentId::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CapacityExceeded);
    }

    #[test]
    fn test_reenroll_is_noop_even_when_full() {
        let first = StudentId::new();
        let class = class_with(1, &[first]);
        assert_eq!(check_enroll(&class, first).unwrap(), EnrollOutcome::AlreadyEnrolled);
    }

    #[test]
    fn test_enroll_with_room() {
        let class = class_with(2, &[StudentId::new()]);
        assert_eq!(check_enroll(&class, StudentId::new()).unwrap(), EnrollOutcome::Enrolled);
    }

    #[test]
    fn test_unenroll_requires_enrollment() {
        let enrolled = StudentId::new();
        let class = class_with(5, &[enrolled]);
        assert!(check_unenroll(&class, enrolled).is_ok());
        assert_eq!(
            check_unenroll(&class, StudentId::new()).unwrap_err().code(),
            ErrorCode::NotEnrolled
        );
    }
}
