//! Row visibility.
//!
//! Admins see every row and anonymous callers see none. Students and teachers
//! are filtered per entity kind:
//!
//! | Entity     | Student sees                          | Teacher sees                  |
//! |------------|---------------------------------------|-------------------------------|
//! | Student    | own profile                           | all                           |
//! | Teacher    | all                                   | all                           |
//! | Subject    | all                                   | all                           |
//! | Class      | classes they are enrolled in          | classes they own              |
//! | Attendance | own rows                              | rows in classes they own      |
//! | Grade      | own rows                              | rows they graded              |
//! | Assignment | published, in a class they attend     | assignments they own          |
//! | Submission | own rows                              | rows for assignments they own |
//!
//! A student or teacher without the matching profile sees nothing, whatever the kind.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::evaluator::{OwnerRef, Owned};
use super::models::Principal;
use crate::identity::CoarseRole;
use crate::ids::{AssignmentId, ClassId, StudentId, TeacherId};
use crate::school::{
    Assignment, AssignmentStatus, Attendance, Class, Grade, StudentProfile, Subject, Submission,
    TeacherProfile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Student,
    Teacher,
    Subject,
    Class,
    Attendance,
    Grade,
    Assignment,
    Submission,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Relations
// ═══════════════════════════════════════════════════════════════════════════════

/// Transitive relations the visibility rules follow.
pub trait RelationSource {
    fn class_teacher(&self, class: ClassId) -> Option<TeacherId>;

    fn is_enrolled(&self, class: ClassId, student: StudentId) -> bool;

    fn assignment_teacher(&self, assignment: AssignmentId) -> Option<TeacherId>;
}

/// A point-in-time copy of the class and assignment relations.
#[derive(Debug, Clone, Default)]
pub struct RelationSnapshot {
    class_teachers: HashMap<ClassId, TeacherId>,
    enrollments: HashSet<(ClassId, StudentId)>,
    assignment_teachers: HashMap<AssignmentId, TeacherId>,
}

impl RelationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: &Class) {
        self.class_teachers.insert(class.id, class.teacher_id);
        self.enrollments
            .extend(class.students.iter().map(|student| (class.id, *student)));
    }

    pub fn add_assignment(&mut self, assignment: &Assignment) {
        self.assignment_teachers
            .insert(assignment.id, assignment.teacher_id);
    }

    /// Record one (class, teacher) pair without a full class row.
    pub fn insert_class_teacher(&mut self, class: ClassId, teacher: TeacherId) {
        self.class_teachers.insert(class, teacher);
    }

    pub fn insert_enrollment(&mut self, class: ClassId, student: StudentId) {
        self.enrollments.insert((class, student));
    }

    pub fn insert_assignment_teacher(&mut self, assignment: AssignmentId, teacher: TeacherId) {
        self.assignment_teachers.insert(assignment, teacher);
    }
}

impl RelationSource for RelationSnapshot {
    fn class_teacher(&self, class: ClassId) -> Option<TeacherId> {
        self.class_teachers.get(&class).copied()
    }

    fn is_enrolled(&self, class: ClassId, student: StudentId) -> bool {
        self.enrollments.contains(&(class, student))
    }

    fn assignment_teacher(&self, assignment: AssignmentId) -> Option<TeacherId> {
        self.assignment_teachers.get(&assignment).copied()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scoped rows
// ═══════════════════════════════════════════════════════════════════════════════

/// A row kind with per-role visibility predicates.
pub trait Scoped {
    const KIND: EntityKind;

    fn visible_to_student(&self, me: StudentId, rel: &dyn RelationSource) -> bool;

    fn visible_to_teacher(&self, me: TeacherId, rel: &dyn RelationSource) -> bool;
}

/// Filter `rows` down to what `principal` may see.
///
/// Never fails: a principal whose role claims a profile it does not have gets
/// an empty result. Applying it twice gives the same rows as applying it once.
pub fn scope_query<T, I>(principal: &Principal, rows: I, rel: &dyn RelationSource) -> Vec<T>
where
    T: Scoped,
    I: IntoIterator<Item = T>,
{
    if !principal.is_authenticated() {
        return Vec::new();
    }

    match principal.role {
        Some(CoarseRole::Admin) => rows.into_iter().collect(),
        Some(CoarseRole::Student) => match principal.student_id {
            Some(me) => rows
                .into_iter()
                .filter(|row| row.visible_to_student(me, rel))
                .collect(),
            None => {
                debug!(principal = %principal, kind = ?T::KIND, "Scope empty: no student profile");
                Vec::new()
            }
        },
        Some(CoarseRole::Teacher) => match principal.teacher_id {
            Some(me) => rows
                .into_iter()
                .filter(|row| row.visible_to_teacher(me, rel))
                .collect(),
            None => {
                debug!(principal = %principal, kind = ?T::KIND, "Scope empty: no teacher profile");
                Vec::new()
            }
        },
        None => Vec::new(),
    }
}

/// Single-row form of [`scope_query`].
pub fn is_visible<T: Scoped>(principal: &Principal, row: &T, rel: &dyn RelationSource) -> bool {
    if !principal.is_authenticated() {
        return false;
    }
    match principal.role {
        Some(CoarseRole::Admin) => true,
        Some(CoarseRole::Student) => principal
            .student_id
            .map(|me| row.visible_to_student(me, rel))
            .unwrap_or(false),
        Some(CoarseRole::Teacher) => principal
            .teacher_id
            .map(|me| row.visible_to_teacher(me, rel))
            .unwrap_or(false),
        None => false,
    }
}

impl<T: Scoped> Scoped for &T {
    const KIND: EntityKind = T::KIND;

    fn visible_to_student(&self, me: StudentId, rel: &dyn RelationSource) -> bool {
        (**self).visible_to_student(me, rel)
    }

    fn visible_to_teacher(&self, me: TeacherId, rel: &dyn RelationSource) -> bool {
        (**self).visible_to_teacher(me, rel)
    }
}

impl Scoped for StudentProfile {
    const KIND: EntityKind = EntityKind::Student;

    fn visible_to_student(&self, me: StudentId, _rel: &dyn RelationSource) -> bool {
        self.id == me
    }

    fn visible_to_teacher(&self, _me: TeacherId, _rel: &dyn RelationSource) -> bool {
        true
    }
}

impl Scoped for TeacherProfile {
    const KIND: EntityKind = EntityKind::Teacher;

    fn visible_to_student(&self, _me: StudentId, _rel: &dyn RelationSource) -> bool {
        true
    }

    fn visible_to_teacher(&self, _me: TeacherId, _rel: &dyn RelationSource) -> bool {
        true
    }
}

impl Scoped for Subject {
    const KIND: EntityKind = EntityKind::Subject;

    fn visible_to_student(&self, _me: StudentId, _rel: &dyn RelationSource) -> bool {
        true
    }

    fn visible_to_teacher(&self, _me: TeacherId, _rel: &dyn RelationSource) -> bool {
        true
    }
}

impl Scoped for Class {
    const KIND: EntityKind = EntityKind::Class;

    fn visible_to_student(&self, me: StudentId, _rel: &dyn RelationSource) -> bool {
        self.is_enrolled(me)
    }

    fn visible_to_teacher(&self, me: TeacherId, _rel: &dyn RelationSource) -> bool {
        self.teacher_id == me
    }
}

impl Scoped for Attendance {
    const KIND: EntityKind = EntityKind::Attendance;

    fn visible_to_student(&self, me: StudentId, _rel: &dyn RelationSource) -> bool {
        self.student_id == me
    }

    fn visible_to_teacher(&self, me: TeacherId, rel: &dyn RelationSource) -> bool {
        rel.class_teacher(self.class_id) == Some(me)
    }
}

impl Scoped for Grade {
    const KIND: EntityKind = EntityKind::Grade;

    fn visible_to_student(&self, me: StudentId, _rel: &dyn RelationSource) -> bool {
        self.student_id == me
    }

    fn visible_to_teacher(&self, me: TeacherId, _rel: &dyn RelationSource) -> bool {
        self.teacher_id == me
    }
}

impl Scoped for Assignment {
    const KIND: EntityKind = EntityKind::Assignment;

    fn visible_to_student(&self, me: StudentId, rel: &dyn RelationSource) -> bool {
        self.status == AssignmentStatus::Published && rel.is_enrolled(self.class_id, me)
    }

    fn visible_to_teacher(&self, me: TeacherId, _rel: &dyn RelationSource) -> bool {
        self.teacher_id == me
    }
}

impl Scoped for Submission {
    const KIND: EntityKind = EntityKind::Submission;

    fn visible_to_student(&self, me: StudentId, _rel: &dyn RelationSource) -> bool {
        self.student_id == me
    }

    fn visible_to_teacher(&self, me: TeacherId, rel: &dyn RelationSource) -> bool {
        rel.assignment_teacher(self.assignment_id) == Some(me)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ownership relations
// ═══════════════════════════════════════════════════════════════════════════════

impl Owned for StudentProfile {
    fn student(&self) -> Option<StudentId> {
        Some(self.id)
    }

    fn owner(&self) -> Option<OwnerRef> {
        Some(OwnerRef::Account(self.account_id))
    }
}

impl Owned for TeacherProfile {
    fn owner(&self) -> Option<OwnerRef> {
        Some(OwnerRef::Account(self.account_id))
    }
}

impl Owned for Class {
    fn owner(&self) -> Option<OwnerRef> {
        Some(OwnerRef::Teacher(self.teacher_id))
    }
}

impl Owned for Attendance {
    fn student(&self) -> Option<StudentId> {
        Some(self.student_id)
    }

    fn owner(&self) -> Option<OwnerRef> {
        self.marked_by.map(OwnerRef::Account)
    }
}

impl Owned for Grade {
    fn student(&self) -> Option<StudentId> {
        Some(self.student_id)
    }

    fn owner(&self) -> Option<OwnerRef> {
        Some(OwnerRef::Teacher(self.teacher_id))
    }
}

impl Owned for Assignment {
    fn owner(&self) -> Option<OwnerRef> {
        Some(OwnerRef::Teacher(self.teacher_id))
    }
}

impl Owned for Submission {
    fn student(&self) -> Option<StudentId> {
        Some(self.student_id)
    }

    fn owner(&self) -> Option<OwnerRef> {
        None
    }
}
