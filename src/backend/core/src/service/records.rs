//! Profiles, catalog, enrollment and the scoped records.

use chrono::Utc;
use tracing::{debug, info, instrument};

use super::SchoolService;
use crate::error::{Result, SchoolError};
use crate::identity::CoarseRole;
use crate::ids::{
    AccountId, AssignmentId, AttendanceId, ClassId, GradeId, StudentId, SubjectId, SubmissionId,
    TeacherId,
};
use crate::rbac::catalog::{
    MANAGE_ASSIGNMENTS, MANAGE_CLASSES, MANAGE_GRADES, MARK_ATTENDANCE, SUBMIT_ASSIGNMENTS,
    VIEW_ASSIGNMENTS, VIEW_ATTENDANCE, VIEW_CLASSES, VIEW_GRADES, VIEW_STUDENTS, VIEW_SUBJECTS,
    VIEW_SUBMISSIONS, VIEW_TEACHERS,
};
use crate::rbac::{
    enforce_author_or_admin, enforce_capability, enforce_owner_or_admin, enforce_role, is_visible,
    Principal,
};
use crate::school::submission::prepare_submission;
use crate::school::{
    Assignment, AssignmentUpdate, Attendance, AttendanceCorrection, Class, EnrollOutcome, Grade,
    GradeCorrection, NewAssignment, NewAttendance, NewClass, NewGrade, NewStudentProfile,
    NewSubject, NewSubmission, NewTeacherProfile, StudentProfile, Subject, Submission,
    TeacherProfile,
};

const STAFF: &[CoarseRole] = &[CoarseRole::Admin, CoarseRole::Teacher];

impl SchoolService {
    async fn require_class(&self, id: ClassId) -> Result<Class> {
        self.store
            .get_class(id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Class", id.to_string()))
    }

    async fn require_student(&self, id: StudentId) -> Result<StudentProfile> {
        self.store
            .get_student(id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Student", id.to_string()))
    }

    async fn require_teacher(&self, id: TeacherId) -> Result<TeacherProfile> {
        self.store
            .get_teacher(id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Teacher", id.to_string()))
    }

    async fn require_subject(&self, id: SubjectId) -> Result<Subject> {
        self.store
            .get_subject(id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Subject", id.to_string()))
    }

    /// The account must exist and carry the coarse role the profile is for.
    async fn check_profile_account(
        &self,
        account_id: AccountId,
        expected: CoarseRole,
    ) -> Result<()> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Account", account_id.to_string()))?;
        if account.role != expected {
            return Err(SchoolError::validation(format!(
                "Account {} has role {}, expected {}",
                account.username, account.role, expected
            ))
            .with_context("field", "account_id"));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Profiles
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_student_profile(
        &self,
        principal: &Principal,
        request: NewStudentProfile,
    ) -> Result<StudentProfile> {
        enforce_role(principal, &[CoarseRole::Admin])?;
        self.check_profile_account(request.account_id, CoarseRole::Student)
            .await?;
        let student = request.build(Utc::now().date_naive())?;
        self.store.insert_student(&student).await?;
        info!(student_id = %student.id, account_id = %student.account_id, "Created student profile");
        Ok(student)
    }

    pub async fn create_teacher_profile(
        &self,
        principal: &Principal,
        request: NewTeacherProfile,
    ) -> Result<TeacherProfile> {
        enforce_role(principal, &[CoarseRole::Admin])?;
        self.check_profile_account(request.account_id, CoarseRole::Teacher)
            .await?;
        for subject in &request.subjects {
            self.require_subject(*subject).await?;
        }
        let teacher = request.build(Utc::now().date_naive())?;
        self.store.insert_teacher(&teacher).await?;
        info!(teacher_id = %teacher.id, account_id = %teacher.account_id, "Created teacher profile");
        Ok(teacher)
    }

    pub async fn list_students(&self, principal: &Principal) -> Result<Vec<StudentProfile>> {
        enforce_capability(principal, Some(VIEW_STUDENTS))?;
        let rows = self.store.list_students().await?;
        self.scoped(principal, rows).await
    }

    pub async fn list_teachers(&self, principal: &Principal) -> Result<Vec<TeacherProfile>> {
        enforce_capability(principal, Some(VIEW_TEACHERS))?;
        let rows = self.store.list_teachers().await?;
        self.scoped(principal, rows).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subjects and classes
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_subject(&self, principal: &Principal, request: NewSubject) -> Result<Subject> {
        enforce_role(principal, &[CoarseRole::Admin])?;
        let subject = request.build()?;
        self.store.insert_subject(&subject).await?;
        Ok(subject)
    }

    pub async fn list_subjects(&self, principal: &Principal) -> Result<Vec<Subject>> {
        enforce_capability(principal, Some(VIEW_SUBJECTS))?;
        let rows = self.store.list_subjects().await?;
        self.scoped(principal, rows).await
    }

    pub async fn create_class(&self, principal: &Principal, request: NewClass) -> Result<Class> {
        enforce_role(principal, &[CoarseRole::Admin])?;
        self.require_subject(request.subject_id).await?;
        self.require_teacher(request.teacher_id).await?;
        let class = request.build(self.config.default_class_capacity)?;
        self.store.insert_class(&class).await?;
        info!(class_id = %class.id, teacher_id = %class.teacher_id, "Created class");
        Ok(class)
    }

    pub async fn list_classes(&self, principal: &Principal) -> Result<Vec<Class>> {
        enforce_capability(principal, Some(VIEW_CLASSES))?;
        let rows = self.store.list_classes().await?;
        self.scoped(principal, rows).await
    }

    /// Enroll a student; re-enrolling is a no-op even in a full class.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn enroll(
        &self,
        principal: &Principal,
        class_id: ClassId,
        student_id: StudentId,
    ) -> Result<EnrollOutcome> {
        enforce_capability(principal, Some(MANAGE_CLASSES))?;
        let class = self.require_class(class_id).await?;
        enforce_owner_or_admin(principal, &class)?;
        self.require_student(student_id).await?;

        let outcome = self.store.enroll(class_id, student_id).await?;
        debug!(class_id = %class_id, student_id = %student_id, ?outcome, "Enrollment");
        Ok(outcome)
    }

    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn unenroll(
        &self,
        principal: &Principal,
        class_id: ClassId,
        student_id: StudentId,
    ) -> Result<()> {
        enforce_capability(principal, Some(MANAGE_CLASSES))?;
        let class = self.require_class(class_id).await?;
        enforce_owner_or_admin(principal, &class)?;
        self.store.unenroll(class_id, student_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attendance
    // ─────────────────────────────────────────────────────────────────────────

    /// Mark one student for one class and date. The student must be enrolled.
    pub async fn mark_attendance(
        &self,
        principal: &Principal,
        request: NewAttendance,
    ) -> Result<Attendance> {
        enforce_capability(principal, Some(MARK_ATTENDANCE))?;
        enforce_role(principal, STAFF)?;
        let marked_by = principal.require_account()?;

        let class = self.require_class(request.class_id).await?;
        enforce_author_or_admin(principal, &class)?;
        if !class.is_enrolled(request.student_id) {
            return Err(SchoolError::not_enrolled(class.id, request.student_id));
        }

        let record = request.build(marked_by, Utc::now());
        self.store.insert_attendance(&record).await?;
        Ok(record)
    }

    /// Change the status of a mark. Only the marking account or an admin may.
    pub async fn correct_attendance(
        &self,
        principal: &Principal,
        id: AttendanceId,
        correction: AttendanceCorrection,
    ) -> Result<Attendance> {
        enforce_capability(principal, Some(MARK_ATTENDANCE))?;
        let mut record = self
            .store
            .get_attendance(id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Attendance", id.to_string()))?;
        enforce_author_or_admin(principal, &record)?;

        correction.apply(&mut record);
        self.store.update_attendance(&record).await?;
        Ok(record)
    }

    pub async fn list_attendance(&self, principal: &Principal) -> Result<Vec<Attendance>> {
        enforce_capability(principal, Some(VIEW_ATTENDANCE))?;
        let rows = self.store.list_attendance().await?;
        self.scoped(principal, rows).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grades
    // ─────────────────────────────────────────────────────────────────────────

    /// Teachers grade as themselves; an admin must name the teacher.
    pub async fn record_grade(&self, principal: &Principal, request: NewGrade) -> Result<Grade> {
        enforce_capability(principal, Some(MANAGE_GRADES))?;
        enforce_role(principal, STAFF)?;

        let teacher_id = if principal.is_admin() {
            let id = request.teacher_id.ok_or_else(|| {
                SchoolError::validation("teacher_id is required").with_context("field", "teacher_id")
            })?;
            self.require_teacher(id).await?.id
        } else {
            principal
                .teacher_id
                .ok_or_else(|| SchoolError::forbidden("A teacher profile is required to record grades"))?
        };
        self.require_student(request.student_id).await?;
        self.require_subject(request.subject_id).await?;

        let grade = request.build(teacher_id, self.config.default_max_grade, Utc::now())?;
        self.store.insert_grade(&grade).await?;
        Ok(grade)
    }

    /// Change a score. Only the grading teacher or an admin may.
    pub async fn correct_grade(
        &self,
        principal: &Principal,
        id: GradeId,
        correction: GradeCorrection,
    ) -> Result<Grade> {
        enforce_capability(principal, Some(MANAGE_GRADES))?;
        let mut grade = self.require_grade(id).await?;
        enforce_author_or_admin(principal, &grade)?;

        correction.apply(&mut grade)?;
        self.store.update_grade(&grade).await?;
        Ok(grade)
    }

    async fn require_grade(&self, id: GradeId) -> Result<Grade> {
        self.store
            .get_grade(id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Grade", id.to_string()))
    }

    /// A single grade, readable by its student, its teacher or an admin.
    pub async fn get_grade(&self, principal: &Principal, id: GradeId) -> Result<Grade> {
        enforce_capability(principal, Some(VIEW_GRADES))?;
        let grade = self.require_grade(id).await?;
        enforce_owner_or_admin(principal, &grade)?;
        Ok(grade)
    }

    pub async fn list_grades(&self, principal: &Principal) -> Result<Vec<Grade>> {
        enforce_capability(principal, Some(VIEW_GRADES))?;
        let rows = self.store.list_grades().await?;
        self.scoped(principal, rows).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Assignments and submissions
    // ─────────────────────────────────────────────────────────────────────────

    /// New assignments are drafts owned by the class teacher.
    pub async fn create_assignment(
        &self,
        principal: &Principal,
        request: NewAssignment,
    ) -> Result<Assignment> {
        enforce_capability(principal, Some(MANAGE_ASSIGNMENTS))?;
        let class = self.require_class(request.class_id).await?;
        enforce_owner_or_admin(principal, &class)?;

        let assignment = request.build(&class, self.config.default_max_grade, Utc::now())?;
        self.store.insert_assignment(&assignment).await?;
        info!(assignment_id = %assignment.id, class_id = %class.id, "Created assignment");
        Ok(assignment)
    }

    /// Move the status forward or change the due date.
    ///
    /// Existing submissions keep the lateness they were stored with.
    pub async fn update_assignment(
        &self,
        principal: &Principal,
        id: AssignmentId,
        update: AssignmentUpdate,
    ) -> Result<Assignment> {
        enforce_capability(principal, Some(MANAGE_ASSIGNMENTS))?;
        let mut assignment = self
            .store
            .get_assignment(id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Assignment", id.to_string()))?;
        enforce_owner_or_admin(principal, &assignment)?;

        update.apply(&mut assignment)?;
        self.store.update_assignment(&assignment).await?;
        Ok(assignment)
    }

    pub async fn list_assignments(&self, principal: &Principal) -> Result<Vec<Assignment>> {
        enforce_capability(principal, Some(VIEW_ASSIGNMENTS))?;
        let rows = self.store.list_assignments().await?;
        self.scoped(principal, rows).await
    }

    /// Submit work for a published assignment of one of the caller's classes.
    #[instrument(skip(self, principal, request), fields(principal = %principal, assignment_id = %request.assignment_id))]
    pub async fn submit(&self, principal: &Principal, request: NewSubmission) -> Result<Submission> {
        enforce_capability(principal, Some(SUBMIT_ASSIGNMENTS))?;
        enforce_role(principal, &[CoarseRole::Student])?;
        let student_id = principal
            .student_id
            .ok_or_else(|| SchoolError::forbidden("A student profile is required to submit"))?;

        let assignment = self
            .store
            .get_assignment(request.assignment_id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Assignment", request.assignment_id.to_string()))?;
        let class = self.require_class(assignment.class_id).await?;

        let submission = prepare_submission(
            &assignment,
            student_id,
            class.is_enrolled(student_id),
            request.content,
            Utc::now(),
        )?;
        self.store.insert_submission(&submission).await?;
        info!(submission_id = %submission.id, is_late = submission.is_late, "Submitted assignment");
        Ok(submission)
    }

    /// A single submission, if it is in the caller's visible set.
    pub async fn get_submission(&self, principal: &Principal, id: SubmissionId) -> Result<Submission> {
        enforce_capability(principal, Some(VIEW_SUBMISSIONS))?;
        let submission = self
            .store
            .get_submission(id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Submission", id.to_string()))?;

        let relations = self.store.relation_snapshot().await?;
        if !is_visible(principal, &submission, &relations) {
            return Err(SchoolError::forbidden("You do not have access to this record"));
        }
        Ok(submission)
    }

    pub async fn list_submissions(&self, principal: &Principal) -> Result<Vec<Submission>> {
        enforce_capability(principal, Some(VIEW_SUBMISSIONS))?;
        let rows = self.store.list_submissions().await?;
        self.scoped(principal, rows).await
    }
}
