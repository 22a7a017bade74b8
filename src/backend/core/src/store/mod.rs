//! Storage contract.
//!
//! The core needs transactional CRUD with uniqueness enforced by the storage
//! engine itself: a duplicate attendance key, submission key, permission code,
//! username or email comes back as [`ErrorCode::Conflict`](crate::error::ErrorCode::Conflict)
//! from the write, never from a separate read. Enrollment is a single atomic
//! check-and-insert.
//!
//! Role reads always reflect the live permission catalog.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::identity::{Account, CoarseRole, TokenRecord};
use crate::ids::{
    AccountId, AssignmentId, AttendanceId, ClassId, GradeId, RoleId, StudentId, SubjectId,
    SubmissionId, TeacherId,
};
use crate::rbac::{Permission, RelationSnapshot, Role};
use crate::school::{
    Assignment, Attendance, Class, EnrollOutcome, Grade, StudentProfile, Subject, Submission,
    TeacherProfile,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Accounts and tokens
    // ─────────────────────────────────────────────────────────────────────────

    /// `Conflict` on a taken username or email (emails compare case-insensitively).
    async fn insert_account(&self, account: &Account) -> Result<()>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>>;

    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Write both halves of the role model at once. `NotFound` for an unknown account.
    async fn set_account_role(
        &self,
        id: AccountId,
        role: CoarseRole,
        role_id: Option<RoleId>,
    ) -> Result<Account>;

    /// Remove an account with its profile, enrollments, attendance, grades,
    /// submissions and tokens.
    async fn delete_account(&self, id: AccountId) -> Result<()>;

    async fn insert_token(&self, token: &TokenRecord) -> Result<()>;

    async fn get_token(&self, jti: &str) -> Result<Option<TokenRecord>>;

    /// The newest token of `account` still valid at `now`.
    async fn latest_active_token(
        &self,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenRecord>>;

    /// `true` if a token was removed.
    async fn delete_token(&self, jti: &str) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Permission graph
    // ─────────────────────────────────────────────────────────────────────────

    /// `Conflict` on a duplicate code.
    async fn insert_permission(&self, permission: &Permission) -> Result<()>;

    async fn list_permissions(&self) -> Result<Vec<Permission>>;

    /// Replace name and description of an existing code.
    async fn update_permission(&self, permission: &Permission) -> Result<()>;

    async fn delete_permission(&self, code: &str) -> Result<()>;

    /// `Conflict` on a duplicate name (case-insensitive).
    async fn insert_role(&self, role: &Role) -> Result<()>;

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>>;

    /// Case-insensitive exact name match.
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    async fn list_roles(&self) -> Result<Vec<Role>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Profiles and catalog
    // ─────────────────────────────────────────────────────────────────────────

    /// `Conflict` if the account already has a student profile or the number is taken.
    async fn insert_student(&self, student: &StudentProfile) -> Result<()>;

    async fn get_student(&self, id: StudentId) -> Result<Option<StudentProfile>>;

    async fn student_for_account(&self, account: AccountId) -> Result<Option<StudentProfile>>;

    async fn list_students(&self) -> Result<Vec<StudentProfile>>;

    /// `Conflict` if the account already has a teacher profile or the number is taken.
    async fn insert_teacher(&self, teacher: &TeacherProfile) -> Result<()>;

    async fn get_teacher(&self, id: TeacherId) -> Result<Option<TeacherProfile>>;

    async fn teacher_for_account(&self, account: AccountId) -> Result<Option<TeacherProfile>>;

    async fn list_teachers(&self) -> Result<Vec<TeacherProfile>>;

    /// `Conflict` on a duplicate code.
    async fn insert_subject(&self, subject: &Subject) -> Result<()>;

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>>;

    async fn list_subjects(&self) -> Result<Vec<Subject>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Classes
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_class(&self, class: &Class) -> Result<()>;

    async fn get_class(&self, id: ClassId) -> Result<Option<Class>>;

    async fn list_classes(&self) -> Result<Vec<Class>>;

    /// Atomic capacity check and insert.
    async fn enroll(&self, class: ClassId, student: StudentId) -> Result<EnrollOutcome>;

    async fn unenroll(&self, class: ClassId, student: StudentId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    /// `Conflict` on a duplicate (student, class, date).
    async fn insert_attendance(&self, record: &Attendance) -> Result<()>;

    async fn get_attendance(&self, id: AttendanceId) -> Result<Option<Attendance>>;

    async fn update_attendance(&self, record: &Attendance) -> Result<()>;

    async fn list_attendance(&self) -> Result<Vec<Attendance>>;

    async fn insert_grade(&self, grade: &Grade) -> Result<()>;

    async fn get_grade(&self, id: GradeId) -> Result<Option<Grade>>;

    async fn update_grade(&self, grade: &Grade) -> Result<()>;

    async fn list_grades(&self) -> Result<Vec<Grade>>;

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()>;

    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>>;

    async fn update_assignment(&self, assignment: &Assignment) -> Result<()>;

    async fn list_assignments(&self) -> Result<Vec<Assignment>>;

    /// `Conflict` on a duplicate (assignment, student).
    async fn insert_submission(&self, submission: &Submission) -> Result<()>;

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>>;

    async fn list_submissions(&self) -> Result<Vec<Submission>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Relations
    // ─────────────────────────────────────────────────────────────────────────

    /// Class owners, enrollments and assignment owners, for row scoping.
    async fn relation_snapshot(&self) -> Result<RelationSnapshot>;

    async fn health_check(&self) -> Result<()>;
}
