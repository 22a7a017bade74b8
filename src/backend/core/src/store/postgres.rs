//! PostgreSQL store.
//!
//! Uniqueness comes from the constraints in `migrations/`; a violated
//! constraint surfaces as `Conflict` through `From<sqlx::Error>`. Enrollment
//! locks the class row with `FOR UPDATE` before counting.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::Store;
use crate::config::DatabaseConfig;
use crate::error::{ErrorCode, Result, SchoolError};
use crate::identity::{Account, CoarseRole, TokenRecord};
use crate::ids::{
    AccountId, AssignmentId, AttendanceId, ClassId, GradeId, RoleId, StudentId, SubjectId,
    SubmissionId, TeacherId,
};
use crate::rbac::{Permission, RelationSnapshot, Role};
use crate::school::enrollment::{check_enroll_counts, check_unenroll};
use crate::school::{
    Assignment, Attendance, Class, EnrollOutcome, Grade, StudentProfile, Subject, Submission,
    TeacherProfile,
};

/// A [`Store`] backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn role_permissions(&self, role_ids: &[Uuid]) -> Result<HashMap<Uuid, BTreeSet<String>>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT rp.role_id, rp.code
            FROM role_permissions rp
            JOIN permissions p USING (code)
            WHERE rp.role_id = ANY($1)
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, BTreeSet<String>> = HashMap::new();
        for (role_id, code) in rows {
            grouped.entry(role_id).or_default().insert(code);
        }
        Ok(grouped)
    }

    async fn roles_from_rows(&self, rows: Vec<RoleRow>) -> Result<Vec<Role>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut permissions = self.role_permissions(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let codes = permissions.remove(&row.id).unwrap_or_default();
                row.into_role(codes)
            })
            .collect()
    }

    async fn teachers_from_rows(&self, rows: Vec<TeacherRow>) -> Result<Vec<TeacherProfile>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let links: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT teacher_id, subject_id FROM teacher_subjects WHERE teacher_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut subjects: HashMap<Uuid, BTreeSet<SubjectId>> = HashMap::new();
        for (teacher, subject) in links {
            subjects.entry(teacher).or_default().insert(SubjectId(subject));
        }
        Ok(rows
            .into_iter()
            .map(|row| {
                let taught = subjects.remove(&row.id).unwrap_or_default();
                row.into_profile(taught)
            })
            .collect())
    }

    async fn classes_from_rows(&self, rows: Vec<ClassRow>) -> Result<Vec<Class>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let links: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT class_id, student_id FROM class_students WHERE class_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut students: HashMap<Uuid, BTreeSet<StudentId>> = HashMap::new();
        for (class, student) in links {
            students.entry(class).or_default().insert(StudentId(student));
        }
        rows.into_iter()
            .map(|row| {
                let enrolled = students.remove(&row.id).unwrap_or_default();
                row.into_class(enrolled)
            })
            .collect()
    }

    async fn lock_class(tx: &mut Transaction<'_, Postgres>, class: ClassId) -> Result<Class> {
        let row = sqlx::query_as::<_, ClassRow>(
            r#"
            SELECT id, name, subject_id, teacher_id, room_number, max_capacity
            FROM classes
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(class.0)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| SchoolError::not_found("Class", class.to_string()))?;

        let students: Vec<Uuid> =
            sqlx::query_scalar("SELECT student_id FROM class_students WHERE class_id = $1")
                .bind(class.0)
                .fetch_all(&mut **tx)
                .await?;

        row.into_class(students.into_iter().map(StudentId).collect())
    }
}

/// Rewrite the generic unique-violation message for the account table.
fn account_conflict(error: SchoolError) -> SchoolError {
    if error.code() != ErrorCode::Conflict {
        return error;
    }
    let on_email = error
        .details()
        .context
        .get("constraint")
        .and_then(|v| v.as_str())
        .is_some_and(|c| c.contains("email"));
    if on_email {
        SchoolError::conflict("A user with that email already exists").with_context("field", "email")
    } else {
        SchoolError::conflict("A user with that username already exists")
            .with_context("field", "username")
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, username, email, first_name, last_name, role, role_id,
                                  password_hash, is_active, date_joined)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.id.0)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(account.role.code())
        .bind(account.role_id.map(|id| id.0))
        .bind(&account.password_hash)
        .bind(account.is_active)
        .bind(account.date_joined)
        .execute(&self.pool)
        .await
        .map_err(|e| account_conflict(e.into()))?;
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        sqlx::query_as::<_, AccountRow>(&format!("{ACCOUNT_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(AccountRow::into_account)
            .transpose()
    }

    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        sqlx::query_as::<_, AccountRow>(&format!("{ACCOUNT_SELECT} WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(AccountRow::into_account)
            .transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        sqlx::query_as::<_, AccountRow>(&format!("{ACCOUNT_SELECT} ORDER BY date_joined"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AccountRow::into_account)
            .collect()
    }

    async fn set_account_role(
        &self,
        id: AccountId,
        role: CoarseRole,
        role_id: Option<RoleId>,
    ) -> Result<Account> {
        sqlx::query_as::<_, AccountRow>(
            r#"
            UPDATE accounts SET role = $2, role_id = $3
            WHERE id = $1
            RETURNING id, username, email, first_name, last_name, role, role_id,
                      password_hash, is_active, date_joined
            "#,
        )
        .bind(id.0)
        .bind(role.code())
        .bind(role_id.map(|r| r.0))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SchoolError::not_found("Account", id.to_string()))?
        .into_account()
    }

    async fn delete_account(&self, id: AccountId) -> Result<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchoolError::not_found("Account", id.to_string()));
        }
        debug!(account_id = %id, "Deleted account");
        Ok(())
    }

    async fn insert_token(&self, token: &TokenRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO tokens (jti, account_id, issued_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&token.jti)
        .bind(token.account_id.0)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_token(&self, jti: &str) -> Result<Option<TokenRecord>> {
        Ok(sqlx::query_as::<_, TokenRow>(
            "SELECT jti, account_id, issued_at, expires_at FROM tokens WHERE jti = $1",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?
        .map(TokenRow::into_record))
    }

    async fn latest_active_token(
        &self,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenRecord>> {
        Ok(sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT jti, account_id, issued_at, expires_at FROM tokens
            WHERE account_id = $1 AND expires_at > $2
            ORDER BY issued_at DESC
            LIMIT 1
            "#,
        )
        .bind(account.0)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .map(TokenRow::into_record))
    }

    async fn delete_token(&self, jti: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tokens WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<()> {
        sqlx::query("INSERT INTO permissions (code, name, description) VALUES ($1, $2, $3)")
            .bind(&permission.code)
            .bind(&permission.name)
            .bind(&permission.description)
            .execute(&self.pool)
            .await
            .map_err(|e| match SchoolError::from(e) {
                err if err.code() == ErrorCode::Conflict => SchoolError::conflict(
                    format!("Permission code already exists: {}", permission.code),
                ),
                err => err,
            })?;
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT code, name, description FROM permissions ORDER BY code")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(code, name, description)| Permission { code, name, description })
            .collect())
    }

    async fn update_permission(&self, permission: &Permission) -> Result<()> {
        let result = sqlx::query("UPDATE permissions SET name = $2, description = $3 WHERE code = $1")
            .bind(&permission.code)
            .bind(&permission.name)
            .bind(&permission.description)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchoolError::not_found("Permission", permission.code.clone()));
        }
        Ok(())
    }

    async fn delete_permission(&self, code: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM permissions WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchoolError::not_found("Permission", code));
        }
        Ok(())
    }

    async fn insert_role(&self, role: &Role) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, category, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.id.0)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.category.map(|c| c.code()))
        .bind(role.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match SchoolError::from(e) {
            err if err.code() == ErrorCode::Conflict => {
                SchoolError::conflict(format!("Role already exists: {}", role.name))
            }
            err => err,
        })?;

        for code in &role.permissions {
            sqlx::query("INSERT INTO role_permissions (role_id, code) VALUES ($1, $2)")
                .bind(role.id.0)
                .bind(code)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(&format!("{ROLE_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.roles_from_rows(rows).await?.pop())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let rows =
            sqlx::query_as::<_, RoleRow>(&format!("{ROLE_SELECT} WHERE lower(name) = lower($1)"))
                .bind(name.trim())
                .fetch_all(&self.pool)
                .await?;
        Ok(self.roles_from_rows(rows).await?.pop())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(&format!("{ROLE_SELECT} ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;
        self.roles_from_rows(rows).await
    }

    async fn insert_student(&self, student: &StudentProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (id, account_id, student_number, grade_level, enrollment_date,
                                  guardian_name, guardian_phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(student.id.0)
        .bind(student.account_id.0)
        .bind(&student.student_number)
        .bind(student.grade_level)
        .bind(student.enrollment_date)
        .bind(&student.guardian_name)
        .bind(&student.guardian_phone)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<StudentProfile>> {
        Ok(sqlx::query_as::<_, StudentRow>(&format!("{STUDENT_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(StudentRow::into_profile))
    }

    async fn student_for_account(&self, account: AccountId) -> Result<Option<StudentProfile>> {
        Ok(sqlx::query_as::<_, StudentRow>(&format!("{STUDENT_SELECT} WHERE account_id = $1"))
            .bind(account.0)
            .fetch_optional(&self.pool)
            .await?
            .map(StudentRow::into_profile))
    }

    async fn list_students(&self) -> Result<Vec<StudentProfile>> {
        Ok(sqlx::query_as::<_, StudentRow>(&format!("{STUDENT_SELECT} ORDER BY student_number"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(StudentRow::into_profile)
            .collect())
    }

    async fn insert_teacher(&self, teacher: &TeacherProfile) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO teachers (id, account_id, employee_number, department, qualification, hire_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(teacher.id.0)
        .bind(teacher.account_id.0)
        .bind(&teacher.employee_number)
        .bind(&teacher.department)
        .bind(&teacher.qualification)
        .bind(teacher.hire_date)
        .execute(&mut *tx)
        .await?;

        for subject in &teacher.subjects {
            sqlx::query("INSERT INTO teacher_subjects (teacher_id, subject_id) VALUES ($1, $2)")
                .bind(teacher.id.0)
                .bind(subject.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_teacher(&self, id: TeacherId) -> Result<Option<TeacherProfile>> {
        let rows = sqlx::query_as::<_, TeacherRow>(&format!("{TEACHER_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.teachers_from_rows(rows).await?.pop())
    }

    async fn teacher_for_account(&self, account: AccountId) -> Result<Option<TeacherProfile>> {
        let rows =
            sqlx::query_as::<_, TeacherRow>(&format!("{TEACHER_SELECT} WHERE account_id = $1"))
                .bind(account.0)
                .fetch_all(&self.pool)
                .await?;
        Ok(self.teachers_from_rows(rows).await?.pop())
    }

    async fn list_teachers(&self) -> Result<Vec<TeacherProfile>> {
        let rows = sqlx::query_as::<_, TeacherRow>(&format!("{TEACHER_SELECT} ORDER BY employee_number"))
            .fetch_all(&self.pool)
            .await?;
        self.teachers_from_rows(rows).await
    }

    async fn insert_subject(&self, subject: &Subject) -> Result<()> {
        sqlx::query(
            "INSERT INTO subjects (id, code, name, description, credits) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(subject.id.0)
        .bind(&subject.code)
        .bind(&subject.name)
        .bind(&subject.description)
        .bind(subject.credits)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>> {
        Ok(sqlx::query_as::<_, SubjectRow>(
            "SELECT id, code, name, description, credits FROM subjects WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .map(SubjectRow::into_subject))
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>> {
        Ok(sqlx::query_as::<_, SubjectRow>(
            "SELECT id, code, name, description, credits FROM subjects ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(SubjectRow::into_subject)
        .collect())
    }

    async fn insert_class(&self, class: &Class) -> Result<()> {
        let capacity = i32::try_from(class.max_capacity)
            .map_err(|_| SchoolError::validation("max_capacity is out of range"))?;
        sqlx::query(
            r#"
            INSERT INTO classes (id, name, subject_id, teacher_id, room_number, max_capacity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(class.id.0)
        .bind(&class.name)
        .bind(class.subject_id.0)
        .bind(class.teacher_id.0)
        .bind(&class.room_number)
        .bind(capacity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_class(&self, id: ClassId) -> Result<Option<Class>> {
        let rows = sqlx::query_as::<_, ClassRow>(&format!("{CLASS_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.classes_from_rows(rows).await?.pop())
    }

    async fn list_classes(&self) -> Result<Vec<Class>> {
        let rows = sqlx::query_as::<_, ClassRow>(&format!("{CLASS_SELECT} ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;
        self.classes_from_rows(rows).await
    }

    async fn enroll(&self, class: ClassId, student: StudentId) -> Result<EnrollOutcome> {
        let mut tx = self.pool.begin().await?;
        let row = Self::lock_class(&mut tx, class).await?;

        let student_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM students WHERE id = $1)")
                .bind(student.0)
                .fetch_one(&mut *tx)
                .await?;
        if !student_exists {
            return Err(SchoolError::not_found("Student", student.to_string()));
        }

        let outcome = check_enroll_counts(&row, row.is_enrolled(student), row.enrolled_count())?;
        if outcome == EnrollOutcome::Enrolled {
            sqlx::query("INSERT INTO class_students (class_id, student_id) VALUES ($1, $2)")
                .bind(class.0)
                .bind(student.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn unenroll(&self, class: ClassId, student: StudentId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let row = Self::lock_class(&mut tx, class).await?;
        check_unenroll(&row, student)?;

        sqlx::query("DELETE FROM class_students WHERE class_id = $1 AND student_id = $2")
            .bind(class.0)
            .bind(student.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_attendance(&self, record: &Attendance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO attendance (id, student_id, class_id, date, status, remarks, marked_by, marked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id.0)
        .bind(record.student_id.0)
        .bind(record.class_id.0)
        .bind(record.date)
        .bind(record.status.as_str())
        .bind(&record.remarks)
        .bind(record.marked_by.map(|a| a.0))
        .bind(record.marked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match SchoolError::from(e) {
            err if err.code() == ErrorCode::Conflict => SchoolError::conflict(format!(
                "Attendance already recorded for this student, class and date ({})",
                record.date
            )),
            err => err,
        })?;
        Ok(())
    }

    async fn get_attendance(&self, id: AttendanceId) -> Result<Option<Attendance>> {
        sqlx::query_as::<_, AttendanceRow>(&format!("{ATTENDANCE_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRow::into_record)
            .transpose()
    }

    async fn update_attendance(&self, record: &Attendance) -> Result<()> {
        let result = sqlx::query("UPDATE attendance SET status = $2, remarks = $3 WHERE id = $1")
            .bind(record.id.0)
            .bind(record.status.as_str())
            .bind(&record.remarks)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SchoolError::not_found("Attendance", record.id.to_string()));
        }
        Ok(())
    }

    async fn list_attendance(&self) -> Result<Vec<Attendance>> {
        sqlx::query_as::<_, AttendanceRow>(&format!("{ATTENDANCE_SELECT} ORDER BY date DESC"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AttendanceRow::into_record)
            .collect()
    }

    async fn insert_grade(&self, grade: &Grade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO grades (id, student_id, subject_id, teacher_id, assignment_name, score,
                                max_grade, comments, date_assigned)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(grade.id.0)
        .bind(grade.student_id.0)
        .bind(grade.subject_id.0)
        .bind(grade.teacher_id.0)
        .bind(&grade.assignment_name)
        .bind(grade.score)
        .bind(grade.max_grade)
        .bind(&grade.comments)
        .bind(grade.date_assigned)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_grade(&self, id: GradeId) -> Result<Option<Grade>> {
        Ok(sqlx::query_as::<_, GradeRow>(&format!("{GRADE_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(GradeRow::into_grade))
    }

    async fn update_grade(&self, grade: &Grade) -> Result<()> {
        let result = sqlx::query(
            "UPDATE grades SET score = $2, max_grade = $3, comments = $4, assignment_name = $5 WHERE id = $1",
        )
        .bind(grade.id.0)
        .bind(grade.score)
        .bind(grade.max_grade)
        .bind(&grade.comments)
        .bind(&grade.assignment_name)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SchoolError::not_found("Grade", grade.id.to_string()));
        }
        Ok(())
    }

    async fn list_grades(&self) -> Result<Vec<Grade>> {
        Ok(sqlx::query_as::<_, GradeRow>(&format!("{GRADE_SELECT} ORDER BY date_assigned DESC"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(GradeRow::into_grade)
            .collect())
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO assignments (id, class_id, teacher_id, title, description, due_date,
                                     max_points, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(assignment.id.0)
        .bind(assignment.class_id.0)
        .bind(assignment.teacher_id.0)
        .bind(&assignment.title)
        .bind(&assignment.description)
        .bind(assignment.due_date)
        .bind(assignment.max_points)
        .bind(assignment.status.as_str())
        .bind(assignment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>> {
        sqlx::query_as::<_, AssignmentRow>(&format!("{ASSIGNMENT_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(AssignmentRow::into_assignment)
            .transpose()
    }

    async fn update_assignment(&self, assignment: &Assignment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE assignments
            SET title = $2, description = $3, due_date = $4, max_points = $5, status = $6
            WHERE id = $1
            "#,
        )
        .bind(assignment.id.0)
        .bind(&assignment.title)
        .bind(&assignment.description)
        .bind(assignment.due_date)
        .bind(assignment.max_points)
        .bind(assignment.status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SchoolError::not_found("Assignment", assignment.id.to_string()));
        }
        Ok(())
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        sqlx::query_as::<_, AssignmentRow>(&format!("{ASSIGNMENT_SELECT} ORDER BY due_date"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AssignmentRow::into_assignment)
            .collect()
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO submissions (id, assignment_id, student_id, content, submitted_at, is_late)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(submission.id.0)
        .bind(submission.assignment_id.0)
        .bind(submission.student_id.0)
        .bind(&submission.content)
        .bind(submission.submitted_at)
        .bind(submission.is_late)
        .execute(&self.pool)
        .await
        .map_err(|e| match SchoolError::from(e) {
            err if err.code() == ErrorCode::Conflict => {
                SchoolError::conflict("A submission for this assignment already exists")
            }
            err => err,
        })?;
        Ok(())
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
        Ok(sqlx::query_as::<_, SubmissionRow>(&format!("{SUBMISSION_SELECT} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(SubmissionRow::into_submission))
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>> {
        Ok(sqlx::query_as::<_, SubmissionRow>(&format!("{SUBMISSION_SELECT} ORDER BY submitted_at DESC"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(SubmissionRow::into_submission)
            .collect())
    }

    async fn relation_snapshot(&self) -> Result<RelationSnapshot> {
        let classes: Vec<(Uuid, Uuid)> = sqlx::query_as("SELECT id, teacher_id FROM classes")
            .fetch_all(&self.pool)
            .await?;
        let enrollments: Vec<(Uuid, Uuid)> =
            sqlx::query_as("SELECT class_id, student_id FROM class_students")
                .fetch_all(&self.pool)
                .await?;
        let assignments: Vec<(Uuid, Uuid)> =
            sqlx::query_as("SELECT id, teacher_id FROM assignments")
                .fetch_all(&self.pool)
                .await?;

        let mut snapshot = RelationSnapshot::new();
        for (class, teacher) in classes {
            snapshot.insert_class_teacher(ClassId(class), TeacherId(teacher));
        }
        for (class, student) in enrollments {
            snapshot.insert_enrollment(ClassId(class), StudentId(student));
        }
        for (assignment, teacher) in assignments {
            snapshot.insert_assignment_teacher(AssignmentId(assignment), TeacherId(teacher));
        }
        Ok(snapshot)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types (for sqlx queries)
// ═══════════════════════════════════════════════════════════════════════════════

const ACCOUNT_SELECT: &str = "SELECT id, username, email, first_name, last_name, role, role_id, \
                              password_hash, is_active, date_joined FROM accounts";
const ROLE_SELECT: &str = "SELECT id, name, description, category, created_at FROM roles";
const STUDENT_SELECT: &str = "SELECT id, account_id, student_number, grade_level, enrollment_date, \
                              guardian_name, guardian_phone FROM students";
const TEACHER_SELECT: &str = "SELECT id, account_id, employee_number, department, qualification, \
                              hire_date FROM teachers";
const CLASS_SELECT: &str =
    "SELECT id, name, subject_id, teacher_id, room_number, max_capacity FROM classes";
const ATTENDANCE_SELECT: &str = "SELECT id, student_id, class_id, date, status, remarks, marked_by, \
                                 marked_at FROM attendance";
const GRADE_SELECT: &str = "SELECT id, student_id, subject_id, teacher_id, assignment_name, score, \
                            max_grade, comments, date_assigned FROM grades";
const ASSIGNMENT_SELECT: &str = "SELECT id, class_id, teacher_id, title, description, due_date, \
                                 max_points, status, created_at FROM assignments";
const SUBMISSION_SELECT: &str =
    "SELECT id, assignment_id, student_id, content, submitted_at, is_late FROM submissions";

fn corrupt(column: &str, value: impl std::fmt::Display) -> SchoolError {
    SchoolError::internal(format!("Unexpected value in column {}: {}", column, value))
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    role: i16,
    role_id: Option<Uuid>,
    password_hash: String,
    is_active: bool,
    date_joined: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Result<Account> {
        let role = CoarseRole::from_code(self.role).ok_or_else(|| corrupt("accounts.role", self.role))?;
        Ok(Account {
            id: AccountId(self.id),
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role,
            role_id: self.role_id.map(RoleId),
            password_hash: self.password_hash,
            is_active: self.is_active,
            date_joined: self.date_joined,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    jti: String,
    account_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TokenRow {
    fn into_record(self) -> TokenRecord {
        TokenRecord {
            jti: self.jti,
            account_id: AccountId(self.account_id),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    description: String,
    category: Option<i16>,
    created_at: DateTime<Utc>,
}

impl RoleRow {
    fn into_role(self, permissions: BTreeSet<String>) -> Result<Role> {
        let category = match self.category {
            Some(code) => Some(CoarseRole::from_code(code).ok_or_else(|| corrupt("roles.category", code))?),
            None => None,
        };
        Ok(Role {
            id: RoleId(self.id),
            name: self.name,
            description: self.description,
            category,
            permissions,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StudentRow {
    id: Uuid,
    account_id: Uuid,
    student_number: String,
    grade_level: i16,
    enrollment_date: NaiveDate,
    guardian_name: Option<String>,
    guardian_phone: Option<String>,
}

impl StudentRow {
    fn into_profile(self) -> StudentProfile {
        StudentProfile {
            id: StudentId(self.id),
            account_id: AccountId(self.account_id),
            student_number: self.student_number,
            grade_level: self.grade_level,
            enrollment_date: self.enrollment_date,
            guardian_name: self.guardian_name,
            guardian_phone: self.guardian_phone,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TeacherRow {
    id: Uuid,
    account_id: Uuid,
    employee_number: String,
    department: String,
    qualification: Option<String>,
    hire_date: NaiveDate,
}

impl TeacherRow {
    fn into_profile(self, subjects: BTreeSet<SubjectId>) -> TeacherProfile {
        TeacherProfile {
            id: TeacherId(self.id),
            account_id: AccountId(self.account_id),
            employee_number: self.employee_number,
            department: self.department,
            qualification: self.qualification,
            hire_date: self.hire_date,
            subjects,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubjectRow {
    id: Uuid,
    code: String,
    name: String,
    description: String,
    credits: i16,
}

impl SubjectRow {
    fn into_subject(self) -> Subject {
        Subject {
            id: SubjectId(self.id),
            code: self.code,
            name: self.name,
            description: self.description,
            credits: self.credits,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ClassRow {
    id: Uuid,
    name: String,
    subject_id: Uuid,
    teacher_id: Uuid,
    room_number: Option<String>,
    max_capacity: i32,
}

impl ClassRow {
    fn into_class(self, students: BTreeSet<StudentId>) -> Result<Class> {
        let max_capacity = u32::try_from(self.max_capacity)
            .map_err(|_| corrupt("classes.max_capacity", self.max_capacity))?;
        Ok(Class {
            id: ClassId(self.id),
            name: self.name,
            subject_id: SubjectId(self.subject_id),
            teacher_id: TeacherId(self.teacher_id),
            room_number: self.room_number,
            max_capacity,
            students,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttendanceRow {
    id: Uuid,
    student_id: Uuid,
    class_id: Uuid,
    date: NaiveDate,
    status: String,
    remarks: Option<String>,
    marked_by: Option<Uuid>,
    marked_at: DateTime<Utc>,
}

impl AttendanceRow {
    fn into_record(self) -> Result<Attendance> {
        Ok(Attendance {
            id: AttendanceId(self.id),
            student_id: StudentId(self.student_id),
            class_id: ClassId(self.class_id),
            date: self.date,
            status: self.status.parse()?,
            remarks: self.remarks,
            marked_by: self.marked_by.map(AccountId),
            marked_at: self.marked_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GradeRow {
    id: Uuid,
    student_id: Uuid,
    subject_id: Uuid,
    teacher_id: Uuid,
    assignment_name: String,
    score: f64,
    max_grade: f64,
    comments: Option<String>,
    date_assigned: DateTime<Utc>,
}

impl GradeRow {
    fn into_grade(self) -> Grade {
        Grade {
            id: GradeId(self.id),
            student_id: StudentId(self.student_id),
            subject_id: SubjectId(self.subject_id),
            teacher_id: TeacherId(self.teacher_id),
            assignment_name: self.assignment_name,
            score: self.score,
            max_grade: self.max_grade,
            comments: self.comments,
            date_assigned: self.date_assigned,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    class_id: Uuid,
    teacher_id: Uuid,
    title: String,
    description: String,
    due_date: DateTime<Utc>,
    max_points: f64,
    status: String,
    created_at: DateTime<Utc>,
}

impl AssignmentRow {
    fn into_assignment(self) -> Result<Assignment> {
        Ok(Assignment {
            id: AssignmentId(self.id),
            class_id: ClassId(self.class_id),
            teacher_id: TeacherId(self.teacher_id),
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            max_points: self.max_points,
            status: self.status.parse()?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    assignment_id: Uuid,
    student_id: Uuid,
    content: String,
    submitted_at: DateTime<Utc>,
    is_late: bool,
}

impl SubmissionRow {
    fn into_submission(self) -> Submission {
        Submission {
            id: SubmissionId(self.id),
            assignment_id: AssignmentId(self.assignment_id),
            student_id: StudentId(self.student_id),
            content: self.content,
            submitted_at: self.submitted_at,
            is_late: self.is_late,
        }
    }
}
