//! In-process store.
//!
//! All tables sit behind one `RwLock`; every check-then-write runs under a
//! single write guard, which gives the same atomicity the Postgres store gets
//! from constraints and row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

use super::Store;
use crate::error::{Result, SchoolError};
use crate::identity::{Account, CoarseRole, TokenRecord};
use crate::ids::{
    AccountId, AssignmentId, AttendanceId, ClassId, GradeId, RoleId, StudentId, SubjectId,
    SubmissionId, TeacherId,
};
use crate::rbac::{graph, Permission, RelationSnapshot, Role};
use crate::school::enrollment::{check_enroll, check_unenroll};
use crate::school::{
    Assignment, Attendance, Class, EnrollOutcome, Grade, StudentProfile, Subject, Submission,
    TeacherProfile,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    tokens: BTreeMap<String, TokenRecord>,
    permissions: BTreeMap<String, Permission>,
    roles: BTreeMap<RoleId, Role>,
    students: BTreeMap<StudentId, StudentProfile>,
    teachers: BTreeMap<TeacherId, TeacherProfile>,
    subjects: BTreeMap<SubjectId, Subject>,
    classes: BTreeMap<ClassId, Class>,
    attendance: BTreeMap<AttendanceId, Attendance>,
    grades: BTreeMap<GradeId, Grade>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    submissions: BTreeMap<SubmissionId, Submission>,
}

impl Tables {
    fn live_role(&self, role: &Role) -> Role {
        let catalog: Vec<Permission> = self.permissions.values().cloned().collect();
        graph::with_live_permissions(role.clone(), &catalog)
    }
}

/// A [`Store`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(entity: &str, id: impl ToString) -> SchoolError {
    SchoolError::not_found(entity, id.to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<()> {
        let mut t = self.tables.write();
        if t.accounts.values().any(|a| a.username == account.username) {
            return Err(SchoolError::conflict("A user with that username already exists")
                .with_context("field", "username"));
        }
        if t.accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email))
        {
            return Err(SchoolError::conflict("A user with that email already exists")
                .with_context("field", "email"));
        }
        t.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.tables.read().accounts.get(&id).cloned())
    }

    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        Ok(self
            .tables
            .read()
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.tables.read().accounts.values().cloned().collect())
    }

    async fn set_account_role(
        &self,
        id: AccountId,
        role: CoarseRole,
        role_id: Option<RoleId>,
    ) -> Result<Account> {
        let mut t = self.tables.write();
        if let Some(role_id) = role_id {
            if !t.roles.contains_key(&role_id) {
                return Err(missing("Role", role_id));
            }
        }
        let account = t.accounts.get_mut(&id).ok_or_else(|| missing("Account", id))?;
        account.role = role;
        account.role_id = role_id;
        Ok(account.clone())
    }

    async fn delete_account(&self, id: AccountId) -> Result<()> {
        let mut t = self.tables.write();
        if t.accounts.remove(&id).is_none() {
            return Err(missing("Account", id));
        }

        t.tokens.retain(|_, token| token.account_id != id);

        let student_ids: Vec<StudentId> = t
            .students
            .values()
            .filter(|s| s.account_id == id)
            .map(|s| s.id)
            .collect();
        for student in &student_ids {
            t.students.remove(student);
            for class in t.classes.values_mut() {
                class.students.remove(student);
            }
        }
        t.attendance.retain(|_, a| !student_ids.contains(&a.student_id));
        for record in t.attendance.values_mut() {
            if record.marked_by == Some(id) {
                record.marked_by = None;
            }
        }
        t.grades.retain(|_, g| !student_ids.contains(&g.student_id));
        t.submissions
            .retain(|_, s| !student_ids.contains(&s.student_id));

        let teacher_ids: Vec<TeacherId> = t
            .teachers
            .values()
            .filter(|p| p.account_id == id)
            .map(|p| p.id)
            .collect();
        for teacher in &teacher_ids {
            t.teachers.remove(teacher);
        }
        let class_ids: Vec<ClassId> = t
            .classes
            .values()
            .filter(|c| teacher_ids.contains(&c.teacher_id))
            .map(|c| c.id)
            .collect();
        t.classes.retain(|_, c| !class_ids.contains(&c.id));
        t.attendance.retain(|_, a| !class_ids.contains(&a.class_id));
        t.grades.retain(|_, g| !teacher_ids.contains(&g.teacher_id));
        let assignment_ids: Vec<AssignmentId> = t
            .assignments
            .values()
            .filter(|a| class_ids.contains(&a.class_id) || teacher_ids.contains(&a.teacher_id))
            .map(|a| a.id)
            .collect();
        t.assignments.retain(|_, a| !assignment_ids.contains(&a.id));
        t.submissions
            .retain(|_, s| !assignment_ids.contains(&s.assignment_id));

        debug!(account_id = %id, "Deleted account and dependent rows");
        Ok(())
    }

    async fn insert_token(&self, token: &TokenRecord) -> Result<()> {
        let mut t = self.tables.write();
        if !t.accounts.contains_key(&token.account_id) {
            return Err(missing("Account", token.account_id));
        }
        t.tokens.insert(token.jti.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, jti: &str) -> Result<Option<TokenRecord>> {
        Ok(self.tables.read().tokens.get(jti).cloned())
    }

    async fn latest_active_token(
        &self,
        account: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenRecord>> {
        Ok(self
            .tables
            .read()
            .tokens
            .values()
            .filter(|token| token.account_id == account && token.is_active_at(now))
            .max_by_key(|token| token.issued_at)
            .cloned())
    }

    async fn delete_token(&self, jti: &str) -> Result<bool> {
        Ok(self.tables.write().tokens.remove(jti).is_some())
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<()> {
        let mut t = self.tables.write();
        if t.permissions.contains_key(&permission.code) {
            return Err(SchoolError::conflict(format!(
                "Permission code already exists: {}",
                permission.code
            )));
        }
        t.permissions
            .insert(permission.code.clone(), permission.clone());
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        Ok(self.tables.read().permissions.values().cloned().collect())
    }

    async fn update_permission(&self, permission: &Permission) -> Result<()> {
        let mut t = self.tables.write();
        let stored = t
            .permissions
            .get_mut(&permission.code)
            .ok_or_else(|| missing("Permission", &permission.code))?;
        stored.name = permission.name.clone();
        stored.description = permission.description.clone();
        Ok(())
    }

    async fn delete_permission(&self, code: &str) -> Result<()> {
        self.tables
            .write()
            .permissions
            .remove(code)
            .map(|_| ())
            .ok_or_else(|| missing("Permission", code))
    }

    async fn insert_role(&self, role: &Role) -> Result<()> {
        let mut t = self.tables.write();
        if t.roles
            .values()
            .any(|r| r.name.eq_ignore_ascii_case(&role.name))
        {
            return Err(SchoolError::conflict(format!(
                "Role already exists: {}",
                role.name
            )));
        }
        t.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>> {
        let t = self.tables.read();
        Ok(t.roles.get(&id).map(|role| t.live_role(role)))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let t = self.tables.read();
        Ok(t.roles
            .values()
            .find(|r| r.name.eq_ignore_ascii_case(name.trim()))
            .map(|role| t.live_role(role)))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let t = self.tables.read();
        let mut roles: Vec<Role> = t.roles.values().map(|role| t.live_role(role)).collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn insert_student(&self, student: &StudentProfile) -> Result<()> {
        let mut t = self.tables.write();
        if !t.accounts.contains_key(&student.account_id) {
            return Err(missing("Account", student.account_id));
        }
        if t.students.values().any(|s| s.account_id == student.account_id) {
            return Err(SchoolError::conflict("This account already has a student profile"));
        }
        if t.students
            .values()
            .any(|s| s.student_number == student.student_number)
        {
            return Err(SchoolError::conflict(format!(
                "Student number already in use: {}",
                student.student_number
            )));
        }
        t.students.insert(student.id, student.clone());
        Ok(())
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<StudentProfile>> {
        Ok(self.tables.read().students.get(&id).cloned())
    }

    async fn student_for_account(&self, account: AccountId) -> Result<Option<StudentProfile>> {
        Ok(self
            .tables
            .read()
            .students
            .values()
            .find(|s| s.account_id == account)
            .cloned())
    }

    async fn list_students(&self) -> Result<Vec<StudentProfile>> {
        Ok(self.tables.read().students.values().cloned().collect())
    }

    async fn insert_teacher(&self, teacher: &TeacherProfile) -> Result<()> {
        let mut t = self.tables.write();
        if !t.accounts.contains_key(&teacher.account_id) {
            return Err(missing("Account", teacher.account_id));
        }
        if t.teachers.values().any(|p| p.account_id == teacher.account_id) {
            return Err(SchoolError::conflict("This account already has a teacher profile"));
        }
        if t.teachers
            .values()
            .any(|p| p.employee_number == teacher.employee_number)
        {
            return Err(SchoolError::conflict(format!(
                "Employee number already in use: {}",
                teacher.employee_number
            )));
        }
        if let Some(subject) = teacher.subjects.iter().find(|s| !t.subjects.contains_key(*s)) {
            return Err(missing("Subject", subject));
        }
        t.teachers.insert(teacher.id, teacher.clone());
        Ok(())
    }

    async fn get_teacher(&self, id: TeacherId) -> Result<Option<TeacherProfile>> {
        Ok(self.tables.read().teachers.get(&id).cloned())
    }

    async fn teacher_for_account(&self, account: AccountId) -> Result<Option<TeacherProfile>> {
        Ok(self
            .tables
            .read()
            .teachers
            .values()
            .find(|p| p.account_id == account)
            .cloned())
    }

    async fn list_teachers(&self) -> Result<Vec<TeacherProfile>> {
        Ok(self.tables.read().teachers.values().cloned().collect())
    }

    async fn insert_subject(&self, subject: &Subject) -> Result<()> {
        let mut t = self.tables.write();
        if t.subjects.values().any(|s| s.code == subject.code) {
            return Err(SchoolError::conflict(format!(
                "Subject code already exists: {}",
                subject.code
            )));
        }
        t.subjects.insert(subject.id, subject.clone());
        Ok(())
    }

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>> {
        Ok(self.tables.read().subjects.get(&id).cloned())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>> {
        Ok(self.tables.read().subjects.values().cloned().collect())
    }

    async fn insert_class(&self, class: &Class) -> Result<()> {
        let mut t = self.tables.write();
        if !t.subjects.contains_key(&class.subject_id) {
            return Err(missing("Subject", class.subject_id));
        }
        if !t.teachers.contains_key(&class.teacher_id) {
            return Err(missing("Teacher", class.teacher_id));
        }
        t.classes.insert(class.id, class.clone());
        Ok(())
    }

    async fn get_class(&self, id: ClassId) -> Result<Option<Class>> {
        Ok(self.tables.read().classes.get(&id).cloned())
    }

    async fn list_classes(&self) -> Result<Vec<Class>> {
        Ok(self.tables.read().classes.values().cloned().collect())
    }

    async fn enroll(&self, class: ClassId, student: StudentId) -> Result<EnrollOutcome> {
        let mut t = self.tables.write();
        if !t.students.contains_key(&student) {
            return Err(missing("Student", student));
        }
        let row = t.classes.get_mut(&class).ok_or_else(|| missing("Class", class))?;
        let outcome = check_enroll(row, student)?;
        if outcome == EnrollOutcome::Enrolled {
            row.students.insert(student);
        }
        Ok(outcome)
    }

    async fn unenroll(&self, class: ClassId, student: StudentId) -> Result<()> {
        let mut t = self.tables.write();
        let row = t.classes.get_mut(&class).ok_or_else(|| missing("Class", class))?;
        check_unenroll(row, student)?;
        row.students.remove(&student);
        Ok(())
    }

    async fn insert_attendance(&self, record: &Attendance) -> Result<()> {
        let mut t = self.tables.write();
        if !t.students.contains_key(&record.student_id) {
            return Err(missing("Student", record.student_id));
        }
        if !t.classes.contains_key(&record.class_id) {
            return Err(missing("Class", record.class_id));
        }
        if let Some(marker) = record.marked_by {
            if !t.accounts.contains_key(&marker) {
                return Err(missing("Account", marker));
            }
        }
        let duplicate = t.attendance.values().any(|a| {
            a.student_id == record.student_id && a.class_id == record.class_id && a.date == record.date
        });
        if duplicate {
            return Err(SchoolError::conflict(format!(
                "Attendance already recorded for this student, class and date ({})",
                record.date
            )));
        }
        t.attendance.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_attendance(&self, id: AttendanceId) -> Result<Option<Attendance>> {
        Ok(self.tables.read().attendance.get(&id).cloned())
    }

    async fn update_attendance(&self, record: &Attendance) -> Result<()> {
        let mut t = self.tables.write();
        let stored = t
            .attendance
            .get_mut(&record.id)
            .ok_or_else(|| missing("Attendance", record.id))?;
        *stored = record.clone();
        Ok(())
    }

    async fn list_attendance(&self) -> Result<Vec<Attendance>> {
        let mut rows: Vec<Attendance> = self.tables.read().attendance.values().cloned().collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn insert_grade(&self, grade: &Grade) -> Result<()> {
        let mut t = self.tables.write();
        if !t.students.contains_key(&grade.student_id) {
            return Err(missing("Student", grade.student_id));
        }
        if !t.subjects.contains_key(&grade.subject_id) {
            return Err(missing("Subject", grade.subject_id));
        }
        if !t.teachers.contains_key(&grade.teacher_id) {
            return Err(missing("Teacher", grade.teacher_id));
        }
        t.grades.insert(grade.id, grade.clone());
        Ok(())
    }

    async fn get_grade(&self, id: GradeId) -> Result<Option<Grade>> {
        Ok(self.tables.read().grades.get(&id).cloned())
    }

    async fn update_grade(&self, grade: &Grade) -> Result<()> {
        let mut t = self.tables.write();
        let stored = t
            .grades
            .get_mut(&grade.id)
            .ok_or_else(|| missing("Grade", grade.id))?;
        *stored = grade.clone();
        Ok(())
    }

    async fn list_grades(&self) -> Result<Vec<Grade>> {
        let mut rows: Vec<Grade> = self.tables.read().grades.values().cloned().collect();
        rows.sort_by(|a, b| b.date_assigned.cmp(&a.date_assigned));
        Ok(rows)
    }

    async fn insert_assignment(&self, assignment: &Assignment) -> Result<()> {
        let mut t = self.tables.write();
        if !t.classes.contains_key(&assignment.class_id) {
            return Err(missing("Class", assignment.class_id));
        }
        if !t.teachers.contains_key(&assignment.teacher_id) {
            return Err(missing("Teacher", assignment.teacher_id));
        }
        t.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>> {
        Ok(self.tables.read().assignments.get(&id).cloned())
    }

    async fn update_assignment(&self, assignment: &Assignment) -> Result<()> {
        let mut t = self.tables.write();
        let stored = t
            .assignments
            .get_mut(&assignment.id)
            .ok_or_else(|| missing("Assignment", assignment.id))?;
        *stored = assignment.clone();
        Ok(())
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        let mut rows: Vec<Assignment> = self.tables.read().assignments.values().cloned().collect();
        rows.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(rows)
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let mut t = self.tables.write();
        if !t.assignments.contains_key(&submission.assignment_id) {
            return Err(missing("Assignment", submission.assignment_id));
        }
        if !t.students.contains_key(&submission.student_id) {
            return Err(missing("Student", submission.student_id));
        }
        let duplicate = t.submissions.values().any(|s| {
            s.assignment_id == submission.assignment_id && s.student_id == submission.student_id
        });
        if duplicate {
            return Err(SchoolError::conflict(
                "A submission for this assignment already exists",
            ));
        }
        t.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Option<Submission>> {
        Ok(self.tables.read().submissions.get(&id).cloned())
    }

    async fn list_submissions(&self) -> Result<Vec<Submission>> {
        let mut rows: Vec<Submission> = self.tables.read().submissions.values().cloned().collect();
        rows.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(rows)
    }

    async fn relation_snapshot(&self) -> Result<RelationSnapshot> {
        let t = self.tables.read();
        let mut snapshot = RelationSnapshot::new();
        for class in t.classes.values() {
            snapshot.add_class(class);
        }
        for assignment in t.assignments.values() {
            snapshot.add_assignment(assignment);
        }
        Ok(snapshot)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
