//! Built-in capability codes and default roles.
//!
//! | Role    | Category | Grants                                                        |
//! |---------|----------|---------------------------------------------------------------|
//! | Admin   | Admin    | Every capability                                              |
//! | Teacher | Teacher  | Every `view_*`, plus marking, grading, classes, assignments   |
//! | Student | Student  | Viewing their own records, submitting assignments             |

use tracing::{debug, info};

use super::models::{Permission, Role};
use crate::error::{ErrorCode, Result};
use crate::identity::CoarseRole;
use crate::store::Store;

pub const VIEW_STUDENTS: &str = "view_students";
pub const VIEW_TEACHERS: &str = "view_teachers";
pub const VIEW_SUBJECTS: &str = "view_subjects";
pub const VIEW_CLASSES: &str = "view_classes";
pub const MANAGE_CLASSES: &str = "manage_classes";
pub const VIEW_ATTENDANCE: &str = "view_attendance";
pub const MARK_ATTENDANCE: &str = "mark_attendance";
pub const VIEW_GRADES: &str = "view_grades";
pub const MANAGE_GRADES: &str = "manage_grades";
pub const VIEW_ASSIGNMENTS: &str = "view_assignments";
pub const MANAGE_ASSIGNMENTS: &str = "manage_assignments";
pub const VIEW_SUBMISSIONS: &str = "view_submissions";
pub const SUBMIT_ASSIGNMENTS: &str = "submit_assignments";
pub const MANAGE_ROLES: &str = "manage_roles";

/// Every built-in capability with its display name.
pub const BUILTIN_PERMISSIONS: &[(&str, &str)] = &[
    (VIEW_STUDENTS, "Can view students"),
    (VIEW_TEACHERS, "Can view teachers"),
    (VIEW_SUBJECTS, "Can view subjects"),
    (VIEW_CLASSES, "Can view classes"),
    (MANAGE_CLASSES, "Can manage class enrollment"),
    (VIEW_ATTENDANCE, "Can view attendance"),
    (MARK_ATTENDANCE, "Can mark attendance"),
    (VIEW_GRADES, "Can view grades"),
    (MANAGE_GRADES, "Can record and correct grades"),
    (VIEW_ASSIGNMENTS, "Can view assignments"),
    (MANAGE_ASSIGNMENTS, "Can create and publish assignments"),
    (VIEW_SUBMISSIONS, "Can view submissions"),
    (SUBMIT_ASSIGNMENTS, "Can submit assignments"),
    (MANAGE_ROLES, "Can manage roles and permissions"),
];

pub fn builtin_permissions() -> Vec<Permission> {
    BUILTIN_PERMISSIONS
        .iter()
        .map(|(code, name)| Permission::new(*code, *name))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Default Roles
// ═══════════════════════════════════════════════════════════════════════════════

/// Role templates seeded into a fresh installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRole {
    Admin,
    Teacher,
    Student,
}

impl DefaultRole {
    pub fn all() -> [DefaultRole; 3] {
        [Self::Admin, Self::Teacher, Self::Student]
    }

    pub fn category(&self) -> CoarseRole {
        match self {
            Self::Admin => CoarseRole::Admin,
            Self::Teacher => CoarseRole::Teacher,
            Self::Student => CoarseRole::Student,
        }
    }

    pub fn name(&self) -> &'static str {
        self.category().label()
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Admin => "Full access to every record and to role management",
            Self::Teacher => "Runs classes: attendance, grades and assignments",
            Self::Student => "Sees own classes and records, submits assignments",
        }
    }

    pub fn capabilities(&self) -> Vec<&'static str> {
        match self {
            Self::Admin => BUILTIN_PERMISSIONS.iter().map(|(code, _)| *code).collect(),
            Self::Teacher => vec![
                VIEW_STUDENTS,
                VIEW_TEACHERS,
                VIEW_SUBJECTS,
                VIEW_CLASSES,
                MANAGE_CLASSES,
                VIEW_ATTENDANCE,
                MARK_ATTENDANCE,
                VIEW_GRADES,
                MANAGE_GRADES,
                VIEW_ASSIGNMENTS,
                MANAGE_ASSIGNMENTS,
                VIEW_SUBMISSIONS,
            ],
            Self::Student => vec![
                VIEW_SUBJECTS,
                VIEW_CLASSES,
                VIEW_ATTENDANCE,
                VIEW_GRADES,
                VIEW_ASSIGNMENTS,
                VIEW_SUBMISSIONS,
                SUBMIT_ASSIGNMENTS,
            ],
        }
    }

    pub fn to_role(&self) -> Role {
        Role::new(
            self.name(),
            self.capabilities().into_iter().map(str::to_string),
        )
        .with_description(self.description())
        .with_category(self.category())
    }
}

/// Counts of rows written by [`seed_defaults`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
}

/// Insert the built-in permissions and default roles. Existing rows are left alone.
pub async fn seed_defaults(store: &dyn Store) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for permission in builtin_permissions() {
        match store.insert_permission(&permission).await {
            Ok(()) => report.permissions_created += 1,
            Err(e) if e.code() == ErrorCode::Conflict => {
                debug!(code = %permission.code, "Permission already present");
            }
            Err(e) => return Err(e),
        }
    }

    for template in DefaultRole::all() {
        if store.find_role_by_name(template.name()).await?.is_some() {
            debug!(role = template.name(), "Role already present");
            continue;
        }
        store.insert_role(&template.to_role()).await?;
        report.roles_created += 1;
    }

    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "Seeded default roles"
    );
    Ok(report)
}
