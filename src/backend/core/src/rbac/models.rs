//! RBAC data models: Permission, Role and the Principal every decision is about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, SchoolError};
use crate::identity::{Account, CoarseRole};
use crate::ids::{AccountId, RoleId, StudentId, TeacherId};

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A named capability.
///
/// `code` is the identity key used by every capability check; `name` and
/// `description` are display-only and can be renamed freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Permission {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Reject empty or whitespace-bearing codes.
    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(SchoolError::validation("Permission code must not be empty"));
        }
        if self.code.chars().any(char::is_whitespace) {
            return Err(SchoolError::validation(format!(
                "Permission code must not contain whitespace: {:?}",
                self.code
            )));
        }
        if self.name.trim().is_empty() {
            return Err(SchoolError::validation("Permission name must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A named bundle of capability codes.
///
/// Accounts point at a Role; the Role does not own them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Coarse role implied by holding this Role, if any.
    pub category: Option<CoarseRole>,
    /// Capability codes, deduplicated and ordered.
    pub permissions: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, permissions: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: RoleId::new(),
            name: name.into(),
            description: String::new(),
            category: None,
            permissions: permissions.into_iter().collect(),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: CoarseRole) -> Self {
        self.category = Some(category);
        self
    }

    pub fn has_capability(&self, code: &str) -> bool {
        self.permissions.contains(code)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// The subject of every authorization decision.
///
/// Built once per request from the bearer credential: the account, its coarse
/// role, the linked Role with live permissions, and whichever profile the
/// account owns.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub account_id: Option<AccountId>,
    pub username: String,
    pub role: Option<CoarseRole>,
    pub linked_role: Option<Role>,
    pub student_id: Option<StudentId>,
    pub teacher_id: Option<TeacherId>,
}

impl Principal {
    /// An unauthenticated caller.
    pub fn anonymous() -> Self {
        Self {
            username: "anonymous".to_string(),
            ..Self::default()
        }
    }

    pub fn for_account(account: &Account) -> Self {
        Self {
            account_id: Some(account.id),
            username: account.username.clone(),
            role: Some(account.role),
            ..Self::default()
        }
    }

    pub fn with_linked_role(mut self, role: Option<Role>) -> Self {
        self.linked_role = role;
        self
    }

    pub fn with_student_profile(mut self, student_id: Option<StudentId>) -> Self {
        self.student_id = student_id;
        self
    }

    pub fn with_teacher_profile(mut self, teacher_id: Option<TeacherId>) -> Self {
        self.teacher_id = teacher_id;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.account_id.is_some() && self.role.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.is_authenticated() && self.role == Some(CoarseRole::Admin)
    }

    /// The account id, or `Unauthenticated`.
    pub fn require_account(&self) -> Result<AccountId> {
        self.account_id
            .ok_or_else(|| SchoolError::unauthenticated("Authentication credentials were not provided"))
    }

    /// Every capability code the linked Role grants.
    pub fn capabilities(&self) -> BTreeSet<String> {
        self.linked_role
            .as_ref()
            .map(|role| role.permissions.clone())
            .unwrap_or_default()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.account_id, self.role) {
            (Some(id), Some(role)) => write!(f, "{}({}, {})", self.username, role, id),
            _ => f.write_str("anonymous"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_deduplicates_codes() {
        let role = Role::new(
            "Grader",
            vec!["grade:write".to_string(), "grade:read".to_string(), "grade:write".to_string()],
        );
        assert_eq!(role.permissions.len(), 2);
        assert!(role.has_capability("grade:read"));
        assert!(!role.has_capability("grade:delete"));
    }

    #[test]
    fn test_permission_validation() {
        assert!(Permission::new("view_grades", "View grades").validate().is_ok());
        assert!(Permission::new("", "Nothing").validate().is_err());
        assert!(Permission::new("view grades", "Spaced").validate().is_err());
    }

    #[test]
    fn test_anonymous_principal() {
        let p = Principal::anonymous();
        assert!(!p.is_authenticated());
        assert!(!p.is_admin());
        assert!(p.require_account().is_err());
        assert_eq!(p.to_string(), "anonymous");
    }

    #[test]
    fn test_principal_for_account() {
        let account = Account::new("root", "root@example.com", CoarseRole::Admin, "h");
        let p = Principal::for_account(&account);
        assert!(p.is_admin());
        assert_eq!(p.require_account().unwrap(), account.id);
        assert!(p.capabilities().is_empty());
    }
}
