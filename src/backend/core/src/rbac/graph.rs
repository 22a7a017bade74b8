//! Permission/Role graph maintenance.
//!
//! Roles hold capability codes. Codes are resolved against the live catalog
//! when a role is created and again whenever a role is read, so a permission
//! deleted from the catalog silently drops out of every role holding it.

use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use super::models::{Permission, Role};
use crate::error::{Result, SchoolError};
use crate::identity::CoarseRole;

/// Request to create a fine-grained role.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<CoarseRole>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl NewRole {
    pub fn new(name: impl Into<String>, permissions: &[&str]) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.iter().map(|code| code.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: CoarseRole) -> Self {
        self.category = Some(category);
        self
    }
}

/// Resolve every requested code against the catalog.
///
/// All unknown codes are reported together in one `NotFound`. Duplicates are
/// collapsed without complaint.
pub fn resolve_codes(requested: &[String], catalog: &[Permission]) -> Result<BTreeSet<String>> {
    let known: HashSet<&str> = catalog.iter().map(|p| p.code.as_str()).collect();

    let mut missing: Vec<String> = Vec::new();
    let mut resolved = BTreeSet::new();
    for code in requested {
        let code = code.trim();
        if known.contains(code) {
            resolved.insert(code.to_string());
        } else if !missing.iter().any(|m| m == code) {
            missing.push(code.to_string());
        }
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(SchoolError::not_found_many("Permission", missing))
    }
}

/// Validate a role request and build the Role it describes.
pub fn build_role(request: &NewRole, catalog: &[Permission]) -> Result<Role> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(SchoolError::validation("Role name must not be empty"));
    }

    let permissions = resolve_codes(&request.permissions, catalog)?;
    debug!(role = name, permissions = permissions.len(), "Built role");

    let mut role = Role::new(name, permissions).with_description(request.description.clone());
    role.category = request.category;
    Ok(role)
}

/// Drop codes that are no longer in the catalog.
pub fn with_live_permissions(mut role: Role, catalog: &[Permission]) -> Role {
    let known: HashSet<&str> = catalog.iter().map(|p| p.code.as_str()).collect();
    role.permissions.retain(|code| known.contains(code.as_str()));
    role
}

/// Coarse role an account should carry after its Role link changes.
///
/// Linking a categorised Role adopts its category. Linking an uncategorised
/// Role, or unlinking, keeps the current coarse role.
pub fn reconcile_coarse_role(current: CoarseRole, linked: Option<&Role>) -> CoarseRole {
    linked.and_then(|role| role.category).unwrap_or(current)
}

/// Coarse role for a registration that names a Role.
///
/// The Role's category wins, then a case-insensitive match of the name
/// against the coarse labels, then Student.
pub fn coarse_role_for_named_role(role: &Role) -> CoarseRole {
    role.category
        .or_else(|| CoarseRole::from_label(&role.name))
        .unwrap_or(CoarseRole::Student)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn catalog() -> Vec<Permission> {
        vec![
            Permission::new("grade:read", "Read grades"),
            Permission::new("grade:write", "Write grades"),
        ]
    }

    #[test]
    fn test_build_role_dedupes() {
        let request = NewRole::new("Grader", &["grade:write", "grade:read", "grade:write"]);
        let role = build_role(&request, &catalog()).unwrap();
        assert_eq!(role.permissions.len(), 2);
        assert_eq!(role.category, None);
    }

    #[test]
    fn test_missing_codes_reported_together() {
        let request = NewRole::new("Broken", &["grade:write", "nope", "also_nope", "nope"]);
        let err = build_role(&request, &catalog()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let missing = err.details().context.get("missing").unwrap();
        assert_eq!(missing, &serde_json::json!(["nope", "also_nope"]));
    }

    #[test]
    fn test_deleted_permission_drops_out_on_read() {
        let role = build_role(&NewRole::new("Grader", &["grade:write", "grade:read"]), &catalog()).unwrap();
        let reduced = vec![Permission::new("grade:read", "Read grades")];
        let live = with_live_permissions(role, &reduced);
        assert!(live.has_capability("grade:read"));
        assert!(!live.has_capability("grade:write"));
    }

    #[test]
    fn test_reconcile_coarse_role() {
        let teacher_role = Role::new("Teacher", Vec::new()).with_category(CoarseRole::Teacher);
        let grader = Role::new("Grader", Vec::new());

        assert_eq!(
            reconcile_coarse_role(CoarseRole::Student, Some(&teacher_role)),
            CoarseRole::Teacher
        );
        assert_eq!(
            reconcile_coarse_role(CoarseRole::Student, Some(&grader)),
            CoarseRole::Student
        );
        assert_eq!(reconcile_coarse_role(CoarseRole::Teacher, None), CoarseRole::Teacher);
    }

    #[test]
    fn test_coarse_role_for_named_role() {
        let by_category = Role::new("Staff", Vec::new()).with_category(CoarseRole::Teacher);
        let by_label = Role::new("admin", Vec::new());
        let neither = Role::new("Grader", Vec::new());

        assert_eq!(coarse_role_for_named_role(&by_category), CoarseRole::Teacher);
        assert_eq!(coarse_role_for_named_role(&by_label), CoarseRole::Admin);
        assert_eq!(coarse_role_for_named_role(&neither), CoarseRole::Student);
    }
}
