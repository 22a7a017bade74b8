//! Authorization decisions.
//!
//! Every check here is a pure function of the [`Principal`] and the record
//! handed in. "No access" is an answer (`false`, or an empty row set), never an
//! error; the `enforce_*` wrappers are the one place where `false` becomes
//! [`ErrorCode::Forbidden`](crate::error::ErrorCode::Forbidden) or
//! `Unauthenticated`.

use metrics::counter;
use tracing::{debug, warn};

use super::models::Principal;
use crate::error::{Result, SchoolError};
use crate::identity::CoarseRole;
use crate::ids::{AccountId, StudentId, TeacherId};

// ═══════════════════════════════════════════════════════════════════════════════
// Capability and role checks
// ═══════════════════════════════════════════════════════════════════════════════

/// Can the principal exercise `required`?
///
/// `None` means the operation needs no capability. Admins pass every check.
/// Other principals pass only if their linked Role carries the code; having no
/// linked Role is a plain "no".
pub fn can_perform(principal: &Principal, required: Option<&str>) -> bool {
    let Some(code) = required else {
        return true;
    };

    if !principal.is_authenticated() {
        debug!(capability = code, "Capability denied: unauthenticated");
        return false;
    }

    if principal.is_admin() {
        return true;
    }

    match &principal.linked_role {
        Some(role) if role.has_capability(code) => {
            debug!(
                principal = %principal,
                capability = code,
                role = %role.name,
                "Capability granted"
            );
            true
        }
        Some(role) => {
            debug!(
                principal = %principal,
                capability = code,
                role = %role.name,
                "Capability denied: not granted by role"
            );
            false
        }
        None => {
            debug!(principal = %principal, capability = code, "Capability denied: no linked role");
            false
        }
    }
}

/// Is the principal authenticated with one of the given coarse roles?
pub fn has_role(principal: &Principal, one_of: &[CoarseRole]) -> bool {
    match principal.role {
        Some(role) if principal.is_authenticated() => one_of.contains(&role),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ownership
// ═══════════════════════════════════════════════════════════════════════════════

/// A party a record can point back at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerRef {
    Account(AccountId),
    Student(StudentId),
    Teacher(TeacherId),
}

impl OwnerRef {
    /// Does this reference resolve to the principal's account?
    ///
    /// Profiles are one-to-one with accounts, so matching the principal's own
    /// profile ids is the same as resolving the profile to its account.
    pub fn resolves_to(&self, principal: &Principal) -> bool {
        match self {
            Self::Account(id) => principal.account_id == Some(*id),
            Self::Student(id) => principal.student_id == Some(*id),
            Self::Teacher(id) => principal.teacher_id == Some(*id),
        }
    }
}

/// Records that carry a student relation and/or a generic owner.
pub trait Owned {
    /// The student the record is about.
    fn student(&self) -> Option<StudentId> {
        None
    }

    /// The party that created or runs the record.
    fn owner(&self) -> Option<OwnerRef>;
}

/// True for Admins, or when the record's student or owner is the principal.
pub fn is_owner_or_admin(principal: &Principal, record: &impl Owned) -> bool {
    if !principal.is_authenticated() {
        return false;
    }
    if principal.is_admin() {
        return true;
    }

    let via_student = record
        .student()
        .map(|id| OwnerRef::Student(id).resolves_to(principal))
        .unwrap_or(false);
    let via_owner = record
        .owner()
        .map(|owner| owner.resolves_to(principal))
        .unwrap_or(false);

    via_student || via_owner
}

/// True for Admins, or when the record's owner (never its student) is the principal.
///
/// Used for mutations: a student may read their grade but not rewrite it.
pub fn is_author_or_admin(principal: &Principal, record: &impl Owned) -> bool {
    if !principal.is_authenticated() {
        return false;
    }
    principal.is_admin()
        || record
            .owner()
            .map(|owner| owner.resolves_to(principal))
            .unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Enforcement
// ═══════════════════════════════════════════════════════════════════════════════

fn denied(check: &'static str, principal: &Principal, message: String) -> SchoolError {
    counter!("school_access_denied_total", "check" => check).increment(1);
    if principal.is_authenticated() {
        warn!(principal = %principal, check, "Access denied");
        SchoolError::forbidden(message)
    } else {
        SchoolError::unauthenticated("Authentication credentials were not provided")
    }
}

/// `can_perform`, mapped to `Unauthenticated` / `Forbidden`.
pub fn enforce_capability(principal: &Principal, required: Option<&str>) -> Result<()> {
    if can_perform(principal, required) {
        Ok(())
    } else {
        Err(denied(
            "capability",
            principal,
            format!(
                "You do not have permission: {}",
                required.unwrap_or_default()
            ),
        ))
    }
}

/// `has_role`, mapped to `Unauthenticated` / `Forbidden`.
pub fn enforce_role(principal: &Principal, one_of: &[CoarseRole]) -> Result<()> {
    if has_role(principal, one_of) {
        Ok(())
    } else {
        let allowed: Vec<&str> = one_of.iter().map(|r| r.label()).collect();
        Err(denied(
            "role",
            principal,
            format!("This action requires one of the roles: {}", allowed.join(", ")),
        ))
    }
}

/// `is_owner_or_admin`, mapped to `Unauthenticated` / `Forbidden`.
pub fn enforce_owner_or_admin(principal: &Principal, record: &impl Owned) -> Result<()> {
    if is_owner_or_admin(principal, record) {
        Ok(())
    } else {
        Err(denied(
            "ownership",
            principal,
            "You do not have access to this record".to_string(),
        ))
    }
}

/// `is_author_or_admin`, mapped to `Unauthenticated` / `Forbidden`.
pub fn enforce_author_or_admin(principal: &Principal, record: &impl Owned) -> Result<()> {
    if is_author_or_admin(principal, record) {
        Ok(())
    } else {
        Err(denied(
            "authorship",
            principal,
            "Only the owner of this record or an admin may change it".to_string(),
        ))
    }
}
