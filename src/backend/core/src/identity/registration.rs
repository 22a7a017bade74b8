//! Registration and login requests.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use super::models::CoarseRole;
use crate::error::{Result, SchoolError};
use crate::ids::RoleId;
use crate::rbac::{graph, Role};

/// Django-compatible usernames: letters, digits and `@.+-_`.
static USERNAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w.@+-]{1,150}$").expect("Invalid username regex")
});

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex")
});

/// A candidate account.
///
/// The coarse role comes either from `role` or from `role_name`, which must
/// name an existing Role (case-insensitive); never both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: Option<CoarseRole>,
    #[serde(default)]
    pub role_name: Option<String>,
}

impl RegistrationRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            username: username.into(),
            email: email.into(),
            password_confirm: password.clone(),
            password,
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: CoarseRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_role_name(mut self, name: impl Into<String>) -> Self {
        self.role_name = Some(name.into());
        self
    }

    /// Shape checks that need no storage: formats and password confirmation.
    pub fn validate(&self) -> Result<()> {
        if !USERNAME_REGEX.is_match(&self.username) {
            return Err(SchoolError::validation(
                "Enter a valid username: up to 150 letters, digits and @/./+/-/_ characters",
            )
            .with_context("field", "username"));
        }
        if !EMAIL_REGEX.is_match(&self.email) {
            return Err(SchoolError::validation("Enter a valid email address")
                .with_context("field", "email"));
        }
        if self.password != self.password_confirm {
            return Err(SchoolError::validation("Password fields didn't match")
                .with_context("field", "password_confirm"));
        }
        if self.role.is_some() && self.role_name.is_some() {
            return Err(SchoolError::validation(
                "Provide either role or role_name, not both",
            ));
        }
        Ok(())
    }
}

/// Where a new account lands in the role model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAssignment {
    pub coarse: CoarseRole,
    pub role_id: Option<RoleId>,
}

/// Decide the coarse role and Role link for a registration.
///
/// `named_role` is the store's case-insensitive lookup of `role_name`; it is
/// only consulted when a name was given.
pub fn resolve_role_assignment(
    request: &RegistrationRequest,
    named_role: Option<&Role>,
) -> Result<RoleAssignment> {
    match request.role_name.as_deref() {
        Some(name) => {
            let role = named_role.ok_or_else(|| {
                SchoolError::validation(format!("Role does not exist: {}", name))
                    .with_context("field", "role_name")
            })?;
            Ok(RoleAssignment {
                coarse: graph::coarse_role_for_named_role(role),
                role_id: Some(role.id),
            })
        }
        None => Ok(RoleAssignment {
            coarse: request.role.unwrap_or(CoarseRole::Student),
            role_id: None,
        }),
    }
}

/// Username and password presented at login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_valid_request_passes() {
        let req = RegistrationRequest::new("jane.doe", "jane@example.com", "Tr1cky-Walrus");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let bad_user = RegistrationRequest::new("jane doe", "jane@example.com", "x");
        assert_eq!(bad_user.validate().unwrap_err().code(), ErrorCode::ValidationError);

        let bad_email = RegistrationRequest::new("jane", "not-an-email", "x");
        assert!(bad_email.validate().is_err());

        let mut mismatch = RegistrationRequest::new("jane", "jane@example.com", "Tr1cky-Walrus");
        mismatch.password_confirm = "Tr1cky-Walrus!".into();
        assert!(mismatch.validate().is_err());

        let both = RegistrationRequest::new("jane", "jane@example.com", "Tr1cky-Walrus")
            .with_role(CoarseRole::Teacher)
            .with_role_name("Teacher");
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_role_defaults_to_student() {
        let req = RegistrationRequest::new("jane", "jane@example.com", "pw");
        let assignment = resolve_role_assignment(&req, None).unwrap();
        assert_eq!(assignment.coarse, CoarseRole::Student);
        assert_eq!(assignment.role_id, None);
    }

    #[test]
    fn test_named_role_must_exist() {
        let req = RegistrationRequest::new("jane", "jane@example.com", "pw").with_role_name("Ghost");
        let err = resolve_role_assignment(&req, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_named_role_links_and_derives_coarse_role() {
        let teacher = Role::new("Teacher", Vec::new()).with_category(CoarseRole::Teacher);
        let req = RegistrationRequest::new("jane", "jane@example.com", "pw").with_role_name("teacher");
        let assignment = resolve_role_assignment(&req, Some(&teacher)).unwrap();
        assert_eq!(assignment.coarse, CoarseRole::Teacher);
        assert_eq!(assignment.role_id, Some(teacher.id));
    }
}
