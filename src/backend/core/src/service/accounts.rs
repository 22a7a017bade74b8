//! Registration, login, token resolution and the permission graph.

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

use super::SchoolService;
use crate::error::{ErrorCode, Result, SchoolError};
use crate::identity::registration::resolve_role_assignment;
use crate::identity::{Account, AccountView, CoarseRole, LoginRequest, RegistrationRequest};
use crate::ids::{AccountId, RoleId, StudentId, TeacherId};
use crate::rbac::{
    catalog, enforce_capability, enforce_role, graph, NewRole, Permission, Principal, Role,
};

/// Returned by register and login.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AccountView,
}

/// The caller's own account and what it may do.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub user: AccountView,
    pub linked_role: Option<Role>,
    pub permissions: BTreeSet<String>,
    pub student_id: Option<StudentId>,
    pub teacher_id: Option<TeacherId>,
}

fn bad_credentials() -> SchoolError {
    SchoolError::unauthenticated("Unable to log in with provided credentials")
}

impl SchoolService {
    // ─────────────────────────────────────────────────────────────────────────
    // Authentication
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an account and mint a fresh token for it.
    ///
    /// Does not create a student or teacher profile.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: RegistrationRequest) -> Result<AuthResponse> {
        request.validate()?;
        self.credentials
            .check_password_policy(&request.password, &request.username, &request.email)?;

        let named_role = match request.role_name.as_deref() {
            Some(name) => self.store.find_role_by_name(name).await?,
            None => None,
        };
        let mut assignment = resolve_role_assignment(&request, named_role.as_ref())?;

        // An explicit coarse role picks up the seeded Role of the same category.
        if assignment.role_id.is_none() {
            if let Some(default) = self.store.find_role_by_name(assignment.coarse.label()).await? {
                if default.category == Some(assignment.coarse) {
                    assignment.role_id = Some(default.id);
                }
            }
        }

        let hash = self.credentials.hash_password(&request.password)?;
        let mut account = Account::new(
            request.username.trim(),
            request.email.trim(),
            assignment.coarse,
            hash,
        )
        .with_names(request.first_name, request.last_name);
        account.role_id = assignment.role_id;

        self.store.insert_account(&account).await?;

        let issued = self.credentials.issue_token(account.id, Utc::now())?;
        self.store.insert_token(&issued.record).await?;

        info!(account_id = %account.id, role = %account.role, "Registered account");
        Ok(AuthResponse {
            token: issued.token,
            user: AccountView::from(&account),
        })
    }

    /// Check a username and password and hand back a bearer token.
    ///
    /// An unexpired token is reused rather than minting another.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse> {
        let account = match self.store.find_account_by_username(&request.username).await? {
            Some(account)
                if account.is_active
                    && self
                        .credentials
                        .verify_password(&request.password, &account.password_hash) =>
            {
                account
            }
            _ => {
                counter!("school_auth_attempts_total", "outcome" => "failure").increment(1);
                warn!(username = %request.username, "Login failed");
                return Err(bad_credentials());
            }
        };

        let now = Utc::now();
        let token = match self.store.latest_active_token(account.id, now).await? {
            Some(record) => {
                debug!(account_id = %account.id, jti = %record.jti, "Reusing active token");
                self.credentials.sign_record(&record)?
            }
            None => {
                let issued = self.credentials.issue_token(account.id, now)?;
                self.store.insert_token(&issued.record).await?;
                issued.token
            }
        };

        counter!("school_auth_attempts_total", "outcome" => "success").increment(1);
        Ok(AuthResponse {
            token,
            user: AccountView::from(&account),
        })
    }

    /// Revoke the presented token.
    pub async fn logout(&self, token: &str) -> Result<()> {
        let claims = self.credentials.decode_token(token)?;
        if !self.store.delete_token(&claims.jti).await? {
            return Err(SchoolError::new(ErrorCode::InvalidToken, "Invalid or expired token"));
        }
        debug!(jti = %claims.jti, "Token revoked");
        Ok(())
    }

    /// Resolve a bearer token into the request principal.
    ///
    /// The token must verify and its record must still be stored.
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        let invalid = || SchoolError::new(ErrorCode::InvalidToken, "Invalid or expired token");

        let claims = self.credentials.decode_token(token)?;
        let account_id = claims.account_id()?;
        let record = self.store.get_token(&claims.jti).await?.ok_or_else(invalid)?;
        if record.account_id != account_id || !record.is_active_at(Utc::now()) {
            return Err(invalid());
        }

        let account = self
            .store
            .get_account(account_id)
            .await?
            .filter(|account| account.is_active)
            .ok_or_else(|| SchoolError::unauthenticated("User inactive or deleted"))?;

        self.principal_for(&account).await
    }

    /// Build the principal for an account: linked Role and owned profiles.
    pub async fn principal_for(&self, account: &Account) -> Result<Principal> {
        let linked_role = match account.role_id {
            Some(id) => self.store.get_role(id).await?,
            None => None,
        };
        let student = self.store.student_for_account(account.id).await?;
        let teacher = self.store.teacher_for_account(account.id).await?;

        Ok(Principal::for_account(account)
            .with_linked_role(linked_role)
            .with_student_profile(student.map(|s| s.id))
            .with_teacher_profile(teacher.map(|t| t.id)))
    }

    pub async fn profile(&self, principal: &Principal) -> Result<ProfileView> {
        let account_id = principal.require_account()?;
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Account", account_id.to_string()))?;

        Ok(ProfileView {
            user: AccountView::from(&account),
            permissions: principal.capabilities(),
            linked_role: principal.linked_role.clone(),
            student_id: principal.student_id,
            teacher_id: principal.teacher_id,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission graph
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_permissions(&self, principal: &Principal) -> Result<Vec<Permission>> {
        enforce_capability(principal, Some(catalog::MANAGE_ROLES))?;
        self.store.list_permissions().await
    }

    pub async fn create_permission(&self, principal: &Principal, permission: Permission) -> Result<Permission> {
        enforce_capability(principal, Some(catalog::MANAGE_ROLES))?;
        permission.validate()?;
        self.store.insert_permission(&permission).await?;
        info!(code = %permission.code, "Created permission");
        Ok(permission)
    }

    /// Change the display name of a permission. Authorization is unaffected.
    pub async fn rename_permission(
        &self,
        principal: &Principal,
        code: &str,
        name: String,
        description: Option<String>,
    ) -> Result<Permission> {
        enforce_capability(principal, Some(catalog::MANAGE_ROLES))?;
        let mut permission = self
            .store
            .list_permissions()
            .await?
            .into_iter()
            .find(|p| p.code == code)
            .ok_or_else(|| SchoolError::not_found("Permission", code))?;

        permission.name = name;
        if let Some(description) = description {
            permission.description = description;
        }
        permission.validate()?;
        self.store.update_permission(&permission).await?;
        Ok(permission)
    }

    /// Remove a permission from the catalog; roles lose it on their next read.
    pub async fn delete_permission(&self, principal: &Principal, code: &str) -> Result<()> {
        enforce_capability(principal, Some(catalog::MANAGE_ROLES))?;
        self.store.delete_permission(code).await?;
        info!(code, "Deleted permission");
        Ok(())
    }

    pub async fn list_roles(&self, principal: &Principal) -> Result<Vec<Role>> {
        enforce_capability(principal, Some(catalog::MANAGE_ROLES))?;
        self.store.list_roles().await
    }

    /// Create a Role from permission codes, all of which must exist.
    #[instrument(skip(self, request), fields(role = %request.name))]
    pub async fn create_role(&self, principal: &Principal, request: NewRole) -> Result<Role> {
        enforce_capability(principal, Some(catalog::MANAGE_ROLES))?;
        let catalog = self.store.list_permissions().await?;
        let role = graph::build_role(&request, &catalog)?;
        self.store.insert_role(&role).await?;
        info!(role_id = %role.id, permissions = role.permissions.len(), "Created role");
        Ok(role)
    }

    /// Link an account to a Role (or unlink with `None`), recomputing its coarse role.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn link_role(
        &self,
        principal: &Principal,
        account_id: AccountId,
        role_id: Option<RoleId>,
    ) -> Result<AccountView> {
        enforce_role(principal, &[CoarseRole::Admin])?;
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| SchoolError::not_found("Account", account_id.to_string()))?;

        let role = match role_id {
            Some(id) => Some(
                self.store
                    .get_role(id)
                    .await?
                    .ok_or_else(|| SchoolError::not_found("Role", id.to_string()))?,
            ),
            None => None,
        };

        let coarse = graph::reconcile_coarse_role(account.role, role.as_ref());
        let updated = self.store.set_account_role(account_id, coarse, role_id).await?;
        info!(
            account_id = %account_id,
            role = %updated.role,
            linked = ?role.as_ref().map(|r| r.name.as_str()),
            "Updated account role"
        );
        Ok(AccountView::from(&updated))
    }

    pub async fn delete_account(&self, principal: &Principal, account_id: AccountId) -> Result<()> {
        enforce_role(principal, &[CoarseRole::Admin])?;
        self.store.delete_account(account_id).await?;
        info!(account_id = %account_id, "Deleted account");
        Ok(())
    }
}
