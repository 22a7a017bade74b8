//! Account data model: the coarse role tag and the login identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchoolError;
use crate::ids::{AccountId, RoleId};

// ═══════════════════════════════════════════════════════════════════════════════
// Coarse Role
// ═══════════════════════════════════════════════════════════════════════════════

/// The three-valued categorical role stored on every account.
///
/// Distinct from the fine-grained [`crate::rbac::Role`] entity: this tag drives
/// row visibility and the Admin bypass, the Role drives capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoarseRole {
    #[serde(alias = "Admin", alias = "ADMIN")]
    Admin,
    #[serde(alias = "Teacher", alias = "TEACHER")]
    Teacher,
    #[serde(alias = "Student", alias = "STUDENT")]
    Student,
}

impl CoarseRole {
    /// Stable storage code.
    pub const fn code(&self) -> i16 {
        match self {
            Self::Admin => 1,
            Self::Teacher => 2,
            Self::Student => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Admin),
            2 => Some(Self::Teacher),
            3 => Some(Self::Student),
            _ => None,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Teacher => "Teacher",
            Self::Student => "Student",
        }
    }

    /// Case-insensitive exact match against the labels.
    pub fn from_label(label: &str) -> Option<Self> {
        [Self::Admin, Self::Teacher, Self::Student]
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for CoarseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CoarseRole {
    type Err = SchoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
            .ok_or_else(|| SchoolError::validation(format!("Unknown role: {}", s)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Account
// ═══════════════════════════════════════════════════════════════════════════════

/// A login identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Coarse role tag.
    pub role: CoarseRole,
    /// Optional link to a fine-grained Role (weak reference).
    pub role_id: Option<RoleId>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl Account {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        role: CoarseRole,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: AccountId::new(),
            username: username.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            role,
            role_id: None,
            password_hash: password_hash.into(),
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    pub fn with_names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    pub fn with_role_id(mut self, role_id: RoleId) -> Self {
        self.role_id = Some(role_id);
        self
    }

    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Public view of an account, safe to return from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: CoarseRole,
    pub role_id: Option<RoleId>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            role: account.role,
            role_id: account.role_id,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bearer Tokens
// ═══════════════════════════════════════════════════════════════════════════════

/// A stored bearer credential. The signed token itself is never persisted;
/// it is re-derived from this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub jti: String,
    pub account_id: AccountId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
