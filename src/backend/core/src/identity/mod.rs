//! Accounts, credentials and registration.

pub mod credentials;
pub mod models;
pub mod registration;

pub use credentials::{Claims, CredentialService, IssuedToken, LocalCredentials, PasswordPolicy};
pub use models::{Account, AccountView, CoarseRole, TokenRecord};
pub use registration::{LoginRequest, RegistrationRequest, RoleAssignment};
