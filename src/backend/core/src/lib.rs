#![allow(clippy::result_large_err)]
//! # School Core
//!
//! Backend for a school: accounts, roles, student and teacher profiles,
//! classes, attendance, grades, assignments and submissions.
//!
//! ## Architecture
//!
//! - **Identity**: Registration, password hashing and bearer tokens
//! - **RBAC**: Permissions, roles, principals and the access evaluator
//! - **Scoping**: Per-role row visibility applied to every list query
//! - **School**: Record models, enrollment, submissions and the dashboard
//! - **Store**: Storage contract with in-memory and PostgreSQL backends
//! - **Service**: Capability-gated operations over the store
//! - **API**: axum router, authentication middleware and handlers
//! - **Telemetry**: Structured logging, tracing and Prometheus metrics

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod ids;
pub mod rbac;
pub mod school;
pub mod service;
pub mod store;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, Result, SchoolError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, ApiResponse, AppState};
    pub use crate::config::Config;
    pub use crate::error::{ErrorCode, Result, SchoolError};
    pub use crate::identity::{
        Account, AccountView, CoarseRole, CredentialService, LocalCredentials, LoginRequest,
        RegistrationRequest,
    };
    pub use crate::ids::*;
    pub use crate::rbac::{catalog, NewRole, Permission, Principal, Role};
    pub use crate::school::{
        Assignment, AssignmentStatus, Attendance, AttendanceStatus, Class, DashboardSummary,
        EnrollOutcome, Grade, StudentProfile, Subject, Submission, TeacherProfile,
    };
    pub use crate::service::{AuthResponse, ProfileView, SchoolService};
    pub use crate::store::{MemoryStore, PgStore, Store};
}
