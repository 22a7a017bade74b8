//! Role-based access control and row visibility.
//!
//! This module provides:
//! - **Models**: Permission, Role and the request Principal
//! - **Catalog**: built-in capability codes and the default Admin/Teacher/Student roles
//! - **Evaluator**: capability, coarse-role and ownership checks
//! - **Scope**: per-role row visibility over domain records
//! - **Graph**: role creation against the live permission catalog
//! - **Middleware**: tower layer gating a route on a capability
//!
//! # Usage
//!
//! ```rust,ignore
//! use school_core::rbac::{can_perform, scope_query, catalog};
//!
//! if !can_perform(&principal, Some(catalog::VIEW_GRADES)) {
//!     return Err(SchoolError::forbidden("..."));
//! }
//! let visible = scope_query(&principal, grades, &relations);
//! ```

pub mod catalog;
pub mod evaluator;
pub mod graph;
pub mod middleware;
pub mod models;
pub mod scope;

pub use evaluator::{
    can_perform, enforce_author_or_admin, enforce_capability, enforce_owner_or_admin,
    enforce_role, has_role, is_author_or_admin, is_owner_or_admin, Owned, OwnerRef,
};
pub use graph::NewRole;
pub use middleware::{RequireCapabilityLayer, RequireCapabilityService};
pub use models::{Permission, Principal, Role};
pub use scope::{is_visible, scope_query, EntityKind, RelationSnapshot, RelationSource, Scoped};
