//! HTTP surface.
//!
//! A thin axum router over [`SchoolService`]. The authentication middleware
//! turns the bearer credential into a [`Principal`](crate::rbac::Principal);
//! handlers take it as an extractor and pass it to the service, which runs
//! every capability and ownership check itself.
//!
//! # Routes
//!
//! - `GET /health`, `GET /metrics`
//! - `/api/auth/{register,login,logout}/`
//! - `/api/users/profile/`
//! - `/api/permissions/`, `/api/roles/` (gated on `manage_roles`)
//! - `/api/accounts/:id/role`
//! - `/api/{students,teachers,subjects,classes}/`
//! - `/api/{attendance,grades,assignments,submissions}/`
//! - `/api/dashboard/`

mod handlers;
pub mod middleware;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::rbac::{catalog, RequireCapabilityLayer};
use crate::service::SchoolService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SchoolService>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: SchoolService) -> Self {
        Self {
            service: Arc::new(service),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the API router.
///
/// # Example
///
/// ```rust,ignore
/// let state = AppState::new(service).with_metrics(handle);
/// let app = build_router(state);
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Uniformly gated on one capability; the service checks again.
    let role_admin = Router::new()
        .route(
            "/api/permissions/",
            get(handlers::list_permissions).post(handlers::create_permission),
        )
        .route(
            "/api/permissions/:code",
            patch(handlers::rename_permission).delete(handlers::delete_permission),
        )
        .route(
            "/api/roles/",
            get(handlers::list_roles).post(handlers::create_role),
        )
        .route_layer(RequireCapabilityLayer::new(catalog::MANAGE_ROLES));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        // Auth
        .route("/api/auth/register/", post(handlers::register))
        .route("/api/auth/login/", post(handlers::login))
        .route("/api/auth/logout/", post(handlers::logout))
        .route("/api/users/profile/", get(handlers::profile))
        // Accounts
        .route("/api/accounts/:id", delete(handlers::delete_account))
        .route("/api/accounts/:id/role", put(handlers::link_role))
        // Profiles and catalog
        .route(
            "/api/students/",
            get(handlers::list_students).post(handlers::create_student),
        )
        .route(
            "/api/teachers/",
            get(handlers::list_teachers).post(handlers::create_teacher),
        )
        .route(
            "/api/subjects/",
            get(handlers::list_subjects).post(handlers::create_subject),
        )
        .route(
            "/api/classes/",
            get(handlers::list_classes).post(handlers::create_class),
        )
        .route("/api/classes/:id/enroll/", post(handlers::enroll))
        .route("/api/classes/:id/unenroll/", post(handlers::unenroll))
        // Records
        .route(
            "/api/attendance/",
            get(handlers::list_attendance).post(handlers::mark_attendance),
        )
        .route("/api/attendance/:id", patch(handlers::correct_attendance))
        .route(
            "/api/grades/",
            get(handlers::list_grades).post(handlers::record_grade),
        )
        .route(
            "/api/grades/:id",
            get(handlers::get_grade).patch(handlers::correct_grade),
        )
        .route(
            "/api/assignments/",
            get(handlers::list_assignments).post(handlers::create_assignment),
        )
        .route("/api/assignments/:id", patch(handlers::update_assignment))
        .route(
            "/api/submissions/",
            get(handlers::list_submissions).post(handlers::submit),
        )
        .route("/api/submissions/:id", get(handlers::get_submission))
        .route("/api/dashboard/", get(handlers::dashboard))
        .merge(role_admin)
        // Middleware
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ))
        .layer(axum_middleware::from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
    }

    #[test]
    fn test_api_response_serializes_envelope() {
        let json = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": [1, 2]}));
    }
}
