//! HTTP round-trips through the router.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::PASSWORD;
use school_core::api::{build_router, AppState};

async fn app() -> Router {
    build_router(AppState::new(common::service().await))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with(uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, authorization)
        .body(Body::empty())
        .unwrap()
}

async fn register(app: &Router, username: &str, role: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/auth/register/",
            json!({
                "username": username,
                "email": format!("{}@school.test", username),
                "password": PASSWORD,
                "password_confirm": PASSWORD,
                "role": role,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["token"].as_str().unwrap().to_string()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_metrics_without_recorder_is_not_found() {
    let app = app().await;
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = app().await;
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_request_id_is_generated_when_absent() {
    let app = app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let id = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_register_login_profile_logout() {
    let app = app().await;
    let token = register(&app, "student.kim", "Student").await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/login/",
            json!({"username": "student.kim", "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["token"], token.as_str());
    assert_eq!(body["data"]["user"]["role"], "student");

    let (status, body) = send(
        &app,
        get_with("/api/users/profile/", &format!("Bearer {}", token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["username"], "student.kim");
    assert_eq!(body["data"]["linked_role"]["name"], "Student");

    // Legacy scheme.
    let (status, _) = send(
        &app,
        get_with("/api/users/profile/", &format!("Token {}", token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let logout = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/logout/")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, logout).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        get_with("/api/users/profile/", &format!("Bearer {}", token)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_profile_requires_credentials() {
    let app = app().await;
    let request = Request::builder()
        .uri("/api/users/profile/")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_register_mismatched_password_is_unprocessable() {
    let app = app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/register/",
            json!({
                "username": "mismatch",
                "email": "mismatch@school.test",
                "password": PASSWORD,
                "password_confirm": "Other-Secret-77",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// ============================================================================
// Role administration
// ============================================================================

#[tokio::test]
async fn test_role_routes_are_gated_on_manage_roles() {
    let app = app().await;
    let student = register(&app, "student.lee", "Student").await;
    let admin = register(&app, "head.office", "Admin").await;

    let (status, body) = send(&app, get_with("/api/roles/", &format!("Bearer {}", student))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = send(&app, get_with("/api/roles/", &format!("Bearer {}", admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let create = Request::builder()
        .method(Method::POST)
        .uri("/api/roles/")
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"name": "Auditor", "permissions": ["view_grades", "view_attendance"]})
                .to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, create).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Auditor");
}

#[tokio::test]
async fn test_dashboard_is_role_tagged() {
    let app = app().await;
    let admin = register(&app, "head.office", "Admin").await;

    let (status, body) = send(&app, get_with("/api/dashboard/", &format!("Bearer {}", admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "admin");
    assert_eq!(body["data"]["total_students"], 0);
}
