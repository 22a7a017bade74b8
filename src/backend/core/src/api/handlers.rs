//! API request handlers.
//!
//! All handlers return `Result<impl IntoResponse, SchoolError>` so that errors
//! are converted to HTTP status codes by the `IntoResponse` implementation on
//! `SchoolError`.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::middleware::BearerToken;
use super::{ApiResponse, AppState};
use crate::error::SchoolError;
use crate::identity::{LoginRequest, RegistrationRequest};
use crate::ids::{AccountId, AssignmentId, AttendanceId, ClassId, GradeId, RoleId, StudentId, SubmissionId};
use crate::rbac::{NewRole, Permission, Principal};
use crate::school::{
    AssignmentUpdate, AttendanceCorrection, GradeCorrection, NewAssignment, NewAttendance,
    NewClass, NewGrade, NewStudentProfile, NewSubject, NewSubmission, NewTeacherProfile,
};

type HandlerResult<T> = Result<T, SchoolError>;

fn created<T: serde::Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

fn ok<T: serde::Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, label) = match state.service.health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            e.log();
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };
    (
        status,
        Json(serde_json::json!({
            "status": label,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Auth
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegistrationRequest>,
) -> HandlerResult<impl IntoResponse> {
    let response = state.service.register(req).await?;
    Ok(created(response))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.login(req).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    token: Option<Extension<BearerToken>>,
) -> HandlerResult<impl IntoResponse> {
    let Some(Extension(BearerToken(token))) = token else {
        return Err(SchoolError::unauthenticated(
            "Authentication credentials were not provided",
        ));
    };
    state.service.logout(&token).await?;
    Ok(ok(serde_json::json!({ "message": "Successfully logged out" })))
}

pub async fn profile(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.profile(&principal).await?))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permissions, Roles, Accounts
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct RenamePermission {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkRole {
    pub role_id: Option<RoleId>,
}

pub async fn list_permissions(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_permissions(&principal).await?))
}

pub async fn create_permission(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<Permission>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.create_permission(&principal, req).await?))
}

pub async fn rename_permission(
    State(state): State<AppState>,
    principal: Principal,
    Path(code): Path<String>,
    Json(req): Json<RenamePermission>,
) -> HandlerResult<impl IntoResponse> {
    let permission = state
        .service
        .rename_permission(&principal, &code, req.name, req.description)
        .await?;
    Ok(ok(permission))
}

pub async fn delete_permission(
    State(state): State<AppState>,
    principal: Principal,
    Path(code): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    state.service.delete_permission(&principal, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_roles(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_roles(&principal).await?))
}

pub async fn create_role(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewRole>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.create_role(&principal, req).await?))
}

pub async fn link_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<AccountId>,
    Json(req): Json<LinkRole>,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.link_role(&principal, id, req.role_id).await?))
}

pub async fn delete_account(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<AccountId>,
) -> HandlerResult<impl IntoResponse> {
    state.service.delete_account(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Profiles, Subjects, Classes
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub student_id: StudentId,
}

pub async fn list_students(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_students(&principal).await?))
}

pub async fn create_student(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewStudentProfile>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.create_student_profile(&principal, req).await?))
}

pub async fn list_teachers(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_teachers(&principal).await?))
}

pub async fn create_teacher(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewTeacherProfile>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.create_teacher_profile(&principal, req).await?))
}

pub async fn list_subjects(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_subjects(&principal).await?))
}

pub async fn create_subject(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewSubject>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.create_subject(&principal, req).await?))
}

pub async fn list_classes(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_classes(&principal).await?))
}

pub async fn create_class(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewClass>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.create_class(&principal, req).await?))
}

pub async fn enroll(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<ClassId>,
    Json(req): Json<EnrollRequest>,
) -> HandlerResult<impl IntoResponse> {
    let outcome = state.service.enroll(&principal, id, req.student_id).await?;
    Ok(ok(serde_json::json!({ "outcome": outcome })))
}

pub async fn unenroll(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<ClassId>,
    Json(req): Json<EnrollRequest>,
) -> HandlerResult<impl IntoResponse> {
    state.service.unenroll(&principal, id, req.student_id).await?;
    Ok(ok(serde_json::json!({ "outcome": "unenrolled" })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Attendance & Grades
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_attendance(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_attendance(&principal).await?))
}

pub async fn mark_attendance(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewAttendance>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.mark_attendance(&principal, req).await?))
}

pub async fn correct_attendance(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<AttendanceId>,
    Json(req): Json<AttendanceCorrection>,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.correct_attendance(&principal, id, req).await?))
}

pub async fn list_grades(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_grades(&principal).await?))
}

pub async fn record_grade(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewGrade>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.record_grade(&principal, req).await?))
}

pub async fn get_grade(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<GradeId>,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.get_grade(&principal, id).await?))
}

pub async fn correct_grade(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<GradeId>,
    Json(req): Json<GradeCorrection>,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.correct_grade(&principal, id, req).await?))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Assignments & Submissions
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_assignments(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_assignments(&principal).await?))
}

pub async fn create_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewAssignment>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.create_assignment(&principal, req).await?))
}

pub async fn update_assignment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<AssignmentId>,
    Json(req): Json<AssignmentUpdate>,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.update_assignment(&principal, id, req).await?))
}

pub async fn list_submissions(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.list_submissions(&principal).await?))
}

pub async fn submit(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<NewSubmission>,
) -> HandlerResult<impl IntoResponse> {
    Ok(created(state.service.submit(&principal, req).await?))
}

pub async fn get_submission(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<SubmissionId>,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.get_submission(&principal, id).await?))
}

pub async fn dashboard(
    State(state): State<AppState>,
    principal: Principal,
) -> HandlerResult<impl IntoResponse> {
    Ok(ok(state.service.dashboard(&principal).await?))
}
