//! Axum glue for authorization.
//!
//! The authentication middleware in [`crate::api`] resolves the bearer
//! credential into a [`Principal`] and stores it in the request extensions.
//! This module reads it back: as an extractor for handlers, and as a tower
//! layer that gates a whole route on one capability.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::evaluator::enforce_capability;
use super::models::Principal;
use crate::error::SchoolError;

// ═══════════════════════════════════════════════════════════════════════════════
// Principal extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// Handlers take the caller as `principal: Principal`.
///
/// Requests that never passed the authentication middleware are treated as
/// anonymous.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = SchoolError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Principal>()
            .cloned()
            .unwrap_or_else(Principal::anonymous))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that rejects requests whose principal lacks a capability.
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/api/roles/", get(list_roles).post(create_role))
///     .route_layer(RequireCapabilityLayer::new(catalog::MANAGE_ROLES));
/// ```
#[derive(Debug, Clone)]
pub struct RequireCapabilityLayer {
    capability: &'static str,
}

impl RequireCapabilityLayer {
    pub fn new(capability: &'static str) -> Self {
        Self { capability }
    }
}

impl<S> Layer<S> for RequireCapabilityLayer {
    type Service = RequireCapabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireCapabilityService {
            inner,
            capability: self.capability,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RequireCapabilityService<S> {
    inner: S,
    capability: &'static str,
}

impl<S> Service<Request<Body>> for RequireCapabilityService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let capability = self.capability;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let principal = request
                .extensions()
                .get::<Principal>()
                .cloned()
                .unwrap_or_else(Principal::anonymous);

            if let Err(rejection) = enforce_capability(&principal, Some(capability)) {
                return Ok(rejection.into_response());
            }

            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Account, CoarseRole};
    use crate::rbac::models::Role;
    use axum::{http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/roles", get(|| async { "ok" }))
            .route_layer(RequireCapabilityLayer::new("manage_roles"))
    }

    async fn status_for(principal: Option<Principal>) -> StatusCode {
        let mut request = Request::builder().uri("/roles").body(Body::empty()).unwrap();
        if let Some(principal) = principal {
            request.extensions_mut().insert(principal);
        }
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_anonymous_is_unauthorized() {
        assert_eq!(status_for(None).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_capability_is_forbidden() {
        let account = Account::new("t", "t@example.com", CoarseRole::Teacher, "h");
        let principal = Principal::for_account(&account);
        assert_eq!(status_for(Some(principal)).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_granted_capability_passes() {
        let account = Account::new("t", "t@example.com", CoarseRole::Teacher, "h");
        let role = Role::new("Registrar", vec!["manage_roles".to_string()]);
        let principal = Principal::for_account(&account).with_linked_role(Some(role));
        assert_eq!(status_for(Some(principal)).await, StatusCode::OK);

        let admin = Account::new("a", "a@example.com", CoarseRole::Admin, "h");
        assert_eq!(
            status_for(Some(Principal::for_account(&admin))).await,
            StatusCode::OK
        );
    }
}
