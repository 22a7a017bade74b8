//! Request middleware: bearer authentication and request ids.

use axum::{
    extract::{Request, State},
    http::{
        header::{HeaderName, HeaderValue, AUTHORIZATION},
        HeaderMap,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::AppState;

/// The raw bearer value of an authenticated request, kept for logout.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Pull the token out of `Authorization: Bearer <t>` or the legacy `Token <t>`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| {
            s.strip_prefix("Bearer ")
                .or_else(|| s.strip_prefix("bearer "))
                .or_else(|| s.strip_prefix("Token "))
                .map(|t| t.trim().to_string())
        })
        .filter(|t| !t.is_empty())
}

/// Resolve the bearer credential into a principal.
///
/// No credential leaves the request anonymous; a bad one is rejected here.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = extract_token(req.headers()) {
        match state.service.authenticate(&token).await {
            Ok(principal) => {
                debug!(principal = %principal, "Authenticated request");
                req.extensions_mut().insert(principal);
                req.extensions_mut().insert(BearerToken(token));
            }
            Err(e) => return e.into_response(),
        }
    }
    next.run(req).await
}

/// Echo `x-request-id`, generating one when absent.
pub async fn request_id(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut response = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&request_id) {
        if let Err(e) = response
            .headers_mut()
            .try_insert(HeaderName::from_static("x-request-id"), val)
        {
            debug!(error = %e, "Could not attach x-request-id");
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_token_schemes() {
        assert_eq!(extract_token(&headers("Bearer abc")), Some("abc".to_string()));
        assert_eq!(extract_token(&headers("Token abc")), Some("abc".to_string()));
        assert_eq!(extract_token(&headers("Basic abc")), None);
        assert_eq!(extract_token(&headers("Bearer ")), None);
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }
}
