use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Admin-token settings guarding the mutation routes.
#[derive(Debug, Clone)]
pub struct AdminState {
    token: Option<Arc<String>>,
    pub enabled: bool,
}

impl AdminState {
    /// Builds the admin gate from `ADBOARD_ADMIN_TOKEN`.
    ///
    /// An empty/missing token disables the gate only when `allow_open` is
    /// set (local iteration); otherwise startup fails.
    pub fn from_env(allow_open: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("ADBOARD_ADMIN_TOKEN").unwrap_or_default();
        let token = raw.trim();

        if token.is_empty() {
            if allow_open {
                tracing::warn!("ADBOARD_ADMIN_TOKEN not set; admin routes are open");
                return Ok(Self {
                    token: None,
                    enabled: false,
                });
            }
            anyhow::bail!("ADBOARD_ADMIN_TOKEN is required; provide the admin bearer token");
        }

        Ok(Self {
            token: Some(Arc::new(token.to_string())),
            enabled: true,
        })
    }

    fn allows(&self, candidate: &str) -> bool {
        // Constant-time compare so timing does not leak prefix matches.
        self.token
            .as_ref()
            .is_some_and(|token| token.as_bytes().ct_eq(candidate.as_bytes()).into())
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    success: bool,
    error: &'static str,
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware gating the admin mutation routes behind the bearer token.
pub async fn require_admin(
    State(admin): State<AdminState>,
    req: Request,
    next: Next,
) -> Response {
    if !admin.enabled {
        return next.run(req).await;
    }

    let token = extract_bearer_token(req.headers().get(AUTHORIZATION));
    match token {
        Some(token) if admin.allows(token) => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(MiddlewareErrorBody {
                success: false,
                error: "missing or invalid admin token",
            }),
        )
            .into_response(),
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer admin-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("admin-token"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn admin_state_open_mode_has_no_token() {
        std::env::remove_var("ADBOARD_ADMIN_TOKEN");
        let state = AdminState::from_env(true).expect("open mode should allow missing token");
        assert!(!state.enabled);
    }

    #[test]
    fn admin_compare_matches_exact_token_only() {
        let state = AdminState {
            token: Some(Arc::new("s3cret".to_string())),
            enabled: true,
        };
        assert!(state.allows("s3cret"));
        assert!(!state.allows("s3cre"));
        assert!(!state.allows("s3cret "));
        assert!(!state.allows(""));
    }
}
