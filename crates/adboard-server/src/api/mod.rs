mod environment;
mod jobs;
mod pipeline;
mod processing;
mod queues;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use adboard_core::Environment;

use crate::middleware::{request_id, require_admin, AdminState};
use crate::registry::{EnvRegistry, StoreHandles};
use crate::scheduler::SchedulerGuard;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EnvRegistry>,
    pub scheduler: Arc<SchedulerGuard>,
}

/// Uniform success envelope. Failures go out as [`ApiError`] instead.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data,
        })
    }

    pub fn ok_with(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    #[serde(skip)]
    code: &'static str,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code {
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "bad_request" | "validation_error" | "invalid_environment" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<adboard_queue::QueueError> for ApiError {
    fn from(error: adboard_queue::QueueError) -> Self {
        use adboard_queue::QueueError;
        match &error {
            QueueError::BrandNotFound(_) | QueueError::EntryNotFound(_) => {
                ApiError::new("not_found", error.to_string())
            }
            QueueError::DuplicateEntry(_) => ApiError::new("conflict", error.to_string()),
            QueueError::Parse(_) | QueueError::Store(_) | QueueError::Db(_) => {
                tracing::error!(error = %error, "queue operation failed");
                ApiError::internal("queue operation failed")
            }
        }
    }
}

impl From<adboard_db::DbError> for ApiError {
    fn from(error: adboard_db::DbError) -> Self {
        match &error {
            adboard_db::DbError::NotFound => ApiError::new("not_found", error.to_string()),
            _ => {
                tracing::error!(error = %error, "database query failed");
                ApiError::internal("database query failed")
            }
        }
    }
}

impl From<adboard_pipeline::PipelineError> for ApiError {
    fn from(error: adboard_pipeline::PipelineError) -> Self {
        use adboard_pipeline::PipelineError;
        match &error {
            PipelineError::BrandNotFound(_) => ApiError::new("not_found", error.to_string()),
            PipelineError::Validation(_) => ApiError::new("validation_error", error.to_string()),
            PipelineError::Db(_) | PipelineError::Queue(_) => {
                tracing::error!(error = %error, "pipeline computation failed");
                ApiError::internal("pipeline computation failed")
            }
        }
    }
}

/// Pagination block every list endpoint shares.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T: Serialize> Paginated<T> {
    #[must_use]
    pub fn new(items: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            items,
            has_next: page < total_pages,
            has_prev: page > 1 && total_pages > 0,
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

pub(super) fn normalize_page(page: Option<i64>) -> i64 {
    page.unwrap_or(1).max(1)
}

pub(super) fn normalize_per_page(per_page: Option<i64>) -> i64 {
    per_page.unwrap_or(50).clamp(1, 200)
}

/// Resolves the target environment from the `x-environment` header; missing
/// or unrecognized values are production. The explicit switch endpoint is
/// the strict path.
pub(super) fn resolve_env(headers: &HeaderMap) -> Environment {
    Environment::from_header(
        headers
            .get("x-environment")
            .and_then(|value| value.to_str().ok()),
    )
}

/// Store handles for the request's environment, built on first use.
pub(super) async fn env_handles(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<StoreHandles, ApiError> {
    let env = resolve_env(headers);
    state.registry.handles(env).await.map_err(|e| {
        tracing::error!(error = %e, %env, "store handles unavailable");
        ApiError::internal("backing stores unavailable")
    })
}

/// Whether the request's `If-None-Match` already names this fingerprint.
pub(super) fn if_none_match_hits(headers: &HeaderMap, fingerprint: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().trim_matches('"'))
        .is_some_and(|value| value == fingerprint)
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::IF_NONE_MATCH,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-environment"),
        ])
}

fn admin_router(admin: AdminState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/environment/switch", post(environment::switch))
        .route("/api/v1/queues/{family}/pending", post(queues::add_pending))
        .route(
            "/api/v1/queues/{family}/pending/bulk",
            post(queues::add_bulk),
        )
        .route(
            "/api/v1/queues/{family}/pending/add-all",
            post(queues::add_all),
        )
        .route("/api/v1/queues/{family}/move", post(queues::move_entry))
        .route("/api/v1/queues/{family}/move-all", post(queues::move_all))
        .route("/api/v1/queues/{family}/{role}", delete(queues::clear))
        .route("/api/v1/queues/{family}/cleanup", post(queues::cleanup))
        .route(
            "/api/v1/brands/{brand_id}/status",
            patch(pipeline::update_brand_status),
        )
        .layer(axum::middleware::from_fn_with_state(admin, require_admin))
}

pub fn build_app(state: AppState, admin: AdminState) -> Router {
    let read_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/environment", get(environment::current))
        .route("/api/v1/queues/{family}/pending", get(queues::list_pending))
        .route("/api/v1/queues/{family}/failed", get(queues::list_failed))
        .route("/api/v1/jobs/{family}/{kind}", get(jobs::list_jobs))
        .route("/api/v1/jobs/{family}/{kind}/counts", get(jobs::counts))
        .route("/api/v1/processing", get(processing::list))
        .route("/api/v1/ip-stats", get(processing::ip_stats))
        .route("/api/v1/pipeline/status", get(pipeline::list_statuses))
        .route(
            "/api/v1/pipeline/status/{brand_id}",
            get(pipeline::brand_status),
        );

    Router::new()
        .merge(read_routes)
        .merge(admin_router(admin))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    database: &'static str,
    queue_backend: &'static str,
}

async fn health(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Ok(handles) = env_handles(&state, &headers).await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Envelope::ok(HealthData {
                status: "degraded",
                database: "unavailable",
                queue_backend: "unavailable",
            }),
        );
    };

    let database = match adboard_db::health_check(&handles.pool).await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            "unavailable"
        }
    };

    let mut conn = handles.global.clone();
    let queue_backend = match redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
    {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "health check: queue backend unavailable");
            "unavailable"
        }
    };

    let healthy = database == "ok" && queue_backend == "ok";
    (
        if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
        Envelope::ok(HealthData {
            status: if healthy { "ok" } else { "degraded" },
            database,
            queue_backend,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_success_shape() {
        let Json(envelope) = Envelope::ok_with("queued", serde_json::json!({"pageId": "123"}));
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "queued");
        assert_eq!(json["data"]["pageId"], "123");
    }

    #[test]
    fn envelope_omits_absent_message() {
        let Json(envelope) = Envelope::ok(serde_json::json!([]));
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn api_error_shape_and_status() {
        let error = ApiError::new("not_found", "no brand found for page_id 9");
        let json = serde_json::to_value(&error).expect("serialize");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "no brand found for page_id 9");
        assert!(json.get("code").is_none());

        let response = ApiError::new("conflict", "duplicate").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let response = ApiError::new("validation_error", "bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn queue_errors_map_to_http_codes() {
        let not_found: ApiError =
            adboard_queue::QueueError::BrandNotFound("9".to_string()).into();
        assert_eq!(not_found.code, "not_found");

        let conflict: ApiError =
            adboard_queue::QueueError::DuplicateEntry("9".to_string()).into();
        assert_eq!(conflict.code, "conflict");
    }

    #[test]
    fn pagination_math() {
        let page = Paginated::new(vec![1, 2, 3], 1, 3, 7);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(!page.has_prev);

        let last = Paginated::new(vec![7], 3, 3, 7);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty = Paginated::new(Vec::<i64>::new(), 1, 50, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }

    #[test]
    fn paginated_serializes_camel_case() {
        let json = serde_json::to_value(Paginated::new(vec![1], 1, 50, 1)).expect("serialize");
        assert!(json.get("perPage").is_some());
        assert!(json.get("totalPages").is_some());
        assert!(json.get("hasNext").is_some());
    }

    #[test]
    fn if_none_match_accepts_quoted_and_bare() {
        let fingerprint = "abc123";
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, "\"abc123\"".parse().expect("header"));
        assert!(if_none_match_hits(&headers, fingerprint));

        headers.insert(header::IF_NONE_MATCH, "abc123".parse().expect("header"));
        assert!(if_none_match_hits(&headers, fingerprint));

        headers.insert(header::IF_NONE_MATCH, "other".parse().expect("header"));
        assert!(!if_none_match_hits(&headers, fingerprint));
    }

    #[test]
    fn env_resolution_is_lenient() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_env(&headers), Environment::Production);
        headers.insert("x-environment", "stage".parse().expect("header"));
        assert_eq!(resolve_env(&headers), Environment::Stage);
        headers.insert("x-environment", "qa".parse().expect("header"));
        assert_eq!(resolve_env(&headers), Environment::Production);
    }

    #[test]
    fn page_normalization_bounds() {
        assert_eq!(normalize_page(None), 1);
        assert_eq!(normalize_page(Some(0)), 1);
        assert_eq!(normalize_page(Some(-3)), 1);
        assert_eq!(normalize_per_page(None), 50);
        assert_eq!(normalize_per_page(Some(1_000)), 200);
    }
}
