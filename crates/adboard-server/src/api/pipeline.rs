//! Pipeline status endpoints: single-brand and bulk reports with the cache
//! and conditional-GET layer, plus the admin brand-status mutation.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use adboard_core::keys::cache_key;
use adboard_db::StatusSort;
use adboard_pipeline::{
    get_all_brands_pipeline_status, get_brand_pipeline_status, StatusListQuery,
};
use adboard_queue::fingerprint;

use super::{
    env_handles, if_none_match_hits, normalize_page, normalize_per_page, ApiError, AppState,
    Envelope, Paginated,
};

fn parse_date(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    match raw {
        None => Ok(Utc::now().date_naive()),
        Some(raw) => raw.trim().parse::<NaiveDate>().map_err(|_| {
            ApiError::new("validation_error", format!("invalid date: {raw}"))
        }),
    }
}

/// 200 with an ETag, or 304 when the client already holds this payload.
fn etagged(headers: &HeaderMap, payload: serde_json::Value) -> Response {
    let etag = fingerprint(&payload);
    let etag_header = [(header::ETAG, format!("\"{etag}\""))];
    if if_none_match_hits(headers, &etag) {
        return (StatusCode::NOT_MODIFIED, etag_header).into_response();
    }
    (StatusCode::OK, etag_header, Envelope::ok(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct BrandStatusQuery {
    pub date: Option<String>,
}

pub async fn brand_status(
    State(state): State<AppState>,
    Path(brand_id): Path<i64>,
    Query(query): Query<BrandStatusQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let date = parse_date(query.date.as_deref())?;
    let handles = env_handles(&state, &headers).await?;

    let key = cache_key(
        handles.env,
        "pipeline",
        &["brand", &brand_id.to_string(), &date.to_string()],
    );
    if let Some(cached) = handles.cache.get::<serde_json::Value>(&key).await {
        return Ok(etagged(&headers, cached));
    }

    let ctx = handles.pipeline_context();
    let report = get_brand_pipeline_status(&ctx, brand_id, date).await?;
    let payload = serde_json::to_value(&report)
        .map_err(|e| ApiError::internal(format!("serialization failed: {e}")))?;
    handles
        .cache
        .set(
            &key,
            &payload,
            Duration::from_secs(state.registry.config().status_cache_ttl_secs),
        )
        .await;
    Ok(etagged(&headers, payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusesQuery {
    pub date: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub sort: Option<String>,
    /// `asc` or `desc`; defaults to descending.
    pub order: Option<String>,
}

pub async fn list_statuses(
    State(state): State<AppState>,
    Query(query): Query<StatusesQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let date = parse_date(query.date.as_deref())?;
    let sort = StatusSort::parse(query.sort.as_deref()).ok_or_else(|| {
        ApiError::new(
            "validation_error",
            format!("unknown sort mode: {}", query.sort.unwrap_or_default()),
        )
    })?;
    let descending = match query.order.as_deref().map(str::trim) {
        None | Some("") | Some("desc") => true,
        Some("asc") => false,
        Some(other) => {
            return Err(ApiError::new(
                "validation_error",
                format!("unknown sort order: {other}"),
            ))
        }
    };
    let page = normalize_page(query.page);
    let per_page = normalize_per_page(query.per_page);
    let handles = env_handles(&state, &headers).await?;

    // Every payload-shaping parameter goes into the key; two logically
    // different listings must never collide.
    let sort_part = if sort == StatusSort::ActiveAds {
        "active_ads"
    } else {
        "normal"
    };
    let order_part = if descending { "desc" } else { "asc" };
    let key = cache_key(
        handles.env,
        "pipeline",
        &[
            "list",
            &date.to_string(),
            &page.to_string(),
            &per_page.to_string(),
            sort_part,
            order_part,
        ],
    );
    if let Some(cached) = handles.cache.get::<serde_json::Value>(&key).await {
        return Ok(etagged(&headers, cached));
    }

    let ctx = handles.pipeline_context();
    let result = get_all_brands_pipeline_status(
        &ctx,
        StatusListQuery {
            date,
            page,
            per_page,
            sort,
            descending,
        },
    )
    .await?;

    let paginated = Paginated::new(result.statuses, page, per_page, result.total);
    let payload = serde_json::to_value(&paginated)
        .map_err(|e| ApiError::internal(format!("serialization failed: {e}")))?;
    handles
        .cache
        .set(
            &key,
            &payload,
            Duration::from_secs(state.registry.config().status_cache_ttl_secs),
        )
        .await;
    Ok(etagged(&headers, payload))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: String,
}

const ALLOWED_BRAND_STATUSES: [&str; 2] = ["Active", "Inactive"];

/// Admin mutation flipping a brand's relational status. Invalidates the
/// pipeline cache namespace so listings reflect the change immediately.
pub async fn update_brand_status(
    State(state): State<AppState>,
    Path(brand_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let status = ALLOWED_BRAND_STATUSES
        .into_iter()
        .find(|allowed| allowed.eq_ignore_ascii_case(body.status.trim()))
        .ok_or_else(|| {
            ApiError::new(
                "validation_error",
                format!("unknown brand status: {}", body.status),
            )
        })?;

    let handles = env_handles(&state, &headers).await?;
    adboard_db::update_brand_status(&handles.pool, brand_id, status).await?;

    let pattern = adboard_core::keys::cache_pattern(handles.env, "pipeline");
    if let Err(e) = handles.cache.invalidate(&pattern).await {
        tracing::warn!(error = %e, "pipeline cache invalidation failed after status update");
    }
    Ok(Envelope::ok_with("brand status updated", ()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_parse_defaults_to_today_and_validates() {
        assert!(parse_date(None).is_ok());
        assert_eq!(
            parse_date(Some("2025-01-10")).expect("date"),
            NaiveDate::from_ymd_opt(2025, 1, 10).expect("date")
        );
        assert!(parse_date(Some("01/10/2025")).is_err());
        assert!(parse_date(Some("not-a-date")).is_err());
    }

    #[test]
    fn brand_status_whitelist_is_case_insensitive() {
        assert!(ALLOWED_BRAND_STATUSES
            .iter()
            .any(|s| s.eq_ignore_ascii_case("active")));
        assert!(!ALLOWED_BRAND_STATUSES
            .iter()
            .any(|s| s.eq_ignore_ascii_case("archived")));
    }
}
