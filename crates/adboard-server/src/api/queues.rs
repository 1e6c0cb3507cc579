//! Queue listing and mutation endpoints.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use adboard_core::{QueueFamily, QueueRole};
use adboard_db::BrandFilter;
use adboard_queue::{BulkAddItem, MoveDirection, QueueEntry};

use super::{
    env_handles, normalize_page, normalize_per_page, ApiError, AppState, Envelope, Paginated,
};

pub(super) fn parse_family(raw: &str) -> Result<QueueFamily, ApiError> {
    QueueFamily::parse(raw)
        .ok_or_else(|| ApiError::new("bad_request", format!("unknown queue family: {raw}")))
}

fn parse_role(raw: &str) -> Result<QueueRole, ApiError> {
    QueueRole::parse(raw)
        .ok_or_else(|| ApiError::new("bad_request", format!("unknown queue role: {raw}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItem {
    pub brand_id: i64,
    pub page_id: String,
    pub score: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub brand_id: i64,
    pub page_id: String,
}

fn matches_search(entry: &QueueEntry, search: Option<&str>) -> bool {
    match search {
        Some(needle) if !needle.trim().is_empty() => entry.page_id.contains(needle.trim()),
        _ => true,
    }
}

fn paginate<T>(items: Vec<T>, page: i64, per_page: i64) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let start = ((page - 1) * per_page) as usize;
    let window = items
        .into_iter()
        .skip(start)
        .take(per_page as usize)
        .collect();
    (window, total)
}

pub async fn list_pending(
    State(state): State<AppState>,
    Path(family): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<Json<Envelope<Paginated<PendingItem>>>, ApiError> {
    let family = parse_family(&family)?;
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let entries = adboard_queue::list_pending(&mut conn, handles.env, family).await?;
    let items: Vec<PendingItem> = entries
        .into_iter()
        .filter(|(entry, _)| matches_search(entry, query.search.as_deref()))
        .map(|(entry, score)| PendingItem {
            brand_id: entry.brand_id,
            page_id: entry.page_id,
            score,
        })
        .collect();

    let page = normalize_page(query.page);
    let per_page = normalize_per_page(query.per_page);
    let (window, total) = paginate(items, page, per_page);
    Ok(Envelope::ok(Paginated::new(window, page, per_page, total)))
}

pub async fn list_failed(
    State(state): State<AppState>,
    Path(family): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<Json<Envelope<Paginated<FailedItem>>>, ApiError> {
    let family = parse_family(&family)?;
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let entries = adboard_queue::list_failed(&mut conn, handles.env, family).await?;
    let items: Vec<FailedItem> = entries
        .into_iter()
        .filter(|entry| matches_search(entry, query.search.as_deref()))
        .map(|entry| FailedItem {
            brand_id: entry.brand_id,
            page_id: entry.page_id,
        })
        .collect();

    let page = normalize_page(query.page);
    let per_page = normalize_per_page(query.per_page);
    let (window, total) = paginate(items, page, per_page);
    Ok(Envelope::ok(Paginated::new(window, page, per_page, total)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPendingBody {
    pub page_id: String,
    pub score: Option<f64>,
}

pub async fn add_pending(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddPendingBody>,
) -> Result<Json<Envelope<PendingItem>>, ApiError> {
    let family = parse_family(&family)?;
    if body.page_id.trim().is_empty() {
        return Err(ApiError::new("validation_error", "page_id must not be empty"));
    }
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let entry = adboard_queue::add_pending(
        &mut conn,
        &handles.pool,
        handles.env,
        family,
        body.page_id.trim(),
        body.score,
    )
    .await?;
    Ok(Envelope::ok_with(
        "brand queued",
        PendingItem {
            brand_id: entry.brand_id,
            page_id: entry.page_id,
            score: body.score.unwrap_or(adboard_queue::DEFAULT_SCORE),
        },
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAddBody {
    pub items: Vec<BulkItemBody>,
}

/// One pre-parsed row of the operator's bulk upload. `id` is accepted for
/// compatibility with the upload format but the relational store is the
/// authority on page-id resolution.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemBody {
    #[serde(default)]
    pub id: Option<i64>,
    pub page_id: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub queued: usize,
    pub skipped: Vec<String>,
    pub failed: Vec<BulkFailureItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailureItem {
    pub page_id: String,
    pub reason: String,
}

pub async fn add_bulk(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
    Json(body): Json<BulkAddBody>,
) -> Result<Json<Envelope<BulkReport>>, ApiError> {
    let family = parse_family(&family)?;
    if body.items.is_empty() {
        return Err(ApiError::new("validation_error", "items must not be empty"));
    }
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let items: Vec<BulkAddItem> = body
        .items
        .into_iter()
        .map(|item| BulkAddItem {
            page_id: item.page_id,
            score: item.score,
        })
        .collect();
    let outcome =
        adboard_queue::add_bulk(&mut conn, &handles.pool, handles.env, family, &items).await?;

    Ok(Envelope::ok(BulkReport {
        queued: outcome.success.len(),
        skipped: outcome.skipped,
        failed: outcome
            .failed
            .into_iter()
            .map(|failure| BulkFailureItem {
                page_id: failure.page_id,
                reason: failure.reason,
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AddAllBody {
    pub filter: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAllResponse {
    pub queued: usize,
    pub skipped: usize,
}

pub async fn add_all(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddAllBody>,
) -> Result<Json<Envelope<AddAllResponse>>, ApiError> {
    let family = parse_family(&family)?;
    let filter = BrandFilter::parse(body.filter.as_deref()).ok_or_else(|| {
        ApiError::new(
            "validation_error",
            format!("unknown brand filter: {}", body.filter.unwrap_or_default()),
        )
    })?;
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let report = adboard_queue::add_all_matching(
        &mut conn,
        &handles.pool,
        handles.env,
        family,
        filter,
        state.registry.config().queue_bulk_chunk_size,
    )
    .await?;
    Ok(Envelope::ok(AddAllResponse {
        queued: report.queued,
        skipped: report.skipped,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveBody {
    pub page_id: String,
    pub direction: String,
    #[serde(default)]
    pub score: Option<f64>,
}

fn parse_direction(raw: &str) -> Result<MoveDirection, ApiError> {
    MoveDirection::parse(raw)
        .ok_or_else(|| ApiError::new("bad_request", format!("unknown move direction: {raw}")))
}

pub async fn move_entry(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MoveBody>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let family = parse_family(&family)?;
    let direction = parse_direction(&body.direction)?;
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    match direction {
        MoveDirection::PendingToFailed => {
            adboard_queue::move_to_failed(&mut conn, handles.env, family, &body.page_id).await?;
        }
        MoveDirection::FailedToPending => {
            adboard_queue::move_to_pending(
                &mut conn,
                handles.env,
                family,
                &body.page_id,
                body.score,
            )
            .await?;
        }
    }
    Ok(Envelope::ok_with("entry moved", ()))
}

#[derive(Debug, Deserialize)]
pub struct MoveAllBody {
    pub direction: String,
}

#[derive(Debug, Serialize)]
pub struct MoveAllResponse {
    pub moved: usize,
}

pub async fn move_all(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MoveAllBody>,
) -> Result<Json<Envelope<MoveAllResponse>>, ApiError> {
    let family = parse_family(&family)?;
    let direction = parse_direction(&body.direction)?;
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let moved = adboard_queue::move_all(&mut conn, handles.env, family, direction).await?;
    Ok(Envelope::ok(MoveAllResponse { moved }))
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: i64,
}

pub async fn clear(
    State(state): State<AppState>,
    Path((family, role)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Envelope<ClearResponse>>, ApiError> {
    let family = parse_family(&family)?;
    let role = parse_role(&role)?;
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let cleared = adboard_queue::clear(&mut conn, handles.env, family, role).await?;
    Ok(Envelope::ok_with(
        format!("{role} queue cleared"),
        ClearResponse { cleared },
    ))
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub valid: usize,
    pub corrupted: usize,
}

pub async fn cleanup(
    State(state): State<AppState>,
    Path(family): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Envelope<CleanupResponse>>, ApiError> {
    let family = parse_family(&family)?;
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let report = adboard_queue::cleanup_corrupted(&mut conn, handles.env, family).await?;
    Ok(Envelope::ok(CleanupResponse {
        valid: report.valid,
        corrupted: report.corrupted,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(page_id: &str) -> QueueEntry {
        QueueEntry {
            brand_id: 1,
            page_id: page_id.to_string(),
        }
    }

    #[test]
    fn unknown_family_is_rejected_before_store_access() {
        assert!(parse_family("regular").is_ok());
        assert!(parse_family("watchlist").is_ok());
        assert!(parse_family("vip").is_err());
    }

    #[test]
    fn search_filters_on_page_id_substring() {
        assert!(matches_search(&entry("123456"), Some("345")));
        assert!(!matches_search(&entry("123456"), Some("999")));
        assert!(matches_search(&entry("123456"), None));
        assert!(matches_search(&entry("123456"), Some("  ")));
    }

    #[test]
    fn pagination_windows_the_listing() {
        let items: Vec<i64> = (1..=7).collect();
        let (window, total) = paginate(items.clone(), 2, 3);
        assert_eq!(window, vec![4, 5, 6]);
        assert_eq!(total, 7);

        let (past_end, total) = paginate(items, 9, 3);
        assert!(past_end.is_empty());
        assert_eq!(total, 7);
    }

    #[test]
    fn bulk_item_body_accepts_optional_id() {
        let item: BulkItemBody =
            serde_json::from_str(r#"{"id": 7, "pageId": "123", "score": 2.0}"#).expect("parse");
        assert_eq!(item.id, Some(7));
        assert_eq!(item.page_id, "123");

        let bare: BulkItemBody = serde_json::from_str(r#"{"pageId": "123"}"#).expect("parse");
        assert_eq!(bare.id, None);
        assert_eq!(bare.score, None);
    }
}
