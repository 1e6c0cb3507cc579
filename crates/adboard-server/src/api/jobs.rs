//! Job-queue index listing and counter endpoints.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adboard_core::{JobKind, JobState};
use adboard_queue::JobCounts;

use super::queues::parse_family;
use super::{
    env_handles, normalize_page, normalize_per_page, ApiError, AppState, Envelope, Paginated,
};

fn parse_kind(raw: &str) -> Result<JobKind, ApiError> {
    JobKind::parse(raw)
        .ok_or_else(|| ApiError::new("bad_request", format!("unknown job kind: {raw}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    /// Restrict to one reconciled state, e.g. `failed`.
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobItem {
    pub job_id: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Reconciled job listing for one (family, kind), newest first, enriched
/// with brand names from the metadata cache.
pub async fn list_jobs(
    State(state): State<AppState>,
    Path((family, kind)): Path<(String, String)>,
    Query(query): Query<JobListQuery>,
    headers: HeaderMap,
) -> Result<Json<Envelope<Paginated<JobItem>>>, ApiError> {
    let family = parse_family(&family)?;
    let kind = parse_kind(&kind)?;
    let state_filter = match query.state.as_deref() {
        Some(raw) => Some(parse_state(raw)?),
        None => None,
    };

    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);
    let index = handles.jobs.get(family, kind);
    let snapshot = index
        .ensure_fresh(&mut conn, &handles.pool, handles.env, family, kind)
        .await?;
    let brands = handles.brands.ensure_fresh(&handles.pool).await?;

    let items: Vec<JobItem> = snapshot
        .jobs
        .iter()
        .filter(|job| state_filter.is_none_or(|wanted| job.state == wanted))
        .map(|job| JobItem {
            job_id: job.job_id.clone(),
            state: job.state,
            timestamp: job.timestamp,
            brand_id: job.brand_id,
            brand_name: job
                .brand_id
                .and_then(|id| brands.get(&id))
                .map(|meta| meta.name.clone()),
            payload: job.payload.clone(),
        })
        .collect();

    let page = normalize_page(query.page);
    let per_page = normalize_per_page(query.per_page);
    let total = items.len() as i64;
    let window: Vec<JobItem> = items
        .into_iter()
        .skip(((page - 1) * per_page) as usize)
        .take(per_page as usize)
        .collect();
    Ok(Envelope::ok(Paginated::new(window, page, per_page, total)))
}

fn parse_state(raw: &str) -> Result<JobState, ApiError> {
    JobState::ALL
        .into_iter()
        .find(|state| state.as_str() == raw.trim().to_ascii_lowercase())
        .ok_or_else(|| ApiError::new("bad_request", format!("unknown job state: {raw}")))
}

/// Cheap sub-collection sizes from the short-TTL counter cache.
pub async fn counts(
    State(state): State<AppState>,
    Path((family, kind)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Envelope<JobCounts>>, ApiError> {
    let family = parse_family(&family)?;
    let kind = parse_kind(&kind)?;
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.queue_conn(family);

    let counts = handles
        .counters
        .get(&mut conn, handles.env, family, kind)
        .await?;
    Ok(Envelope::ok(counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_accepts_both_spellings() {
        assert_eq!(parse_kind("ad-update").expect("kind"), JobKind::AdUpdate);
        assert_eq!(
            parse_kind("brand-processing").expect("kind"),
            JobKind::BrandProcessing
        );
        assert!(parse_kind("media-upload").is_err());
    }

    #[test]
    fn state_filter_parse() {
        assert_eq!(parse_state("failed").expect("state"), JobState::Failed);
        assert_eq!(parse_state(" Waiting ").expect("state"), JobState::Waiting);
        assert!(parse_state("zombie").is_err());
    }

    #[test]
    fn job_item_omits_unknown_brand_fields() {
        let item = JobItem {
            job_id: "42".to_string(),
            state: JobState::Waiting,
            timestamp: None,
            brand_id: None,
            brand_name: None,
            payload: None,
        };
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["jobId"], "42");
        assert_eq!(json["state"], "waiting");
        assert!(json.get("brandId").is_none());
        assert!(json.get("payload").is_none());
    }
}
