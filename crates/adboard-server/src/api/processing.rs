//! Currently-processing and proxy-stats endpoints.

use axum::{extract::State, http::HeaderMap, Json};

use adboard_pipeline::{list_currently_processing, ProcessingView};
use adboard_queue::IpStats;

use super::{env_handles, ApiError, AppState, Envelope};

/// Enriched in-flight scrape listing. A failing tracker read degrades to an
/// empty list so the dashboard keeps rendering while the backend recovers.
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Envelope<Vec<ProcessingView>>>, ApiError> {
    let handles = env_handles(&state, &headers).await?;
    let ctx = handles.pipeline_context();

    let views = match list_currently_processing(&ctx).await {
        Ok(views) => views,
        Err(e) => {
            tracing::warn!(error = %e, "currently-processing read failed; serving empty list");
            Vec::new()
        }
    };
    Ok(Envelope::ok(views))
}

/// Per-proxy success/failure counters.
pub async fn ip_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Envelope<Vec<IpStats>>>, ApiError> {
    let handles = env_handles(&state, &headers).await?;
    let mut conn = handles.global.clone();
    let stats = adboard_queue::list_ip_stats(&mut conn, handles.env).await?;
    Ok(Envelope::ok(stats))
}
