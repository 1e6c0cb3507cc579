//! Currently-processing view: raw tracker entries enriched with brand
//! metadata for the dashboard.

use chrono::{DateTime, Utc};
use serde::Serialize;

use adboard_queue::list_processing_entries;

use crate::{PipelineContext, PipelineError};

/// One enriched in-flight scrape row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingView {
    pub brand_id: Option<i64>,
    pub page_id: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub watchlisted: bool,
    pub status: String,
    pub start_at: Option<DateTime<Utc>>,
    pub duration: Option<f64>,
    pub total_ads: Option<i64>,
    pub proxy: Option<String>,
}

/// Reads the currently-processing list and joins each entry against the
/// brand metadata cache. Entries whose brand is unknown (deleted, or pushed
/// with no brand id) still render, with placeholder metadata.
///
/// # Errors
///
/// Returns [`PipelineError::Queue`] if the tracker read fails, or
/// [`PipelineError::Db`] if a cold metadata cache cannot be filled.
pub async fn list_currently_processing(
    ctx: &PipelineContext,
) -> Result<Vec<ProcessingView>, PipelineError> {
    let mut conn = ctx.global.clone();
    let entries = list_processing_entries(&mut conn, ctx.env).await?;
    let brands = ctx.brands.ensure_fresh(&ctx.pool).await?;

    let views = entries
        .into_iter()
        .map(|entry| {
            let meta = entry.brand_id.and_then(|id| brands.get(&id));
            ProcessingView {
                name: meta.map_or_else(|| "Unknown brand".to_string(), |m| m.name.clone()),
                category: meta.and_then(|m| m.category.clone()),
                watchlisted: meta.is_some_and(|m| m.watchlisted),
                page_id: entry
                    .page_id
                    .or_else(|| meta.map(|m| m.page_id.clone())),
                brand_id: entry.brand_id,
                status: entry.status,
                start_at: entry.start_at,
                duration: entry.duration,
                total_ads: entry.total_ads,
                proxy: entry.proxy,
            }
        })
        .collect();
    Ok(views)
}
