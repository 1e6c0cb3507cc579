//! Per-brand pipeline status aggregation: joins the relational audit trail
//! with the reconciled job indexes into one four-stage report per brand.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

use adboard_core::{JobKind, QueueFamily};
use adboard_db::{DailyStatusRow, MediaCounts, StatusSort};

use crate::status::{
    classify_unindexed, derive_db_store, derive_file_upload, derive_scrape, derive_search_index,
    StageReport,
};
use crate::{PipelineContext, PipelineError};

/// `[00:00, next day 00:00)` in UTC for a calendar date.
#[must_use]
pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
    (start, start + chrono::Duration::days(1))
}

/// The full per-brand report the dashboard renders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandPipelineStatus {
    pub brand_id: i64,
    pub page_id: String,
    pub name: String,
    pub watchlisted: bool,
    pub date: NaiveDate,
    pub scrape: StageReport,
    pub db_store: StageReport,
    pub search_index: StageReport,
    pub file_upload: StageReport,
    /// Logo upload is its own flag, never folded into a stage status.
    pub logo_uploaded: bool,
}

/// Query shape for the bulk listing.
#[derive(Debug, Clone, Copy)]
pub struct StatusListQuery {
    pub date: NaiveDate,
    pub page: i64,
    pub per_page: i64,
    pub sort: StatusSort,
    pub descending: bool,
}

/// One page of per-brand reports plus the overall total for pagination.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelinePage {
    pub statuses: Vec<BrandPipelineStatus>,
    pub total: i64,
}

/// Computes the four-stage pipeline report for one brand on one date.
///
/// # Errors
///
/// Returns [`PipelineError::BrandNotFound`] if the brand does not exist, or
/// the underlying store errors.
pub async fn get_brand_pipeline_status(
    ctx: &PipelineContext,
    brand_id: i64,
    date: NaiveDate,
) -> Result<BrandPipelineStatus, PipelineError> {
    let brand = adboard_db::get_brand(&ctx.pool, brand_id)
        .await?
        .ok_or(PipelineError::BrandNotFound(brand_id))?;
    let watchlisted = adboard_db::is_watchlisted(&ctx.pool, brand_id).await?;
    let family = if watchlisted {
        QueueFamily::Watchlist
    } else {
        QueueFamily::Regular
    };
    let (window_start, window_end) = day_window(date);

    let daily =
        adboard_db::latest_status_in_window(&ctx.pool, brand_id, window_start, window_end).await?;
    let scrape = derive_scrape(daily.as_ref());
    let db_store = derive_db_store(daily.as_ref());

    let search_index =
        derive_search_stage(ctx, family, brand_id, window_start, window_end).await?;
    let file_upload =
        derive_upload_stage(ctx, family, brand_id, window_start, window_end, daily.as_ref())
            .await?;
    let logo_uploaded = adboard_db::brand_has_logo(&ctx.pool, brand_id).await?;

    Ok(BrandPipelineStatus {
        brand_id,
        page_id: brand.page_id,
        name: brand.name,
        watchlisted,
        date,
        scrape,
        db_store,
        search_index,
        file_upload,
        logo_uploaded,
    })
}

/// Search-index stage: window counts plus a queue-membership check on every
/// unindexed ad, against the ad-update job index for the brand's family.
async fn derive_search_stage(
    ctx: &PipelineContext,
    family: QueueFamily,
    brand_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<StageReport, PipelineError> {
    let counts =
        adboard_db::index_counts_for_brand(&ctx.pool, brand_id, window_start, window_end).await?;
    if counts.total == 0 || counts.indexed == counts.total {
        return Ok(derive_search_index(counts, Default::default()));
    }

    let unindexed =
        adboard_db::unindexed_archive_ids(&ctx.pool, brand_id, window_start, window_end).await?;
    let index = ctx.jobs.get(family, JobKind::AdUpdate);
    let mut conn = ctx.queue_conn(family);
    let snapshot = index
        .ensure_fresh(&mut conn, &ctx.pool, ctx.env, family, JobKind::AdUpdate)
        .await?;
    let split = classify_unindexed(&unindexed, |id| snapshot.state_of(id));
    Ok(derive_search_index(counts, split))
}

/// File-upload stage: media counts over the window ads, with "completed"
/// judged against the calendar day the brand's latest run started.
async fn derive_upload_stage(
    ctx: &PipelineContext,
    family: QueueFamily,
    brand_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    daily: Option<&DailyStatusRow>,
) -> Result<StageReport, PipelineError> {
    // The run day comes from the latest run overall, not the window's: a
    // media item uploaded today for yesterday's window still counts.
    let run_started_at = match daily {
        Some(row) => Some(row.started_at),
        None => adboard_db::latest_status_for_brand(&ctx.pool, brand_id)
            .await?
            .map(|row| row.started_at),
    };
    let counts = match run_started_at {
        Some(started_at) => {
            let (run_day_start, run_day_end) = day_window(started_at.date_naive());
            adboard_db::media_counts_for_brand(
                &ctx.pool,
                brand_id,
                window_start,
                window_end,
                run_day_start,
                run_day_end,
            )
            .await?
        }
        None => MediaCounts::default(),
    };

    let index = ctx.jobs.get(family, JobKind::BrandProcessing);
    let mut conn = ctx.queue_conn(family);
    let snapshot = index
        .ensure_fresh(
            &mut conn,
            &ctx.pool,
            ctx.env,
            family,
            JobKind::BrandProcessing,
        )
        .await?;
    let has_active_job = snapshot.has_active_job_for_brand(brand_id);
    Ok(derive_file_upload(counts, has_active_job))
}

/// Computes reports for one page of brands that ran on the date. Page order
/// comes from the relational sort; the bounded fan-out preserves it. Any
/// brand failing is fatal for the whole page rather than silently omitted.
///
/// # Errors
///
/// Returns the first per-brand error, or the paging query's.
pub async fn get_all_brands_pipeline_status(
    ctx: &PipelineContext,
    query: StatusListQuery,
) -> Result<PipelinePage, PipelineError> {
    let (window_start, window_end) = day_window(query.date);
    let page = adboard_db::page_brands_for_date(
        &ctx.pool,
        window_start,
        window_end,
        query.page,
        query.per_page,
        query.sort,
        query.descending,
    )
    .await?;

    let statuses: Vec<BrandPipelineStatus> = stream::iter(page.brand_ids)
        .map(|brand_id| get_brand_pipeline_status(ctx, brand_id, query.date))
        .buffered(ctx.status_fanout_limit.max(1))
        .try_collect()
        .await?;

    Ok(PipelinePage {
        statuses,
        total: page.total,
    })
}
