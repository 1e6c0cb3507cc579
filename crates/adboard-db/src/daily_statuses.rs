//! Database operations for the `brand_daily_statuses` table.
//!
//! The scraper writes these rows directly (one per processing run, possibly
//! several per brand per day); this core only reads them. The aggregator
//! always wants the most recent row by `started_at` within a UTC day window.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from `brand_daily_statuses`. `status` is one of the scraper's
/// literals: `Started`, `Completed`, `Blocked`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyStatusRow {
    pub id: i64,
    pub brand_id: i64,
    pub status: String,
    pub active_ads: Option<i32>,
    pub inactive_ads: Option<i32>,
    pub stopped_ads: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Sort mode for the bulk pipeline-status listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSort {
    /// Watchlist brands grouped before the rest, newest run first.
    Normal,
    /// Pure numeric `active_ads` sort with `started_at` as tie-break; the
    /// watchlist grouping is ignored.
    ActiveAds,
}

impl StatusSort {
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            None | Some("") | Some("normal") => Some(StatusSort::Normal),
            Some("active_ads") | Some("activeads") => Some(StatusSort::ActiveAds),
            _ => None,
        }
    }
}

/// One page of brand ids that had a processing run on the target date,
/// carrying the per-brand latest-run columns used for ordering.
#[derive(Debug, Clone)]
pub struct StatusPage {
    pub brand_ids: Vec<i64>,
    pub total: i64,
}

const STATUS_COLUMNS: &str =
    "id, brand_id, status, active_ads, inactive_ads, stopped_ads, started_at, ended_at";

/// Most recent run row for a brand with `started_at` inside `[start, end)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_status_in_window(
    pool: &PgPool,
    brand_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Option<DailyStatusRow>, DbError> {
    let row = sqlx::query_as::<_, DailyStatusRow>(&format!(
        "SELECT {STATUS_COLUMNS} FROM brand_daily_statuses \
         WHERE brand_id = $1 AND started_at >= $2 AND started_at < $3 \
         ORDER BY started_at DESC LIMIT 1"
    ))
    .bind(brand_id)
    .bind(window_start)
    .bind(window_end)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Most recent run row for a brand regardless of date; the file-upload stage
/// compares media timestamps against this run's start date.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_status_for_brand(
    pool: &PgPool,
    brand_id: i64,
) -> Result<Option<DailyStatusRow>, DbError> {
    let row = sqlx::query_as::<_, DailyStatusRow>(&format!(
        "SELECT {STATUS_COLUMNS} FROM brand_daily_statuses \
         WHERE brand_id = $1 ORDER BY started_at DESC LIMIT 1"
    ))
    .bind(brand_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Resolves one page of candidate brand ids for the bulk aggregator: brands
/// with at least one run starting inside the window, ordered per the sort
/// mode, plus the total distinct-brand count for pagination.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn page_brands_for_date(
    pool: &PgPool,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    page: i64,
    per_page: i64,
    sort: StatusSort,
    descending: bool,
) -> Result<StatusPage, DbError> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT brand_id) FROM brand_daily_statuses \
         WHERE started_at >= $1 AND started_at < $2",
    )
    .bind(window_start)
    .bind(window_end)
    .fetch_one(pool)
    .await?;

    let direction = if descending { "DESC" } else { "ASC" };
    // Order expressions are enum-driven, never caller input.
    let order_by = match sort {
        StatusSort::Normal => format!(
            "watchlisted DESC, started_at {direction}"
        ),
        StatusSort::ActiveAds => format!(
            "active_ads {direction} NULLS LAST, started_at {direction}"
        ),
    };

    let sql = format!(
        "WITH latest AS ( \
            SELECT DISTINCT ON (brand_id) brand_id, active_ads, started_at \
            FROM brand_daily_statuses \
            WHERE started_at >= $1 AND started_at < $2 \
            ORDER BY brand_id, started_at DESC \
         ) \
         SELECT l.brand_id, \
                EXISTS (SELECT 1 FROM watch_lists w WHERE w.brand_id = l.brand_id) AS watchlisted \
         FROM latest l \
         ORDER BY {order_by} \
         LIMIT $3 OFFSET $4"
    );

    let offset = (page.max(1) - 1) * per_page;
    let rows = sqlx::query_as::<_, (i64, bool)>(&sql)
        .bind(window_start)
        .bind(window_end)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let brand_ids = rows.into_iter().map(|(brand_id, _)| brand_id).collect();
    Ok(StatusPage { brand_ids, total })
}
