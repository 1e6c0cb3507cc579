//! Database operations for the `ads_media_items` table (file-upload stage).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// File-upload progress for one brand on the target date.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaCounts {
    /// Media items touched on the target date, joined through ads whose
    /// index timestamp also falls in the window. Intentionally narrow: only
    /// media touched on the exact target date counts.
    pub total: i64,
    /// The subset whose `updated_at` falls on the same calendar date as the
    /// brand's latest run start.
    pub completed: i64,
}

/// Counts media items for the brand's window ads, and how many were updated
/// on the same calendar day as `[run_day_start, run_day_end)` — the day the
/// brand's latest processing run started.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn media_counts_for_brand(
    pool: &PgPool,
    brand_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    run_day_start: DateTime<Utc>,
    run_day_end: DateTime<Utc>,
) -> Result<MediaCounts, DbError> {
    let (total, completed) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE m.updated_at >= $4 AND m.updated_at < $5) \
         FROM ads_media_items m \
         JOIN ads a ON a.id = m.ad_id \
         WHERE a.brand_id = $1 \
           AND a.typesense_updated_at >= $2 AND a.typesense_updated_at < $3 \
           AND m.updated_at >= $2 AND m.updated_at < $3",
    )
    .bind(brand_id)
    .bind(window_start)
    .bind(window_end)
    .bind(run_day_start)
    .bind(run_day_end)
    .fetch_one(pool)
    .await?;

    Ok(MediaCounts { total, completed })
}
