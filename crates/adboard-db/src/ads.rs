//! Database operations for the `ads` table (search-index bookkeeping).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Search-index progress for one brand inside a date window.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdIndexCounts {
    /// Ads whose `typesense_updated_at` falls inside the window.
    pub total: i64,
    /// The subset of those that already carry a `search_index_id`.
    pub indexed: i64,
}

/// Counts indexed vs. total ads for a brand in `[start, end)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn index_counts_for_brand(
    pool: &PgPool,
    brand_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<AdIndexCounts, DbError> {
    let (total, indexed) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE search_index_id IS NOT NULL) \
         FROM ads \
         WHERE brand_id = $1 AND typesense_updated_at >= $2 AND typesense_updated_at < $3",
    )
    .bind(brand_id)
    .bind(window_start)
    .bind(window_end)
    .fetch_one(pool)
    .await?;

    Ok(AdIndexCounts { total, indexed })
}

/// Archive ids of the brand's window ads still missing a `search_index_id`;
/// these are the ids checked against the ad-update job queue.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn unindexed_archive_ids(
    pool: &PgPool,
    brand_id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT archive_id FROM ads \
         WHERE brand_id = $1 AND typesense_updated_at >= $2 AND typesense_updated_at < $3 \
           AND search_index_id IS NULL \
         ORDER BY archive_id",
    )
    .bind(brand_id)
    .bind(window_start)
    .bind(window_end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Batched ad-archive-id to brand-id resolution, one round trip. Job payloads
/// reference ads; dashboards want brands.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn ad_brand_resolution(
    pool: &PgPool,
    archive_ids: &[String],
) -> Result<Vec<(String, i64)>, DbError> {
    if archive_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT archive_id, brand_id FROM ads WHERE archive_id = ANY($1)",
    )
    .bind(archive_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
