//! Database operations for the `watch_lists` table. Watchlist membership is
//! derived (a brand is watchlisted iff a row exists), never stored on the
//! brand itself.

use sqlx::PgPool;

use crate::DbError;

/// Whether the brand currently has a watchlist row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn is_watchlisted(pool: &PgPool, brand_id: i64) -> Result<bool, DbError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM watch_lists WHERE brand_id = $1)",
    )
    .bind(brand_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// All watchlisted brand ids.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_watchlisted(pool: &PgPool) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query_scalar::<_, i64>("SELECT brand_id FROM watch_lists ORDER BY brand_id")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Of the given brand ids, the subset that is watchlisted. One round trip,
/// used when enriching whole listings.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn watchlisted_subset(pool: &PgPool, brand_ids: &[i64]) -> Result<Vec<i64>, DbError> {
    if brand_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_scalar::<_, i64>(
        "SELECT brand_id FROM watch_lists WHERE brand_id = ANY($1)",
    )
    .bind(brand_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
