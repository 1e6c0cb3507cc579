//! Database operations for the `brands` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `brands` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandRow {
    pub id: i64,
    pub page_id: String,
    pub name: String,
    pub actual_name: Option<String>,
    pub category: Option<String>,
    pub status: String,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The metadata subset the job reconciler and dashboards need; refreshed on
/// its own timer because it changes far less often than queue state.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandMetaRow {
    pub id: i64,
    pub page_id: String,
    pub name: String,
    pub category: Option<String>,
}

/// Relational filter backing the bulk "queue everything matching" operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrandFilter {
    All,
    Active,
    Inactive,
    WatchlistAll,
    WatchlistActive,
    WatchlistInactive,
    RegularAll,
    RegularActive,
    RegularInactive,
}

impl BrandFilter {
    /// `None` (no filter supplied) means all brands.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let Some(raw) = raw else {
            return Some(BrandFilter::All);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Some(BrandFilter::All),
            "active" => Some(BrandFilter::Active),
            "inactive" => Some(BrandFilter::Inactive),
            "watchlist_all" => Some(BrandFilter::WatchlistAll),
            "watchlist_active" => Some(BrandFilter::WatchlistActive),
            "watchlist_inactive" => Some(BrandFilter::WatchlistInactive),
            "regular_all" => Some(BrandFilter::RegularAll),
            "regular_active" => Some(BrandFilter::RegularActive),
            "regular_inactive" => Some(BrandFilter::RegularInactive),
            _ => None,
        }
    }

    fn where_clause(self) -> &'static str {
        const ON_WATCHLIST: &str =
            "EXISTS (SELECT 1 FROM watch_lists w WHERE w.brand_id = brands.id)";
        const OFF_WATCHLIST: &str =
            "NOT EXISTS (SELECT 1 FROM watch_lists w WHERE w.brand_id = brands.id)";
        match self {
            BrandFilter::All => "TRUE",
            BrandFilter::Active => "status = 'Active'",
            BrandFilter::Inactive => "status = 'Inactive'",
            BrandFilter::WatchlistAll => ON_WATCHLIST,
            BrandFilter::WatchlistActive => {
                "status = 'Active' AND EXISTS (SELECT 1 FROM watch_lists w WHERE w.brand_id = brands.id)"
            }
            BrandFilter::WatchlistInactive => {
                "status = 'Inactive' AND EXISTS (SELECT 1 FROM watch_lists w WHERE w.brand_id = brands.id)"
            }
            BrandFilter::RegularAll => OFF_WATCHLIST,
            BrandFilter::RegularActive => {
                "status = 'Active' AND NOT EXISTS (SELECT 1 FROM watch_lists w WHERE w.brand_id = brands.id)"
            }
            BrandFilter::RegularInactive => {
                "status = 'Inactive' AND NOT EXISTS (SELECT 1 FROM watch_lists w WHERE w.brand_id = brands.id)"
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

const BRAND_COLUMNS: &str =
    "id, page_id, name, actual_name, category, status, logo_url, created_at, updated_at";

/// Returns a single brand by `page_id`, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_brand_by_page_id(pool: &PgPool, page_id: &str) -> Result<Option<BrandRow>, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE page_id = $1"
    ))
    .bind(page_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns a single brand by primary key, or `None` if not found.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_brand(pool: &PgPool, brand_id: i64) -> Result<Option<BrandRow>, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE id = $1"
    ))
    .bind(brand_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Batch existence check: of the given `page_ids`, returns the subset known
/// to the `brands` table. One round trip, used by bulk queue adds to avoid
/// N+1 lookups.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_known_page_ids(
    pool: &PgPool,
    page_ids: &[String],
) -> Result<Vec<String>, DbError> {
    if page_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT page_id FROM brands WHERE page_id = ANY($1)",
    )
    .bind(page_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Batch `page_id` to brand-id resolution, one round trip. Bulk queue adds
/// use this instead of per-row existence checks.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn page_id_map(
    pool: &PgPool,
    page_ids: &[String],
) -> Result<Vec<(String, i64)>, DbError> {
    if page_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT page_id, id FROM brands WHERE page_id = ANY($1)",
    )
    .bind(page_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Batch brand resolution by primary key, for enriching queue/job listings.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn resolve_brands(pool: &PgPool, brand_ids: &[i64]) -> Result<Vec<BrandRow>, DbError> {
    if brand_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, BrandRow>(&format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE id = ANY($1)"
    ))
    .bind(brand_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Full-table brand metadata listing backing the reconciler's metadata cache.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_brand_metadata(pool: &PgPool) -> Result<Vec<BrandMetaRow>, DbError> {
    let rows = sqlx::query_as::<_, BrandMetaRow>(
        "SELECT id, page_id, name, category FROM brands ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns brands matching a [`BrandFilter`], ordered by id for stable
/// chunking.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_brands_matching(
    pool: &PgPool,
    filter: BrandFilter,
) -> Result<Vec<BrandRow>, DbError> {
    // where_clause comes from a fixed enum, never caller input.
    let sql = format!(
        "SELECT {BRAND_COLUMNS} FROM brands WHERE {} ORDER BY id",
        filter.where_clause()
    );
    let rows = sqlx::query_as::<_, BrandRow>(&sql).fetch_all(pool).await?;

    Ok(rows)
}

/// Updates `brands.status` for a given brand id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matched, [`DbError::Sqlx`] on
/// query failure.
pub async fn update_brand_status(
    pool: &PgPool,
    brand_id: i64,
    status: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE brands SET status = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(status)
    .bind(brand_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Whether the brand has an uploaded logo (surfaced alongside the file-upload
/// stage, never folded into its completed flag).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn brand_has_logo(pool: &PgPool, brand_id: i64) -> Result<bool, DbError> {
    let has_logo = sqlx::query_scalar::<_, bool>(
        "SELECT logo_url IS NOT NULL FROM brands WHERE id = $1",
    )
    .bind(brand_id)
    .fetch_optional(pool)
    .await?;

    Ok(has_logo.unwrap_or(false))
}
