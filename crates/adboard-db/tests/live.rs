//! Live integration tests for adboard-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/adboard-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{DateTime, TimeZone, Utc};

use adboard_db::{
    ad_brand_resolution, brand_has_logo, get_brand, get_brand_by_page_id, health_check,
    index_counts_for_brand, is_watchlisted, latest_status_for_brand, latest_status_in_window,
    list_brand_metadata, list_brands_matching, list_known_page_ids, list_watchlisted,
    media_counts_for_brand, page_brands_for_date, page_id_map, resolve_brands,
    unindexed_archive_ids, update_brand_status, watchlisted_subset, BrandFilter, DbError,
    StatusSort,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Insert a minimal brand row and return its generated `id`.
async fn insert_test_brand(pool: &sqlx::PgPool, page_id: &str, status: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO brands (page_id, name, status) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(page_id)
    .bind(format!("Test Brand {page_id}"))
    .bind(status)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_test_brand failed for page_id '{page_id}': {e}"))
}

async fn insert_watchlist_row(pool: &sqlx::PgPool, brand_id: i64) {
    sqlx::query("INSERT INTO watch_lists (brand_id) VALUES ($1)")
        .bind(brand_id)
        .execute(pool)
        .await
        .unwrap_or_else(|e| panic!("insert_watchlist_row failed for brand {brand_id}: {e}"));
}

/// Insert a processing-run row with an explicit start time.
async fn insert_daily_status(
    pool: &sqlx::PgPool,
    brand_id: i64,
    status: &str,
    active_ads: Option<i32>,
    started_at: DateTime<Utc>,
) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO brand_daily_statuses (brand_id, status, active_ads, started_at) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(brand_id)
    .bind(status)
    .bind(active_ads)
    .bind(started_at)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_daily_status failed for brand {brand_id}: {e}"))
}

async fn insert_test_ad(
    pool: &sqlx::PgPool,
    brand_id: i64,
    archive_id: &str,
    search_index_id: Option<&str>,
    typesense_updated_at: Option<DateTime<Utc>>,
) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO ads (brand_id, archive_id, search_index_id, typesense_updated_at) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(brand_id)
    .bind(archive_id)
    .bind(search_index_id)
    .bind(typesense_updated_at)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_test_ad failed for archive '{archive_id}': {e}"))
}

async fn insert_media_item(pool: &sqlx::PgPool, ad_id: i64, updated_at: DateTime<Utc>) {
    sqlx::query(
        "INSERT INTO ads_media_items (ad_id, media_type, updated_at) VALUES ($1, 'video', $2)",
    )
    .bind(ad_id)
    .bind(updated_at)
    .execute(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_media_item failed for ad {ad_id}: {e}"));
}

/// A fixed UTC instant inside the test day, `hour` hours in.
fn at_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap()
}

/// The `[start, end)` UTC window for the test day.
fn day_window() -> (DateTime<Utc>, DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Section 1: Brand lookups and status updates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn brand_lookup_by_id_and_page_id(pool: sqlx::PgPool) {
    let id = insert_test_brand(&pool, "page-100", "Active").await;

    let by_id = get_brand(&pool, id)
        .await
        .expect("get_brand failed")
        .expect("brand should exist");
    assert_eq!(by_id.page_id, "page-100");
    assert_eq!(by_id.status, "Active");
    assert!(by_id.logo_url.is_none());

    let by_page = get_brand_by_page_id(&pool, "page-100")
        .await
        .expect("get_brand_by_page_id failed")
        .expect("brand should exist");
    assert_eq!(by_page.id, id);

    let missing = get_brand_by_page_id(&pool, "no-such-page")
        .await
        .expect("get_brand_by_page_id failed");
    assert!(missing.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_brand_status_persists_and_flags_missing_rows(pool: sqlx::PgPool) {
    let id = insert_test_brand(&pool, "page-101", "Incomplete").await;

    update_brand_status(&pool, id, "Active")
        .await
        .expect("update_brand_status failed");
    let row = get_brand(&pool, id)
        .await
        .expect("get_brand failed")
        .expect("brand should exist");
    assert_eq!(row.status, "Active");
    assert!(row.updated_at >= row.created_at);

    let err = update_brand_status(&pool, id + 9999, "Active")
        .await
        .expect_err("missing brand should error");
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
async fn brand_has_logo_reflects_logo_url(pool: sqlx::PgPool) {
    let id = insert_test_brand(&pool, "page-102", "Active").await;

    assert!(!brand_has_logo(&pool, id).await.expect("brand_has_logo failed"));

    sqlx::query("UPDATE brands SET logo_url = 'https://cdn.example/logo.png' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .expect("logo update failed");
    assert!(brand_has_logo(&pool, id).await.expect("brand_has_logo failed"));

    // Missing brands read as "no logo", never an error.
    assert!(!brand_has_logo(&pool, id + 9999)
        .await
        .expect("brand_has_logo failed"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn batch_brand_resolution_round_trips(pool: sqlx::PgPool) {
    let a = insert_test_brand(&pool, "page-200", "Active").await;
    let b = insert_test_brand(&pool, "page-201", "Inactive").await;

    let known = list_known_page_ids(
        &pool,
        &[
            "page-200".to_string(),
            "page-201".to_string(),
            "page-999".to_string(),
        ],
    )
    .await
    .expect("list_known_page_ids failed");
    assert_eq!(known.len(), 2);
    assert!(known.contains(&"page-200".to_string()));
    assert!(!known.contains(&"page-999".to_string()));

    let map = page_id_map(&pool, &["page-201".to_string(), "page-999".to_string()])
        .await
        .expect("page_id_map failed");
    assert_eq!(map, vec![("page-201".to_string(), b)]);

    let rows = resolve_brands(&pool, &[a, b, b + 9999])
        .await
        .expect("resolve_brands failed");
    assert_eq!(rows.len(), 2);

    // Empty input short-circuits without touching the database.
    assert!(list_known_page_ids(&pool, &[]).await.unwrap().is_empty());
    assert!(page_id_map(&pool, &[]).await.unwrap().is_empty());
    assert!(resolve_brands(&pool, &[]).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn brand_metadata_listing_is_ordered_by_id(pool: sqlx::PgPool) {
    let a = insert_test_brand(&pool, "page-300", "Active").await;
    let b = insert_test_brand(&pool, "page-301", "Active").await;

    let rows = list_brand_metadata(&pool)
        .await
        .expect("list_brand_metadata failed");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, a);
    assert_eq!(rows[1].id, b);
    assert_eq!(rows[1].page_id, "page-301");
}

#[sqlx::test(migrations = "../../migrations")]
async fn brand_filters_respect_status_and_watchlist_membership(pool: sqlx::PgPool) {
    let active_watch = insert_test_brand(&pool, "page-400", "Active").await;
    let inactive_watch = insert_test_brand(&pool, "page-401", "Inactive").await;
    let active_regular = insert_test_brand(&pool, "page-402", "Active").await;
    insert_watchlist_row(&pool, active_watch).await;
    insert_watchlist_row(&pool, inactive_watch).await;

    let all = list_brands_matching(&pool, BrandFilter::All)
        .await
        .expect("list_brands_matching failed");
    assert_eq!(all.len(), 3);

    let ids = |rows: Vec<adboard_db::BrandRow>| rows.into_iter().map(|r| r.id).collect::<Vec<_>>();

    let active = ids(list_brands_matching(&pool, BrandFilter::Active).await.unwrap());
    assert_eq!(active, vec![active_watch, active_regular]);

    let watch_active = ids(
        list_brands_matching(&pool, BrandFilter::WatchlistActive)
            .await
            .unwrap(),
    );
    assert_eq!(watch_active, vec![active_watch]);

    let regular_all = ids(list_brands_matching(&pool, BrandFilter::RegularAll).await.unwrap());
    assert_eq!(regular_all, vec![active_regular]);

    let regular_inactive = ids(
        list_brands_matching(&pool, BrandFilter::RegularInactive)
            .await
            .unwrap(),
    );
    assert!(regular_inactive.is_empty());
}

// ---------------------------------------------------------------------------
// Section 2: Watchlist membership
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn watchlist_membership_is_derived_from_rows(pool: sqlx::PgPool) {
    let listed = insert_test_brand(&pool, "page-500", "Active").await;
    let unlisted = insert_test_brand(&pool, "page-501", "Active").await;
    insert_watchlist_row(&pool, listed).await;

    assert!(is_watchlisted(&pool, listed).await.expect("is_watchlisted failed"));
    assert!(!is_watchlisted(&pool, unlisted).await.expect("is_watchlisted failed"));

    let all = list_watchlisted(&pool).await.expect("list_watchlisted failed");
    assert_eq!(all, vec![listed]);

    let subset = watchlisted_subset(&pool, &[listed, unlisted, unlisted + 9999])
        .await
        .expect("watchlisted_subset failed");
    assert_eq!(subset, vec![listed]);
    assert!(watchlisted_subset(&pool, &[]).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Section 3: Daily status windows and paging
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn latest_status_in_window_prefers_the_newest_run(pool: sqlx::PgPool) {
    let brand = insert_test_brand(&pool, "page-600", "Active").await;
    let (start, end) = day_window();

    insert_daily_status(&pool, brand, "Started", None, at_hour(2)).await;
    let newest = insert_daily_status(&pool, brand, "Completed", Some(12), at_hour(9)).await;
    // Outside the window; never a candidate.
    insert_daily_status(
        &pool,
        brand,
        "Blocked",
        None,
        Utc.with_ymd_and_hms(2026, 3, 11, 1, 0, 0).unwrap(),
    )
    .await;

    let row = latest_status_in_window(&pool, brand, start, end)
        .await
        .expect("latest_status_in_window failed")
        .expect("run row should exist");
    assert_eq!(row.id, newest);
    assert_eq!(row.status, "Completed");
    assert_eq!(row.active_ads, Some(12));

    let other_brand = insert_test_brand(&pool, "page-601", "Active").await;
    let missing = latest_status_in_window(&pool, other_brand, start, end)
        .await
        .expect("latest_status_in_window failed");
    assert!(missing.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn latest_status_for_brand_ignores_the_window(pool: sqlx::PgPool) {
    let brand = insert_test_brand(&pool, "page-610", "Active").await;
    insert_daily_status(&pool, brand, "Completed", Some(3), at_hour(4)).await;
    let later = insert_daily_status(
        &pool,
        brand,
        "Started",
        None,
        Utc.with_ymd_and_hms(2026, 3, 12, 8, 0, 0).unwrap(),
    )
    .await;

    let row = latest_status_for_brand(&pool, brand)
        .await
        .expect("latest_status_for_brand failed")
        .expect("run row should exist");
    assert_eq!(row.id, later);
    assert_eq!(row.status, "Started");
}

#[sqlx::test(migrations = "../../migrations")]
async fn status_page_normal_sort_groups_watchlisted_first(pool: sqlx::PgPool) {
    let regular = insert_test_brand(&pool, "page-620", "Active").await;
    let watchlisted = insert_test_brand(&pool, "page-621", "Active").await;
    insert_watchlist_row(&pool, watchlisted).await;
    let (start, end) = day_window();

    // The regular brand ran later, but watchlist grouping still wins.
    insert_daily_status(&pool, watchlisted, "Completed", Some(5), at_hour(3)).await;
    insert_daily_status(&pool, regular, "Completed", Some(9), at_hour(10)).await;

    let page = page_brands_for_date(&pool, start, end, 1, 10, StatusSort::Normal, true)
        .await
        .expect("page_brands_for_date failed");
    assert_eq!(page.total, 2);
    assert_eq!(page.brand_ids, vec![watchlisted, regular]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn status_page_active_ads_sort_ignores_the_watchlist(pool: sqlx::PgPool) {
    let low = insert_test_brand(&pool, "page-630", "Active").await;
    let high = insert_test_brand(&pool, "page-631", "Active").await;
    let unknown = insert_test_brand(&pool, "page-632", "Active").await;
    insert_watchlist_row(&pool, low).await;
    let (start, end) = day_window();

    insert_daily_status(&pool, low, "Completed", Some(2), at_hour(5)).await;
    insert_daily_status(&pool, high, "Completed", Some(40), at_hour(6)).await;
    insert_daily_status(&pool, unknown, "Started", None, at_hour(7)).await;

    let desc = page_brands_for_date(&pool, start, end, 1, 10, StatusSort::ActiveAds, true)
        .await
        .expect("page_brands_for_date failed");
    // NULL counts sort last in both directions.
    assert_eq!(desc.brand_ids, vec![high, low, unknown]);

    let asc = page_brands_for_date(&pool, start, end, 1, 10, StatusSort::ActiveAds, false)
        .await
        .expect("page_brands_for_date failed");
    assert_eq!(asc.brand_ids, vec![low, high, unknown]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn status_page_counts_distinct_brands_and_pages(pool: sqlx::PgPool) {
    let a = insert_test_brand(&pool, "page-640", "Active").await;
    let b = insert_test_brand(&pool, "page-641", "Active").await;
    let c = insert_test_brand(&pool, "page-642", "Active").await;
    let (start, end) = day_window();

    // Two runs for one brand still count it once.
    insert_daily_status(&pool, a, "Started", None, at_hour(1)).await;
    insert_daily_status(&pool, a, "Completed", Some(7), at_hour(8)).await;
    insert_daily_status(&pool, b, "Completed", Some(1), at_hour(4)).await;
    insert_daily_status(&pool, c, "Completed", Some(2), at_hour(6)).await;

    let first = page_brands_for_date(&pool, start, end, 1, 2, StatusSort::Normal, true)
        .await
        .expect("page_brands_for_date failed");
    assert_eq!(first.total, 3);
    assert_eq!(first.brand_ids.len(), 2);

    let second = page_brands_for_date(&pool, start, end, 2, 2, StatusSort::Normal, true)
        .await
        .expect("page_brands_for_date failed");
    assert_eq!(second.total, 3);
    assert_eq!(second.brand_ids.len(), 1);
    assert!(!first.brand_ids.contains(&second.brand_ids[0]));
}

// ---------------------------------------------------------------------------
// Section 4: Ads and media counts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn index_counts_split_indexed_from_pending(pool: sqlx::PgPool) {
    let brand = insert_test_brand(&pool, "page-700", "Active").await;
    let (start, end) = day_window();

    insert_test_ad(&pool, brand, "arc-1", Some("ts-1"), Some(at_hour(3))).await;
    insert_test_ad(&pool, brand, "arc-2", None, Some(at_hour(5))).await;
    insert_test_ad(&pool, brand, "arc-3", None, Some(at_hour(7))).await;
    // Outside the window and never indexed; invisible to both queries.
    insert_test_ad(
        &pool,
        brand,
        "arc-4",
        None,
        Some(Utc.with_ymd_and_hms(2026, 3, 12, 3, 0, 0).unwrap()),
    )
    .await;
    insert_test_ad(&pool, brand, "arc-5", None, None).await;

    let counts = index_counts_for_brand(&pool, brand, start, end)
        .await
        .expect("index_counts_for_brand failed");
    assert_eq!(counts.total, 3);
    assert_eq!(counts.indexed, 1);

    let pending = unindexed_archive_ids(&pool, brand, start, end)
        .await
        .expect("unindexed_archive_ids failed");
    assert_eq!(pending, vec!["arc-2".to_string(), "arc-3".to_string()]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn archive_ids_resolve_to_brand_ids(pool: sqlx::PgPool) {
    let a = insert_test_brand(&pool, "page-710", "Active").await;
    let b = insert_test_brand(&pool, "page-711", "Active").await;
    insert_test_ad(&pool, a, "arc-10", None, None).await;
    insert_test_ad(&pool, b, "arc-11", None, None).await;

    let mut resolved = ad_brand_resolution(
        &pool,
        &[
            "arc-10".to_string(),
            "arc-11".to_string(),
            "arc-99".to_string(),
        ],
    )
    .await
    .expect("ad_brand_resolution failed");
    resolved.sort();
    assert_eq!(
        resolved,
        vec![("arc-10".to_string(), a), ("arc-11".to_string(), b)]
    );
    assert!(ad_brand_resolution(&pool, &[]).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn media_counts_split_completed_by_run_day(pool: sqlx::PgPool) {
    let brand = insert_test_brand(&pool, "page-720", "Active").await;
    let (start, end) = day_window();

    let ad = insert_test_ad(&pool, brand, "arc-20", Some("ts-20"), Some(at_hour(2))).await;
    insert_media_item(&pool, ad, at_hour(3)).await;
    insert_media_item(&pool, ad, at_hour(20)).await;
    // Media outside the index window is not part of the stage at all.
    insert_media_item(&pool, ad, Utc.with_ymd_and_hms(2026, 3, 12, 1, 0, 0).unwrap()).await;

    // Run day covers only the morning; one of the two window items completed.
    let counts = media_counts_for_brand(&pool, brand, start, end, start, at_hour(12))
        .await
        .expect("media_counts_for_brand failed");
    assert_eq!(counts.total, 2);
    assert_eq!(counts.completed, 1);
}

// ---------------------------------------------------------------------------
// Section 5: Connectivity
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_check_succeeds_on_a_live_pool(pool: sqlx::PgPool) {
    adboard_db::ping(&pool).await.expect("ping failed");
    health_check(&pool).await.expect("health_check failed");
}
