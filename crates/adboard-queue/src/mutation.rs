//! Queue mutation engine: add, move, drain, clear, and corrupted-entry
//! cleanup over a family's pending priority set and failed list.
//!
//! None of these operations get a cross-key transaction from the backend.
//! Multi-member writes go through a single `redis::pipe()` round trip so the
//! network failure mode is all-or-nothing, and two-key moves are issued as
//! remove-then-insert with a documented crash window in between.

use std::collections::{HashMap, HashSet};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sqlx::PgPool;

use adboard_core::keys::queue_key;
use adboard_core::{Environment, QueueFamily, QueueRole};

use crate::entry::QueueEntry;
use crate::QueueError;

/// Default priority for single adds.
pub const DEFAULT_SCORE: f64 = 0.0;
/// Watchlist-origin bulk adds score above regular entries so they win under a
/// shared ordering.
pub const WATCHLIST_BULK_SCORE: f64 = 100.0;

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// All pending entries, highest priority first, with scores. Corrupted
/// members are skipped and logged, never fatal on this read path.
///
/// # Errors
///
/// Returns [`QueueError::Store`] if the backend read fails.
pub async fn list_pending(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
) -> Result<Vec<(QueueEntry, f64)>, QueueError> {
    let key = queue_key(env, family, QueueRole::Pending);
    let members: Vec<(String, f64)> = conn.zrevrange_withscores(&key, 0, -1).await?;

    let mut entries = Vec::with_capacity(members.len());
    for (raw, score) in members {
        match QueueEntry::parse(&raw) {
            Ok(entry) => entries.push((entry, score)),
            Err(e) => tracing::warn!(error = %e, %family, "skipping corrupted pending member"),
        }
    }
    Ok(entries)
}

/// All failed entries in list order. Corrupted members are skipped and logged.
///
/// # Errors
///
/// Returns [`QueueError::Store`] if the backend read fails.
pub async fn list_failed(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
) -> Result<Vec<QueueEntry>, QueueError> {
    let key = queue_key(env, family, QueueRole::Failed);
    let members: Vec<String> = conn.lrange(&key, 0, -1).await?;

    let mut entries = Vec::with_capacity(members.len());
    for raw in members {
        match QueueEntry::parse(&raw) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(error = %e, %family, "skipping corrupted failed member"),
        }
    }
    Ok(entries)
}

/// Page ids currently in the pending set. O(n) full-set scan of serialized
/// members; pending sets are bounded in the thousands, so this stays cheap
/// enough for the duplicate check on every insert.
async fn pending_page_ids(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
) -> Result<HashSet<String>, QueueError> {
    let entries = list_pending(conn, env, family).await?;
    Ok(entries.into_iter().map(|(e, _)| e.page_id).collect())
}

/// Page ids pending in either family. A page id may be pending in at most
/// one of the two families at a time, so every insert path checks this
/// union, not just the target family's set. Both families live on the same
/// backend instance per environment.
async fn pending_page_ids_any_family(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
) -> Result<HashSet<String>, QueueError> {
    let mut ids = pending_page_ids(conn, env, family).await?;
    ids.extend(pending_page_ids(conn, env, family.sibling()).await?);
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Single add
// ---------------------------------------------------------------------------

/// Inserts one brand into a family's pending set.
///
/// # Errors
///
/// - [`QueueError::BrandNotFound`] when no brand row matches `page_id`.
/// - [`QueueError::DuplicateEntry`] when the page id is already pending in
///   either family.
/// - [`QueueError::Store`] / [`QueueError::Db`] on backend failure.
pub async fn add_pending(
    conn: &mut ConnectionManager,
    pool: &PgPool,
    env: Environment,
    family: QueueFamily,
    page_id: &str,
    score: Option<f64>,
) -> Result<QueueEntry, QueueError> {
    let brand = adboard_db::get_brand_by_page_id(pool, page_id)
        .await?
        .ok_or_else(|| QueueError::BrandNotFound(page_id.to_string()))?;

    let existing = pending_page_ids_any_family(conn, env, family).await?;
    if existing.contains(page_id) {
        return Err(QueueError::DuplicateEntry(page_id.to_string()));
    }

    let entry = QueueEntry::new(brand.id, page_id);
    let key = queue_key(env, family, QueueRole::Pending);
    let _: () = conn
        .zadd(&key, entry.to_member(), score.unwrap_or(DEFAULT_SCORE))
        .await?;

    tracing::info!(brand_id = brand.id, page_id, %family, "queued brand");
    Ok(entry)
}

// ---------------------------------------------------------------------------
// Bulk add
// ---------------------------------------------------------------------------

/// One pre-parsed input row for a bulk add (CSV parsing happens upstream).
#[derive(Debug, Clone)]
pub struct BulkAddItem {
    pub page_id: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct BulkFailure {
    pub page_id: String,
    pub reason: String,
}

/// Outcome of classifying a bulk-add batch before the single batched write.
#[derive(Debug, Default)]
pub struct BulkClassification {
    pub success: Vec<(QueueEntry, f64)>,
    pub skipped: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

/// Splits a batch into insertable / duplicate / invalid rows against the
/// pre-fetched pending page ids (the union across both families) and known
/// page-id map. Pure so the classification rules are testable without a
/// backend.
#[must_use]
pub fn classify_bulk(
    items: &[BulkAddItem],
    existing_pending: &HashSet<String>,
    known_page_ids: &HashMap<String, i64>,
    default_score: f64,
) -> BulkClassification {
    let mut out = BulkClassification::default();
    let mut seen_in_batch: HashSet<&str> = HashSet::new();

    for item in items {
        let page_id = item.page_id.trim();
        if page_id.is_empty() {
            out.failed.push(BulkFailure {
                page_id: item.page_id.clone(),
                reason: "missing page_id".to_string(),
            });
            continue;
        }
        if existing_pending.contains(page_id) || !seen_in_batch.insert(page_id) {
            out.skipped.push(page_id.to_string());
            continue;
        }
        match known_page_ids.get(page_id) {
            Some(brand_id) => {
                let entry = QueueEntry::new(*brand_id, page_id);
                out.success
                    .push((entry, item.score.unwrap_or(default_score)));
            }
            None => out.failed.push(BulkFailure {
                page_id: page_id.to_string(),
                reason: "unknown page_id".to_string(),
            }),
        }
    }
    out
}

/// Bulk insert with two-pass classification: the pending set and the known
/// page ids are each fetched once up front, then every insert goes out in one
/// pipelined write. No reader observes a partial batch.
///
/// # Errors
///
/// Returns [`QueueError::Store`] / [`QueueError::Db`] if a backend call
/// fails; per-row problems land in the returned classification instead.
pub async fn add_bulk(
    conn: &mut ConnectionManager,
    pool: &PgPool,
    env: Environment,
    family: QueueFamily,
    items: &[BulkAddItem],
) -> Result<BulkClassification, QueueError> {
    let existing = pending_page_ids_any_family(conn, env, family).await?;

    let page_ids: Vec<String> = items.iter().map(|i| i.page_id.trim().to_string()).collect();
    let known: HashMap<String, i64> = adboard_db::page_id_map(pool, &page_ids)
        .await?
        .into_iter()
        .collect();

    let default_score = match family {
        QueueFamily::Watchlist => WATCHLIST_BULK_SCORE,
        QueueFamily::Regular => DEFAULT_SCORE,
    };
    let classified = classify_bulk(items, &existing, &known, default_score);

    if !classified.success.is_empty() {
        let key = queue_key(env, family, QueueRole::Pending);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (entry, score) in &classified.success {
            pipe.zadd(&key, entry.to_member(), *score).ignore();
        }
        pipe.query_async::<()>(conn).await?;
    }

    tracing::info!(
        queued = classified.success.len(),
        skipped = classified.skipped.len(),
        failed = classified.failed.len(),
        %family,
        "bulk queue add"
    );
    Ok(classified)
}

// ---------------------------------------------------------------------------
// Filter-driven bulk add
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct AddAllReport {
    pub queued: usize,
    pub skipped: usize,
}

/// Queues every brand matching a relational filter, skipping page ids already
/// pending in either family. Inserts go out in fixed-size pipelined chunks to
/// bound single-call payload size.
///
/// # Errors
///
/// Returns [`QueueError::Store`] / [`QueueError::Db`] on backend failure.
pub async fn add_all_matching(
    conn: &mut ConnectionManager,
    pool: &PgPool,
    env: Environment,
    family: QueueFamily,
    filter: adboard_db::BrandFilter,
    chunk_size: usize,
) -> Result<AddAllReport, QueueError> {
    let brands = adboard_db::list_brands_matching(pool, filter).await?;
    let existing = pending_page_ids_any_family(conn, env, family).await?;

    let score = match family {
        QueueFamily::Watchlist => WATCHLIST_BULK_SCORE,
        QueueFamily::Regular => DEFAULT_SCORE,
    };

    let mut report = AddAllReport::default();
    let key = queue_key(env, family, QueueRole::Pending);
    let to_insert: Vec<QueueEntry> = brands
        .iter()
        .filter(|b| {
            if existing.contains(&b.page_id) {
                report.skipped += 1;
                false
            } else {
                true
            }
        })
        .map(|b| QueueEntry::new(b.id, b.page_id.clone()))
        .collect();

    for chunk in to_insert.chunks(chunk_size.max(1)) {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for entry in chunk {
            pipe.zadd(&key, entry.to_member(), score).ignore();
        }
        pipe.query_async::<()>(conn).await?;
        report.queued += chunk.len();
    }

    tracing::info!(queued = report.queued, skipped = report.skipped, %family, ?filter, "filter-driven queue add");
    Ok(report)
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    PendingToFailed,
    FailedToPending,
}

impl MoveDirection {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending-to-failed" | "to-failed" => Some(MoveDirection::PendingToFailed),
            "failed-to-pending" | "to-pending" | "requeue" => Some(MoveDirection::FailedToPending),
            _ => None,
        }
    }
}

/// Moves one entry from the pending set to the failed list.
///
/// Remove-then-insert, two dependent calls: a crash between them loses the
/// entry from both collections. Accepted, not papered over.
///
/// # Errors
///
/// Returns [`QueueError::EntryNotFound`] when the page id is not pending,
/// [`QueueError::Store`] on backend failure.
pub async fn move_to_failed(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
    page_id: &str,
) -> Result<(), QueueError> {
    let pending_key = queue_key(env, family, QueueRole::Pending);
    let members: Vec<String> = conn.zrange(&pending_key, 0, -1).await?;
    let raw = find_member(&members, page_id)
        .ok_or_else(|| QueueError::EntryNotFound(page_id.to_string()))?;

    let removed: i64 = conn.zrem(&pending_key, &raw).await?;
    if removed == 0 {
        // Lost a race with a concurrent pop; treat the same as absent.
        return Err(QueueError::EntryNotFound(page_id.to_string()));
    }
    let failed_key = queue_key(env, family, QueueRole::Failed);
    let _: () = conn.rpush(&failed_key, &raw).await?;

    tracing::info!(page_id, %family, "moved entry pending -> failed");
    Ok(())
}

/// Moves one entry from the failed list back into the pending set.
///
/// # Errors
///
/// Returns [`QueueError::EntryNotFound`] when the page id is not in the
/// failed list, [`QueueError::Store`] on backend failure.
pub async fn move_to_pending(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
    page_id: &str,
    score: Option<f64>,
) -> Result<(), QueueError> {
    let failed_key = queue_key(env, family, QueueRole::Failed);
    let members: Vec<String> = conn.lrange(&failed_key, 0, -1).await?;
    let raw = find_member(&members, page_id)
        .ok_or_else(|| QueueError::EntryNotFound(page_id.to_string()))?;

    let removed: i64 = conn.lrem(&failed_key, 1, &raw).await?;
    if removed == 0 {
        return Err(QueueError::EntryNotFound(page_id.to_string()));
    }
    let pending_key = queue_key(env, family, QueueRole::Pending);
    let _: () = conn
        .zadd(&pending_key, &raw, score.unwrap_or(DEFAULT_SCORE))
        .await?;

    tracing::info!(page_id, %family, "moved entry failed -> pending");
    Ok(())
}

/// Drains the entire source collection into the destination ("retry all
/// failed" and its inverse). Returns the number of members moved.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn move_all(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
    direction: MoveDirection,
) -> Result<usize, QueueError> {
    match direction {
        MoveDirection::PendingToFailed => {
            let pending_key = queue_key(env, family, QueueRole::Pending);
            let members: Vec<String> = conn.zrange(&pending_key, 0, -1).await?;
            if members.is_empty() {
                return Ok(0);
            }
            let failed_key = queue_key(env, family, QueueRole::Failed);
            let mut pipe = redis::pipe();
            pipe.atomic();
            for raw in &members {
                pipe.rpush(&failed_key, raw).ignore();
            }
            pipe.del(&pending_key).ignore();
            pipe.query_async::<()>(conn).await?;
            Ok(members.len())
        }
        MoveDirection::FailedToPending => {
            let failed_key = queue_key(env, family, QueueRole::Failed);
            let members: Vec<String> = conn.lrange(&failed_key, 0, -1).await?;
            if members.is_empty() {
                return Ok(0);
            }
            let pending_key = queue_key(env, family, QueueRole::Pending);
            let mut pipe = redis::pipe();
            pipe.atomic();
            for raw in &members {
                pipe.zadd(&pending_key, raw, DEFAULT_SCORE).ignore();
            }
            pipe.del(&failed_key).ignore();
            pipe.query_async::<()>(conn).await?;
            Ok(members.len())
        }
    }
}

// ---------------------------------------------------------------------------
// Clear & cleanup
// ---------------------------------------------------------------------------

/// Empties the pending set or failed list entirely. Irreversible; the admin
/// gate lives at the routing boundary, not here. Returns the removed count.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn clear(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
    role: QueueRole,
) -> Result<i64, QueueError> {
    let key = queue_key(env, family, role);
    let count: i64 = match role {
        QueueRole::Pending => conn.zcard(&key).await?,
        QueueRole::Failed => conn.llen(&key).await?,
    };
    let _: () = conn.del(&key).await?;

    tracing::warn!(removed = count, %family, %role, "cleared queue collection");
    Ok(count)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupReport {
    pub valid: usize,
    pub corrupted: usize,
}

/// Scans the failed list and removes only the members that no longer parse
/// as the expected schema, reporting both counts for operator visibility.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn cleanup_corrupted(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
) -> Result<CleanupReport, QueueError> {
    let key = queue_key(env, family, QueueRole::Failed);
    let members: Vec<String> = conn.lrange(&key, 0, -1).await?;

    let mut report = CleanupReport::default();
    let mut corrupted_raw = Vec::new();
    for raw in &members {
        if QueueEntry::parse(raw).is_ok() {
            report.valid += 1;
        } else {
            report.corrupted += 1;
            corrupted_raw.push(raw);
        }
    }

    if !corrupted_raw.is_empty() {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for raw in corrupted_raw {
            pipe.lrem(&key, 0, raw).ignore();
        }
        pipe.query_async::<()>(conn).await?;
    }

    tracing::info!(
        valid = report.valid,
        corrupted = report.corrupted,
        %family,
        "failed-list cleanup"
    );
    Ok(report)
}

fn find_member(members: &[String], page_id: &str) -> Option<String> {
    members
        .iter()
        .find(|raw| {
            QueueEntry::parse(raw)
                .map(|e| e.page_id == page_id)
                .unwrap_or(false)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(page_id: &str) -> BulkAddItem {
        BulkAddItem {
            page_id: page_id.to_string(),
            score: None,
        }
    }

    #[test]
    fn classify_splits_success_skipped_failed() {
        let existing: HashSet<String> = HashSet::from(["dup".to_string()]);
        let known: HashMap<String, i64> =
            HashMap::from([("ok".to_string(), 1), ("dup".to_string(), 2)]);

        let out = classify_bulk(
            &[item("ok"), item("dup"), item("unknown")],
            &existing,
            &known,
            DEFAULT_SCORE,
        );

        assert_eq!(out.success.len(), 1);
        assert_eq!(out.success[0].0, QueueEntry::new(1, "ok"));
        assert_eq!(out.skipped, vec!["dup".to_string()]);
        assert_eq!(out.failed.len(), 1);
        assert_eq!(out.failed[0].page_id, "unknown");
    }

    #[test]
    fn classify_rejects_missing_page_id() {
        let out = classify_bulk(
            &[item("")],
            &HashSet::new(),
            &HashMap::new(),
            DEFAULT_SCORE,
        );
        assert_eq!(out.failed.len(), 1);
        assert_eq!(out.failed[0].reason, "missing page_id");
    }

    #[test]
    fn classify_skips_page_ids_pending_in_the_sibling_family() {
        // The caller unions both families' pending sets before classifying;
        // a page id pending on the watchlist side must not be queued again
        // on the regular side.
        let mut existing: HashSet<String> = HashSet::from(["reg-pending".to_string()]);
        existing.extend(["watch-pending".to_string()]);
        let known: HashMap<String, i64> = HashMap::from([
            ("fresh".to_string(), 1),
            ("reg-pending".to_string(), 2),
            ("watch-pending".to_string(), 3),
        ]);

        let out = classify_bulk(
            &[item("fresh"), item("reg-pending"), item("watch-pending")],
            &existing,
            &known,
            DEFAULT_SCORE,
        );

        assert_eq!(out.success.len(), 1);
        assert_eq!(out.success[0].0, QueueEntry::new(1, "fresh"));
        assert_eq!(
            out.skipped,
            vec!["reg-pending".to_string(), "watch-pending".to_string()]
        );
        assert!(out.failed.is_empty());
    }

    #[test]
    fn classify_dedupes_within_the_batch() {
        let known: HashMap<String, i64> = HashMap::from([("a".to_string(), 1)]);
        let out = classify_bulk(
            &[item("a"), item("a")],
            &HashSet::new(),
            &known,
            DEFAULT_SCORE,
        );
        assert_eq!(out.success.len(), 1);
        assert_eq!(out.skipped, vec!["a".to_string()]);
    }

    #[test]
    fn classify_applies_the_default_score() {
        let known: HashMap<String, i64> = HashMap::from([("a".to_string(), 1)]);
        let out = classify_bulk(
            &[item("a")],
            &HashSet::new(),
            &known,
            WATCHLIST_BULK_SCORE,
        );
        assert!((out.success[0].1 - WATCHLIST_BULK_SCORE).abs() < f64::EPSILON);
    }

    #[test]
    fn find_member_matches_on_parsed_page_id() {
        let members = vec![
            QueueEntry::new(1, "alpha").to_member(),
            "garbage".to_string(),
            QueueEntry::new(2, "beta").to_member(),
        ];
        assert_eq!(
            find_member(&members, "beta"),
            Some(QueueEntry::new(2, "beta").to_member())
        );
        assert_eq!(find_member(&members, "gamma"), None);
    }

    #[test]
    fn move_direction_parses_operator_spellings() {
        assert_eq!(
            MoveDirection::parse("requeue"),
            Some(MoveDirection::FailedToPending)
        );
        assert_eq!(
            MoveDirection::parse("pending-to-failed"),
            Some(MoveDirection::PendingToFailed)
        );
        assert_eq!(MoveDirection::parse("sideways"), None);
    }
}
