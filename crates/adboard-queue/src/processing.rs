//! Currently-processing tracker: the bounded list of in-flight scrape
//! records the scraper fleet pushes, and the sweeps that keep it honest.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use adboard_core::keys::currently_processing_key;
use adboard_core::Environment;

use crate::QueueError;

/// One in-flight scrape record, in the scraper's wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingEntry {
    #[serde(default)]
    pub brand_id: Option<i64>,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub total_ads: Option<i64>,
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Terminal statuses the 30-second sweep evicts, case-insensitive.
#[must_use]
pub fn is_terminal_status(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_lowercase().as_str(),
        "completed" | "complete" | "failed" | "error"
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub removed: usize,
    pub kept: usize,
}

/// Appends an entry; normally only the scraper calls this.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn record_processing(
    conn: &mut ConnectionManager,
    env: Environment,
    entry: &ProcessingEntry,
) -> Result<(), QueueError> {
    let raw = serde_json::to_string(entry)
        .map_err(|e| QueueError::Parse(format!("processing entry: {e}")))?;
    let key = currently_processing_key(env);
    let _: () = conn.rpush(&key, raw).await?;
    Ok(())
}

/// All parseable entries in list order. Corrupted members are skipped and
/// logged — a half-broken list still renders a dashboard.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn list_processing_entries(
    conn: &mut ConnectionManager,
    env: Environment,
) -> Result<Vec<ProcessingEntry>, QueueError> {
    let key = currently_processing_key(env);
    let members: Vec<String> = conn.lrange(&key, 0, -1).await?;

    let mut entries = Vec::with_capacity(members.len());
    for raw in members {
        match serde_json::from_str::<ProcessingEntry>(&raw) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping corrupted currently-processing member");
            }
        }
    }
    Ok(entries)
}

/// Evicts entries whose status has resolved to a terminal value. Runs every
/// 30 seconds from the cleanup scheduler.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn sweep_terminal(
    conn: &mut ConnectionManager,
    env: Environment,
) -> Result<SweepReport, QueueError> {
    sweep_with(conn, env, |entry| !is_terminal_status(&entry.status)).await
}

/// Forcibly evicts entries still in a non-terminal status. Runs every 4
/// hours so crashed scrapers that never reported a terminal state cannot pin
/// entries forever.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn sweep_stale(
    conn: &mut ConnectionManager,
    env: Environment,
) -> Result<SweepReport, QueueError> {
    sweep_with(conn, env, |entry| is_terminal_status(&entry.status)).await
}

/// Read-filter-delete-repush over the whole list. A scraper push landing
/// between the read and the rewrite is lost; that small window is a known
/// trade for keeping the sweep a single pipelined write.
async fn sweep_with<F>(
    conn: &mut ConnectionManager,
    env: Environment,
    keep: F,
) -> Result<SweepReport, QueueError>
where
    F: Fn(&ProcessingEntry) -> bool,
{
    let key = currently_processing_key(env);
    let members: Vec<String> = conn.lrange(&key, 0, -1).await?;
    if members.is_empty() {
        return Ok(SweepReport::default());
    }

    let mut survivors = Vec::new();
    let mut removed = 0usize;
    for raw in &members {
        match serde_json::from_str::<ProcessingEntry>(raw) {
            Ok(entry) if keep(&entry) => survivors.push(raw.clone()),
            Ok(_) => removed += 1,
            Err(e) => {
                tracing::warn!(error = %e, "dropping corrupted currently-processing member");
                removed += 1;
            }
        }
    }

    let mut pipe = redis::pipe();
    pipe.atomic();
    pipe.del(&key).ignore();
    for raw in &survivors {
        pipe.rpush(&key, raw).ignore();
    }
    pipe.query_async::<()>(conn).await?;

    let report = SweepReport {
        removed,
        kept: survivors.len(),
    };
    tracing::debug!(removed = report.removed, kept = report.kept, "swept currently-processing list");
    Ok(report)
}
