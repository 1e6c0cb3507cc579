//! Redis layer: queue entry codec, queue mutation engine, currently-processing
//! tracker, job-queue sub-collection readers, and the TTL cache.

use redis::aio::ConnectionManager;
use thiserror::Error;

pub mod cache;
pub mod entry;
pub mod ip_stats;
pub mod jobs;
pub mod mutation;
pub mod processing;

pub use cache::{fingerprint, CacheLayer};
pub use entry::QueueEntry;
pub use ip_stats::{bump_proxy, list_ip_stats, IpStats};
pub use jobs::{
    job_counts, job_payload, job_state_ids, merge_states, read_all_memberships, JobCounts,
    RawJobPayload,
};
pub use mutation::{
    add_all_matching, add_bulk, add_pending, classify_bulk, cleanup_corrupted, clear,
    list_failed, list_pending, move_all, move_to_failed, move_to_pending, AddAllReport,
    BulkAddItem, BulkClassification, BulkFailure, CleanupReport, MoveDirection, DEFAULT_SCORE,
    WATCHLIST_BULK_SCORE,
};
pub use processing::{
    is_terminal_status, list_processing_entries, record_processing, sweep_stale, sweep_terminal,
    ProcessingEntry, SweepReport,
};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no brand found for page_id {0}")]
    BrandNotFound(String),
    #[error("page_id {0} is already pending in this queue")]
    DuplicateEntry(String),
    #[error("no queue entry found for page_id {0}")]
    EntryNotFound(String),
    #[error("malformed queue entry: {0}")]
    Parse(String),
    #[error(transparent)]
    Store(#[from] redis::RedisError),
    #[error(transparent)]
    Db(#[from] adboard_db::DbError),
}

/// Open a managed connection to a Redis backend. The manager reconnects
/// transparently; clones share the underlying multiplexed connection.
///
/// # Errors
///
/// Returns [`QueueError::Store`] if the client cannot be created or the
/// initial connection fails.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, QueueError> {
    let client = redis::Client::open(redis_url)?;
    let conn = ConnectionManager::new(client).await?;
    Ok(conn)
}
