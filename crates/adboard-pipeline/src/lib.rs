//! Job-queue reconciliation and pipeline status aggregation.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use thiserror::Error;

use adboard_core::{Environment, QueueFamily};

pub mod aggregate;
pub mod brand_cache;
pub mod counters;
pub mod processing;
pub mod reconciler;
pub mod status;

pub use aggregate::{
    day_window, get_all_brands_pipeline_status, get_brand_pipeline_status, BrandPipelineStatus,
    PipelinePage, StatusListQuery,
};
pub use brand_cache::{BrandMeta, BrandMetaCache};
pub use counters::JobCountersCache;
pub use processing::{list_currently_processing, ProcessingView};
pub use reconciler::{JobIndex, JobIndexRegistry, JobIndexSnapshot, JobRecord};
pub use status::{StageReport, StageStatus};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("brand {0} not found")]
    BrandNotFound(i64),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] adboard_db::DbError),
    #[error(transparent)]
    Queue(#[from] adboard_queue::QueueError),
}

/// Per-environment handles the reconciler and aggregator operate over. Built
/// by the environment registry; cheap to clone (pools and connection
/// managers are handles).
#[derive(Clone)]
pub struct PipelineContext {
    pub env: Environment,
    pub pool: PgPool,
    pub global: ConnectionManager,
    pub regular: ConnectionManager,
    pub watchlist: ConnectionManager,
    pub jobs: Arc<JobIndexRegistry>,
    pub brands: Arc<BrandMetaCache>,
    pub counters: Arc<JobCountersCache>,
    pub status_fanout_limit: usize,
}

impl PipelineContext {
    /// Queue-backend connection for a family.
    #[must_use]
    pub fn queue_conn(&self, family: QueueFamily) -> ConnectionManager {
        match family {
            QueueFamily::Regular => self.regular.clone(),
            QueueFamily::Watchlist => self.watchlist.clone(),
        }
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("env", &self.env)
            .field("status_fanout_limit", &self.status_fanout_limit)
            .finish()
    }
}

/// Default bound on concurrent per-brand computations in the bulk path.
pub const DEFAULT_FANOUT_LIMIT: usize = 8;

/// Default staleness threshold for the in-memory job index.
pub const DEFAULT_INDEX_STALENESS: Duration = Duration::from_secs(30);

/// Default TTL for the pre-computed job counters.
pub const DEFAULT_COUNTERS_TTL: Duration = Duration::from_secs(10);

/// Default refresh interval for the brand metadata cache.
pub const DEFAULT_BRAND_CACHE_TTL: Duration = Duration::from_secs(60);
