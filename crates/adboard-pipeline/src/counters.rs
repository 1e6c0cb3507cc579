//! Short-TTL cache over the pipelined sub-collection size reads, so dashboard
//! polling does not hit the backend on every request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;

use adboard_core::{Environment, JobKind, QueueFamily};
use adboard_queue::{job_counts, JobCounts};

use crate::{PipelineError, DEFAULT_COUNTERS_TTL};

struct CachedCounts {
    counts: JobCounts,
    fetched_at: Instant,
}

/// Per-environment counter cache, keyed by (family, kind).
pub struct JobCountersCache {
    entries: Mutex<HashMap<(QueueFamily, JobKind), CachedCounts>>,
    ttl: Duration,
}

impl std::fmt::Debug for JobCountersCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCountersCache")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for JobCountersCache {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTERS_TTL)
    }
}

impl JobCountersCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn cached(&self, family: QueueFamily, kind: JobKind) -> Option<JobCounts> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .get(&(family, kind))
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.counts)
    }

    fn store(&self, family: QueueFamily, kind: JobKind, counts: JobCounts) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(
            (family, kind),
            CachedCounts {
                counts,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Counters for a (family, kind), served from cache while within TTL.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Queue`] if the cache is cold or expired and
    /// the backend read fails.
    pub async fn get(
        &self,
        conn: &mut ConnectionManager,
        env: Environment,
        family: QueueFamily,
        kind: JobKind,
    ) -> Result<JobCounts, PipelineError> {
        if let Some(counts) = self.cached(family, kind) {
            return Ok(counts);
        }
        let counts = job_counts(conn, env, family, kind).await?;
        self.store(family, kind, counts);
        Ok(counts)
    }

    /// Scheduler hook: refresh one slot unconditionally so interactive reads
    /// stay on the cached path.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Queue`] if the backend read fails.
    pub async fn refresh(
        &self,
        conn: &mut ConnectionManager,
        env: Environment,
        family: QueueFamily,
        kind: JobKind,
    ) -> Result<JobCounts, PipelineError> {
        let counts = job_counts(conn, env, family, kind).await?;
        self.store(family, kind, counts);
        Ok(counts)
    }
}
