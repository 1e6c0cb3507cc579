//! In-memory job index: merges the backend's sub-collection memberships into
//! unified per-job records, refreshed behind a staleness threshold.
//!
//! Readers always get a fully built snapshot: refresh constructs the new
//! index off to the side and publishes it with a single `Arc` swap. The
//! refresh path is single-flight — concurrent cold-start callers wait on the
//! first refresh instead of each re-scanning the backend.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use sqlx::PgPool;

use adboard_core::{Environment, JobKind, JobState, QueueFamily};
use adboard_queue::{job_payload, merge_states, read_all_memberships};

use crate::{PipelineError, DEFAULT_INDEX_STALENESS};

/// One reconciled job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub state: JobState,
    pub payload: Option<serde_json::Value>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Resolved from the payload's brand reference or its ad archive ids.
    pub brand_id: Option<i64>,
}

/// Immutable snapshot readers hold while a refresh may be running.
#[derive(Debug, Default)]
pub struct JobIndexSnapshot {
    pub jobs: Vec<JobRecord>,
    pub last_updated: Option<Instant>,
    pub known_ids: HashSet<String>,
    states: HashMap<String, JobState>,
}

impl JobIndexSnapshot {
    #[must_use]
    pub fn state_of(&self, job_id: &str) -> Option<JobState> {
        self.states.get(job_id).copied()
    }

    /// Whether the snapshot holds an active job resolved to this brand.
    #[must_use]
    pub fn has_active_job_for_brand(&self, brand_id: i64) -> bool {
        self.jobs
            .iter()
            .any(|job| job.state == JobState::Active && job.brand_id == Some(brand_id))
    }

    fn is_fresh(&self, staleness: Duration) -> bool {
        self.last_updated
            .map(|at| at.elapsed() < staleness)
            .unwrap_or(false)
    }
}

/// Index for one (environment, family, kind).
pub struct JobIndex {
    snapshot: RwLock<Arc<JobIndexSnapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
    staleness: Duration,
}

impl std::fmt::Debug for JobIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobIndex")
            .field("staleness", &self.staleness)
            .finish()
    }
}

impl JobIndex {
    #[must_use]
    pub fn new(staleness: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(JobIndexSnapshot::default())),
            refresh_lock: tokio::sync::Mutex::new(()),
            staleness,
        }
    }

    /// Current snapshot, fresh or not. Callers that can tolerate staleness
    /// (a refresh already in flight) read this directly.
    #[must_use]
    pub fn current(&self) -> Arc<JobIndexSnapshot> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    /// Returns a fresh snapshot, refreshing from the backend if the current
    /// one is older than the staleness threshold. Single-flight: the first
    /// caller pays the refresh, concurrent callers wait and reuse it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Queue`] / [`PipelineError::Db`] if the
    /// backend scan fails; the previous snapshot stays published.
    pub async fn ensure_fresh(
        &self,
        conn: &mut ConnectionManager,
        pool: &PgPool,
        env: Environment,
        family: QueueFamily,
        kind: JobKind,
    ) -> Result<Arc<JobIndexSnapshot>, PipelineError> {
        let current = self.current();
        if current.is_fresh(self.staleness) {
            return Ok(current);
        }

        let _guard = self.refresh_lock.lock().await;
        // Re-check after acquiring: a concurrent caller may have refreshed
        // while this one waited on the lock.
        let current = self.current();
        if current.is_fresh(self.staleness) {
            return Ok(current);
        }
        self.refresh(conn, pool, env, family, kind).await
    }

    /// Unconditional refresh; also the manual/forced path for cold starts.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Queue`] / [`PipelineError::Db`] if the
    /// backend scan fails.
    pub async fn refresh(
        &self,
        conn: &mut ConnectionManager,
        pool: &PgPool,
        env: Environment,
        family: QueueFamily,
        kind: JobKind,
    ) -> Result<Arc<JobIndexSnapshot>, PipelineError> {
        let memberships = read_all_memberships(conn, env, family, kind).await?;
        let states = merge_states(&memberships);

        let mut jobs = Vec::with_capacity(states.len());
        for (job_id, state) in &states {
            let raw = job_payload(conn, env, family, kind, job_id).await?;
            let (payload, timestamp) = match raw {
                Some(raw) => (
                    raw.data.as_deref().and_then(|data| {
                        match serde_json::from_str::<serde_json::Value>(data) {
                            Ok(value) => Some(value),
                            Err(e) => {
                                tracing::warn!(error = %e, job_id, "skipping unparseable job payload");
                                None
                            }
                        }
                    }),
                    raw.timestamp.and_then(DateTime::<Utc>::from_timestamp_millis),
                ),
                None => (None, None),
            };
            jobs.push(JobRecord {
                job_id: job_id.clone(),
                state: *state,
                payload,
                timestamp,
                brand_id: None,
            });
        }

        resolve_brand_ids(pool, &mut jobs).await?;

        // Newest first; jobs without a timestamp sort last.
        jobs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let snapshot = Arc::new(JobIndexSnapshot {
            known_ids: states.keys().cloned().collect(),
            states,
            jobs,
            last_updated: Some(Instant::now()),
        });
        if let Ok(mut guard) = self.snapshot.write() {
            *guard = Arc::clone(&snapshot);
        }
        tracing::debug!(%family, %kind, jobs = snapshot.jobs.len(), "refreshed job index");
        Ok(snapshot)
    }
}

/// Fills in `brand_id` for each record: straight from the payload when it
/// carries a brand reference, otherwise via one batched ad-archive-id lookup.
async fn resolve_brand_ids(pool: &PgPool, jobs: &mut [JobRecord]) -> Result<(), PipelineError> {
    let mut unresolved_archive_ids = Vec::new();
    for job in jobs.iter_mut() {
        let Some(payload) = &job.payload else {
            continue;
        };
        if let Some(brand_id) = payload_brand_id(payload) {
            job.brand_id = Some(brand_id);
        } else if let Some(archive_id) = payload_first_archive_id(payload) {
            unresolved_archive_ids.push(archive_id);
        }
    }

    if unresolved_archive_ids.is_empty() {
        return Ok(());
    }
    let resolution: HashMap<String, i64> =
        adboard_db::ad_brand_resolution(pool, &unresolved_archive_ids)
            .await?
            .into_iter()
            .collect();

    for job in jobs.iter_mut() {
        if job.brand_id.is_some() {
            continue;
        }
        if let Some(archive_id) = job.payload.as_ref().and_then(payload_first_archive_id) {
            job.brand_id = resolution.get(&archive_id).copied();
        }
    }
    Ok(())
}

fn payload_brand_id(payload: &serde_json::Value) -> Option<i64> {
    let value = payload.get("brandId")?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse::<i64>().ok()))
}

fn payload_first_archive_id(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("adArchiveIds")
        .or_else(|| payload.get("adIds"))?
        .as_array()?
        .first()?
        .as_str()
        .map(ToOwned::to_owned)
}

/// Lazily built indexes for one environment, keyed by (family, kind). The
/// registry is rebuilt wholesale when the environment's stores rebind, which
/// doubles as its cache clear.
pub struct JobIndexRegistry {
    indexes: Mutex<HashMap<(QueueFamily, JobKind), Arc<JobIndex>>>,
    staleness: Duration,
}

impl std::fmt::Debug for JobIndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobIndexRegistry")
            .field("staleness", &self.staleness)
            .finish()
    }
}

impl Default for JobIndexRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_STALENESS)
    }
}

impl JobIndexRegistry {
    #[must_use]
    pub fn new(staleness: Duration) -> Self {
        Self {
            indexes: Mutex::new(HashMap::new()),
            staleness,
        }
    }

    #[must_use]
    pub fn get(&self, family: QueueFamily, kind: JobKind) -> Arc<JobIndex> {
        let mut indexes = match self.indexes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            indexes
                .entry((family, kind))
                .or_insert_with(|| Arc::new(JobIndex::new(self.staleness))),
        )
    }
}
