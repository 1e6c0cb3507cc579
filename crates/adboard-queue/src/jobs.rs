//! Raw readers over the job-queue backend's sub-collections.
//!
//! Per (family, kind) the backend keeps six sub-collections: `wait`/`waiting`
//! (two legacy names for the same logical state), `active` as lists, and
//! `prioritized`, `delayed`, `completed`, `failed` as sorted sets, plus one
//! payload hash per job id. This module only reads; reconciliation into a
//! single per-job status lives in the pipeline crate.

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;

use adboard_core::keys::{job_payload_key, job_state_key};
use adboard_core::{Environment, JobKind, JobState, QueueFamily};

use crate::QueueError;

/// Sub-collection sizes for the cheap counter endpoints; computed without
/// materializing any job list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub prioritized: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

/// Raw payload hash for one job id.
#[derive(Debug, Clone, Default)]
pub struct RawJobPayload {
    pub data: Option<String>,
    pub timestamp: Option<i64>,
}

fn is_list_backed(segment: &str) -> bool {
    matches!(segment, "wait" | "waiting" | "active")
}

/// Job ids in one sub-collection, unioning the legacy key names where the
/// state has more than one.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn job_state_ids(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
    kind: JobKind,
    state: JobState,
) -> Result<Vec<String>, QueueError> {
    let mut ids = Vec::new();
    for segment in state.key_segments() {
        let key = job_state_key(env, family, kind, segment);
        let mut members: Vec<String> = if is_list_backed(segment) {
            conn.lrange(&key, 0, -1).await?
        } else {
            conn.zrange(&key, 0, -1).await?
        };
        ids.append(&mut members);
    }
    Ok(ids)
}

/// Membership lists for every sub-collection of a (family, kind), in one
/// pass. Input to [`merge_states`].
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn read_all_memberships(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
    kind: JobKind,
) -> Result<Vec<(JobState, Vec<String>)>, QueueError> {
    let mut memberships = Vec::with_capacity(JobState::ALL.len());
    for state in JobState::ALL {
        let ids = job_state_ids(conn, env, family, kind, state).await?;
        memberships.push((state, ids));
    }
    Ok(memberships)
}

/// Assigns each job id exactly one state. A job id should live in one
/// sub-collection; overlap is a backend anomaly resolved by the fixed
/// precedence rule (never last-writer-wins).
#[must_use]
pub fn merge_states(memberships: &[(JobState, Vec<String>)]) -> HashMap<String, JobState> {
    let mut merged: HashMap<String, JobState> = HashMap::new();
    for (state, ids) in memberships {
        for id in ids {
            merged
                .entry(id.clone())
                .and_modify(|current| {
                    if state.precedence() > current.precedence() {
                        *current = *state;
                    }
                })
                .or_insert(*state);
        }
    }
    merged
}

/// Sub-collection sizes in a single pipelined round trip.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn job_counts(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
    kind: JobKind,
) -> Result<JobCounts, QueueError> {
    let mut pipe = redis::pipe();
    pipe.llen(job_state_key(env, family, kind, "wait"));
    pipe.llen(job_state_key(env, family, kind, "waiting"));
    pipe.llen(job_state_key(env, family, kind, "active"));
    pipe.zcard(job_state_key(env, family, kind, "prioritized"));
    pipe.zcard(job_state_key(env, family, kind, "delayed"));
    pipe.zcard(job_state_key(env, family, kind, "completed"));
    pipe.zcard(job_state_key(env, family, kind, "failed"));
    let sizes: Vec<u64> = pipe.query_async(conn).await?;

    let mut counts = JobCounts {
        waiting: sizes.first().copied().unwrap_or(0) + sizes.get(1).copied().unwrap_or(0),
        active: sizes.get(2).copied().unwrap_or(0),
        prioritized: sizes.get(3).copied().unwrap_or(0),
        delayed: sizes.get(4).copied().unwrap_or(0),
        completed: sizes.get(5).copied().unwrap_or(0),
        failed: sizes.get(6).copied().unwrap_or(0),
        total: 0,
    };
    counts.total = counts.waiting
        + counts.active
        + counts.prioritized
        + counts.delayed
        + counts.completed
        + counts.failed;
    Ok(counts)
}

/// Fetches one job's payload hash, or `None` when the backend has already
/// dropped it.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn job_payload(
    conn: &mut ConnectionManager,
    env: Environment,
    family: QueueFamily,
    kind: JobKind,
    job_id: &str,
) -> Result<Option<RawJobPayload>, QueueError> {
    let key = job_payload_key(env, family, kind, job_id);
    let fields: HashMap<String, String> = conn.hgetall(&key).await?;
    if fields.is_empty() {
        return Ok(None);
    }
    Ok(Some(RawJobPayload {
        data: fields.get("data").cloned(),
        timestamp: fields
            .get("timestamp")
            .and_then(|raw| raw.parse::<i64>().ok()),
    }))
}
