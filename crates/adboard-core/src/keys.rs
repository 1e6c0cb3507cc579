//! Typed Redis key construction.
//!
//! Every backing-store key the system touches is built here, so the key
//! format lives in one place instead of drifting across call sites. All keys
//! embed the environment, which keeps stage and production isolated even when
//! both point at the same Redis instance.

use crate::environment::Environment;
use crate::queues::{JobKind, QueueFamily, QueueRole};

const PREFIX: &str = "adboard";

/// Pending priority set or failed list for a queue family.
#[must_use]
pub fn queue_key(env: Environment, family: QueueFamily, role: QueueRole) -> String {
    format!("{PREFIX}:{env}:{family}:{role}", env = env.as_str())
}

/// Bounded list of in-flight scrape records, one per active brand run.
#[must_use]
pub fn currently_processing_key(env: Environment) -> String {
    format!("{PREFIX}:{env}:currently-processing")
}

/// One of a job kind's sub-collections, by raw backend segment name
/// (see [`crate::queues::JobState::key_segments`]).
#[must_use]
pub fn job_state_key(
    env: Environment,
    family: QueueFamily,
    kind: JobKind,
    segment: &str,
) -> String {
    format!("{PREFIX}:{env}:{family}:job:{kind}:{segment}")
}

/// Per-job payload hash.
#[must_use]
pub fn job_payload_key(
    env: Environment,
    family: QueueFamily,
    kind: JobKind,
    job_id: &str,
) -> String {
    format!("{PREFIX}:{env}:{family}:job:{kind}:{job_id}")
}

/// Per-proxy scrape statistics hash.
#[must_use]
pub fn ip_stats_key(env: Environment, proxy: &str) -> String {
    format!("{PREFIX}:{env}:ip-stats:{proxy}")
}

/// Pattern matching every per-proxy stats hash in an environment.
#[must_use]
pub fn ip_stats_pattern(env: Environment) -> String {
    format!("{PREFIX}:{env}:ip-stats:*")
}

/// Cache key for a memoized payload. `parts` must carry every parameter that
/// shapes the payload (page, limit, sort, search, date, ...) so logically
/// different results can never collide under one key.
#[must_use]
pub fn cache_key(env: Environment, namespace: &str, parts: &[&str]) -> String {
    let mut key = format!("{PREFIX}:{env}:cache:{namespace}");
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}

/// Pattern matching a whole cache namespace in an environment.
#[must_use]
pub fn cache_pattern(env: Environment, namespace: &str) -> String {
    format!("{PREFIX}:{env}:cache:{namespace}:*")
}

/// Cache namespaces cleared wholesale on environment switch.
pub const CACHE_NAMESPACES: [&str; 5] = [
    "pipeline",
    "queue",
    "ip-stats",
    "job-index",
    "brand-lookup",
];
