//! Per-proxy scrape statistics kept in the global backend.

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;

use adboard_core::keys::{ip_stats_key, ip_stats_pattern};
use adboard_core::Environment;

use crate::QueueError;

#[derive(Debug, Clone, Serialize)]
pub struct IpStats {
    pub proxy: String,
    pub success: i64,
    pub failure: i64,
}

/// Bumps the success or failure counter for one proxy.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn bump_proxy(
    conn: &mut ConnectionManager,
    env: Environment,
    proxy: &str,
    success: bool,
) -> Result<(), QueueError> {
    let key = ip_stats_key(env, proxy);
    let field = if success { "success" } else { "failure" };
    let _: i64 = conn.hincr(&key, field, 1).await?;
    Ok(())
}

/// All per-proxy counters in an environment.
///
/// # Errors
///
/// Returns [`QueueError::Store`] on backend failure.
pub async fn list_ip_stats(
    conn: &mut ConnectionManager,
    env: Environment,
) -> Result<Vec<IpStats>, QueueError> {
    let pattern = ip_stats_pattern(env);
    let keys: Vec<String> = conn.keys(&pattern).await?;

    let prefix = pattern.strip_suffix('*').unwrap_or("");
    let mut stats = Vec::with_capacity(keys.len());
    for key in keys {
        let fields: HashMap<String, i64> = conn.hgetall(&key).await?;
        let proxy = key.strip_prefix(prefix).unwrap_or(&key).to_string();
        stats.push(IpStats {
            proxy,
            success: fields.get("success").copied().unwrap_or(0),
            failure: fields.get("failure").copied().unwrap_or(0),
        });
    }
    stats.sort_by(|a, b| a.proxy.cmp(&b.proxy));
    Ok(stats)
}
