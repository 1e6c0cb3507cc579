//! TTL cache with payload fingerprints.
//!
//! Backed by Redis, with an in-process fallback map used only while the
//! remote is unreachable. Fallback entries are not cross-process consistent;
//! they exist to degrade gracefully, not as a durability layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::QueueError;

/// Deterministic content fingerprint of a serialized payload, used as an
/// ETag: identical payloads always hash identically, any field change
/// changes the hash.
#[must_use]
pub fn fingerprint<T: Serialize>(payload: &T) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    format!("{:x}", Sha256::digest(bytes))
}

struct FallbackEntry {
    value: String,
    expires_at: Instant,
}

type Clearer = Box<dyn Fn() + Send + Sync>;

/// Remote cache handle plus the in-process fallback and the registry of
/// clear callbacks other components hook into so a global invalidation
/// reaches their private caches too.
#[derive(Clone)]
pub struct CacheLayer {
    conn: ConnectionManager,
    fallback: Arc<Mutex<HashMap<String, FallbackEntry>>>,
    clearers: Arc<Mutex<Vec<Clearer>>>,
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl CacheLayer {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            fallback: Arc::new(Mutex::new(HashMap::new())),
            clearers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fetches and deserializes a cached payload. Remote failures fall back
    /// to the in-process map rather than erroring.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, key, "dropping undecodable cache entry");
                None
            }
        }
    }

    /// Serializes and stores a payload with a TTL in both the remote store
    /// and the fallback map.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(raw) = serde_json::to_string(value) else {
            tracing::warn!(key, "cache value failed to serialize; not cached");
            return;
        };
        self.set_raw(key, raw, ttl).await;
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, key, "cache backend unreachable; using in-process fallback");
                self.fallback_get(key)
            }
        }
    }

    async fn set_raw(&self, key: &str, raw: String, ttl: Duration) {
        self.fallback_set(key, raw.clone(), ttl);
        let mut conn = self.conn.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, raw, ttl.as_secs().max(1))
            .await
        {
            tracing::warn!(error = %e, key, "cache backend unreachable; value kept in-process only");
        }
    }

    fn fallback_get(&self, key: &str) -> Option<String> {
        let mut map = self.fallback.lock().ok()?;
        match map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    fn fallback_set(&self, key: &str, value: String, ttl: Duration) {
        if let Ok(mut map) = self.fallback.lock() {
            map.insert(
                key.to_string(),
                FallbackEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    /// Registers an in-process clear callback fired on every
    /// [`CacheLayer::invalidate`].
    pub fn register_clearer(&self, clearer: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut clearers) = self.clearers.lock() {
            clearers.push(Box::new(clearer));
        }
    }

    /// Best-effort pattern-based bulk delete against the remote store, plus
    /// a prefix purge of the fallback map and a fan-out to registered
    /// clearers. Returns the number of remote keys deleted.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Store`] only when the remote scan itself fails;
    /// in-process clears always run.
    pub async fn invalidate(&self, pattern: &str) -> Result<usize, QueueError> {
        self.clear_fallback_matching(pattern);
        if let Ok(clearers) = self.clearers.lock() {
            for clearer in clearers.iter() {
                clearer();
            }
        }

        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = keys.len();
        let _: () = conn.del(keys).await?;
        tracing::debug!(pattern, deleted, "invalidated cache keys");
        Ok(deleted)
    }

    fn clear_fallback_matching(&self, pattern: &str) {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        if let Ok(mut map) = self.fallback.lock() {
            map.retain(|key, _| !key.starts_with(prefix));
        }
    }
}
