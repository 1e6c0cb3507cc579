//! Brand metadata cache: an `Arc`-swapped map of id to lightweight brand
//! info, refreshed on a timer because brand rows change far less often than
//! queue state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use sqlx::PgPool;

use adboard_db::list_watchlisted;

use crate::{PipelineError, DEFAULT_BRAND_CACHE_TTL};

/// The slice of a brand row the processing and job views need.
#[derive(Debug, Clone)]
pub struct BrandMeta {
    pub id: i64,
    pub page_id: String,
    pub name: String,
    pub category: Option<String>,
    pub watchlisted: bool,
}

#[derive(Default)]
struct CacheState {
    brands: Arc<HashMap<i64, BrandMeta>>,
    last_refresh: Option<Instant>,
}

pub struct BrandMetaCache {
    state: RwLock<CacheState>,
    refresh_lock: tokio::sync::Mutex<()>,
    ttl: Duration,
}

impl std::fmt::Debug for BrandMetaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrandMetaCache")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for BrandMetaCache {
    fn default() -> Self {
        Self::new(DEFAULT_BRAND_CACHE_TTL)
    }
}

impl BrandMetaCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            ttl,
        }
    }

    /// Current map, possibly stale or empty before the first refresh.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<i64, BrandMeta>> {
        self.state
            .read()
            .map(|state| Arc::clone(&state.brands))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, brand_id: i64) -> Option<BrandMeta> {
        self.snapshot().get(&brand_id).cloned()
    }

    fn is_fresh(&self) -> bool {
        self.state
            .read()
            .ok()
            .and_then(|state| state.last_refresh)
            .map(|at| at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    /// Refreshes from the database if the cache is cold or expired, then
    /// returns the current map. Single-flight like the job index.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] if the refresh queries fail; the old
    /// map stays published.
    pub async fn ensure_fresh(
        &self,
        pool: &PgPool,
    ) -> Result<Arc<HashMap<i64, BrandMeta>>, PipelineError> {
        if self.is_fresh() {
            return Ok(self.snapshot());
        }
        let _guard = self.refresh_lock.lock().await;
        if self.is_fresh() {
            return Ok(self.snapshot());
        }
        self.refresh(pool).await
    }

    /// Unconditional refresh; the scheduler calls this on its 60-second tick.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Db`] if the refresh queries fail.
    pub async fn refresh(
        &self,
        pool: &PgPool,
    ) -> Result<Arc<HashMap<i64, BrandMeta>>, PipelineError> {
        let rows = adboard_db::list_brand_metadata(pool).await?;
        let watchlisted: HashSet<i64> = list_watchlisted(pool).await?.into_iter().collect();

        let brands: HashMap<i64, BrandMeta> = rows
            .into_iter()
            .map(|row| {
                (
                    row.id,
                    BrandMeta {
                        watchlisted: watchlisted.contains(&row.id),
                        id: row.id,
                        page_id: row.page_id,
                        name: row.name,
                        category: row.category,
                    },
                )
            })
            .collect();
        let brands = Arc::new(brands);

        if let Ok(mut state) = self.state.write() {
            state.brands = Arc::clone(&brands);
            state.last_refresh = Some(Instant::now());
        }
        tracing::debug!(brands = brands.len(), "refreshed brand metadata cache");
        Ok(brands)
    }

    /// Drops the cached map so the next read refreshes; used on environment
    /// switches.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = CacheState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_cache_is_empty_and_stale() {
        let cache = BrandMetaCache::default();
        assert!(cache.snapshot().is_empty());
        assert!(!cache.is_fresh());
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn clear_resets_freshness() {
        let cache = BrandMetaCache::new(Duration::from_secs(60));
        {
            let mut state = cache.state.write().expect("lock");
            state.brands = Arc::new(HashMap::from([(
                1,
                BrandMeta {
                    id: 1,
                    page_id: "10".into(),
                    name: "Acme".into(),
                    category: None,
                    watchlisted: false,
                },
            )]));
            state.last_refresh = Some(Instant::now());
        }
        assert!(cache.is_fresh());
        assert_eq!(cache.get(1).map(|b| b.name), Some("Acme".to_string()));

        cache.clear();
        assert!(!cache.is_fresh());
        assert!(cache.get(1).is_none());
    }
}
