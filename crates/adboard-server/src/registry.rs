//! Environment registry: per-environment store handles, lazy construction,
//! and the best-effort hot switch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use redis::aio::ConnectionManager;
use serde::Serialize;
use sqlx::PgPool;

use adboard_core::keys::{cache_pattern, CACHE_NAMESPACES};
use adboard_core::{AppConfig, Environment};
use adboard_pipeline::{BrandMetaCache, JobCountersCache, JobIndexRegistry, PipelineContext};
use adboard_queue::CacheLayer;

/// Every handle one environment's requests run against. Cheap to clone; the
/// pool and connection managers are shared handles.
#[derive(Clone)]
pub struct StoreHandles {
    pub env: Environment,
    pub pool: PgPool,
    pub global: ConnectionManager,
    pub regular: ConnectionManager,
    pub watchlist: ConnectionManager,
    pub cache: CacheLayer,
    pub jobs: Arc<JobIndexRegistry>,
    pub brands: Arc<BrandMetaCache>,
    pub counters: Arc<JobCountersCache>,
    status_fanout_limit: usize,
}

impl StoreHandles {
    #[must_use]
    pub fn pipeline_context(&self) -> PipelineContext {
        PipelineContext {
            env: self.env,
            pool: self.pool.clone(),
            global: self.global.clone(),
            regular: self.regular.clone(),
            watchlist: self.watchlist.clone(),
            jobs: Arc::clone(&self.jobs),
            brands: Arc::clone(&self.brands),
            counters: Arc::clone(&self.counters),
            status_fanout_limit: self.status_fanout_limit,
        }
    }

    #[must_use]
    pub fn queue_conn(&self, family: adboard_core::QueueFamily) -> ConnectionManager {
        match family {
            adboard_core::QueueFamily::Regular => self.regular.clone(),
            adboard_core::QueueFamily::Watchlist => self.watchlist.clone(),
        }
    }
}

impl std::fmt::Debug for StoreHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandles").field("env", &self.env).finish()
    }
}

/// One sub-step of an environment switch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchStep {
    pub name: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a best-effort switch: the pointer update always happens, the
/// per-step record says which rebinds or cache clears errored along the way.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchReport {
    pub environment: Environment,
    pub steps: Vec<SwitchStep>,
}

impl SwitchReport {
    #[must_use]
    pub fn fully_clean(&self) -> bool {
        self.steps.iter().all(|step| step.ok)
    }
}

/// Per-environment store handles plus the process-wide default environment
/// pointer. Handles are built on first use and replaced wholesale on rebind.
pub struct EnvRegistry {
    config: Arc<AppConfig>,
    current: RwLock<Environment>,
    handles: tokio::sync::Mutex<HashMap<Environment, StoreHandles>>,
}

impl std::fmt::Debug for EnvRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvRegistry")
            .field("current", &self.current_env())
            .finish()
    }
}

impl EnvRegistry {
    #[must_use]
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            current: RwLock::new(config.default_env),
            config,
            handles: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The process default environment, used when a request carries no
    /// `x-environment` header.
    #[must_use]
    pub fn current_env(&self) -> Environment {
        self.current
            .read()
            .map(|guard| *guard)
            .unwrap_or(Environment::Production)
    }

    /// Handles for an environment, building them on first use.
    ///
    /// # Errors
    ///
    /// Returns the underlying connect error when the environment has no
    /// handles yet and they cannot be built.
    pub async fn handles(&self, env: Environment) -> anyhow::Result<StoreHandles> {
        let mut map = self.handles.lock().await;
        if let Some(existing) = map.get(&env) {
            return Ok(existing.clone());
        }
        let built = self.build_handles(env).await?;
        map.insert(env, built.clone());
        Ok(built)
    }

    /// Handles for the current default environment.
    ///
    /// # Errors
    ///
    /// Same as [`EnvRegistry::handles`].
    pub async fn current_handles(&self) -> anyhow::Result<StoreHandles> {
        self.handles(self.current_env()).await
    }

    /// Rebuilds an environment's handles from scratch, replacing any
    /// existing ones.
    ///
    /// # Errors
    ///
    /// Returns the underlying connect error; the old handles stay registered.
    pub async fn rebind(&self, env: Environment) -> anyhow::Result<StoreHandles> {
        let built = self.build_handles(env).await?;
        self.handles.lock().await.insert(env, built.clone());
        Ok(built)
    }

    async fn build_handles(&self, env: Environment) -> anyhow::Result<StoreHandles> {
        let pool_config = adboard_db::PoolConfig::from_app_config(&self.config);
        let pool = adboard_db::connect_pool(self.config.database_url(env), pool_config).await?;

        // One connection per queue family plus the shared global one; the
        // URL is the same but a stuck family connection must not stall the
        // other families' traffic.
        let redis_url = self.config.redis_url(env);
        let global = adboard_queue::connect(redis_url).await?;
        let regular = adboard_queue::connect(redis_url).await?;
        let watchlist = adboard_queue::connect(redis_url).await?;

        let cache = CacheLayer::new(global.clone());
        let brands = Arc::new(BrandMetaCache::new(Duration::from_secs(
            self.config.brand_cache_refresh_secs,
        )));
        let brands_clearer = Arc::clone(&brands);
        cache.register_clearer(move || brands_clearer.clear());

        Ok(StoreHandles {
            env,
            pool,
            global,
            regular,
            watchlist,
            cache,
            jobs: Arc::new(JobIndexRegistry::new(Duration::from_secs(
                self.config.job_index_staleness_secs,
            ))),
            brands,
            counters: Arc::new(JobCountersCache::new(Duration::from_secs(
                self.config.job_counters_ttl_secs,
            ))),
            status_fanout_limit: self.config.status_fanout_limit,
        })
    }

    /// Switches the default environment. Runs the rebind and cache-clear
    /// sub-steps in order, collecting per-step errors instead of aborting;
    /// the pointer update itself always happens last and cannot fail.
    pub async fn switch(&self, env: Environment) -> SwitchReport {
        let mut steps = Vec::new();

        let handles = match self.rebind(env).await {
            Ok(handles) => {
                steps.push(SwitchStep {
                    name: "rebind-stores",
                    ok: true,
                    error: None,
                });
                Some(handles)
            }
            Err(e) => {
                tracing::error!(error = %e, %env, "environment switch: store rebind failed");
                steps.push(SwitchStep {
                    name: "rebind-stores",
                    ok: false,
                    error: Some(e.to_string()),
                });
                // Fall back to whatever handles already exist for the env.
                self.handles.lock().await.get(&env).cloned()
            }
        };

        if let Some(handles) = handles {
            for namespace in CACHE_NAMESPACES {
                let pattern = cache_pattern(env, namespace);
                match handles.cache.invalidate(&pattern).await {
                    Ok(deleted) => {
                        tracing::debug!(namespace, deleted, "environment switch: cache cleared");
                        steps.push(SwitchStep {
                            name: namespace,
                            ok: true,
                            error: None,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, namespace, "environment switch: cache clear failed");
                        steps.push(SwitchStep {
                            name: namespace,
                            ok: false,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        } else {
            for namespace in CACHE_NAMESPACES {
                steps.push(SwitchStep {
                    name: namespace,
                    ok: false,
                    error: Some("no store handles available".to_string()),
                });
            }
        }

        if let Ok(mut current) = self.current.write() {
            *current = env;
        }
        tracing::info!(%env, clean = steps.iter().all(|s| s.ok), "environment switched");
        SwitchReport {
            environment: env,
            steps,
        }
    }
}
