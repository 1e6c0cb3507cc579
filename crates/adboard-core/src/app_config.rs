use std::net::SocketAddr;

use crate::environment::Environment;

#[derive(Clone)]
pub struct AppConfig {
    pub default_env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub database_url_production: String,
    pub database_url_stage: String,
    pub redis_url_production: String,
    pub redis_url_stage: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub job_index_staleness_secs: u64,
    pub job_counters_ttl_secs: u64,
    pub brand_cache_refresh_secs: u64,
    pub status_cache_ttl_secs: u64,
    pub status_fanout_limit: usize,
    pub queue_bulk_chunk_size: usize,
    pub sweep_terminal_interval_secs: u64,
    pub sweep_stale_interval_secs: u64,
}

impl AppConfig {
    #[must_use]
    pub fn database_url(&self, env: Environment) -> &str {
        match env {
            Environment::Production => &self.database_url_production,
            Environment::Stage => &self.database_url_stage,
        }
    }

    #[must_use]
    pub fn redis_url(&self, env: Environment) -> &str {
        match env {
            Environment::Production => &self.redis_url_production,
            Environment::Stage => &self.redis_url_stage,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("default_env", &self.default_env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url_production", &"[redacted]")
            .field("database_url_stage", &"[redacted]")
            .field("redis_url_production", &"[redacted]")
            .field("redis_url_stage", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("job_index_staleness_secs", &self.job_index_staleness_secs)
            .field("job_counters_ttl_secs", &self.job_counters_ttl_secs)
            .field("brand_cache_refresh_secs", &self.brand_cache_refresh_secs)
            .field("status_cache_ttl_secs", &self.status_cache_ttl_secs)
            .field("status_fanout_limit", &self.status_fanout_limit)
            .field("queue_bulk_chunk_size", &self.queue_bulk_chunk_size)
            .field(
                "sweep_terminal_interval_secs",
                &self.sweep_terminal_interval_secs,
            )
            .field("sweep_stale_interval_secs", &self.sweep_stale_interval_secs)
            .finish()
    }
}
