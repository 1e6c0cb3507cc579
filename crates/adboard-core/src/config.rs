use crate::app_config::AppConfig;
use crate::environment::Environment;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url_production = require("ADBOARD_DATABASE_URL_PRODUCTION")?;
    let redis_url_production = require("ADBOARD_REDIS_URL_PRODUCTION")?;

    // Stage stores fall back to the production endpoints; key prefixes still
    // keep the two environments' queue state apart on a shared instance.
    let database_url_stage = or_default("ADBOARD_DATABASE_URL_STAGE", &database_url_production);
    let redis_url_stage = or_default("ADBOARD_REDIS_URL_STAGE", &redis_url_production);

    let default_env = Environment::from_header(lookup("ADBOARD_ENV").ok().as_deref());
    let bind_addr = parse_addr("ADBOARD_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("ADBOARD_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("ADBOARD_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("ADBOARD_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("ADBOARD_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let job_index_staleness_secs = parse_u64("ADBOARD_JOB_INDEX_STALENESS_SECS", "30")?;
    let job_counters_ttl_secs = parse_u64("ADBOARD_JOB_COUNTERS_TTL_SECS", "10")?;
    let brand_cache_refresh_secs = parse_u64("ADBOARD_BRAND_CACHE_REFRESH_SECS", "60")?;
    let status_cache_ttl_secs = parse_u64("ADBOARD_STATUS_CACHE_TTL_SECS", "60")?;
    let status_fanout_limit = parse_usize("ADBOARD_STATUS_FANOUT_LIMIT", "8")?;
    let queue_bulk_chunk_size = parse_usize("ADBOARD_QUEUE_BULK_CHUNK_SIZE", "500")?;

    let sweep_terminal_interval_secs = parse_u64("ADBOARD_SWEEP_TERMINAL_INTERVAL_SECS", "30")?;
    let sweep_stale_interval_secs = parse_u64("ADBOARD_SWEEP_STALE_INTERVAL_SECS", "14400")?;

    Ok(AppConfig {
        default_env,
        bind_addr,
        log_level,
        database_url_production,
        database_url_stage,
        redis_url_production,
        redis_url_stage,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        job_index_staleness_secs,
        job_counters_ttl_secs,
        brand_cache_refresh_secs,
        status_cache_ttl_secs,
        status_fanout_limit,
        queue_bulk_chunk_size,
        sweep_terminal_interval_secs,
        sweep_stale_interval_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> + 'a {
        move |key: &str| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    fn minimal_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (
                "ADBOARD_DATABASE_URL_PRODUCTION",
                "postgres://localhost/adboard",
            ),
            ("ADBOARD_REDIS_URL_PRODUCTION", "redis://localhost:6379/0"),
        ])
    }

    #[test]
    fn minimal_config_applies_defaults() {
        let env = minimal_env();
        let config = build_app_config(lookup_from(&env)).expect("config");

        assert_eq!(config.default_env, Environment::Production);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.job_index_staleness_secs, 30);
        assert_eq!(config.job_counters_ttl_secs, 10);
        assert_eq!(config.brand_cache_refresh_secs, 60);
        assert_eq!(config.status_fanout_limit, 8);
        assert_eq!(config.sweep_terminal_interval_secs, 30);
        assert_eq!(config.sweep_stale_interval_secs, 14_400);
    }

    #[test]
    fn stage_urls_fall_back_to_production() {
        let env = minimal_env();
        let config = build_app_config(lookup_from(&env)).expect("config");

        assert_eq!(
            config.database_url(Environment::Stage),
            config.database_url(Environment::Production)
        );
        assert_eq!(
            config.redis_url(Environment::Stage),
            config.redis_url(Environment::Production)
        );
    }

    #[test]
    fn explicit_stage_urls_win() {
        let mut env = minimal_env();
        env.insert("ADBOARD_DATABASE_URL_STAGE", "postgres://localhost/stage");
        env.insert("ADBOARD_REDIS_URL_STAGE", "redis://localhost:6379/1");
        let config = build_app_config(lookup_from(&env)).expect("config");

        assert_eq!(
            config.database_url(Environment::Stage),
            "postgres://localhost/stage"
        );
        assert_eq!(
            config.redis_url(Environment::Stage),
            "redis://localhost:6379/1"
        );
    }

    #[test]
    fn missing_production_urls_fail() {
        let env: HashMap<&str, &str> = HashMap::new();
        let err = build_app_config(lookup_from(&env)).expect_err("must fail");
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn invalid_bind_addr_is_rejected() {
        let mut env = minimal_env();
        env.insert("ADBOARD_BIND_ADDR", "not-an-addr");
        let err = build_app_config(lookup_from(&env)).expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }
}
