//! Cleanup and refresh timers.
//!
//! Four recurring jobs against the current default environment: the
//! 30-second terminal-entry sweep, the 4-hour stale-entry sweep, the job
//! counter refresh, and the brand-metadata cache refresh. The guard keeps
//! exactly one scheduler alive so repeated environment switches never
//! accumulate duplicate timers.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use adboard_core::{JobKind, QueueFamily};

use crate::registry::EnvRegistry;

/// Singleton holder for the running scheduler.
pub struct SchedulerGuard {
    inner: tokio::sync::Mutex<Option<JobScheduler>>,
}

impl Default for SchedulerGuard {
    fn default() -> Self {
        Self {
            inner: tokio::sync::Mutex::new(None),
        }
    }
}

impl SchedulerGuard {
    /// Stops any running scheduler and starts a fresh one. Idempotent across
    /// repeated environment switches.
    ///
    /// # Errors
    ///
    /// Returns [`JobSchedulerError`] if the new scheduler cannot be built or
    /// started; the old one is already shut down at that point.
    pub async fn restart(&self, registry: Arc<EnvRegistry>) -> Result<(), JobSchedulerError> {
        let mut guard = self.inner.lock().await;
        if let Some(mut old) = guard.take() {
            if let Err(e) = old.shutdown().await {
                tracing::warn!(error = %e, "previous cleanup scheduler did not shut down cleanly");
            }
        }
        let scheduler = build_scheduler(registry).await?;
        *guard = Some(scheduler);
        Ok(())
    }
}

async fn build_scheduler(registry: Arc<EnvRegistry>) -> Result<JobScheduler, JobSchedulerError> {
    let config = registry.config();
    let terminal_every = Duration::from_secs(config.sweep_terminal_interval_secs.max(1));
    let stale_every = Duration::from_secs(config.sweep_stale_interval_secs.max(1));
    let counters_every = Duration::from_secs(config.job_counters_ttl_secs.max(1));
    let brands_every = Duration::from_secs(config.brand_cache_refresh_secs.max(1));

    let scheduler = JobScheduler::new().await?;

    register_terminal_sweep(&scheduler, Arc::clone(&registry), terminal_every).await?;
    register_stale_sweep(&scheduler, Arc::clone(&registry), stale_every).await?;
    register_counter_refresh(&scheduler, Arc::clone(&registry), counters_every).await?;
    register_brand_cache_refresh(&scheduler, registry, brands_every).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_terminal_sweep(
    scheduler: &JobScheduler,
    registry: Arc<EnvRegistry>,
    every: Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let registry = Arc::clone(&registry);
        Box::pin(async move {
            let handles = match registry.current_handles().await {
                Ok(handles) => handles,
                Err(e) => {
                    tracing::warn!(error = %e, "terminal sweep skipped; stores unavailable");
                    return;
                }
            };
            let mut conn = handles.global.clone();
            match adboard_queue::sweep_terminal(&mut conn, handles.env).await {
                Ok(report) if report.removed > 0 => {
                    tracing::info!(
                        removed = report.removed,
                        kept = report.kept,
                        "swept terminal currently-processing entries"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "terminal sweep failed"),
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

async fn register_stale_sweep(
    scheduler: &JobScheduler,
    registry: Arc<EnvRegistry>,
    every: Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let registry = Arc::clone(&registry);
        Box::pin(async move {
            let handles = match registry.current_handles().await {
                Ok(handles) => handles,
                Err(e) => {
                    tracing::warn!(error = %e, "stale sweep skipped; stores unavailable");
                    return;
                }
            };
            let mut conn = handles.global.clone();
            match adboard_queue::sweep_stale(&mut conn, handles.env).await {
                Ok(report) if report.removed > 0 => {
                    tracing::info!(
                        removed = report.removed,
                        "force-removed stale currently-processing entries"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "stale sweep failed"),
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

async fn register_counter_refresh(
    scheduler: &JobScheduler,
    registry: Arc<EnvRegistry>,
    every: Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let registry = Arc::clone(&registry);
        Box::pin(async move {
            let handles = match registry.current_handles().await {
                Ok(handles) => handles,
                Err(e) => {
                    tracing::warn!(error = %e, "counter refresh skipped; stores unavailable");
                    return;
                }
            };
            for family in QueueFamily::ALL {
                for kind in JobKind::ALL {
                    let mut conn = handles.queue_conn(family);
                    if let Err(e) = handles
                        .counters
                        .refresh(&mut conn, handles.env, family, kind)
                        .await
                    {
                        tracing::warn!(error = %e, %family, %kind, "counter refresh failed");
                    }
                }
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

async fn register_brand_cache_refresh(
    scheduler: &JobScheduler,
    registry: Arc<EnvRegistry>,
    every: Duration,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let registry = Arc::clone(&registry);
        Box::pin(async move {
            let handles = match registry.current_handles().await {
                Ok(handles) => handles,
                Err(e) => {
                    tracing::warn!(error = %e, "brand cache refresh skipped; stores unavailable");
                    return;
                }
            };
            if let Err(e) = handles.brands.refresh(&handles.pool).await {
                tracing::warn!(error = %e, "brand metadata cache refresh failed");
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}
