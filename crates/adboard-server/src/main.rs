mod api;
mod middleware;
mod registry;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::AdminState,
    registry::EnvRegistry,
    scheduler::SchedulerGuard,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(adboard_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let registry = Arc::new(EnvRegistry::new(Arc::clone(&config)));

    // Migrations run against the default environment; the other environment
    // migrates on its first switch-in if it points at a separate database.
    let handles = registry.current_handles().await?;
    adboard_db::run_migrations(&handles.pool).await?;

    let scheduler = Arc::new(SchedulerGuard::default());
    scheduler.restart(Arc::clone(&registry)).await?;

    let allow_open_admin =
        std::env::var("ADBOARD_ALLOW_OPEN_ADMIN").is_ok_and(|v| v == "1" || v == "true");
    let admin = AdminState::from_env(allow_open_admin)?;
    let app = build_app(
        AppState {
            registry: Arc::clone(&registry),
            scheduler,
        },
        admin,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %registry.current_env(), "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
