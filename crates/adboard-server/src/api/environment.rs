//! Environment endpoints: current default, and the hot switch.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use adboard_core::Environment;

use crate::registry::SwitchReport;

use super::{ApiError, AppState, Envelope};

#[derive(Debug, Serialize)]
pub struct EnvironmentData {
    pub environment: Environment,
    pub available: [Environment; 2],
}

pub async fn current(State(state): State<AppState>) -> Json<Envelope<EnvironmentData>> {
    Envelope::ok(EnvironmentData {
        environment: state.registry.current_env(),
        available: Environment::ALL,
    })
}

#[derive(Debug, Deserialize)]
pub struct SwitchBody {
    pub environment: String,
}

/// Strict switch: unknown names fail before any store access; the switch
/// itself is best-effort and reports its sub-steps. Cleanup timers restart
/// against the new environment as part of the same call.
pub async fn switch(
    State(state): State<AppState>,
    Json(body): Json<SwitchBody>,
) -> Result<Json<Envelope<SwitchReport>>, ApiError> {
    let env = Environment::parse(&body.environment)
        .map_err(|e| ApiError::new("invalid_environment", e.to_string()))?;

    let report = state.registry.switch(env).await;

    if let Err(e) = state
        .scheduler
        .restart(std::sync::Arc::clone(&state.registry))
        .await
    {
        tracing::error!(error = %e, "cleanup scheduler restart failed after switch");
    }

    let message = if report.fully_clean() {
        format!("switched to {env}")
    } else {
        format!("switched to {env} with degraded sub-steps")
    };
    Ok(Envelope::ok_with(message, report))
}
