//! Health check endpoints for Kubernetes probes

use std::future::Future;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::api::types::Json;
use crate::domain::DomainError;

use super::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_runs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<HealthCheck>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of probing one storage backend
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_runs: None,
        checks: None,
        latency_ms: None,
    })
}

/// GET /ready - every store must answer a list call
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();

    let checks = vec![
        probe("chains", state.chain_service.list()).await,
        probe("prompts", state.prompt_service.list()).await,
        probe("queries", state.query_service.list()).await,
    ];

    let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    let status_code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_runs: Some(state.execution_service.active_count()),
        checks: Some(checks),
        latency_ms: Some(start.elapsed().as_millis() as u64),
    };

    (status_code, Json(response))
}

/// GET /live
pub async fn live_check() -> impl IntoResponse {
    StatusCode::OK
}

async fn probe<T>(
    name: &str,
    check: impl Future<Output = Result<T, DomainError>>,
) -> HealthCheck {
    let start = Instant::now();
    let result = check.await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(_) => HealthCheck {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            message: None,
            latency_ms,
        },
        Err(e) => HealthCheck {
            name: name.to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
            latency_ms,
        },
    }
}
