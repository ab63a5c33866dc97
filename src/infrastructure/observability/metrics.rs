//! Prometheus metrics for chain runs, steps and HTTP traffic

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;
use crate::domain::chain::StepType;
use crate::domain::execution::{ExecutionStatus, StepStatus};

/// Handle used to render the scrape endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the global Prometheus recorder
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("chain_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            tracing::info!("Prometheus metrics initialized at {}", config.path);

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Router serving the scrape endpoint at `path`
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// Count a finished step execution and record its duration
pub fn record_step_finished(step_type: StepType, status: StepStatus, duration: Duration) {
    counter!(
        "chain_steps_total",
        "type" => step_type.as_str(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("chain_step_duration_seconds", "type" => step_type.as_str())
        .record(duration.as_secs_f64());
}

/// Count a run reaching a terminal status
pub fn record_run_finished(status: ExecutionStatus, duration: Duration) {
    counter!("chain_runs_total", "status" => status.to_string()).increment(1);
    histogram!("chain_run_duration_seconds").record(duration.as_secs_f64());
}

/// Count an HTTP request by matched route
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}
