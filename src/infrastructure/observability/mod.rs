//! Observability infrastructure - Prometheus metrics for chain runs

mod metrics;

pub use metrics::{
    create_metrics_router, init_metrics, record_http_request, record_run_finished,
    record_step_finished, PrometheusMetrics,
};
