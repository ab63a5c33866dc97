//! Request/response logging with header redaction
//!
//! `TraceLayer` owns the request span; this middleware only emits events
//! inside it.

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};

const REDACTED: &str = "[REDACTED]";

pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    info!(
        method = %method,
        path = %path,
        request_id = %request_id,
        headers = %loggable_headers(request.headers()),
        "Incoming request"
    );

    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        warn!(method = %method, path = %path, status = status.as_u16(), duration_ms, request_id = %request_id, "Request failed");
    } else {
        info!(method = %method, path = %path, status = status.as_u16(), duration_ms, request_id = %request_id, "Request completed");
    }

    response
}

/// `name=value` pairs for the headers worth logging, secrets redacted
fn loggable_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| is_logged(name.as_str()))
        .map(|(name, value)| {
            let value = if is_sensitive(name.as_str()) {
                REDACTED
            } else {
                value.to_str().unwrap_or("[invalid]")
            };
            format!("{}={}", name, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_sensitive(name: &str) -> bool {
    matches!(
        name,
        "authorization" | "x-api-key" | "cookie" | "x-webhook-signature" | "proxy-authorization"
    )
}

fn is_logged(name: &str) -> bool {
    is_sensitive(name)
        || matches!(
            name,
            "content-type" | "content-length" | "user-agent" | "x-request-id" | "x-forwarded-for"
        )
}
