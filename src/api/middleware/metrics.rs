//! Records request count and latency per matched route

use std::time::Instant;

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};

use crate::infrastructure::observability::record_http_request;

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let route = route_label(&request);

    let response = next.run(request).await;

    record_http_request(
        method.as_str(),
        &route,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

/// Matched route template, so ids in the path do not explode label cardinality
fn route_label(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_route_label() {
        let request = Request::builder()
            .uri("/v1/executions/abc")
            .body(Body::empty())
            .unwrap();

        assert_eq!(route_label(&request), "unmatched");
    }
}
