use axum::{middleware, routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::infrastructure::observability::{create_metrics_router, PrometheusMetrics};

use super::health;
use super::middleware::{logging_middleware, metrics_middleware};
use super::state::AppState;
use super::v1;

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        .nest("/v1", v1::create_v1_router())
        .route_layer(middleware::from_fn(metrics_middleware))
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Add the Prometheus scrape endpoint when metrics are enabled
pub fn with_metrics(router: Router, metrics: Option<PrometheusMetrics>, path: &str) -> Router {
    match metrics {
        Some(metrics) => router.merge(create_metrics_router(metrics, path)),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::state::test_support::app_state;

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn wait_for_status(router: &Router, execution_id: &str, status: &str) -> Value {
        for _ in 0..100 {
            let (_, record) = send(router, "GET", &format!("/v1/executions/{}", execution_id), None).await;
            if record["status"] == status {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution {} never reached {}", execution_id, status);
    }

    fn summarize_chain() -> Value {
        json!({
            "id": "summarize",
            "name": "Summarize",
            "steps": [
                {
                    "id": "draft",
                    "type": "prompt",
                    "config": {"promptId": "summary"},
                    "outputVariable": "draft"
                },
                {
                    "id": "shout",
                    "type": "code",
                    "config": {"code": "draft.to_upper()"},
                    "outputVariable": "final"
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_health_and_request_id() {
        let router = create_router(app_state());

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let (status, ready) = send(&router, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ready["checks"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_chain_crud() {
        let router = create_router(app_state());

        let (status, created) = send(&router, "POST", "/v1/chains", Some(summarize_chain())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["version"], 1);

        let (status, _) = send(&router, "POST", "/v1/chains", Some(summarize_chain())).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, updated) = send(
            &router,
            "PUT",
            "/v1/chains/summarize",
            Some(json!({"name": "Summarize v2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["version"], 2);

        let (_, list) = send(&router, "GET", "/v1/chains", None).await;
        assert_eq!(list["data"].as_array().unwrap().len(), 1);

        let (status, _) = send(&router, "DELETE", "/v1/chains/summarize", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&router, "GET", "/v1/chains/summarize", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found_error");
    }

    #[tokio::test]
    async fn test_invalid_chain_is_rejected() {
        let router = create_router(app_state());

        let (status, body) = send(
            &router,
            "POST",
            "/v1/chains",
            Some(json!({"id": "empty", "name": "Empty", "steps": []})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_failed");
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_envelope() {
        let router = create_router(app_state());

        let request = Request::builder()
            .method("POST")
            .uri("/v1/chains")
            .header("content-type", "application/json")
            .body(Body::from("{oops"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "json_parse_error");
    }

    #[tokio::test]
    async fn test_run_chain_and_poll() {
        let router = create_router(app_state());
        send(
            &router,
            "POST",
            "/v1/prompts",
            Some(json!({"id": "summary", "name": "Summary", "content": "Summarize: {{topic}}"})),
        )
        .await;
        send(&router, "POST", "/v1/chains", Some(summarize_chain())).await;

        let (status, accepted) = send(
            &router,
            "POST",
            "/v1/chains/summarize/run",
            Some(json!({"inputs": {"topic": "tides"}})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let execution_id = accepted["executionId"].as_str().unwrap().to_string();

        let record = wait_for_status(&router, &execution_id, "success").await;
        assert_eq!(record["finalOutputs"]["final"], "ECHO: SUMMARIZE: TIDES");

        let (_, runs) = send(&router, "GET", "/v1/chains/summarize/executions", None).await;
        assert_eq!(runs["data"][0]["id"], execution_id.as_str());

        // Cancelling a finished run is a no-op
        let (status, cancelled) = send(
            &router,
            "POST",
            &format!("/v1/executions/{}/cancel", execution_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(cancelled["status"], "success");
    }

    #[tokio::test]
    async fn test_approval_round_trip() {
        let router = create_router(app_state());
        send(
            &router,
            "POST",
            "/v1/chains",
            Some(json!({
                "id": "publish",
                "name": "Publish",
                "steps": [
                    {
                        "id": "review",
                        "type": "approval",
                        "config": {"message": "Publish?", "timeoutDisposition": "reject"}
                    },
                    {"id": "done", "type": "code", "config": {"code": "\"published\""}, "outputVariable": "result"}
                ]
            })),
        )
        .await;

        let (_, accepted) = send(&router, "POST", "/v1/chains/publish/run", Some(json!({}))).await;
        let execution_id = accepted["executionId"].as_str().unwrap().to_string();
        wait_for_status(&router, &execution_id, "paused").await;

        let (status, _) = send(
            &router,
            "POST",
            &format!("/v1/executions/{}/approvals/review", execution_id),
            Some(json!({"approved": true, "approver": "ops"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let record = wait_for_status(&router, &execution_id, "success").await;
        assert_eq!(record["finalOutputs"]["result"], "published");
    }

    #[tokio::test]
    async fn test_unknown_execution_is_not_found() {
        let router = create_router(app_state());

        let (status, _) = send(
            &router,
            "GET",
            "/v1/executions/exec-00000000-0000-0000-0000-000000000000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&router, "GET", "/v1/executions/nope", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["param"], "id");
    }

    #[tokio::test]
    async fn test_prompt_and_query_registration() {
        let router = create_router(app_state());

        let (status, prompt) = send(
            &router,
            "POST",
            "/v1/prompts",
            Some(json!({"id": "greeting", "name": "Greeting", "content": "Hello {{name}}"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(prompt["content"], "Hello {{name}}");

        let (status, _) = send(
            &router,
            "POST",
            "/v1/queries",
            Some(json!({
                "id": "orders",
                "name": "Orders",
                "sql": "SELECT * FROM orders WHERE customer = $1 AND status = $2",
                "parameters": ["customer"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, queries) = send(&router, "GET", "/v1/queries", None).await;
        assert!(queries["data"].as_array().unwrap().is_empty());
    }
}
