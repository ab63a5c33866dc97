//! Leaf step execution against the external collaborators

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::domain::chain::{
    ApiCallStep, CancellationToken, ChainError, CodeStep, DatabaseStep, PromptStep, ScopeId,
    StepId, StepOutcome, VariableStore,
};
use crate::domain::execution::StepTelemetry;
use crate::domain::http::{redact_url, HttpClient, HttpRequest};
use crate::domain::llm::{LlmInvoker, LlmRequest};
use crate::domain::prompt::PromptResolver;
use crate::domain::query::{QueryExecutor, QueryResolver};
use crate::domain::sandbox::CodeSandbox;

/// Executes the step kinds that talk to a collaborator and never touch
/// control flow: prompt, webhook, api_call, database and code.
#[derive(Clone)]
pub struct StepExecutor {
    prompts: Arc<dyn PromptResolver>,
    llm: Arc<dyn LlmInvoker>,
    http: Arc<dyn HttpClient>,
    queries: Arc<dyn QueryResolver>,
    query_executor: Arc<dyn QueryExecutor>,
    sandbox: Arc<dyn CodeSandbox>,
    default_model: String,
    code_timeout: Duration,
    http_timeout: Duration,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("default_model", &self.default_model)
            .field("code_timeout", &self.code_timeout)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl StepExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        prompts: Arc<dyn PromptResolver>,
        llm: Arc<dyn LlmInvoker>,
        http: Arc<dyn HttpClient>,
        queries: Arc<dyn QueryResolver>,
        query_executor: Arc<dyn QueryExecutor>,
        sandbox: Arc<dyn CodeSandbox>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            prompts,
            llm,
            http,
            queries,
            query_executor,
            sandbox,
            default_model: default_model.into(),
            code_timeout: Duration::from_secs(5),
            http_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_code_timeout(mut self, timeout: Duration) -> Self {
        self.code_timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Render the referenced prompt and invoke the model.
    ///
    /// The step's `variables` are interpolated and bound in a step-local scope
    /// before the prompt content itself is interpolated.
    pub async fn prompt(
        &self,
        step: &PromptStep,
        store: &mut VariableStore,
        scope: ScopeId,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, ChainError> {
        let prompt = cancel.run(self.prompts.resolve(&step.prompt_id)).await?;

        let local = store.push_scope(scope);
        for (name, template) in &step.variables {
            let value = store.interpolate(local, template);
            store.bind(local, name.clone(), Value::String(value));
        }
        let content = store.interpolate(local, &prompt.content);
        store.pop_scope(local);

        let model = step
            .model
            .clone()
            .or(prompt.default_model)
            .unwrap_or_else(|| self.default_model.clone());

        let mut parameters = prompt.default_parameters;
        parameters.extend(step.parameters.clone());

        debug!(prompt_id = %step.prompt_id, model = %model, "Invoking model");

        let request = LlmRequest::new(model, content).with_parameters(parameters);
        let invocation = cancel
            .run(async { self.llm.invoke(request).await.map_err(ChainError::from) })
            .await?;

        let telemetry = StepTelemetry {
            model: Some(invocation.model),
            prompt_tokens: Some(invocation.usage.prompt_tokens),
            completion_tokens: Some(invocation.usage.completion_tokens),
            cost_cents: Some(invocation.cost_cents),
            latency_ms: Some(invocation.latency_ms),
            ..StepTelemetry::default()
        };

        Ok(StepOutcome::new(Value::String(invocation.text)).with_telemetry(telemetry))
    }

    /// Webhook steps never wait: the payload arrived with the trigger
    pub fn webhook(
        &self,
        step_id: &StepId,
        payloads: &HashMap<StepId, Value>,
    ) -> Result<StepOutcome, ChainError> {
        payloads
            .get(step_id)
            .cloned()
            .map(StepOutcome::new)
            .ok_or_else(|| {
                ChainError::configuration(format!(
                    "no payload received for webhook step '{}'",
                    step_id
                ))
            })
    }

    /// Interpolate and send the request; non-2xx fails unless tolerated
    pub async fn api_call(
        &self,
        step: &ApiCallStep,
        store: &VariableStore,
        scope: ScopeId,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, ChainError> {
        let url = store.interpolate(scope, &step.url);
        let headers = step
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), store.interpolate(scope, value)))
            .collect();
        let body = step
            .body
            .as_ref()
            .map(|body| store.interpolate_value(scope, body));

        let request = HttpRequest {
            method: step.method,
            url: url.clone(),
            headers,
            body,
            timeout: step.timeout_or(self.http_timeout),
        };

        debug!(method = %step.method, url = %redact_url(&url), "Sending request");

        let response = cancel.run(self.http.send(request)).await?;

        if !response.is_success() && !step.tolerate_errors {
            return Err(ChainError::external_with_status(
                "http",
                response.status,
                format!(
                    "{} {} returned {} {}",
                    step.method,
                    redact_url(&url),
                    response.status,
                    response.status_text
                ),
            ));
        }

        Ok(StepOutcome::new(response.body).with_telemetry(StepTelemetry::http(response.status)))
    }

    /// Run a registered query, binding its parameters in declaration order
    pub async fn database(
        &self,
        step: &DatabaseStep,
        store: &VariableStore,
        scope: ScopeId,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, ChainError> {
        let query = cancel.run(self.queries.resolve(&step.query_id)).await?;

        let params = query
            .parameters()
            .iter()
            .map(|name| match step.variables.get(name) {
                Some(template) => Ok(Value::String(store.interpolate(scope, template))),
                None => store.get(scope, name).cloned().ok_or_else(|| {
                    ChainError::configuration(format!(
                        "no value bound for query parameter '{}'",
                        name
                    ))
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = cancel
            .run(self.query_executor.execute(&step.connection_id, &query, params))
            .await?;

        Ok(StepOutcome::new(Value::Array(result.rows))
            .with_telemetry(StepTelemetry::rows(result.row_count)))
    }

    /// Evaluate a script against a read-only snapshot of the variables
    pub async fn code(
        &self,
        step: &CodeStep,
        store: &VariableStore,
        scope: ScopeId,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, ChainError> {
        let timeout = step
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.code_timeout);

        let value = self
            .sandbox
            .execute(&step.code, store.snapshot(scope), timeout, cancel.clone())
            .await?;

        Ok(StepOutcome::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::http::{HttpMethod, HttpResponse};
    use crate::domain::llm::mock::MockLlmInvoker;
    use crate::domain::prompt::{MockPromptResolver, ResolvedPrompt};
    use crate::domain::query::{
        MockQueryExecutor, MockQueryResolver, QueryId, QueryResult, StoredQuery,
    };
    use crate::infrastructure::sandbox::{RhaiSandbox, SandboxLimits};

    #[derive(Debug, Default)]
    struct RecordingHttp {
        status: u16,
        requests: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpClient for RecordingHttp {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ChainError> {
            self.requests.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: self.status,
                status_text: "Status".to_string(),
                headers: HashMap::new(),
                body: json!({"ok": self.status < 400}),
            })
        }
    }

    fn executor_with(
        prompts: MockPromptResolver,
        llm: Arc<MockLlmInvoker>,
        http: Arc<RecordingHttp>,
        queries: MockQueryResolver,
        query_executor: MockQueryExecutor,
    ) -> StepExecutor {
        StepExecutor::new(
            Arc::new(prompts),
            llm,
            http,
            Arc::new(queries),
            Arc::new(query_executor),
            Arc::new(RhaiSandbox::new(SandboxLimits::default())),
            "test-model",
        )
    }

    fn executor() -> StepExecutor {
        executor_with(
            MockPromptResolver::new(),
            Arc::new(MockLlmInvoker::new()),
            Arc::new(RecordingHttp {
                status: 200,
                ..Default::default()
            }),
            MockQueryResolver::new(),
            MockQueryExecutor::new(),
        )
    }

    fn store(values: Value) -> VariableStore {
        match values {
            Value::Object(map) => VariableStore::with_inputs(map),
            _ => VariableStore::new(),
        }
    }

    #[tokio::test]
    async fn test_prompt_binds_step_variables_locally() {
        let mut prompts = MockPromptResolver::new();
        prompts
            .expect_resolve()
            .returning(|_| Ok(ResolvedPrompt::new("Summarize {{topic}} for {{audience}}")));

        let llm = Arc::new(MockLlmInvoker::new().with_response("summary"));
        let executor = executor_with(
            prompts,
            llm.clone(),
            Arc::new(RecordingHttp::default()),
            MockQueryResolver::new(),
            MockQueryExecutor::new(),
        );

        let mut store = store(json!({"subject": "rust"}));
        let root = store.root();
        let step = PromptStep::new("p1")
            .with_variable("topic", "{{subject}} traits")
            .with_variable("audience", "beginners");

        let outcome = executor
            .prompt(&step, &mut store, root, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.output, json!("summary"));
        assert_eq!(llm.prompts(), vec!["Summarize rust traits for beginners"]);
        assert!(store.get(root, "topic").is_none());

        let telemetry = outcome.telemetry.unwrap();
        assert_eq!(telemetry.model.as_deref(), Some("test-model"));
        assert_eq!(telemetry.prompt_tokens, Some(10));
        assert_eq!(telemetry.completion_tokens, Some(5));
    }

    #[tokio::test]
    async fn test_prompt_model_precedence() {
        let mut prompts = MockPromptResolver::new();
        prompts
            .expect_resolve()
            .returning(|_| Ok(ResolvedPrompt::new("hi").with_default_model("prompt-model")));

        let executor = executor_with(
            prompts,
            Arc::new(MockLlmInvoker::new()),
            Arc::new(RecordingHttp::default()),
            MockQueryResolver::new(),
            MockQueryExecutor::new(),
        );
        let mut store = VariableStore::new();
        let root = store.root();
        let cancel = CancellationToken::new();

        let from_prompt = executor
            .prompt(&PromptStep::new("p"), &mut store, root, &cancel)
            .await
            .unwrap();
        assert_eq!(
            from_prompt.telemetry.unwrap().model.as_deref(),
            Some("prompt-model")
        );

        let from_step = executor
            .prompt(
                &PromptStep::new("p").with_model("step-model"),
                &mut store,
                root,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(
            from_step.telemetry.unwrap().model.as_deref(),
            Some("step-model")
        );
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_configuration_error() {
        let mut prompts = MockPromptResolver::new();
        prompts
            .expect_resolve()
            .returning(|id| Err(ChainError::configuration(format!("prompt '{}' not found", id))));

        let executor = executor_with(
            prompts,
            Arc::new(MockLlmInvoker::new()),
            Arc::new(RecordingHttp::default()),
            MockQueryResolver::new(),
            MockQueryExecutor::new(),
        );
        let mut store = VariableStore::new();
        let root = store.root();

        let err = executor
            .prompt(&PromptStep::new("ghost"), &mut store, root, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)));
    }

    #[test]
    fn test_webhook_reads_delivered_payload() {
        let executor = executor();
        let step_id = StepId::new("hook").unwrap();
        let mut payloads = HashMap::new();

        let missing = executor.webhook(&step_id, &payloads).unwrap_err();
        assert!(matches!(missing, ChainError::Configuration(_)));

        payloads.insert(step_id.clone(), json!({"event": "push"}));
        let outcome = executor.webhook(&step_id, &payloads).unwrap();
        assert_eq!(outcome.output, json!({"event": "push"}));
    }

    #[tokio::test]
    async fn test_api_call_interpolates_request() {
        let http = Arc::new(RecordingHttp {
            status: 201,
            ..Default::default()
        });
        let executor = executor_with(
            MockPromptResolver::new(),
            Arc::new(MockLlmInvoker::new()),
            http.clone(),
            MockQueryResolver::new(),
            MockQueryExecutor::new(),
        )
        .with_http_timeout(Duration::from_secs(3));

        let store = store(json!({"user": 42, "token": "abc"}));
        let step = ApiCallStep::new(HttpMethod::Post, "https://api.test/users/{{user}}")
            .with_header("Authorization", "Bearer {{token}}")
            .with_body(json!({"id": "{{user}}"}));

        let outcome = executor
            .api_call(&step, &store, store.root(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.output, json!({"ok": true}));
        assert_eq!(outcome.telemetry.unwrap().http_status, Some(201));

        let requests = http.requests.lock().unwrap();
        assert_eq!(requests[0].url, "https://api.test/users/42");
        assert_eq!(requests[0].headers["Authorization"], "Bearer abc");
        assert_eq!(requests[0].body, Some(json!({"id": "42"})));
        assert_eq!(requests[0].timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_api_call_non_success_status() {
        let http = Arc::new(RecordingHttp {
            status: 503,
            ..Default::default()
        });
        let executor = executor_with(
            MockPromptResolver::new(),
            Arc::new(MockLlmInvoker::new()),
            http,
            MockQueryResolver::new(),
            MockQueryExecutor::new(),
        );
        let store = VariableStore::new();
        let cancel = CancellationToken::new();
        let step = ApiCallStep::new(HttpMethod::Get, "https://api.test/health?key=secret");

        let err = executor
            .api_call(&step, &store, store.root(), &cancel)
            .await
            .unwrap_err();
        match err {
            ChainError::ExternalService {
                status, message, ..
            } => {
                assert_eq!(status, Some(503));
                assert!(!message.contains("secret"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let tolerated = executor
            .api_call(&step.with_tolerate_errors(true), &store, store.root(), &cancel)
            .await
            .unwrap();
        assert_eq!(tolerated.output, json!({"ok": false}));
    }

    #[tokio::test]
    async fn test_database_binds_parameters_in_order() {
        let mut queries = MockQueryResolver::new();
        queries.expect_resolve().returning(|_| {
            Ok(StoredQuery::new(
                QueryId::new("orders-by-user").unwrap(),
                "Orders",
                "SELECT * FROM orders WHERE user_id = $1 AND status = $2",
            )
            .with_parameters(vec!["user_id".to_string(), "status".to_string()]))
        });

        let mut query_executor = MockQueryExecutor::new();
        query_executor
            .expect_execute()
            .withf(|connection, _, params| {
                connection == "analytics" && params == &vec![json!(7), json!("open-7")]
            })
            .returning(|_, _, _| {
                Ok(QueryResult {
                    rows: vec![json!({"id": 1})],
                    row_count: 1,
                })
            });

        let executor = executor_with(
            MockPromptResolver::new(),
            Arc::new(MockLlmInvoker::new()),
            Arc::new(RecordingHttp::default()),
            queries,
            query_executor,
        );

        let store = store(json!({"user_id": 7}));
        let step: DatabaseStep = serde_json::from_value(json!({
            "connectionId": "analytics",
            "queryId": "orders-by-user",
            "variables": {"status": "open-{{user_id}}"}
        }))
        .unwrap();

        let outcome = executor
            .database(&step, &store, store.root(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.output, json!([{"id": 1}]));
        assert_eq!(outcome.telemetry.unwrap().row_count, Some(1));
    }

    #[tokio::test]
    async fn test_database_missing_parameter() {
        let mut queries = MockQueryResolver::new();
        queries.expect_resolve().returning(|_| {
            Ok(StoredQuery::new(QueryId::new("q").unwrap(), "Q", "SELECT $1")
                .with_parameters(vec!["missing".to_string()]))
        });

        let executor = executor_with(
            MockPromptResolver::new(),
            Arc::new(MockLlmInvoker::new()),
            Arc::new(RecordingHttp::default()),
            queries,
            MockQueryExecutor::new(),
        );
        let store = VariableStore::new();
        let step: DatabaseStep =
            serde_json::from_value(json!({"connectionId": "main", "queryId": "q"})).unwrap();

        let err = executor
            .database(&step, &store, store.root(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_code_sees_variable_snapshot() {
        let executor = executor();
        let store = store(json!({"sum": 3, "item": 4}));

        let outcome = executor
            .code(
                &CodeStep::new("sum + item"),
                &store,
                store.root(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.output, json!(7));
    }
}
