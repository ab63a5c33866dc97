use std::time::{Duration, Instant};

use async_trait::async_trait;
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde_json::{Map, Value};

use crate::domain::chain::{is_valid_identifier, CancelReason, CancellationToken, ChainError};
use crate::domain::sandbox::CodeSandbox;

const TERMINATED_TIMEOUT: &str = "timeout";
const TERMINATED_CANCELLED: &str = "cancelled";

/// Resource ceilings applied to every script
#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 1 << 20,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

/// Runs Rhai scripts on the blocking pool.
///
/// Rhai has no filesystem or network access; variables are pushed as
/// constants so scripts only communicate through their return value.
#[derive(Debug, Clone, Default)]
pub struct RhaiSandbox {
    limits: SandboxLimits,
}

impl RhaiSandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    fn engine(&self, deadline: Instant, cancel: CancellationToken) -> Engine {
        let mut engine = Engine::new();
        engine
            .set_max_call_levels(self.limits.max_call_levels)
            .set_max_expr_depths(self.limits.max_expr_depth, self.limits.max_expr_depth)
            .set_max_string_size(self.limits.max_string_size)
            .set_max_array_size(self.limits.max_array_size)
            .set_max_map_size(self.limits.max_map_size);

        engine.disable_symbol("eval");
        engine.on_print(|text| tracing::debug!(target: "sandbox", "{}", text));
        engine.on_debug(|text, _, _| tracing::debug!(target: "sandbox", "{}", text));

        engine.on_progress(move |_| {
            if cancel.is_cancelled() {
                Some(Dynamic::from(TERMINATED_CANCELLED.to_string()))
            } else if Instant::now() >= deadline {
                Some(Dynamic::from(TERMINATED_TIMEOUT.to_string()))
            } else {
                None
            }
        });

        engine
    }
}

fn map_eval_error(error: EvalAltResult, timeout: Duration, cancel: &CancellationToken) -> ChainError {
    match error {
        EvalAltResult::ErrorTerminated(token, _) => {
            if token.to_string() == TERMINATED_CANCELLED {
                ChainError::cancelled(cancel.reason().unwrap_or(CancelReason::Cancelled))
            } else {
                ChainError::bounds(format!(
                    "code step exceeded {}ms",
                    timeout.as_millis()
                ))
            }
        }
        EvalAltResult::ErrorParsing(parse, position) => {
            ChainError::configuration(format!("script syntax error: {} ({})", parse, position))
        }
        other => ChainError::external("sandbox", other.to_string()),
    }
}

fn run_script(
    engine: &Engine,
    code: &str,
    variables: Map<String, Value>,
) -> Result<Value, Box<EvalAltResult>> {
    let mut scope = Scope::new();
    for (name, value) in variables {
        if is_valid_identifier(&name) {
            scope.push_constant_dynamic(name, rhai::serde::to_dynamic(&value)?);
        }
    }

    let result: Dynamic = engine.eval_with_scope(&mut scope, code)?;
    rhai::serde::from_dynamic(&result)
}

#[async_trait]
impl CodeSandbox for RhaiSandbox {
    async fn execute(
        &self,
        code: &str,
        variables: Map<String, Value>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Value, ChainError> {
        let deadline = Instant::now() + timeout;
        let engine = self.engine(deadline, cancel.clone());
        let code = code.to_string();

        let handle = tokio::task::spawn_blocking(move || run_script(&engine, &code, variables));

        // The engine polls the token itself; awaiting through `run` only
        // returns early, the blocking task stops at its next progress check.
        let joined = cancel.run(async { Ok(handle.await) }).await?;
        joined
            .map_err(|e| ChainError::external("sandbox", format!("script task failed: {}", e)))?
            .map_err(|e| map_eval_error(*e, timeout, &cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn run(code: &str, variables: Value) -> Result<Value, ChainError> {
        RhaiSandbox::default()
            .execute(code, vars(variables), Duration::from_secs(2), CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn test_returns_expression_value() {
        let result = run("sum + item", json!({"sum": 3, "item": 3})).await.unwrap();
        assert_eq!(result, json!(6));
    }

    #[tokio::test]
    async fn test_structured_values_round_trip() {
        let result = run(
            r#"#{ count: items.len(), first: items[0].name }"#,
            json!({"items": [{"name": "a"}, {"name": "b"}]}),
        )
        .await
        .unwrap();
        assert_eq!(result, json!({"count": 2, "first": "a"}));
    }

    #[tokio::test]
    async fn test_variables_are_read_only() {
        let result = run("total = 5; total", json!({"total": 1})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_syntax_error_is_configuration() {
        let err = run("let x = ;", json!({})).await.unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_infinite_loop_hits_deadline() {
        let err = RhaiSandbox::default()
            .execute("loop {}", Map::new(), Duration::from_millis(50), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Bounds(_)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_script() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel(CancelReason::Cancelled);
        });

        let err = RhaiSandbox::default()
            .execute("loop {}", Map::new(), Duration::from_secs(10), token)
            .await
            .unwrap_err();
        assert_eq!(err, ChainError::cancelled(CancelReason::Cancelled));
    }

    #[tokio::test]
    async fn test_unit_result_is_null() {
        assert_eq!(run("let x = 1;", json!({})).await.unwrap(), Value::Null);
    }
}
