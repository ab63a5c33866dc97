//! Code sandbox contract

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::chain::{CancellationToken, ChainError};

/// Executes user code against a read-only snapshot of the run variables.
///
/// The returned value becomes the step output. Implementations must give up
/// once `timeout` elapses or `cancel` fires.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        variables: Map<String, Value>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Value, ChainError>;
}
