//! Run command - execute a chain file in-process and print the execution record
//!
//! The record goes to stdout as JSON; logs go to stderr. A run that does not
//! end in `success` makes the command fail after printing.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;
use serde_json::{Map, Value};
use tracing::info;

use crate::api::v1::prompts::ApiCreatePromptRequest;
use crate::domain::execution::{ExecutionStatus, RunRequest};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Chain definition (JSON)
    #[arg(long)]
    pub chain: PathBuf,

    /// Initial variables as a JSON object
    #[arg(long)]
    pub inputs: Option<String>,

    /// Prompt library (JSON array) for prompt steps and `run_prompt` actions
    #[arg(long)]
    pub prompts: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = super::bootstrap();
    let state = crate::create_app_state(&config)?;

    if let Some(path) = &args.prompts {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading prompt file {}", path.display()))?;
        let prompts: Vec<ApiCreatePromptRequest> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing prompt file {}", path.display()))?;

        for prompt in prompts {
            state.prompt_service.create(prompt.into()).await?;
        }
    }

    let chain = super::read_chain(&args.chain).await?;
    let chain = state.chain_service.create(chain).await?;
    let inputs = parse_inputs(args.inputs.as_deref())?;

    info!(chain_id = %chain.id(), "Running chain");
    let record = state
        .execution_service
        .run_to_completion(chain.id().as_str(), RunRequest::new(inputs))
        .await?;

    println!("{}", serde_json::to_string_pretty(&record)?);

    if record.status() != ExecutionStatus::Success {
        bail!("run {} finished with status {}", record.id(), record.status());
    }
    Ok(())
}

fn parse_inputs(raw: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };

    match serde_json::from_str(raw).context("--inputs is not valid JSON")? {
        Value::Object(inputs) => Ok(inputs),
        other => bail!("--inputs must be a JSON object, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs() {
        assert!(parse_inputs(None).unwrap().is_empty());

        let inputs = parse_inputs(Some(r#"{"topic": "tides", "limit": 3}"#)).unwrap();
        assert_eq!(inputs["limit"], 3);

        assert!(parse_inputs(Some("[1, 2]")).is_err());
        assert!(parse_inputs(Some("{broken")).is_err());
    }
}
