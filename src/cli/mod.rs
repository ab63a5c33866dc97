//! CLI for the prompt chain engine
//!
//! - `serve`: HTTP API plus the cron scheduler
//! - `run`: execute one chain file locally and print its execution record
//! - `validate`: check a chain file without running it

pub mod run;
pub mod serve;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::domain::chain::ChainDefinition;
use crate::infrastructure::logging;

/// Prompt Chain Engine - multi-step AI prompt chains with branching, loops and approvals
#[derive(Parser)]
#[command(name = "prompt-chain-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API and scheduler
    Serve,

    /// Execute a chain definition file and print the final record
    Run(run::RunArgs),

    /// Validate a chain definition file
    Validate(validate::ValidateArgs),
}

/// Load configuration and install logging; shared by every subcommand
fn bootstrap() -> AppConfig {
    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);
    config
}

async fn read_chain(path: &Path) -> anyhow::Result<ChainDefinition> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading chain file {}", path.display()))?;

    serde_json::from_str(&raw).with_context(|| format!("parsing chain file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::try_parse_from([
            "prompt-chain-engine",
            "run",
            "--chain",
            "chain.json",
            "--inputs",
            r#"{"topic":"tides"}"#,
        ])
        .unwrap();

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.chain.to_str(), Some("chain.json"));
                assert_eq!(args.inputs.as_deref(), Some(r#"{"topic":"tides"}"#));
                assert!(args.prompts.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_validate_requires_chain() {
        assert!(Cli::try_parse_from(["prompt-chain-engine", "validate"]).is_err());
    }

    #[tokio::test]
    async fn test_read_chain_reports_path_on_error() {
        let err = read_chain(Path::new("/nonexistent/chain.json"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("/nonexistent/chain.json"));
    }
}
