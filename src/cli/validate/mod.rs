//! Validate command - the same checks chains get when saved through the API

use std::path::PathBuf;

use clap::Args;

use crate::domain::chain::{validate_chain, ChainDefinition};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Chain definition (JSON)
    #[arg(long)]
    pub chain: PathBuf,
}

pub async fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let _config = super::bootstrap();
    let chain = super::read_chain(&args.chain).await?;

    println!("{}", check(&chain)?);
    Ok(())
}

fn check(chain: &ChainDefinition) -> anyhow::Result<String> {
    validate_chain(chain)?;

    Ok(format!(
        "chain '{}' is valid ({} top-level steps, trigger {})",
        chain.id(),
        chain.steps().len(),
        chain.trigger()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_check_reports_summary() {
        let chain: ChainDefinition = serde_json::from_value(json!({
            "id": "ok",
            "name": "Ok",
            "steps": [{"id": "a", "type": "code", "config": {"code": "1"}}]
        }))
        .unwrap();

        let summary = assert_ok!(check(&chain));
        assert!(summary.contains("1 top-level steps"));
    }

    #[test]
    fn test_check_surfaces_validation_error() {
        let chain: ChainDefinition = serde_json::from_value(json!({
            "id": "empty",
            "name": "Empty",
            "steps": []
        }))
        .unwrap();

        let err = assert_err!(check(&chain));
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
