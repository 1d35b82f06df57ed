//! Subcommand handlers. Record output is JSON on stdout.

pub mod analyze;
pub mod compare;
pub mod intel;
pub mod maintenance;
pub mod records;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;

use crate::config::LlmConfig;
use crate::llm::{LlmClient, LlmTransport, StaticTransport};

/// Per-run overrides of the configured provider and model
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Provider label recorded with the result
    #[arg(long)]
    pub provider: Option<String>,
    /// Model name recorded with the result
    #[arg(long)]
    pub model: Option<String>,
}

impl ModelArgs {
    fn client<'a>(&self, transport: &'a dyn LlmTransport, config: &LlmConfig) -> LlmClient<'a> {
        LlmClient::new(transport, config)
            .with_provider(self.provider.clone())
            .with_model(self.model.clone())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Captured model answer to replay through the pipeline
fn replay_transport(response: &Path) -> Result<StaticTransport> {
    StaticTransport::from_file(response)
        .with_context(|| format!("failed to read LLM response from {}", response.display()))
}
