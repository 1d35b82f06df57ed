//! Analyze command implementation

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use super::{print_json, replay_transport, ModelArgs};
use crate::analysis::Analyzer;
use crate::config::Config;
use crate::store::AnalysisStore;

pub async fn run(
    store: &AnalysisStore,
    config: &Config,
    file: &Path,
    response: &Path,
    save: bool,
    status: &str,
    model: &ModelArgs,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let transport = replay_transport(response)?;
    let analyzer = Analyzer::new(
        model.client(&transport, &config.llm),
        config.llm.max_document_chars,
    );
    let payload = analyzer.analyze(&file_name, &content).await;

    if !save {
        return print_json(&payload);
    }

    let file_path = file.to_string_lossy();
    let id = store.save_analysis(
        &file_name,
        status,
        &payload.to_value(),
        Some(&*file_path),
        Some(analyzer.provider()),
        Some(analyzer.model()),
    )?;
    if id.is_none() {
        eprintln!("Identical analysis of '{}' already stored; not saved.", file_name);
    }

    print_json(&json!({ "id": id, "analysis_json": payload }))
}
