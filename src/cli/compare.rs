//! Compare and comparison-history commands

use anyhow::{anyhow, Result};
use serde_json::json;
use std::path::Path;

use super::{print_json, replay_transport, ModelArgs};
use crate::compare::Comparator;
use crate::config::Config;
use crate::store::AnalysisStore;

pub async fn run(
    store: &AnalysisStore,
    config: &Config,
    analysis_id: i64,
    baseline_id: i64,
    response: &Path,
    model: &ModelArgs,
) -> Result<()> {
    let transport = replay_transport(response)?;
    let comparator = Comparator::new(
        model.client(&transport, &config.llm),
        store,
        config.llm.max_document_chars,
    );

    let outcome = comparator.compare_records(analysis_id, baseline_id).await?;
    print_json(&json!({
        "comparisonId": outcome.comparison_id,
        "llm_result": outcome.result,
    }))
}

pub fn list_history(
    store: &AnalysisStore,
    analysis_id: Option<i64>,
    baseline_id: Option<i64>,
) -> Result<()> {
    print_json(&store.list_comparisons(analysis_id, baseline_id)?)
}

pub fn get_history(store: &AnalysisStore, id: i64) -> Result<()> {
    let record = store
        .get_comparison(id)?
        .ok_or_else(|| anyhow!("Comparison not found: {}", id))?;
    print_json(&record)
}

pub fn delete_history(store: &AnalysisStore, id: i64) -> Result<()> {
    print_json(&store.delete_comparison(id)?)
}
