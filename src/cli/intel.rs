//! Threat-intel commands

use anyhow::Result;
use serde_json::json;
use std::path::Path;

use super::{print_json, replay_transport};
use crate::config::Config;
use crate::store::AnalysisStore;

pub fn list(store: &AnalysisStore) -> Result<()> {
    print_json(&store.list_threat_intel()?)
}

pub async fn sync(store: &AnalysisStore, config: &Config, response: &Path) -> Result<()> {
    let transport = replay_transport(response)?;
    let new_entries = crate::intel::sync(&transport, store, &config.llm).await?;
    print_json(&json!({ "ok": true, "new_entries": new_entries }))
}

pub fn last_sync(store: &AnalysisStore) -> Result<()> {
    print_json(&store.threat_intel_last_sync()?)
}

pub fn curate(
    store: &AnalysisStore,
    id: &str,
    tags: Vec<String>,
    site_relevance: Option<&str>,
    response_notes: Option<&str>,
    user: &str,
) -> Result<()> {
    let found = store.update_threat_intel_curation(id, &tags, site_relevance, response_notes, user)?;
    if !found {
        anyhow::bail!("Threat intel entry not found: {}", id);
    }
    print_json(&json!({ "ok": true, "id": id }))
}

pub fn clear(store: &AnalysisStore) -> Result<()> {
    let removed = store.clear_threat_intel()?;
    print_json(&json!({ "ok": true, "removed": removed }))
}
