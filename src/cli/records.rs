//! Analysis and baseline record commands

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

use super::print_json;
use crate::store::AnalysisStore;

fn parse_payload(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("payload is not valid JSON")
}

fn print_saved(id: Option<i64>) -> Result<()> {
    if id.is_none() {
        eprintln!("Identical record already stored; not saved.");
    }
    print_json(&json!({ "id": id }))
}

// ============================================
// ANALYSES
// ============================================

pub fn list_analyses(store: &AnalysisStore) -> Result<()> {
    print_json(&store.list_analyses()?)
}

pub fn get_analysis(store: &AnalysisStore, id: i64) -> Result<()> {
    let record = store
        .get_analysis(id)?
        .ok_or_else(|| anyhow!("Analysis not found: {}", id))?;
    print_json(&record)
}

pub fn delete_analysis(store: &AnalysisStore, id: i64) -> Result<()> {
    print_json(&store.delete_analysis(id)?)
}

pub fn save_analysis(
    store: &AnalysisStore,
    file_name: &str,
    status: &str,
    payload: &str,
    path: Option<&str>,
) -> Result<()> {
    let payload = parse_payload(payload)?;
    print_saved(store.save_analysis(file_name, status, &payload, path, None, None)?)
}

// ============================================
// BASELINES
// ============================================

pub fn list_baselines(store: &AnalysisStore) -> Result<()> {
    print_json(&store.list_baselines()?)
}

pub fn get_baseline(store: &AnalysisStore, id: i64) -> Result<()> {
    let record = store
        .get_baseline(id)?
        .ok_or_else(|| anyhow!("Baseline not found: {}", id))?;
    print_json(&record)
}

pub fn delete_baseline(store: &AnalysisStore, id: i64) -> Result<()> {
    print_json(&store.delete_baseline(id)?)
}

pub fn save_baseline(
    store: &AnalysisStore,
    file_name: &str,
    original_name: Option<&str>,
    path: Option<&str>,
    payload: Option<&str>,
) -> Result<()> {
    let payload = payload.map(parse_payload).transpose()?;
    print_saved(store.save_baseline(file_name, original_name, path, payload.as_ref(), None, None)?)
}
