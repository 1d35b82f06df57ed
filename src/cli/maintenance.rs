//! Maintenance commands

use anyhow::{bail, Result};
use serde_json::json;

use super::print_json;
use crate::store::AnalysisStore;

pub fn backfill_ids(store: &AnalysisStore) -> Result<()> {
    let patched = store.backfill_payload_ids()?;
    print_json(&json!({ "ok": true, "patched": patched }))
}

pub fn audit(store: &AnalysisStore, limit: usize) -> Result<()> {
    print_json(&store.list_audit(limit)?)
}

pub fn reset(store: &AnalysisStore, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Refusing to delete all stored data without --yes");
    }
    store.clear_all_data()?;
    print_json(&json!({ "ok": true }))
}
