//! OT/ICS threat-intel sync
//!
//! Asks the model for recent headlines as a JSON array, stamps each entry
//! with a fresh id and the sync time, and saves the ones not already known.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::extract::extract_array;
use crate::config::LlmConfig;
use crate::llm::{LlmClient, LlmFailure, LlmTransport};
use crate::store::{AnalysisStore, StoreError, ThreatIntelEntry};

const SYNC_ACTION: &str = "sync_ot_threat_intel";
const SYNC_USER: &str = "system";

const THREAT_INTEL_PROMPT: &str = "Provide the latest 3-5 real-world OT/ICS threat intelligence headlines with details. \
Format the answer as a JSON array of objects with these fields: title, summary, source, affected_vendors (array), \
threat_type, severity, industrial_protocols (array), system_targets (array), tags (array). \
Focus on PLC malware, industrial protocol vulnerabilities and ICS APT activity. Keep summaries concise and OT-relevant.";

#[derive(Debug, Error)]
pub enum IntelError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("response contained no threat intel entries")]
    NoEntries,
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<LlmFailure> for IntelError {
    fn from(failure: LlmFailure) -> Self {
        match failure {
            LlmFailure::Provider(message) => IntelError::Provider(message),
            LlmFailure::Timeout(after) => IntelError::Timeout(after),
        }
    }
}

/// Fetch and store a batch of entries. Returns how many were new.
pub async fn sync(
    transport: &dyn LlmTransport,
    store: &AnalysisStore,
    config: &LlmConfig,
) -> Result<usize, IntelError> {
    let client = LlmClient::new(transport, config);

    let text = match client.generate(None, THREAT_INTEL_PROMPT).await {
        Ok(text) => text,
        Err(failure) => {
            store.log_audit(
                SYNC_ACTION,
                SYNC_USER,
                Some(&json!({"source": client.provider(), "error": failure.to_string()})),
            )?;
            return Err(failure.into());
        }
    };

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let entries = parse_entries(&text, &now, client.provider());
    if entries.is_empty() {
        store.log_audit(
            SYNC_ACTION,
            SYNC_USER,
            Some(&json!({"source": client.provider(), "error": "no entries in response"})),
        )?;
        return Err(IntelError::NoEntries);
    }

    let mut new_entries = 0;
    for entry in &entries {
        if store.save_threat_intel(entry)?.is_some() {
            new_entries += 1;
        }
    }

    store.log_audit(
        SYNC_ACTION,
        SYNC_USER,
        Some(&json!({
            "source": client.provider(),
            "prompt": THREAT_INTEL_PROMPT,
            "received": entries.len(),
            "new_entries": new_entries,
        })),
    )?;
    tracing::info!(received = entries.len(), new_entries, "threat intel sync complete");

    Ok(new_entries)
}

/// Entries in a model answer: the whole text as a JSON array, or the first
/// fenced array inside it. Objects without a title are skipped.
pub fn parse_entries(text: &str, now: &str, default_source: &str) -> Vec<ThreatIntelEntry> {
    let items = match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Array(items)) => items,
        _ => extract_array(text).unwrap_or_default(),
    };

    items
        .iter()
        .filter_map(|item| entry_from_value(item, now, default_source, text))
        .collect()
}

fn entry_from_value(
    value: &Value,
    now: &str,
    default_source: &str,
    llm_response: &str,
) -> Option<ThreatIntelEntry> {
    let object = value.as_object()?;
    let title = string_field(object.get("title"))?;

    Some(ThreatIntelEntry {
        id: Uuid::new_v4().to_string(),
        title,
        summary: string_field(object.get("summary")).unwrap_or_default(),
        source: string_field(object.get("source")).unwrap_or_else(|| default_source.to_string()),
        retrieved_at: now.to_string(),
        affected_vendors: list_field(object.get("affected_vendors").or(object.get("vendors"))),
        threat_type: string_field(object.get("threat_type")),
        severity: string_field(object.get("severity")),
        industrial_protocols: list_field(object.get("industrial_protocols").or(object.get("protocols"))),
        system_targets: list_field(object.get("system_targets").or(object.get("targets"))),
        tags: list_field(object.get("tags")),
        created_at: now.to_string(),
        updated_at: now.to_string(),
        site_relevance: None,
        response_notes: None,
        llm_response: Some(llm_response.to_string()),
    })
}

fn string_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Arrays of strings, or a single comma-separated string
fn list_field(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| string_field(Some(item)))
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
