//! Append-only NDJSON log of prompts and responses

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::LlmFailure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub timestamp: String,
    pub prompt: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub success: bool,
    pub provider: String,
    pub model: String,
}

impl InteractionRecord {
    pub fn new(
        prompt: &str,
        outcome: &Result<String, LlmFailure>,
        provider: &str,
        model: &str,
    ) -> Self {
        let (result, error) = match outcome {
            Ok(text) => (Some(text.clone()), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self {
            timestamp: Utc::now().to_rfc3339(),
            prompt: prompt.to_string(),
            success: error.is_none(),
            result,
            error,
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InteractionLog {
    path: PathBuf,
}

impl InteractionLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line
    pub fn append(&self, record: &InteractionRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
