//! Analysis storage with SQLite
//!
//! One store holds analyses, baselines, comparison history, the threat-intel
//! feed and the audit log. Analyses and baselines share the same contract:
//! at most one row per (fileName, filePath, fingerprint), listing by recency,
//! normalization on read, idempotent hard delete.

mod comparisons;
mod intel;
pub mod migrations;
mod records;

pub use comparisons::{ComparisonRecord, NewComparison};
pub use intel::{AuditEntry, ThreatIntelEntry};
pub use records::{AnalysisRecord, BaselineRecord, RecordSummary};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },
}

/// Outcome of a hard delete. Deleting a missing id is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    pub deleted_id: i64,
}

pub struct AnalysisStore {
    conn: Connection,
}

impl AnalysisStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ============================================
    // MAINTENANCE
    // ============================================

    /// Make every analysis payload carry its own row id under `id`.
    /// Returns the number of rows rewritten.
    pub fn backfill_payload_ids(&self) -> Result<usize, StoreError> {
        let rows: Vec<(i64, Option<String>)> = {
            let mut stmt = self.conn.prepare("SELECT id, analysis_json FROM analyses")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let collected = rows.collect::<Result<Vec<_>, _>>()?;
            collected
        };

        let tx = self.conn.unchecked_transaction()?;
        let mut patched = 0;
        for (id, raw) in rows {
            let mut payload = match raw.as_deref().map(serde_json::from_str::<Value>) {
                Some(Ok(Value::Object(map))) => map,
                _ => serde_json::Map::new(),
            };
            if payload.get("id").and_then(Value::as_i64) == Some(id) {
                continue;
            }
            payload.insert("id".to_string(), Value::from(id));
            tx.execute(
                "UPDATE analyses SET analysis_json = ? WHERE id = ?",
                params![Value::Object(payload).to_string(), id],
            )?;
            patched += 1;
        }
        tx.commit()?;

        tracing::info!(patched, "backfilled analysis payload ids");
        Ok(patched)
    }

    /// Delete analyses, baselines, comparisons, threat intel and audit rows.
    pub fn clear_all_data(&self) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM analyses;
             DELETE FROM baselines;
             DELETE FROM comparison_history;
             DELETE FROM ot_threat_intel;
             DELETE FROM audit_log;",
        )?;
        tx.commit()?;
        tracing::warn!("cleared all stored data");
        Ok(())
    }
}

/// Fixed-width UTC timestamp, so text order matches time order
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Whether `err` is a UNIQUE constraint violation (the dedup index firing)
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
