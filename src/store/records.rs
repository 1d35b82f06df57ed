//! Analyses and baselines
//!
//! Both tables follow the same contract, so the SQL is shared and keyed by
//! [`Table`]. Saves are check-then-insert inside an IMMEDIATE transaction,
//! backed by the v3 unique indexes; reads normalize the stored payload.

use rusqlite::types::ValueRef;
use rusqlite::{params, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{is_unique_violation, now_rfc3339, AnalysisStore, Deleted, StoreError};
use crate::analysis::{fingerprint, normalize_value, AnalysisPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Analyses,
    Baselines,
}

impl Table {
    fn as_str(&self) -> &'static str {
        match self {
            Table::Analyses => "analyses",
            Table::Baselines => "baselines",
        }
    }
}

struct NewRow<'a> {
    file_name: &'a str,
    original_name: Option<&'a str>,
    status: Option<&'a str>,
    file_path: Option<&'a str>,
    payload: Option<&'a Value>,
    provider: Option<&'a str>,
    model: Option<&'a str>,
}

// ============================================
// ROW TYPES
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: i64,
    pub file_name: String,
    pub file_path: Option<String>,
    pub date: String,
    pub status: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    #[serde(rename = "analysis_json")]
    pub payload: AnalysisPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineRecord {
    pub id: i64,
    pub file_name: String,
    pub original_name: Option<String>,
    pub file_path: Option<String>,
    pub date: String,
    pub status: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    #[serde(rename = "analysis_json")]
    pub payload: AnalysisPayload,
}

/// Listing row. `payload` is `None` when the stored text is absent or corrupt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: i64,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    pub file_path: Option<String>,
    pub date: String,
    pub status: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    #[serde(rename = "analysis_json")]
    pub payload: Option<Value>,
}

impl AnalysisStore {
    // ============================================
    // ANALYSES
    // ============================================

    /// Save an analysis. `Ok(None)` means an identical record already exists
    /// for this file name and path.
    pub fn save_analysis(
        &self,
        file_name: &str,
        status: &str,
        payload: &Value,
        file_path: Option<&str>,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<Option<i64>, StoreError> {
        self.insert_deduplicated(
            Table::Analyses,
            &NewRow {
                file_name,
                original_name: None,
                status: Some(status),
                file_path,
                payload: Some(payload),
                provider,
                model,
            },
        )
    }

    pub fn get_analysis(&self, id: i64) -> Result<Option<AnalysisRecord>, StoreError> {
        let row = self.conn.query_row(
            "SELECT id, fileName, filePath, date, status, provider, model, analysis_json
             FROM analyses WHERE id = ?",
            params![id],
            |row| {
                Ok(AnalysisRecord {
                    id: row.get(0)?,
                    file_name: row.get(1)?,
                    file_path: row.get(2)?,
                    date: row.get(3)?,
                    status: row.get(4)?,
                    provider: row.get(5)?,
                    model: row.get(6)?,
                    payload: payload_for_read(Table::Analyses, id, stored_payload(row.get_ref(7)?)),
                })
            },
        );

        match row {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_analyses(&self) -> Result<Vec<RecordSummary>, StoreError> {
        self.list_records(Table::Analyses)
    }

    pub fn delete_analysis(&self, id: i64) -> Result<Deleted, StoreError> {
        self.delete_record(Table::Analyses, id)
    }

    // ============================================
    // BASELINES
    // ============================================

    /// Save a baseline. `original_name` defaults to `file_name`.
    pub fn save_baseline(
        &self,
        file_name: &str,
        original_name: Option<&str>,
        file_path: Option<&str>,
        payload: Option<&Value>,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<Option<i64>, StoreError> {
        self.insert_deduplicated(
            Table::Baselines,
            &NewRow {
                file_name,
                original_name: Some(original_name.unwrap_or(file_name)),
                status: Some("baseline"),
                file_path,
                payload,
                provider,
                model,
            },
        )
    }

    pub fn get_baseline(&self, id: i64) -> Result<Option<BaselineRecord>, StoreError> {
        let row = self.conn.query_row(
            "SELECT id, fileName, originalName, filePath, date, status, provider, model, analysis_json
             FROM baselines WHERE id = ?",
            params![id],
            |row| {
                Ok(BaselineRecord {
                    id: row.get(0)?,
                    file_name: row.get(1)?,
                    original_name: row.get(2)?,
                    file_path: row.get(3)?,
                    date: row.get(4)?,
                    status: row.get(5)?,
                    provider: row.get(6)?,
                    model: row.get(7)?,
                    payload: payload_for_read(Table::Baselines, id, stored_payload(row.get_ref(8)?)),
                })
            },
        );

        match row {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_baselines(&self) -> Result<Vec<RecordSummary>, StoreError> {
        self.list_records(Table::Baselines)
    }

    pub fn delete_baseline(&self, id: i64) -> Result<Deleted, StoreError> {
        self.delete_record(Table::Baselines, id)
    }

    // ============================================
    // SHARED
    // ============================================

    fn insert_deduplicated(&self, table: Table, row: &NewRow<'_>) -> Result<Option<i64>, StoreError> {
        // An empty path is the same as no path.
        let file_path = row.file_path.filter(|p| !p.is_empty());
        let hash = fingerprint(row.payload);
        let payload_json = row
            .payload
            .map(|p| serde_json::to_string(p))
            .transpose()?;

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        if let Some(hash) = hash.as_deref() {
            let existing = tx.query_row(
                &format!(
                    "SELECT id FROM {} WHERE fileName = ?1 AND filePath IS ?2 AND analysis_hash = ?3 LIMIT 1",
                    table.as_str()
                ),
                params![row.file_name, file_path, hash],
                |r| r.get::<_, i64>(0),
            );
            match existing {
                Ok(existing_id) => {
                    tracing::debug!(
                        table = table.as_str(),
                        file_name = row.file_name,
                        existing_id,
                        "duplicate content, not inserted"
                    );
                    return Ok(None);
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let date = now_rfc3339();
        let inserted = match table {
            Table::Analyses => tx.execute(
                "INSERT INTO analyses
                 (fileName, date, status, analysis_json, filePath, analysis_hash, provider, model)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    row.file_name,
                    date,
                    row.status,
                    payload_json,
                    file_path,
                    hash,
                    row.provider,
                    row.model,
                ],
            ),
            Table::Baselines => tx.execute(
                "INSERT INTO baselines
                 (fileName, originalName, date, status, analysis_json, filePath, analysis_hash, provider, model)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    row.file_name,
                    row.original_name,
                    date,
                    row.status,
                    payload_json,
                    file_path,
                    hash,
                    row.provider,
                    row.model,
                ],
            ),
        };

        match inserted {
            Ok(_) => {}
            // Another writer got there between our check and insert.
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(table = table.as_str(), file_name = row.file_name, "duplicate rejected by index");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;
        tracing::info!(table = table.as_str(), id, file_name = row.file_name, "saved record");
        Ok(Some(id))
    }

    fn list_records(&self, table: Table) -> Result<Vec<RecordSummary>, StoreError> {
        let original_name = match table {
            Table::Analyses => "NULL",
            Table::Baselines => "originalName",
        };
        let query = format!(
            "SELECT id, fileName, {original_name}, filePath, date, status, provider, model, analysis_json
             FROM {} ORDER BY date DESC, id DESC",
            table.as_str()
        );

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let raw = stored_payload(row.get_ref(8)?);
            Ok(RecordSummary {
                id,
                file_name: row.get(1)?,
                original_name: row.get(2)?,
                file_path: row.get(3)?,
                date: row.get(4)?,
                status: row.get(5)?,
                provider: row.get(6)?,
                model: row.get(7)?,
                payload: payload_for_listing(table, id, raw),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn delete_record(&self, table: Table, id: i64) -> Result<Deleted, StoreError> {
        let affected = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", table.as_str()),
            params![id],
        )?;
        tracing::info!(table = table.as_str(), id, affected, "deleted record");
        Ok(Deleted { deleted_id: id })
    }
}

/// Raw `analysis_json` cell. Bytes that are not UTF-8 are kept lossily so
/// they can be shown, but never parsed as a payload.
enum StoredPayload {
    Missing,
    Text(String),
    NotUtf8(String),
}

fn stored_payload(cell: ValueRef<'_>) -> StoredPayload {
    match cell {
        ValueRef::Null => StoredPayload::Missing,
        ValueRef::Integer(i) => StoredPayload::Text(i.to_string()),
        ValueRef::Real(f) => StoredPayload::Text(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => StoredPayload::Text(text.to_string()),
            Err(_) => StoredPayload::NotUtf8(String::from_utf8_lossy(bytes).into_owned()),
        },
    }
}

/// Stored cell -> canonical payload. Missing text normalizes an empty
/// object; anything unparseable goes through the normalizer's error wrapper.
fn payload_for_read(table: Table, id: i64, raw: StoredPayload) -> AnalysisPayload {
    match raw {
        StoredPayload::Missing => normalize_value(Value::Object(Map::new())),
        StoredPayload::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => normalize_value(value),
            Err(err) => {
                tracing::warn!(table = table.as_str(), id, error = %err, "stored payload is not valid JSON");
                normalize_value(Value::String(text))
            }
        },
        StoredPayload::NotUtf8(lossy) => {
            tracing::warn!(table = table.as_str(), id, "stored payload is not valid UTF-8");
            normalize_value(json!({
                "error": "Failed to parse analysis data",
                "raw_data": lossy,
            }))
        }
    }
}

fn payload_for_listing(table: Table, id: i64, raw: StoredPayload) -> Option<Value> {
    let text = match raw {
        StoredPayload::Missing => return None,
        StoredPayload::Text(text) => text,
        StoredPayload::NotUtf8(_) => {
            tracing::warn!(table = table.as_str(), id, "skipping non-UTF-8 payload in listing");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(table = table.as_str(), id, error = %err, "skipping corrupt payload in listing");
            None
        }
    }
}
