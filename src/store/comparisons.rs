//! Comparison history

use rusqlite::params;
use serde::Serialize;

use super::{now_rfc3339, AnalysisStore, Deleted, StoreError};

/// A comparison about to be recorded. File names are captured by the caller
/// so the label survives deletion of either source.
#[derive(Debug, Clone, Copy)]
pub struct NewComparison<'a> {
    pub analysis_id: Option<i64>,
    pub baseline_id: Option<i64>,
    pub analysis_file_name: Option<&'a str>,
    pub baseline_file_name: Option<&'a str>,
    pub prompt: &'a str,
    pub result: &'a str,
    pub provider: Option<&'a str>,
    pub model: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRecord {
    pub id: i64,
    pub analysis_id: Option<i64>,
    pub baseline_id: Option<i64>,
    pub timestamp: String,
    #[serde(rename = "llm_prompt")]
    pub prompt: String,
    #[serde(rename = "llm_result")]
    pub result: String,
    pub analysis_file_name: Option<String>,
    pub baseline_file_name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

const COMPARISON_COLUMNS: &str = "id, analysisId, baselineId, timestamp, llm_prompt, llm_result,
     analysisFileName, baselineFileName, provider, model";

fn row_to_comparison(row: &rusqlite::Row<'_>) -> rusqlite::Result<ComparisonRecord> {
    Ok(ComparisonRecord {
        id: row.get(0)?,
        analysis_id: row.get(1)?,
        baseline_id: row.get(2)?,
        timestamp: row.get(3)?,
        prompt: row.get(4)?,
        result: row.get(5)?,
        analysis_file_name: row.get(6)?,
        baseline_file_name: row.get(7)?,
        provider: row.get(8)?,
        model: row.get(9)?,
    })
}

impl AnalysisStore {
    // ============================================
    // COMPARISONS
    // ============================================

    pub fn save_comparison(&self, comparison: &NewComparison<'_>) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO comparison_history
             (analysisId, baselineId, timestamp, llm_prompt, llm_result,
              analysisFileName, baselineFileName, provider, model)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                comparison.analysis_id,
                comparison.baseline_id,
                now_rfc3339(),
                comparison.prompt,
                comparison.result,
                comparison.analysis_file_name,
                comparison.baseline_file_name,
                comparison.provider,
                comparison.model,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(
            id,
            analysis_id = comparison.analysis_id,
            baseline_id = comparison.baseline_id,
            "recorded comparison"
        );
        Ok(id)
    }

    pub fn get_comparison(&self, id: i64) -> Result<Option<ComparisonRecord>, StoreError> {
        let result = self.conn.query_row(
            &format!("SELECT {COMPARISON_COLUMNS} FROM comparison_history WHERE id = ?"),
            params![id],
            row_to_comparison,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Newest first. Either filter may be omitted.
    pub fn list_comparisons(
        &self,
        analysis_id: Option<i64>,
        baseline_id: Option<i64>,
    ) -> Result<Vec<ComparisonRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMPARISON_COLUMNS} FROM comparison_history
             WHERE (?1 IS NULL OR analysisId = ?1)
               AND (?2 IS NULL OR baselineId = ?2)
             ORDER BY timestamp DESC, id DESC"
        ))?;

        let rows = stmt.query_map(params![analysis_id, baseline_id], row_to_comparison)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_comparison(&self, id: i64) -> Result<Deleted, StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM comparison_history WHERE id = ?", params![id])?;
        tracing::info!(id, affected, "deleted comparison");
        Ok(Deleted { deleted_id: id })
    }
}
