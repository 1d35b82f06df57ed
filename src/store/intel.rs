//! Threat-intel feed and audit log

use rusqlite::{params, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{now_rfc3339, AnalysisStore, StoreError};

/// One OT/ICS threat headline, as synced from the model and curated by analysts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatIntelEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub retrieved_at: String,
    #[serde(default)]
    pub affected_vendors: Vec<String>,
    #[serde(default)]
    pub threat_type: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub industrial_protocols: Vec<String>,
    #[serde(default)]
    pub system_targets: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub site_relevance: Option<String>,
    #[serde(default)]
    pub response_notes: Option<String>,
    #[serde(default)]
    pub llm_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub user: String,
    pub details: Option<Value>,
}

fn decode_list(id: &str, column: &str, raw: Option<String>) -> Vec<String> {
    let Some(text) = raw else {
        return Vec::new();
    };
    match serde_json::from_str(&text) {
        Ok(list) => list,
        Err(err) => {
            tracing::warn!(id, column, error = %err, "corrupt list column in threat intel row");
            Vec::new()
        }
    }
}

impl AnalysisStore {
    // ============================================
    // THREAT INTEL
    // ============================================

    /// Save an entry unless an identical one (same content, any id) exists.
    /// Returns the entry id, or `None` for a duplicate.
    pub fn save_threat_intel(&self, entry: &ThreatIntelEntry) -> Result<Option<String>, StoreError> {
        let vendors = serde_json::to_string(&entry.affected_vendors)?;
        let protocols = serde_json::to_string(&entry.industrial_protocols)?;
        let targets = serde_json::to_string(&entry.system_targets)?;
        let tags = serde_json::to_string(&entry.tags)?;

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let existing = tx.query_row(
            "SELECT id FROM ot_threat_intel
             WHERE title = ?1 AND summary = ?2 AND source = ?3
               AND threat_type IS ?4 AND severity IS ?5
               AND affected_vendors = ?6 AND industrial_protocols = ?7
               AND system_targets = ?8 AND tags = ?9
             LIMIT 1",
            params![
                entry.title,
                entry.summary,
                entry.source,
                entry.threat_type,
                entry.severity,
                vendors,
                protocols,
                targets,
                tags,
            ],
            |row| row.get::<_, String>(0),
        );
        match existing {
            Ok(existing_id) => {
                tracing::debug!(title = %entry.title, existing_id = %existing_id, "duplicate threat intel entry");
                return Ok(None);
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }

        tx.execute(
            "INSERT INTO ot_threat_intel
             (id, title, summary, source, retrieved_at, affected_vendors, threat_type, severity,
              industrial_protocols, system_targets, tags, created_at, updated_at,
              site_relevance, response_notes, llm_response)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.id,
                entry.title,
                entry.summary,
                entry.source,
                entry.retrieved_at,
                vendors,
                entry.threat_type,
                entry.severity,
                protocols,
                targets,
                tags,
                entry.created_at,
                entry.updated_at,
                entry.site_relevance,
                entry.response_notes,
                entry.llm_response,
            ],
        )?;
        tx.commit()?;

        tracing::info!(id = %entry.id, title = %entry.title, "saved threat intel entry");
        Ok(Some(entry.id.clone()))
    }

    pub fn list_threat_intel(&self) -> Result<Vec<ThreatIntelEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, summary, source, retrieved_at, affected_vendors, threat_type, severity,
                    industrial_protocols, system_targets, tags, created_at, updated_at,
                    site_relevance, response_notes, llm_response
             FROM ot_threat_intel
             ORDER BY retrieved_at DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            Ok(ThreatIntelEntry {
                title: row.get(1)?,
                summary: row.get(2)?,
                source: row.get(3)?,
                retrieved_at: row.get(4)?,
                affected_vendors: decode_list(&id, "affected_vendors", row.get(5)?),
                threat_type: row.get(6)?,
                severity: row.get(7)?,
                industrial_protocols: decode_list(&id, "industrial_protocols", row.get(8)?),
                system_targets: decode_list(&id, "system_targets", row.get(9)?),
                tags: decode_list(&id, "tags", row.get(10)?),
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
                site_relevance: row.get(13)?,
                response_notes: row.get(14)?,
                llm_response: row.get(15)?,
                id,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Replace the analyst-curated fields of an entry and audit the change.
    /// Returns whether the entry exists.
    pub fn update_threat_intel_curation(
        &self,
        id: &str,
        tags: &[String],
        site_relevance: Option<&str>,
        response_notes: Option<&str>,
        user: &str,
    ) -> Result<bool, StoreError> {
        let affected = self.conn.execute(
            "UPDATE ot_threat_intel
             SET tags = ?, site_relevance = ?, response_notes = ?, updated_at = ?
             WHERE id = ?",
            params![
                serde_json::to_string(tags)?,
                site_relevance,
                response_notes,
                now_rfc3339(),
                id
            ],
        )?;
        if affected == 0 {
            tracing::debug!(id, "no threat intel entry to curate");
            return Ok(false);
        }

        self.log_audit(
            "curation_update",
            user,
            Some(&serde_json::json!({
                "id": id,
                "tags": tags,
                "site_relevance": site_relevance,
            })),
        )?;

        Ok(true)
    }

    /// Most recent `retrieved_at`, if anything was ever synced
    pub fn threat_intel_last_sync(&self) -> Result<Option<String>, StoreError> {
        let last = self
            .conn
            .query_row("SELECT MAX(retrieved_at) FROM ot_threat_intel", [], |row| {
                row.get::<_, Option<String>>(0)
            })?;
        Ok(last)
    }

    pub fn clear_threat_intel(&self) -> Result<usize, StoreError> {
        let removed = self.conn.execute("DELETE FROM ot_threat_intel", [])?;
        tracing::info!(removed, "cleared threat intel");
        Ok(removed)
    }

    // ============================================
    // AUDIT LOG
    // ============================================

    pub fn log_audit(&self, action: &str, user: &str, details: Option<&Value>) -> Result<i64, StoreError> {
        let details = details.map(|d| serde_json::to_string(d)).transpose()?;
        self.conn.execute(
            "INSERT INTO audit_log (timestamp, action, user, details) VALUES (?, ?, ?, ?)",
            params![now_rfc3339(), action, user, details],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest first
    pub fn list_audit(&self, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, action, user, details
             FROM audit_log
             ORDER BY id DESC
             LIMIT ?",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let details: Option<String> = row.get(4)?;
            Ok(AuditEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                action: row.get(2)?,
                user: row.get(3)?,
                // Free text written by hand stays readable.
                details: details.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text))),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(id: &str, retrieved_at: &str) -> ThreatIntelEntry {
        ThreatIntelEntry {
            id: id.to_string(),
            title: "S7 PLC malware campaign".to_string(),
            summary: "Targets S7-1500 controllers".to_string(),
            source: "CISA".to_string(),
            retrieved_at: retrieved_at.to_string(),
            affected_vendors: vec!["Siemens".to_string()],
            threat_type: Some("PLC malware".to_string()),
            severity: None,
            industrial_protocols: vec!["S7".to_string()],
            system_targets: vec!["PLC".to_string()],
            tags: vec!["ICS".to_string()],
            created_at: retrieved_at.to_string(),
            updated_at: retrieved_at.to_string(),
            ..ThreatIntelEntry::default()
        }
    }

    #[test]
    fn test_save_deduplicates_on_content() {
        let store = AnalysisStore::open_in_memory().unwrap();
        assert_eq!(
            store.save_threat_intel(&entry("a", "2025-01-01T00:00:00Z")).unwrap(),
            Some("a".to_string())
        );
        // Same content under a new id, NULL severity on both sides.
        assert_eq!(store.save_threat_intel(&entry("b", "2025-02-01T00:00:00Z")).unwrap(), None);

        let mut different = entry("c", "2025-02-01T00:00:00Z");
        different.severity = Some("High".to_string());
        assert_eq!(store.save_threat_intel(&different).unwrap(), Some("c".to_string()));

        assert_eq!(store.list_threat_intel().unwrap().len(), 2);
    }

    #[test]
    fn test_list_and_last_sync() {
        let store = AnalysisStore::open_in_memory().unwrap();
        assert_eq!(store.threat_intel_last_sync().unwrap(), None);

        store.save_threat_intel(&entry("old", "2025-01-01T00:00:00Z")).unwrap();
        let mut newer = entry("new", "2025-03-01T00:00:00Z");
        newer.title = "Modbus exposure".to_string();
        store.save_threat_intel(&newer).unwrap();

        let listed = store.list_threat_intel().unwrap();
        assert_eq!(listed[0].id, "new");
        assert_eq!(listed[1], entry("old", "2025-01-01T00:00:00Z"));
        assert_eq!(
            store.threat_intel_last_sync().unwrap().as_deref(),
            Some("2025-03-01T00:00:00Z")
        );
    }

    #[test]
    fn test_corrupt_list_column_degrades_to_empty() {
        let store = AnalysisStore::open_in_memory().unwrap();
        store.save_threat_intel(&entry("a", "2025-01-01T00:00:00Z")).unwrap();
        store
            .conn
            .execute("UPDATE ot_threat_intel SET tags = 'oops' WHERE id = 'a'", [])
            .unwrap();

        let listed = store.list_threat_intel().unwrap();
        assert!(listed[0].tags.is_empty());
        assert_eq!(listed[0].affected_vendors, vec!["Siemens".to_string()]);
    }

    #[test]
    fn test_curation_update_is_audited() {
        let store = AnalysisStore::open_in_memory().unwrap();
        store.save_threat_intel(&entry("a", "2025-01-01T00:00:00Z")).unwrap();

        let found = store
            .update_threat_intel_curation("a", &["relevant".to_string()], Some("line 3"), Some("patched"), "alice")
            .unwrap();
        assert!(found);

        let listed = store.list_threat_intel().unwrap();
        assert_eq!(listed[0].tags, vec!["relevant".to_string()]);
        assert_eq!(listed[0].site_relevance.as_deref(), Some("line 3"));
        assert_eq!(listed[0].response_notes.as_deref(), Some("patched"));
        assert_ne!(listed[0].updated_at, "2025-01-01T00:00:00Z");

        let audit = store.list_audit(10).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "curation_update");
        assert_eq!(audit[0].user, "alice");
        assert_eq!(
            audit[0].details,
            Some(json!({"id": "a", "tags": ["relevant"], "site_relevance": "line 3"}))
        );

        assert!(!store
            .update_threat_intel_curation("missing", &[], None, None, "alice")
            .unwrap());
        assert_eq!(store.list_audit(10).unwrap().len(), 1);
    }

    #[test]
    fn test_clear_threat_intel() {
        let store = AnalysisStore::open_in_memory().unwrap();
        store.save_threat_intel(&entry("a", "2025-01-01T00:00:00Z")).unwrap();
        assert_eq!(store.clear_threat_intel().unwrap(), 1);
        assert!(store.list_threat_intel().unwrap().is_empty());
    }

    #[test]
    fn test_audit_newest_first_with_limit() {
        let store = AnalysisStore::open_in_memory().unwrap();
        store.log_audit("first", "system", None).unwrap();
        store.log_audit("second", "system", Some(&json!({"n": 2}))).unwrap();
        store.log_audit("third", "system", None).unwrap();

        let audit = store.list_audit(2).unwrap();
        let actions: Vec<&str> = audit.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["third", "second"]);
        assert_eq!(audit[1].details, Some(json!({"n": 2})));
        assert_eq!(audit[0].details, None);
    }
}
