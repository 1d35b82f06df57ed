//! SQLite schema, versioned with PRAGMA user_version
//!
//! v1: analyses, baselines, comparison_history
//! v2: ot_threat_intel, audit_log
//! v3: storage-level uniqueness for (fileName, filePath, analysis_hash)

use rusqlite::Connection;

use super::StoreError;

const V001_RECORDS: &str = r#"
-- ============================================
-- ANALYSES & BASELINES
-- ============================================

CREATE TABLE IF NOT EXISTS analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fileName TEXT NOT NULL,
    date TEXT NOT NULL,                    -- RFC 3339, UTC
    status TEXT,
    analysis_json TEXT,                    -- payload as written by the pipeline
    filePath TEXT,                         -- NULL when content was supplied inline
    analysis_hash TEXT,                    -- sha256 fingerprint, dedup only
    provider TEXT,
    model TEXT
);

CREATE TABLE IF NOT EXISTS baselines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fileName TEXT NOT NULL,
    originalName TEXT,                     -- name of the file at capture time
    date TEXT NOT NULL,
    status TEXT,
    filePath TEXT,
    analysis_json TEXT,
    analysis_hash TEXT,
    provider TEXT,
    model TEXT
);

-- ============================================
-- COMPARISONS
-- ============================================

-- analysisId / baselineId are weak references: no foreign keys, no cascade.
-- File names are captured at comparison time so the label outlives the source.
CREATE TABLE IF NOT EXISTS comparison_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    analysisId INTEGER,
    baselineId INTEGER,
    timestamp TEXT NOT NULL,
    llm_prompt TEXT NOT NULL,
    llm_result TEXT NOT NULL,
    analysisFileName TEXT,
    baselineFileName TEXT,
    provider TEXT,
    model TEXT
);

CREATE INDEX IF NOT EXISTS idx_analyses_date ON analyses(date DESC);
CREATE INDEX IF NOT EXISTS idx_baselines_date ON baselines(date DESC);
CREATE INDEX IF NOT EXISTS idx_comparisons_analysis ON comparison_history(analysisId);
CREATE INDEX IF NOT EXISTS idx_comparisons_baseline ON comparison_history(baselineId);
CREATE INDEX IF NOT EXISTS idx_comparisons_timestamp ON comparison_history(timestamp DESC);
"#;

const V002_INTEL: &str = r#"
-- ============================================
-- THREAT INTEL & AUDIT
-- ============================================

CREATE TABLE IF NOT EXISTS ot_threat_intel (
    id TEXT PRIMARY KEY,                   -- UUID
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    source TEXT NOT NULL,
    retrieved_at TEXT NOT NULL,
    affected_vendors TEXT NOT NULL DEFAULT '[]',      -- JSON array
    threat_type TEXT,
    severity TEXT,
    industrial_protocols TEXT NOT NULL DEFAULT '[]',  -- JSON array
    system_targets TEXT NOT NULL DEFAULT '[]',        -- JSON array
    tags TEXT NOT NULL DEFAULT '[]',                  -- JSON array
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    site_relevance TEXT,
    response_notes TEXT,
    llm_response TEXT
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    action TEXT NOT NULL,
    user TEXT NOT NULL,
    details TEXT                           -- JSON
);

CREATE INDEX IF NOT EXISTS idx_intel_retrieved ON ot_threat_intel(retrieved_at DESC);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp DESC);
"#;

const V003_DEDUP_INDEXES: &str = r#"
-- Collapse duplicates that slipped past the check-then-insert, keeping the oldest row.
DELETE FROM analyses
WHERE analysis_hash IS NOT NULL
  AND id NOT IN (
      SELECT MIN(id) FROM analyses
      WHERE analysis_hash IS NOT NULL
      GROUP BY fileName, IFNULL(filePath, ''), analysis_hash
  );

DELETE FROM baselines
WHERE analysis_hash IS NOT NULL
  AND id NOT IN (
      SELECT MIN(id) FROM baselines
      WHERE analysis_hash IS NOT NULL
      GROUP BY fileName, IFNULL(filePath, ''), analysis_hash
  );

-- NULL hashes stay distinct under UNIQUE, so payloads without a fingerprint never collide.
CREATE UNIQUE INDEX IF NOT EXISTS idx_analyses_dedup
    ON analyses(fileName, IFNULL(filePath, ''), analysis_hash);
CREATE UNIQUE INDEX IF NOT EXISTS idx_baselines_dedup
    ON baselines(fileName, IFNULL(filePath, ''), analysis_hash);
"#;

const MIGRATIONS: &[(&str, u32)] = &[(V001_RECORDS, 1), (V002_INTEL, 2), (V003_DEDUP_INDEXES, 3)];

/// Latest schema version this build knows about
pub const LATEST_VERSION: u32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    apply(conn, MIGRATIONS)
}

/// Each step and its `user_version` bump commit together, so a failed step
/// leaves the schema at the previous version.
fn apply(conn: &Connection, steps: &[(&str, u32)]) -> Result<(), StoreError> {
    let current = current_version(conn)?;

    for (sql, version) in steps {
        if current >= *version {
            continue;
        }
        apply_step(conn, sql, *version).map_err(|e| StoreError::Migration {
            version: *version,
            message: e.to_string(),
        })?;
        tracing::info!(version = version, "applied migration");
    }

    Ok(())
}

fn apply_step(conn: &Connection, sql: &str, version: u32) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()
}

/// Get the current schema version.
pub fn current_version(conn: &Connection) -> Result<u32, StoreError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: e.to_string(),
        })
}
