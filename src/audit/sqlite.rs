//! SQLite-backed audit sink.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::error::{GraphError, Result};
use crate::query::{GraphQuery, GraphResult};

/// One row of the `query_audit` table.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub operation_id: String,
    pub timestamp: String,
    pub query_type: String,
    pub start_entity: String,
    pub query_json: String,
    pub entity_count: i64,
    pub relationship_count: i64,
    pub elapsed_ms: i64,
    pub cached: bool,
}

/// Appends every executed query to a local SQLite table.
pub struct SqliteAuditSink {
    conn: Mutex<Connection>,
}

impl SqliteAuditSink {
    /// Open (or create) the audit database and its table
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(GraphError::Database)?;

        // WAL so readers (e.g. a stats command) don't block the engine's writes
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA temp_store = MEMORY;",
        )?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS query_audit (
                operation_id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                query_type TEXT NOT NULL,
                start_entity TEXT NOT NULL,
                query_json TEXT NOT NULL,
                entity_count INTEGER NOT NULL,
                relationship_count INTEGER NOT NULL,
                elapsed_ms INTEGER NOT NULL,
                cached INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_query_audit_timestamp ON query_audit(timestamp);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT operation_id, timestamp, query_type, start_entity, query_json, \
                    entity_count, relationship_count, elapsed_ms, cached \
             FROM query_audit ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(AuditRecord {
                operation_id: row.get(0)?,
                timestamp: row.get(1)?,
                query_type: row.get(2)?,
                start_entity: row.get(3)?,
                query_json: row.get(4)?,
                entity_count: row.get(5)?,
                relationship_count: row.get(6)?,
                elapsed_ms: row.get(7)?,
                cached: row.get(8)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, query: &GraphQuery, result: &GraphResult) -> Result<()> {
        let query_json = serde_json::to_string(query)
            .map_err(|e| GraphError::Parse(format!("audit query encode: {}", e)))?;

        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            r#"
            INSERT INTO query_audit (
                operation_id, timestamp, query_type, start_entity, query_json,
                entity_count, relationship_count, elapsed_ms, cached
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                Uuid::new_v4().to_string(),
                Utc::now().to_rfc3339(),
                query.query_type.as_str(),
                query.start_entity,
                query_json,
                result.summary.entity_count as i64,
                result.summary.relationship_count as i64,
                result.summary.elapsed_ms as i64,
                result.summary.cached,
            ],
        )?;
        Ok(())
    }
}
