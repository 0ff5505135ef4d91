//! Query audit trail.
//!
//! The engine hands every successful query and its result to an
//! [`AuditSink`] after the fact. Sink failures are logged by the engine and
//! never reach the caller.

mod sqlite;

pub use sqlite::{AuditRecord, SqliteAuditSink};

use std::sync::Arc;

use crate::config::{AuditConfig, AuditSinkKind};
use crate::error::Result;
use crate::query::{GraphQuery, GraphResult};

/// Fire-and-forget recorder of executed queries.
pub trait AuditSink: Send + Sync {
    fn record(&self, query: &GraphQuery, result: &GraphResult) -> Result<()>;
}

/// Writes one `info` log line per query.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, query: &GraphQuery, result: &GraphResult) -> Result<()> {
        log::info!(
            target: "relgraph::audit",
            "{} start={} entities={} relationships={} cached={} elapsed_ms={}",
            query.query_type,
            query.start_entity,
            result.summary.entity_count,
            result.summary.relationship_count,
            result.summary.cached,
            result.summary.elapsed_ms
        );
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _query: &GraphQuery, _result: &GraphResult) -> Result<()> {
        Ok(())
    }
}

/// Build the sink selected by `[audit]`.
pub fn sink_from_config(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    Ok(match config.sink {
        AuditSinkKind::Log => Arc::new(LogAuditSink),
        AuditSinkKind::Sqlite => Arc::new(SqliteAuditSink::open(&config.db_path)?),
        AuditSinkKind::None => Arc::new(NoopAuditSink),
    })
}
