//! Auto-discovery: periodic population of the store from outside sources.
//!
//! A [`SourceLoader`] produces a [`SeedBatch`]; [`apply_batch`] feeds it
//! through the engine's ordinary write path, and [`DiscoveryWorker`] repeats
//! that on a timer until told to stop.

mod loader;

pub use loader::DirectoryLoader;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::graph::{NewEntity, NewRelationship};
use crate::query::QueryEngine;

/// Entities and relationships to add, as found in a seed file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedBatch {
    #[serde(default)]
    pub entities: Vec<NewEntity>,
    #[serde(default)]
    pub relationships: Vec<NewRelationship>,
}

impl SeedBatch {
    pub fn extend(&mut self, other: SeedBatch) {
        self.entities.extend(other.entities);
        self.relationships.extend(other.relationships);
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Source of truth for entities this engine does not own.
pub trait SourceLoader: Send + Sync {
    fn load(&self) -> Result<SeedBatch>;
}

/// Outcome of one [`apply_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub entities_added: usize,
    pub entities_skipped: usize,
    pub relationships_added: usize,
    pub relationships_skipped: usize,
}

/// Stable id for a relationship declared without one, so repeated passes
/// over the same seed do not add it twice.
fn derived_relationship_id(rel: &NewRelationship) -> String {
    format!("{}:{}:{}", rel.source_id, rel.relationship_type, rel.target_id)
}

/// Add a batch through the engine's write path.
///
/// Entities must carry an id; ids already in the store are skipped, as are
/// relationships the store refuses (unknown endpoint, bad strength).
pub fn apply_batch(engine: &QueryEngine, batch: SeedBatch) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    for entity in batch.entities {
        let id = match &entity.id {
            Some(id) => id.clone(),
            None => {
                log::warn!("discovery: skipping entity {:?} without an id", entity.name);
                report.entities_skipped += 1;
                continue;
            }
        };
        if engine.store().contains_entity(&id) {
            report.entities_skipped += 1;
            continue;
        }
        match engine.add_entity(entity) {
            Ok(_) => report.entities_added += 1,
            Err(e) => {
                log::warn!("discovery: skipping entity {}: {}", id, e);
                report.entities_skipped += 1;
            }
        }
    }

    for mut rel in batch.relationships {
        let id = match &rel.id {
            Some(id) => id.clone(),
            None => derived_relationship_id(&rel),
        };
        rel.id = Some(id.clone());
        if engine.store().contains_relationship(&id) {
            report.relationships_skipped += 1;
            continue;
        }
        match engine.add_relationship(rel) {
            Ok(_) => report.relationships_added += 1,
            Err(e) => {
                log::warn!("discovery: skipping relationship {}: {}", id, e);
                report.relationships_skipped += 1;
            }
        }
    }

    report
}

/// Background task that reloads its source on a fixed interval.
#[derive(Clone)]
pub struct DiscoveryWorker {
    engine: Arc<QueryEngine>,
    loader: Arc<dyn SourceLoader>,
    interval: Duration,
}

impl DiscoveryWorker {
    pub fn new(
        engine: Arc<QueryEngine>,
        loader: Arc<dyn SourceLoader>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            loader,
            interval,
        }
    }

    /// One load-and-apply pass.
    pub fn run_once(&self) -> Result<DiscoveryReport> {
        let batch = self.loader.load()?;
        if batch.is_empty() {
            log::debug!("discovery: source returned nothing to apply");
            return Ok(DiscoveryReport::default());
        }
        Ok(apply_batch(&self.engine, batch))
    }

    /// Run a pass immediately and then every `interval` until `shutdown`
    /// turns true or its sender is dropped. Failed passes are logged and the
    /// worker keeps going.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let worker = self.clone();
                        match tokio::task::spawn_blocking(move || worker.run_once()).await {
                            Ok(Ok(report)) => log::info!(
                                "discovery pass: +{} entities (skipped {}), \
                                 +{} relationships (skipped {})",
                                report.entities_added,
                                report.entities_skipped,
                                report.relationships_added,
                                report.relationships_skipped
                            ),
                            Ok(Err(e)) => log::error!("discovery pass failed: {}", e),
                            Err(e) => log::error!("discovery task aborted: {}", e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            log::info!("discovery worker stopped");
        })
    }
}
