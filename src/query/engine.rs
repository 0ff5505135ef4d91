//! Query engine: validation, governance, caching, dispatch, insights, audit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::{sink_from_config, AuditSink, NoopAuditSink};
use crate::cache::{cache_key, ResultCache};
use crate::config::{Config, EngineConfig, SimilarityConfig};
use crate::error::{GraphError, Result};
use crate::governance::{AllowAll, ConfigGate, QueryGate};
use crate::graph::{
    find_similar, traverse, EdgeFilter, Entity, EntityType, GraphStatistics, GraphStore,
    NewEntity, NewRelationship, Relationship, RelationshipType, StoreSnapshot, TraversalLimits,
};
use crate::query::insights::InsightGenerator;
use crate::query::suggestions::{Suggestion, SuggestionEngine};
use crate::query::{GraphQuery, GraphResult, QuerySummary, QueryType, ScoredEntity};

/// A query after mode defaults have been applied.
#[derive(Debug, Clone)]
struct ResolvedQuery {
    query_type: QueryType,
    start: String,
    max_depth: usize,
    relationship_types: Option<Vec<RelationshipType>>,
    entity_types: Option<Vec<EntityType>>,
    threshold: Option<f64>,
}

impl ResolvedQuery {
    /// Normalised signature: allow-lists are sorted and deduplicated so
    /// their order never changes the cache key.
    fn signature(&self) -> String {
        fn list<T: ToString>(items: &Option<Vec<T>>) -> String {
            match items {
                None => "*".to_string(),
                Some(items) => items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(","),
            }
        }
        let threshold = self
            .threshold
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.query_type,
            self.start,
            self.max_depth,
            list(&self.relationship_types),
            list(&self.entity_types),
            threshold
        )
    }

    /// The query as it will actually run, for the governance gate.
    fn as_query(&self) -> GraphQuery {
        GraphQuery {
            query_type: self.query_type,
            start_entity: self.start.clone(),
            max_depth: Some(self.max_depth),
            relationship_types: self.relationship_types.clone(),
            entity_types: self.entity_types.clone(),
            confidence_threshold: self.threshold,
        }
    }

    fn edge_filter(&self) -> EdgeFilter {
        EdgeFilter {
            relationship_types: self
                .relationship_types
                .as_ref()
                .map(|types| types.iter().copied().collect()),
            entity_types: self
                .entity_types
                .as_ref()
                .map(|types| types.iter().copied().collect()),
            min_strength: self.threshold,
        }
    }
}

fn normalized<T: Ord + Copy>(items: &Option<Vec<T>>) -> Option<Vec<T>> {
    items.as_ref().map(|items| {
        let mut items = items.clone();
        items.sort();
        items.dedup();
        items
    })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Answers [`GraphQuery`]s against one shared [`GraphStore`].
///
/// One engine per session or tenant; nothing here is process-global.
pub struct QueryEngine {
    store: Arc<GraphStore>,
    cache: Option<ResultCache>,
    gate: Arc<dyn QueryGate>,
    audit: Arc<dyn AuditSink>,
    insights: InsightGenerator,
    suggestions: SuggestionEngine,
    engine_config: EngineConfig,
    similarity_config: SimilarityConfig,
}

impl QueryEngine {
    /// Engine with an allow-all gate and no audit trail.
    pub fn new(store: Arc<GraphStore>, config: &Config) -> Self {
        let cache = config.cache.enabled.then(|| {
            ResultCache::new(
                config.cache.max_entries,
                Duration::from_secs(config.cache.ttl_secs),
            )
        });

        Self {
            store,
            cache,
            gate: Arc::new(AllowAll),
            audit: Arc::new(NoopAuditSink),
            insights: InsightGenerator::new(&config.insights),
            suggestions: SuggestionEngine::new(config.suggestions.clone()),
            engine_config: config.engine.clone(),
            similarity_config: config.similarity.clone(),
        }
    }

    /// Engine wired from config: [`ConfigGate`] and the `[audit]` sink.
    pub fn from_config(store: Arc<GraphStore>, config: &Config) -> Result<Self> {
        let audit = sink_from_config(&config.audit)?;
        Ok(Self::new(store, config)
            .with_gate(Arc::new(ConfigGate::new(&config.governance)))
            .with_audit_sink(audit))
    }

    pub fn with_gate(mut self, gate: Arc<dyn QueryGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_insights(mut self, insights: InsightGenerator) -> Self {
        self.insights = insights;
        self
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn add_entity(&self, entity: NewEntity) -> Result<Entity> {
        self.store.add_entity(entity)
    }

    pub fn add_relationship(&self, relationship: NewRelationship) -> Result<Relationship> {
        self.store.add_relationship(relationship)
    }

    pub fn statistics(&self) -> GraphStatistics {
        self.store.statistics()
    }

    pub fn get_suggestions(&self, query: &GraphQuery, result: &GraphResult) -> Vec<Suggestion> {
        self.suggestions.suggest(query, result)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Run a query. Never fails: an unknown start entity, an invalid query or
    /// a governance rejection yields an empty result whose only insight
    /// explains why.
    pub fn query(&self, query: &GraphQuery) -> GraphResult {
        let started = Instant::now();
        match self.try_query(query) {
            Ok(result) => result,
            Err(e) => {
                log::warn!(
                    "{} query from {} not executed ({}): {}",
                    query.query_type,
                    query.start_entity,
                    e.kind(),
                    e
                );
                GraphResult::failed(&e, started.elapsed().as_millis() as u64)
            }
        }
    }

    /// Run a query, surfacing the typed error instead of an explanatory result.
    pub fn try_query(&self, query: &GraphQuery) -> Result<GraphResult> {
        let started = Instant::now();
        let resolved = self.resolve(query)?;

        let decision = self.gate.validate(&resolved.as_query());
        if !decision.valid {
            return Err(GraphError::GovernanceRejected(
                decision
                    .reason
                    .unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        let key = cache_key(&resolved.signature());
        let snapshot = self.store.read();
        let generation = snapshot.generation();

        if let Some(cache) = &self.cache {
            if let Some(mut hit) = cache.get(&key, generation) {
                drop(snapshot);
                log::debug!("cache hit for {} from {}", resolved.query_type, resolved.start);
                hit.summary.cached = true;
                hit.summary.elapsed_ms = started.elapsed().as_millis() as u64;
                self.record_audit(query, &hit);
                return Ok(hit);
            }
            log::debug!("cache miss for {} from {}", resolved.query_type, resolved.start);
        }

        let mut result = match resolved.query_type {
            QueryType::FindSimilar => self.run_similar(&snapshot, &resolved)?,
            QueryType::FindRelated | QueryType::TraceImpact | QueryType::ExploreConnections => {
                self.run_traversal(&snapshot, &resolved)?
            }
        };
        drop(snapshot);

        result.summary.elapsed_ms = started.elapsed().as_millis() as u64;
        result.insights = self.insights.generate(query, &result);

        if let Some(cache) = &self.cache {
            cache.put(key, result.clone(), generation);
        }

        log::info!(
            "{} from {}: {} entities, {} relationships, {} paths in {}ms",
            resolved.query_type,
            resolved.start,
            result.summary.entity_count,
            result.summary.relationship_count,
            result.summary.path_count,
            result.summary.elapsed_ms
        );

        self.record_audit(query, &result);
        Ok(result)
    }

    fn record_audit(&self, query: &GraphQuery, result: &GraphResult) {
        if let Err(e) = self.audit.record(query, result) {
            log::warn!(
                "audit record failed for {} from {}: {}",
                query.query_type,
                query.start_entity,
                e
            );
        }
    }

    /// Validate the query and apply the per-mode policy: trace_impact gets the
    /// impact relationship set unless overridden, explore_connections drops
    /// type filters and goes deeper by default.
    fn resolve(&self, query: &GraphQuery) -> Result<ResolvedQuery> {
        let start = query.start_entity.trim();
        if start.is_empty() {
            return Err(GraphError::Validation("start_entity must not be empty".to_string()));
        }

        if let Some(threshold) = query.confidence_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(GraphError::Validation(format!(
                    "confidence_threshold must be within [0, 1], got {}",
                    threshold
                )));
            }
        }

        if let Some(depth) = query.max_depth {
            if depth > self.engine_config.max_depth_limit {
                return Err(GraphError::Validation(format!(
                    "max_depth {} exceeds the limit of {}",
                    depth, self.engine_config.max_depth_limit
                )));
            }
        }

        let mut resolved = ResolvedQuery {
            query_type: query.query_type,
            start: start.to_string(),
            max_depth: query.max_depth.unwrap_or(self.engine_config.default_max_depth),
            relationship_types: normalized(&query.relationship_types),
            entity_types: normalized(&query.entity_types),
            threshold: query.confidence_threshold,
        };

        match query.query_type {
            QueryType::FindRelated => {}
            QueryType::TraceImpact => {
                if resolved.relationship_types.is_none() {
                    resolved.relationship_types =
                        normalized(&Some(self.engine_config.impact_relationship_types.clone()));
                }
            }
            QueryType::ExploreConnections => {
                resolved.max_depth = query
                    .max_depth
                    .unwrap_or(self.engine_config.explore_max_depth);
                resolved.relationship_types = None;
                resolved.entity_types = None;
            }
            QueryType::FindSimilar => {
                resolved.max_depth = 0;
                resolved.relationship_types = None;
                resolved.threshold = Some(
                    query
                        .confidence_threshold
                        .unwrap_or(self.similarity_config.default_threshold),
                );
            }
        }

        Ok(resolved)
    }

    fn run_traversal(
        &self,
        snapshot: &StoreSnapshot<'_>,
        resolved: &ResolvedQuery,
    ) -> Result<GraphResult> {
        let limits = TraversalLimits {
            max_frontier: self.engine_config.max_frontier,
            timeout: Duration::from_millis(self.engine_config.query_timeout_ms),
        };
        let outcome = traverse(
            snapshot,
            &resolved.start,
            resolved.max_depth,
            &resolved.edge_filter(),
            limits,
        )?;

        let summary = QuerySummary {
            entity_count: outcome.entities.len(),
            relationship_count: outcome.relationships.len(),
            path_count: outcome.paths.len(),
            confidence: mean(outcome.relationships.iter().map(|r| r.strength)),
            truncated: outcome.truncated,
            ..Default::default()
        };

        Ok(GraphResult {
            entities: outcome.entities,
            relationships: outcome.relationships,
            paths: outcome.paths,
            summary,
            ..Default::default()
        })
    }

    fn run_similar(
        &self,
        snapshot: &StoreSnapshot<'_>,
        resolved: &ResolvedQuery,
    ) -> Result<GraphResult> {
        let entity_types: Option<HashSet<EntityType>> = resolved
            .entity_types
            .as_ref()
            .map(|types| types.iter().copied().collect());
        let threshold = resolved
            .threshold
            .unwrap_or(self.similarity_config.default_threshold);

        let matches = find_similar(
            snapshot,
            &resolved.start,
            entity_types.as_ref(),
            threshold,
            self.similarity_config.max_results,
        )?;

        let start = snapshot
            .entity(&resolved.start)
            .cloned()
            .ok_or_else(|| {
                GraphError::NotFound(format!("start entity not found: {}", resolved.start))
            })?;

        let similar: Vec<ScoredEntity> = matches
            .iter()
            .map(|(entity, score)| ScoredEntity {
                entity_id: entity.id.clone(),
                score: *score,
            })
            .collect();
        let mut entities = vec![start];
        entities.extend(matches.into_iter().map(|(entity, _)| entity));

        let summary = QuerySummary {
            entity_count: entities.len(),
            confidence: mean(similar.iter().map(|s| s.score)),
            ..Default::default()
        };

        Ok(GraphResult {
            entities,
            similar,
            summary,
            ..Default::default()
        })
    }
}
