//! End-to-end scenarios through the public API: seed, query, cache, govern.

use relgraph::audit::{AuditSink, SqliteAuditSink};
use relgraph::config::Config;
use relgraph::discovery::{apply_batch, DirectoryLoader, SourceLoader};
use relgraph::governance::{GateDecision, QueryGate};
use relgraph::graph::PathKind;
use relgraph::query::InsightKind;
use relgraph::{
    EntityType, GraphError, GraphQuery, GraphResult, GraphStore, NewEntity, NewRelationship,
    QueryEngine, RelationshipType,
};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn engine_with(config: &Config) -> QueryEngine {
    QueryEngine::new(Arc::new(GraphStore::new()), config)
}

/// A:agent -governed_by 0.9-> B:policy <-governed_by 0.5- C:agent
fn governance_engine() -> QueryEngine {
    let engine = engine_with(&Config::default());
    engine
        .add_entity(NewEntity::new(EntityType::Agent, "Agent A").with_id("A"))
        .unwrap();
    engine
        .add_entity(NewEntity::new(EntityType::Policy, "Policy B").with_id("B"))
        .unwrap();
    engine
        .add_entity(NewEntity::new(EntityType::Agent, "Agent C").with_id("C"))
        .unwrap();
    engine
        .add_relationship(
            NewRelationship::new("A", "B", RelationshipType::GovernedBy, 0.9).with_id("A-B"),
        )
        .unwrap();
    engine
        .add_relationship(
            NewRelationship::new("C", "B", RelationshipType::GovernedBy, 0.5).with_id("C-B"),
        )
        .unwrap();
    engine
}

fn entity_ids(result: &GraphResult) -> BTreeSet<String> {
    result.entities.iter().map(|e| e.id.clone()).collect()
}

fn relationship_ids(result: &GraphResult) -> BTreeSet<String> {
    result.relationships.iter().map(|r| r.id.clone()).collect()
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn find_related_reaches_c_through_policy() {
    let engine = governance_engine();
    let result = engine.query(&GraphQuery::find_related("A").with_max_depth(2));

    assert_eq!(entity_ids(&result), set(&["A", "B", "C"]));
    assert_eq!(relationship_ids(&result), set(&["A-B", "C-B"]));
    assert_eq!(result.entities[0].id, "A");
    assert!(result
        .insights
        .iter()
        .any(|i| i.kind == InsightKind::Pattern && i.title.contains("Governance")));

    let to_c = result
        .paths
        .iter()
        .find(|p| p.entities.last().map(String::as_str) == Some("C"))
        .unwrap();
    assert_eq!(to_c.entities, vec!["A", "B", "C"]);
    assert_eq!(to_c.kind, PathKind::Indirect);
    assert!((to_c.strength - 0.7).abs() < 1e-9);
}

#[test]
fn confidence_threshold_drops_weak_edge_and_its_entity() {
    let engine = governance_engine();
    let result = engine.query(
        &GraphQuery::find_related("A")
            .with_max_depth(2)
            .with_confidence_threshold(0.6),
    );
    assert_eq!(entity_ids(&result), set(&["A", "B"]));
    assert_eq!(relationship_ids(&result), set(&["A-B"]));
}

#[test]
fn identical_queries_are_idempotent() {
    let engine = governance_engine();
    let query = GraphQuery::find_related("C").with_max_depth(3);

    let first = engine.query(&query);
    let second = engine.query(&query);
    assert!(second.summary.cached);
    assert_eq!(entity_ids(&first), entity_ids(&second));
    assert_eq!(relationship_ids(&first), relationship_ids(&second));

    engine.clear_cache();
    let third = engine.query(&query);
    assert!(!third.summary.cached);
    assert_eq!(entity_ids(&first), entity_ids(&third));
}

#[test]
fn expired_cache_entry_is_not_served() {
    let mut config = Config::default();
    config.cache.ttl_secs = 0;
    let engine = engine_with(&config);
    engine
        .add_entity(NewEntity::new(EntityType::User, "solo").with_id("solo"))
        .unwrap();

    let query = GraphQuery::find_related("solo");
    assert!(!engine.query(&query).summary.cached);
    assert!(!engine.query(&query).summary.cached);
}

#[test]
fn similarity_half_overlap() {
    let engine = engine_with(&Config::default());
    for (id, t) in [
        ("start", EntityType::Agent),
        ("policy", EntityType::Policy),
        ("candidate", EntityType::Agent),
        ("user", EntityType::User),
    ] {
        engine.add_entity(NewEntity::new(t, id).with_id(id)).unwrap();
    }
    engine
        .add_relationship(NewRelationship::new(
            "start",
            "policy",
            RelationshipType::GovernedBy,
            0.9,
        ))
        .unwrap();
    engine
        .add_relationship(NewRelationship::new(
            "candidate",
            "policy",
            RelationshipType::GovernedBy,
            0.9,
        ))
        .unwrap();
    engine
        .add_relationship(NewRelationship::new(
            "candidate",
            "user",
            RelationshipType::InteractsWith,
            0.9,
        ))
        .unwrap();

    let result = engine.query(
        &GraphQuery::find_similar("start")
            .with_entity_types([EntityType::Agent])
            .with_confidence_threshold(0.5),
    );
    assert_eq!(result.similar.len(), 1);
    assert_eq!(result.similar[0].entity_id, "candidate");
    assert!((result.similar[0].score - 0.5).abs() < 1e-9);

    let strict = engine.query(
        &GraphQuery::find_similar("start")
            .with_entity_types([EntityType::Agent])
            .with_confidence_threshold(0.6),
    );
    assert!(strict.similar.is_empty());
}

#[test]
fn cycles_terminate_and_are_reported() {
    let engine = engine_with(&Config::default());
    for id in ["x", "y", "z"] {
        engine
            .add_entity(NewEntity::new(EntityType::Record, id).with_id(id))
            .unwrap();
    }
    for (from, to) in [("x", "y"), ("y", "z"), ("z", "x")] {
        engine
            .add_relationship(NewRelationship::new(from, to, RelationshipType::DependsOn, 0.8))
            .unwrap();
    }

    let result = engine.query(&GraphQuery::find_related("x").with_max_depth(10));
    assert_eq!(entity_ids(&result), set(&["x", "y", "z"]));
    assert_eq!(result.relationships.len(), 3);
    assert!(result.paths.iter().any(|p| p.kind == PathKind::Circular));
    assert!(result.insights.iter().any(|i| i.kind == InsightKind::Risk));
}

#[test]
fn unknown_start_and_rejection_are_explained() {
    struct NoImpactQueries;

    impl QueryGate for NoImpactQueries {
        fn validate(&self, query: &GraphQuery) -> GateDecision {
            if query.query_type == relgraph::QueryType::TraceImpact {
                GateDecision::reject("impact analysis requires approval")
            } else {
                GateDecision::allow()
            }
        }
    }

    let engine = governance_engine().with_gate(Arc::new(NoImpactQueries));

    let missing = engine.query(&GraphQuery::find_related("Z"));
    assert!(missing.entities.is_empty());
    assert_eq!(missing.insights.len(), 1);
    assert_eq!(missing.insights[0].kind, InsightKind::Warning);

    let rejected = engine.query(&GraphQuery::trace_impact("B"));
    assert!(rejected.entities.is_empty());
    assert_eq!(rejected.insights.len(), 1);
    assert!(rejected.insights[0].description.contains("requires approval"));

    assert!(matches!(
        engine.try_query(&GraphQuery::trace_impact("B")),
        Err(GraphError::GovernanceRejected(_))
    ));
}

#[test]
fn sqlite_audit_records_hits_and_misses() {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(SqliteAuditSink::open(temp_dir.path().join("audit.db")).unwrap());
    let engine = governance_engine().with_audit_sink(sink.clone() as Arc<dyn AuditSink>);

    let query = GraphQuery::find_related("A");
    engine.query(&query);
    engine.query(&query);
    engine.query(&GraphQuery::find_related("missing"));

    let records = sink.recent(10).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|r| r.cached).count(), 1);
    assert!(records.iter().all(|r| r.entity_count == 3));
}

#[test]
fn seeded_directory_answers_queries() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("org.yaml"),
        r#"
entities:
  - { id: agent-intake, type: agent, name: Intake agent }
  - { id: policy-pii, type: policy, name: PII handling }
  - { id: record-claims, type: record, name: Claims table }
relationships:
  - { source_id: agent-intake, target_id: policy-pii, type: governed_by, strength: 0.95 }
  - { source_id: policy-pii, target_id: record-claims, type: affects, strength: 0.85 }
  - { source_id: agent-intake, target_id: record-claims, type: interacts_with, strength: 0.4 }
"#,
    )
    .unwrap();

    let engine = engine_with(&Config::default());
    let report = apply_batch(&engine, DirectoryLoader::new(temp_dir.path()).load().unwrap());
    assert_eq!(report.entities_added, 3);
    assert_eq!(report.relationships_added, 3);

    // interacts_with is outside the default impact set
    let impact = engine.query(&GraphQuery::trace_impact("policy-pii").with_max_depth(1));
    assert_eq!(entity_ids(&impact), set(&["policy-pii", "agent-intake", "record-claims"]));
    assert_eq!(impact.relationships.len(), 2);

    let stats = engine.statistics();
    assert_eq!(stats.total_entities, 3);
    assert_eq!(stats.strong_connection_count, 2);
    assert!((stats.average_connections - 2.0).abs() < 1e-9);
}

#[test]
fn concurrent_queries_and_writes() {
    let engine = Arc::new(governance_engine());

    let writer = {
        let engine = engine.clone();
        thread::spawn(move || {
            for i in 0..50 {
                let id = format!("doc-{}", i);
                engine
                    .add_entity(NewEntity::new(EntityType::Document, &id).with_id(&id))
                    .unwrap();
                engine
                    .add_relationship(NewRelationship::new(
                        "B",
                        &id,
                        RelationshipType::Contains,
                        0.6,
                    ))
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let result = engine.query(&GraphQuery::find_related("A"));
                    // every reached entity is backed by a returned relationship
                    assert_eq!(result.entities.len(), result.relationships.len() + 1);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let result = engine.query(&GraphQuery::find_related("A"));
    assert_eq!(result.entities.len(), 53);
}
