//! Query requests, results, and the engine that answers them.

mod engine;
pub mod insights;
pub mod suggestions;

pub use engine::QueryEngine;
pub use insights::{InsightGenerator, InsightRule};
pub use suggestions::{Suggestion, SuggestionEngine, SuggestionKind};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GraphError;
use crate::graph::{Entity, EntityType, GraphPath, Relationship, RelationshipType};

/// The four query modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    FindRelated,
    TraceImpact,
    FindSimilar,
    ExploreConnections,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::FindRelated => "find_related",
            QueryType::TraceImpact => "trace_impact",
            QueryType::FindSimilar => "find_similar",
            QueryType::ExploreConnections => "explore_connections",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "find_related" | "related" => Ok(QueryType::FindRelated),
            "trace_impact" | "impact" => Ok(QueryType::TraceImpact),
            "find_similar" | "similar" => Ok(QueryType::FindSimilar),
            "explore_connections" | "explore" => Ok(QueryType::ExploreConnections),
            other => Err(GraphError::Validation(format!("unknown query type: {}", other))),
        }
    }
}

/// A relationship query. Unset options fall back to per-mode defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQuery {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub start_entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    /// Allow-list; `Some(vec![])` matches no relationship.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_types: Option<Vec<RelationshipType>>,
    /// Allow-list for every entity other than the start; `Some(vec![])` matches none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<EntityType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
}

impl GraphQuery {
    pub fn new(query_type: QueryType, start_entity: impl Into<String>) -> Self {
        Self {
            query_type,
            start_entity: start_entity.into(),
            max_depth: None,
            relationship_types: None,
            entity_types: None,
            confidence_threshold: None,
        }
    }

    pub fn find_related(start_entity: impl Into<String>) -> Self {
        Self::new(QueryType::FindRelated, start_entity)
    }

    pub fn trace_impact(start_entity: impl Into<String>) -> Self {
        Self::new(QueryType::TraceImpact, start_entity)
    }

    pub fn find_similar(start_entity: impl Into<String>) -> Self {
        Self::new(QueryType::FindSimilar, start_entity)
    }

    pub fn explore_connections(start_entity: impl Into<String>) -> Self {
        Self::new(QueryType::ExploreConnections, start_entity)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_relationship_types(
        mut self,
        types: impl IntoIterator<Item = RelationshipType>,
    ) -> Self {
        self.relationship_types = Some(types.into_iter().collect());
        self
    }

    pub fn with_entity_types(mut self, types: impl IntoIterator<Item = EntityType>) -> Self {
        self.entity_types = Some(types.into_iter().collect());
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }
}

/// Category of a generated observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Pattern,
    Risk,
    Recommendation,
    Warning,
}

/// Human-readable observation derived from a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub actionable: bool,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub related_entities: Vec<String>,
}

/// One find_similar match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub entity_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySummary {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub path_count: usize,
    pub elapsed_ms: u64,
    /// Mean relationship strength (traversal) or mean similarity score (find_similar).
    pub confidence: f64,
    /// Served from the result cache.
    pub cached: bool,
    /// A frontier or time limit cut the traversal short.
    pub truncated: bool,
}

/// Answer to a [`GraphQuery`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub paths: Vec<GraphPath>,
    /// find_similar matches, best first; empty for traversal modes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similar: Vec<ScoredEntity>,
    pub insights: Vec<Insight>,
    pub summary: QuerySummary,
}

impl GraphResult {
    /// Empty result explaining why the query was not answered.
    pub fn failed(err: &GraphError, elapsed_ms: u64) -> Self {
        let (title, actions) = match err {
            GraphError::NotFound(_) => (
                "Start entity not found",
                vec!["Check the entity id or load the entity before querying".to_string()],
            ),
            GraphError::Validation(_) => (
                "Invalid query",
                vec!["Fix the query parameters and retry".to_string()],
            ),
            GraphError::GovernanceRejected(_) => (
                "Query rejected by governance",
                vec!["Request approval or narrow the query".to_string()],
            ),
            _ => ("Query failed", Vec::new()),
        };

        GraphResult {
            insights: vec![Insight {
                kind: InsightKind::Warning,
                title: title.to_string(),
                description: format!("{} ({})", err, err.kind()),
                confidence: 1.0,
                actionable: !actions.is_empty(),
                suggested_actions: actions,
                related_entities: Vec::new(),
            }],
            summary: QuerySummary {
                elapsed_ms,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_type_aliases() {
        assert_eq!("related".parse::<QueryType>().unwrap(), QueryType::FindRelated);
        assert_eq!("trace-impact".parse::<QueryType>().unwrap(), QueryType::TraceImpact);
        assert_eq!("explore".parse::<QueryType>().unwrap(), QueryType::ExploreConnections);
        assert!("walk".parse::<QueryType>().is_err());
    }

    #[test]
    fn test_query_json_shape() {
        let query: GraphQuery = serde_json::from_str(
            r#"{"type": "find_related", "start_entity": "A", "max_depth": 2,
                "relationship_types": ["governed_by"], "confidence_threshold": 0.6}"#,
        )
        .unwrap();
        assert_eq!(query.query_type, QueryType::FindRelated);
        assert_eq!(query.max_depth, Some(2));
        assert_eq!(
            query.relationship_types,
            Some(vec![RelationshipType::GovernedBy])
        );
        assert_eq!(query.entity_types, None);

        let back = serde_json::to_value(&query).unwrap();
        assert_eq!(back["type"], "find_related");
        assert!(back.get("entity_types").is_none());
    }

    #[test]
    fn test_failed_result_has_single_explanatory_insight() {
        let err = GraphError::GovernanceRejected("depth too large".to_string());
        let result = GraphResult::failed(&err, 3);
        assert!(result.entities.is_empty());
        assert!(result.relationships.is_empty());
        assert_eq!(result.insights.len(), 1);
        assert_eq!(result.insights[0].kind, InsightKind::Warning);
        assert!(result.insights[0].description.contains("depth too large"));
        assert!(result.insights[0].description.contains("governance_rejected"));
        assert_eq!(result.summary.elapsed_ms, 3);
    }
}
