//! Follow-up query proposals. Advisory only: nothing here executes a query.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::SuggestionConfig;
use crate::query::{GraphQuery, GraphResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Explore,
    ImpactAnalysis,
    FindSimilar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub title: String,
    pub description: String,
    pub query: GraphQuery,
    pub confidence: f64,
}

const IMPACT_CONFIDENCE: f64 = 0.8;
const SIMILAR_CONFIDENCE: f64 = 0.6;

pub struct SuggestionEngine {
    config: SuggestionConfig,
}

impl SuggestionEngine {
    pub fn new(config: SuggestionConfig) -> Self {
        Self { config }
    }

    /// Up to `max_suggestions` follow-ups, most confident first.
    pub fn suggest(&self, query: &GraphQuery, result: &GraphResult) -> Vec<Suggestion> {
        let mut suggestions = self.explore_suggestions(query, result);

        if let Some(policy) = result.entities.iter().find(|e| e.entity_type.is_policy_like()) {
            suggestions.push(Suggestion {
                kind: SuggestionKind::ImpactAnalysis,
                title: format!("Analyze impact of {}", policy.name),
                description: format!(
                    "Trace what is affected by, depends on, or is governed by policy {}",
                    policy.id
                ),
                query: GraphQuery::trace_impact(policy.id.clone()),
                confidence: IMPACT_CONFIDENCE,
            });
        }

        if result.entities.len() > self.config.similar_min_entities {
            suggestions.push(Suggestion {
                kind: SuggestionKind::FindSimilar,
                title: format!("Find entities similar to {}", query.start_entity),
                description: "Compare relationship profiles to find look-alike entities"
                    .to_string(),
                query: GraphQuery::find_similar(query.start_entity.clone()),
                confidence: SIMILAR_CONFIDENCE,
            });
        }

        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        suggestions.truncate(self.config.max_suggestions);
        suggestions
    }

    /// One explore suggestion per strong relationship, aimed at the endpoint
    /// away from the start entity.
    fn explore_suggestions(&self, query: &GraphQuery, result: &GraphResult) -> Vec<Suggestion> {
        let mut strong: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.strength > self.config.explore_strength)
            .collect();
        strong.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(Ordering::Equal));

        let mut targeted = HashSet::new();
        let mut suggestions = Vec::new();
        for rel in strong {
            let target = rel
                .other_end(&query.start_entity)
                .unwrap_or(rel.target_id.as_str());
            if target == query.start_entity || !targeted.insert(target.to_string()) {
                continue;
            }
            let name = result
                .entity(target)
                .map(|e| e.name.as_str())
                .unwrap_or(target);
            suggestions.push(Suggestion {
                kind: SuggestionKind::Explore,
                title: format!("Explore connections of {}", name),
                description: format!(
                    "{} is linked by a {} relationship with strength {:.2}",
                    target, rel.relationship_type, rel.strength
                ),
                query: GraphQuery::explore_connections(target.to_string()),
                confidence: rel.strength,
            });
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, EntityType, Metadata, Relationship, RelationshipType};
    use crate::query::QueryType;
    use chrono::Utc;

    fn entity(id: &str, entity_type: EntityType) -> Entity {
        Entity {
            id: id.to_string(),
            entity_type,
            name: id.to_string(),
            description: String::new(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn rel(id: &str, from: &str, to: &str, strength: f64) -> Relationship {
        Relationship {
            id: id.to_string(),
            source_id: from.to_string(),
            target_id: to.to_string(),
            relationship_type: RelationshipType::InteractsWith,
            strength,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_explore_targets_far_endpoint_ranked_by_strength() {
        let result = GraphResult {
            entities: vec![
                entity("a", EntityType::Agent),
                entity("b", EntityType::User),
                entity("c", EntityType::User),
            ],
            relationships: vec![
                rel("ab", "a", "b", 0.75),
                rel("ca", "c", "a", 0.95),
                rel("weak", "a", "c", 0.7),
            ],
            ..Default::default()
        };
        let engine = SuggestionEngine::new(SuggestionConfig::default());
        let suggestions = engine.suggest(&GraphQuery::find_related("a"), &result);

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].query.start_entity, "c");
        assert_eq!(suggestions[0].query.query_type, QueryType::ExploreConnections);
        assert!((suggestions[0].confidence - 0.95).abs() < 1e-9);
        assert_eq!(suggestions[1].query.start_entity, "b");
    }

    #[test]
    fn test_impact_and_similar_suggestions() {
        let mut entities = vec![entity("a", EntityType::Agent), entity("p", EntityType::Policy)];
        for i in 0..4 {
            entities.push(entity(&format!("u{}", i), EntityType::User));
        }
        let result = GraphResult {
            entities,
            ..Default::default()
        };
        let engine = SuggestionEngine::new(SuggestionConfig::default());
        let suggestions = engine.suggest(&GraphQuery::find_related("a"), &result);

        let kinds: Vec<SuggestionKind> = suggestions.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SuggestionKind::ImpactAnalysis, SuggestionKind::FindSimilar]);
        assert_eq!(suggestions[0].query.start_entity, "p");
        assert_eq!(suggestions[0].query.query_type, QueryType::TraceImpact);
        assert_eq!(suggestions[1].query.start_entity, "a");
    }

    #[test]
    fn test_small_result_gets_no_similar_suggestion() {
        let result = GraphResult {
            entities: (0..5).map(|i| entity(&format!("u{}", i), EntityType::User)).collect(),
            ..Default::default()
        };
        let engine = SuggestionEngine::new(SuggestionConfig::default());
        assert!(engine.suggest(&GraphQuery::find_related("u0"), &result).is_empty());
    }

    #[test]
    fn test_capped_at_five() {
        let mut entities = vec![entity("a", EntityType::Agent)];
        let mut relationships = Vec::new();
        for i in 0..8 {
            let id = format!("n{}", i);
            entities.push(entity(&id, EntityType::Record));
            relationships.push(rel(&format!("r{}", i), "a", &id, 0.9));
        }
        let result = GraphResult {
            entities,
            relationships,
            ..Default::default()
        };
        let engine = SuggestionEngine::new(SuggestionConfig::default());
        let suggestions = engine.suggest(&GraphQuery::find_related("a"), &result);
        assert_eq!(suggestions.len(), 5);
        assert!(suggestions.iter().all(|s| s.kind == SuggestionKind::Explore));
    }
}
