//! Heuristic observations about a finished query result.
//!
//! Rules are independent and every applicable rule fires. A rule that
//! errors is logged and skipped; it never fails the query.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::InsightConfig;
use crate::error::{GraphError, Result};
use crate::graph::PathKind;
use crate::query::{GraphQuery, GraphResult, Insight, InsightKind};

/// One insight heuristic.
pub trait InsightRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, query: &GraphQuery, result: &GraphResult) -> Result<Option<Insight>>;
}

/// Runs every registered rule over a result.
pub struct InsightGenerator {
    rules: Vec<Box<dyn InsightRule>>,
}

impl InsightGenerator {
    /// Generator with the built-in rule set.
    pub fn new(config: &InsightConfig) -> Self {
        Self {
            rules: vec![
                Box::new(GovernancePattern),
                Box::new(HighConfidenceConnections {
                    min_strength: config.high_confidence_strength,
                }),
                Box::new(LargeResult {
                    threshold: config.large_result_threshold,
                }),
                Box::new(CircularDependency),
                Box::new(HubEntity {
                    min_degree: config.hub_degree_threshold,
                }),
                Box::new(TruncatedTraversal),
            ],
        }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: Box<dyn InsightRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn generate(&self, query: &GraphQuery, result: &GraphResult) -> Vec<Insight> {
        let mut insights = Vec::new();
        for rule in &self.rules {
            match rule.evaluate(query, result) {
                Ok(Some(insight)) => insights.push(insight),
                Ok(None) => {}
                Err(e) => log::debug!("insight rule {} skipped: {}", rule.name(), e),
            }
        }
        insights
    }
}

struct GovernancePattern;

impl InsightRule for GovernancePattern {
    fn name(&self) -> &'static str {
        "governance_pattern"
    }

    fn evaluate(&self, _query: &GraphQuery, result: &GraphResult) -> Result<Option<Insight>> {
        let policies: Vec<&str> = result
            .entities
            .iter()
            .filter(|e| e.entity_type.is_policy_like())
            .map(|e| e.id.as_str())
            .collect();
        let agents: Vec<&str> = result
            .entities
            .iter()
            .filter(|e| e.entity_type.is_agent_like())
            .map(|e| e.id.as_str())
            .collect();

        if policies.is_empty() || agents.is_empty() {
            return Ok(None);
        }

        Ok(Some(Insight {
            kind: InsightKind::Pattern,
            title: "Governance relationship detected".to_string(),
            description: format!(
                "{} agent(s) are connected to {} policy entity(ies) in this result",
                agents.len(),
                policies.len()
            ),
            confidence: 0.9,
            actionable: true,
            suggested_actions: vec![
                "Review which policies govern these agents".to_string(),
                "Run an impact analysis on the policies".to_string(),
            ],
            related_entities: policies
                .into_iter()
                .chain(agents)
                .map(String::from)
                .collect(),
        }))
    }
}

struct HighConfidenceConnections {
    min_strength: f64,
}

impl InsightRule for HighConfidenceConnections {
    fn name(&self) -> &'static str {
        "high_confidence_connections"
    }

    fn evaluate(&self, _query: &GraphQuery, result: &GraphResult) -> Result<Option<Insight>> {
        let strong: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.strength > self.min_strength)
            .collect();
        if strong.is_empty() {
            return Ok(None);
        }

        let listed: Vec<String> = strong
            .iter()
            .map(|r| {
                format!(
                    "{} -[{}]-> {} ({:.2})",
                    r.source_id, r.relationship_type, r.target_id, r.strength
                )
            })
            .collect();
        let endpoints: BTreeSet<&str> = strong
            .iter()
            .flat_map(|r| [r.source_id.as_str(), r.target_id.as_str()])
            .collect();
        let mean = strong.iter().map(|r| r.strength).sum::<f64>() / strong.len() as f64;

        Ok(Some(Insight {
            kind: InsightKind::Pattern,
            title: "High-confidence connections".to_string(),
            description: format!(
                "{} connection(s) above {:.2} strength: {}",
                strong.len(),
                self.min_strength,
                listed.join(", ")
            ),
            confidence: mean,
            actionable: false,
            suggested_actions: Vec::new(),
            related_entities: endpoints.into_iter().map(String::from).collect(),
        }))
    }
}

struct LargeResult {
    threshold: usize,
}

impl InsightRule for LargeResult {
    fn name(&self) -> &'static str {
        "large_result"
    }

    fn evaluate(&self, _query: &GraphQuery, result: &GraphResult) -> Result<Option<Insight>> {
        if result.entities.len() <= self.threshold {
            return Ok(None);
        }

        Ok(Some(Insight {
            kind: InsightKind::Recommendation,
            title: "Large result set".to_string(),
            description: format!(
                "The query returned {} entities; consider narrowing it",
                result.entities.len()
            ),
            confidence: 0.8,
            actionable: true,
            suggested_actions: vec![
                "Add relationship or entity type filters".to_string(),
                "Raise the confidence threshold".to_string(),
                "Reduce the maximum depth".to_string(),
            ],
            related_entities: Vec::new(),
        }))
    }
}

struct CircularDependency;

impl InsightRule for CircularDependency {
    fn name(&self) -> &'static str {
        "circular_dependency"
    }

    fn evaluate(&self, query: &GraphQuery, result: &GraphResult) -> Result<Option<Insight>> {
        let circular: Vec<_> = result
            .paths
            .iter()
            .filter(|p| p.kind == PathKind::Circular)
            .collect();
        let Some(first) = circular.first() else {
            return Ok(None);
        };
        if first.entities.len() < 3 || first.entities.first() != first.entities.last() {
            return Err(GraphError::Validation(
                "circular path does not return to its start".to_string(),
            ));
        }

        Ok(Some(Insight {
            kind: InsightKind::Risk,
            title: "Circular dependency detected".to_string(),
            description: format!(
                "{} loop(s) lead back to {}, e.g. {}",
                circular.len(),
                query.start_entity,
                first.entities.join(" -> ")
            ),
            confidence: 0.7,
            actionable: true,
            suggested_actions: vec!["Check whether the loop is intended".to_string()],
            related_entities: first.entities[1..first.entities.len() - 1].to_vec(),
        }))
    }
}

struct HubEntity {
    min_degree: usize,
}

impl InsightRule for HubEntity {
    fn name(&self) -> &'static str {
        "hub_entity"
    }

    fn evaluate(&self, _query: &GraphQuery, result: &GraphResult) -> Result<Option<Insight>> {
        let mut degree: BTreeMap<&str, usize> = BTreeMap::new();
        for rel in &result.relationships {
            *degree.entry(rel.source_id.as_str()).or_insert(0) += 1;
            if rel.target_id != rel.source_id {
                *degree.entry(rel.target_id.as_str()).or_insert(0) += 1;
            }
        }

        let mut hubs: Vec<(&str, usize)> = degree
            .into_iter()
            .filter(|(_, d)| *d >= self.min_degree)
            .collect();
        if hubs.is_empty() {
            return Ok(None);
        }
        hubs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let names: Vec<String> = hubs
            .iter()
            .map(|(id, d)| {
                let name = result.entity(id).map(|e| e.name.as_str()).unwrap_or(*id);
                format!("{} ({} connections)", name, d)
            })
            .collect();

        Ok(Some(Insight {
            kind: InsightKind::Risk,
            title: "Highly connected entities".to_string(),
            description: format!(
                "{} may be single points of failure: {}",
                if hubs.len() == 1 { "This entity" } else { "These entities" },
                names.join(", ")
            ),
            confidence: 0.6,
            actionable: true,
            suggested_actions: vec!["Review redundancy for these entities".to_string()],
            related_entities: hubs.iter().map(|(id, _)| id.to_string()).collect(),
        }))
    }
}

struct TruncatedTraversal;

impl InsightRule for TruncatedTraversal {
    fn name(&self) -> &'static str {
        "truncated_traversal"
    }

    fn evaluate(&self, _query: &GraphQuery, result: &GraphResult) -> Result<Option<Insight>> {
        if !result.summary.truncated {
            return Ok(None);
        }

        Ok(Some(Insight {
            kind: InsightKind::Warning,
            title: "Traversal truncated".to_string(),
            description: "The traversal hit its frontier or time limit; the result is partial"
                .to_string(),
            confidence: 1.0,
            actionable: true,
            suggested_actions: vec![
                "Reduce the maximum depth".to_string(),
                "Add filters to shrink the frontier".to_string(),
            ],
            related_entities: Vec::new(),
        }))
    }
}
