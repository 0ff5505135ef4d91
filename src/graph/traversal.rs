//! Depth-bounded BFS over the relationship graph.
//!
//! Every node is expanded at most once, so cyclic graphs terminate. Each
//! newly reached entity gets one path (its BFS tree path). A filtered edge
//! joining two branches that only meet at the start entity closes a loop
//! through the start and is reported as a circular path.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::error::{GraphError, Result};
use crate::graph::{Entity, EntityType, Relationship, RelationshipType, StoreSnapshot};

/// Shape of a reconstructed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// One hop from the start entity.
    Direct,
    /// Two or more hops.
    Indirect,
    /// Leaves the start entity and comes back to it.
    Circular,
}

/// Ordered entity ids joined by the relationship ids between consecutive entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub entities: Vec<String>,
    pub relationships: Vec<String>,
    pub kind: PathKind,
    /// Mean strength of the relationships along the path.
    pub strength: f64,
}

/// Filters applied to each (relationship, other entity) pair, in this order:
/// relationship type, minimum strength, entity type.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub relationship_types: Option<HashSet<RelationshipType>>,
    pub entity_types: Option<HashSet<EntityType>>,
    pub min_strength: Option<f64>,
}

impl EdgeFilter {
    pub fn admits(&self, rel: &Relationship, other: &Entity) -> bool {
        if let Some(types) = &self.relationship_types {
            if !types.contains(&rel.relationship_type) {
                return false;
            }
        }
        if let Some(threshold) = self.min_strength {
            if rel.strength < threshold {
                return false;
            }
        }
        if let Some(types) = &self.entity_types {
            if !types.contains(&other.entity_type) {
                return false;
            }
        }
        true
    }
}

/// Guards against pathological queries on dense graphs.
#[derive(Debug, Clone, Copy)]
pub struct TraversalLimits {
    pub max_frontier: usize,
    pub timeout: Duration,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_frontier: 10_000,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Everything a traversal visited. `entities[0]` is always the start entity.
#[derive(Debug, Clone, Default)]
pub struct TraversalOutcome {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub paths: Vec<GraphPath>,
    /// True if a frontier or time limit cut the traversal short.
    pub truncated: bool,
}

#[derive(Debug, Clone)]
struct TreePath {
    entities: Vec<String>,
    edges: Vec<String>,
    strengths: Vec<f64>,
}

impl TreePath {
    fn root(id: &str) -> Self {
        Self {
            entities: vec![id.to_string()],
            edges: Vec::new(),
            strengths: Vec::new(),
        }
    }

    fn extend(&self, rel: &Relationship, next: &str) -> Self {
        let mut path = self.clone();
        path.entities.push(next.to_string());
        path.edges.push(rel.id.clone());
        path.strengths.push(rel.strength);
        path
    }

    /// First entity after the start, if any.
    fn branch(&self) -> Option<&str> {
        self.entities.get(1).map(String::as_str)
    }

    fn last_edge(&self) -> Option<&str> {
        self.edges.last().map(String::as_str)
    }

    fn into_path(self) -> GraphPath {
        let kind = if self.entities.len() == 2 {
            PathKind::Direct
        } else {
            PathKind::Indirect
        };
        build_path(self.entities, self.edges, &self.strengths, kind)
    }
}

fn build_path(
    entities: Vec<String>,
    relationships: Vec<String>,
    strengths: &[f64],
    kind: PathKind,
) -> GraphPath {
    let strength = if strengths.is_empty() {
        0.0
    } else {
        strengths.iter().sum::<f64>() / strengths.len() as f64
    };
    GraphPath {
        entities,
        relationships,
        kind,
        strength,
    }
}

/// Join the tree paths of `from` and `to` through `rel` into a loop that starts
/// and ends at the start entity.
fn circular_path(from: &TreePath, rel: &Relationship, to: &TreePath) -> GraphPath {
    let mut entities = from.entities.clone();
    entities.extend(to.entities.iter().rev().cloned());

    let mut edges = from.edges.clone();
    edges.push(rel.id.clone());
    edges.extend(to.edges.iter().rev().cloned());

    let mut strengths = from.strengths.clone();
    strengths.push(rel.strength);
    strengths.extend(to.strengths.iter().rev().copied());

    build_path(entities, edges, &strengths, PathKind::Circular)
}

/// Breadth-first traversal from `start` up to `max_depth` hops.
///
/// Fails with [`GraphError::NotFound`] if `start` is not in the snapshot.
/// Incident relationships are tried strongest first (ties in insertion
/// order), so a tree path always uses the strongest admitted edge from its
/// parent.
pub fn traverse(
    snapshot: &StoreSnapshot<'_>,
    start: &str,
    max_depth: usize,
    filter: &EdgeFilter,
    limits: TraversalLimits,
) -> Result<TraversalOutcome> {
    let start_entity = snapshot
        .entity(start)
        .ok_or_else(|| GraphError::NotFound(format!("start entity not found: {}", start)))?;

    let started = Instant::now();
    let mut outcome = TraversalOutcome {
        entities: vec![start_entity.clone()],
        ..Default::default()
    };

    let mut tree: HashMap<String, TreePath> = HashMap::new();
    tree.insert(start.to_string(), TreePath::root(start));
    let mut expanded: HashSet<String> = HashSet::new();
    let mut seen_relationships: HashSet<String> = HashSet::new();
    let mut closing_edges: HashSet<String> = HashSet::new();
    let mut frontier: VecDeque<(String, usize)> = VecDeque::new();
    frontier.push_back((start.to_string(), 0));

    while let Some((entity_id, depth)) = frontier.pop_front() {
        if started.elapsed() >= limits.timeout {
            log::warn!(
                "traversal from {} stopped after {:?} (timeout)",
                start,
                started.elapsed()
            );
            outcome.truncated = true;
            break;
        }
        if depth >= max_depth {
            continue;
        }
        if !expanded.insert(entity_id.clone()) {
            continue;
        }
        let current = match tree.get(&entity_id) {
            Some(path) => path.clone(),
            None => continue,
        };

        let mut incident: Vec<&Relationship> = snapshot.incident(&entity_id).collect();
        incident.sort_by(|a, b| b.strength.partial_cmp(&a.strength).unwrap_or(Ordering::Equal));

        for rel in incident {
            let Some(other_id) = rel.other_end(&entity_id) else {
                continue;
            };
            let Some(other) = snapshot.entity(other_id) else {
                continue;
            };
            if !filter.admits(rel, other) {
                continue;
            }

            if seen_relationships.insert(rel.id.clone()) {
                outcome.relationships.push(rel.clone());
            }

            if other_id == entity_id || current.last_edge() == Some(rel.id.as_str()) {
                continue;
            }

            if let Some(other_path) = tree.get(other_id) {
                // Already reached: a non-tree edge. It closes a loop through the
                // start only when the two branches diverge right at the start.
                let is_tree_edge = other_path.last_edge() == Some(rel.id.as_str());
                let diverge_at_start =
                    other_path.branch().is_none() || other_path.branch() != current.branch();
                if !is_tree_edge && diverge_at_start && closing_edges.insert(rel.id.clone()) {
                    outcome.paths.push(circular_path(&current, rel, other_path));
                }
                continue;
            }

            let path = current.extend(rel, other_id);
            outcome.entities.push(other.clone());
            outcome.paths.push(path.clone().into_path());
            tree.insert(other_id.to_string(), path);

            if depth + 1 < max_depth {
                if frontier.len() >= limits.max_frontier {
                    outcome.truncated = true;
                    continue;
                }
                frontier.push_back((other_id.to_string(), depth + 1));
            }
        }
    }

    if outcome.truncated {
        log::warn!(
            "traversal from {} truncated: {} entities, {} relationships kept",
            start,
            outcome.entities.len(),
            outcome.relationships.len()
        );
    }

    Ok(outcome)
}
