//! Shared in-memory entity/relationship store.
//!
//! One `RwLock` guards the whole graph: writers serialise, readers share.
//! A traversal holds a [`StoreSnapshot`] (the read guard) for its whole run,
//! so it never observes a half-applied write.

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::graph::{Entity, EntityType, NewEntity, NewRelationship, Relationship, RelationshipType};

/// Strength above which a relationship counts as a strong connection.
const STRONG_CONNECTION_STRENGTH: f64 = 0.8;

#[derive(Debug, Default)]
struct StoreInner {
    entities: HashMap<String, Entity>,
    entity_order: Vec<String>,
    relationships: HashMap<String, Relationship>,
    relationship_order: Vec<String>,
    /// entity id -> incident relationship ids, insertion order
    adjacency: HashMap<String, Vec<String>>,
    generation: u64,
}

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStatistics {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entity_type_counts: BTreeMap<EntityType, usize>,
    pub relationship_type_counts: BTreeMap<RelationshipType, usize>,
    /// Mean degree: every relationship contributes one connection to each endpoint.
    pub average_connections: f64,
    pub strong_connection_count: usize,
}

/// Thread-safe entity/relationship store, one per session or tenant.
#[derive(Debug, Default)]
pub struct GraphStore {
    inner: RwLock<StoreInner>,
}

/// Consistent read view of the store.
pub struct StoreSnapshot<'a> {
    guard: RwLockReadGuard<'a, StoreInner>,
}

impl<'a> StoreSnapshot<'a> {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.guard.entities.get(id)
    }

    pub fn relationship(&self, id: &str) -> Option<&Relationship> {
        self.guard.relationships.get(id)
    }

    /// Relationships touching `entity_id` as source or target, in insertion order.
    pub fn incident(&self, entity_id: &str) -> impl Iterator<Item = &Relationship> + '_ {
        self.guard
            .adjacency
            .get(entity_id)
            .into_iter()
            .flatten()
            .filter_map(move |rel_id| self.guard.relationships.get(rel_id))
    }

    /// All entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.guard
            .entity_order
            .iter()
            .filter_map(move |id| self.guard.entities.get(id))
    }

    /// All relationships in insertion order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> + '_ {
        self.guard
            .relationship_order
            .iter()
            .filter_map(move |id| self.guard.relationships.get(id))
    }

    /// Distinct types of the relationships touching `entity_id`.
    pub fn relationship_types_of(&self, entity_id: &str) -> BTreeSet<RelationshipType> {
        self.incident(entity_id).map(|rel| rel.relationship_type).collect()
    }

    pub fn entity_count(&self) -> usize {
        self.guard.entities.len()
    }

    pub fn generation(&self) -> u64 {
        self.guard.generation
    }
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a consistent read view. Hold it only as long as needed: writers wait on it.
    pub fn read(&self) -> StoreSnapshot<'_> {
        StoreSnapshot {
            guard: self.inner.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Add an entity, generating an id if none was supplied.
    ///
    /// Fails with [`GraphError::Validation`] if the id is already taken;
    /// an entity's type never changes once created.
    pub fn add_entity(&self, new: NewEntity) -> Result<Entity> {
        let id = match new.id {
            Some(id) if id.trim().is_empty() => {
                return Err(GraphError::Validation("entity id must not be empty".to_string()))
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.entities.contains_key(&id) {
            return Err(GraphError::Validation(format!("entity already exists: {}", id)));
        }

        let now = Utc::now();
        let entity = Entity {
            id: id.clone(),
            entity_type: new.entity_type,
            name: new.name,
            description: new.description,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        inner.entities.insert(id.clone(), entity.clone());
        inner.entity_order.push(id.clone());
        inner.adjacency.entry(id).or_default();
        inner.generation += 1;

        Ok(entity)
    }

    /// Add a relationship between two existing entities.
    ///
    /// Both endpoints must already exist and `strength` must lie in [0, 1];
    /// violations fail with [`GraphError::Validation`].
    pub fn add_relationship(&self, new: NewRelationship) -> Result<Relationship> {
        if !(0.0..=1.0).contains(&new.strength) {
            return Err(GraphError::Validation(format!(
                "relationship strength must be within [0, 1], got {}",
                new.strength
            )));
        }

        let id = match new.id {
            Some(id) if id.trim().is_empty() => {
                return Err(GraphError::Validation(
                    "relationship id must not be empty".to_string(),
                ))
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for endpoint in [&new.source_id, &new.target_id] {
            if !inner.entities.contains_key(endpoint.as_str()) {
                return Err(GraphError::Validation(format!(
                    "relationship {} references unknown entity: {}",
                    id, endpoint
                )));
            }
        }
        if inner.relationships.contains_key(&id) {
            return Err(GraphError::Validation(format!(
                "relationship already exists: {}",
                id
            )));
        }

        let relationship = Relationship {
            id: id.clone(),
            source_id: new.source_id,
            target_id: new.target_id,
            relationship_type: new.relationship_type,
            strength: new.strength,
            metadata: new.metadata,
            created_at: Utc::now(),
        };

        inner
            .adjacency
            .entry(relationship.source_id.clone())
            .or_default()
            .push(id.clone());
        if relationship.target_id != relationship.source_id {
            inner
                .adjacency
                .entry(relationship.target_id.clone())
                .or_default()
                .push(id.clone());
        }
        inner.relationships.insert(id.clone(), relationship.clone());
        inner.relationship_order.push(id);
        inner.generation += 1;

        Ok(relationship)
    }

    pub fn get_entity(&self, id: &str) -> Option<Entity> {
        self.read().entity(id).cloned()
    }

    pub fn get_relationship(&self, id: &str) -> Option<Relationship> {
        self.read().relationship(id).cloned()
    }

    pub fn contains_entity(&self, id: &str) -> bool {
        self.read().entity(id).is_some()
    }

    pub fn contains_relationship(&self, id: &str) -> bool {
        self.read().relationship(id).is_some()
    }

    /// Each relationship touching `id` paired with the entity at its other end.
    pub fn neighbors(&self, id: &str) -> Vec<(Relationship, Entity)> {
        let snapshot = self.read();
        snapshot
            .incident(id)
            .filter_map(|rel| {
                let other = rel.other_end(id)?;
                let entity = snapshot.entity(other)?;
                Some((rel.clone(), entity.clone()))
            })
            .collect()
    }

    pub fn relationship_types_of(&self, id: &str) -> BTreeSet<RelationshipType> {
        self.read().relationship_types_of(id)
    }

    pub fn entity_count(&self) -> usize {
        self.read().entity_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.read().guard.relationships.len()
    }

    /// Incremented on every successful write.
    pub fn generation(&self) -> u64 {
        self.read().generation()
    }

    pub fn statistics(&self) -> GraphStatistics {
        let snapshot = self.read();

        let mut entity_type_counts = BTreeMap::new();
        for entity in snapshot.entities() {
            *entity_type_counts.entry(entity.entity_type).or_insert(0) += 1;
        }

        let mut relationship_type_counts = BTreeMap::new();
        let mut strong_connection_count = 0;
        for rel in snapshot.relationships() {
            *relationship_type_counts.entry(rel.relationship_type).or_insert(0) += 1;
            if rel.strength > STRONG_CONNECTION_STRENGTH {
                strong_connection_count += 1;
            }
        }

        let total_entities = snapshot.entity_count();
        let total_relationships = snapshot.guard.relationships.len();
        let average_connections = if total_entities == 0 {
            0.0
        } else {
            (2 * total_relationships) as f64 / total_entities as f64
        };

        GraphStatistics {
            total_entities,
            total_relationships,
            entity_type_counts,
            relationship_type_counts,
            average_connections,
            strong_connection_count,
        }
    }
}
