//! Relationship graph: typed entities, weighted relationships, the shared
//! in-memory store, BFS traversal, and relationship-profile similarity.
//!
//! Relationships are stored directionally (source -> target) but every
//! traversal treats them as undirected edges.

mod similarity;
mod store;
mod traversal;

pub use similarity::{find_similar, jaccard};
pub use store::{GraphStatistics, GraphStore, StoreSnapshot};
pub use traversal::{traverse, EdgeFilter, GraphPath, PathKind, TraversalLimits, TraversalOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::GraphError;

/// Closed set of entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Agent,
    User,
    Policy,
    Record,
    Organization,
    Document,
    Conversation,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Agent,
        EntityType::User,
        EntityType::Policy,
        EntityType::Record,
        EntityType::Organization,
        EntityType::Document,
        EntityType::Conversation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Agent => "agent",
            EntityType::User => "user",
            EntityType::Policy => "policy",
            EntityType::Record => "record",
            EntityType::Organization => "organization",
            EntityType::Document => "document",
            EntityType::Conversation => "conversation",
        }
    }

    /// Entities that govern others.
    pub fn is_policy_like(&self) -> bool {
        matches!(self, EntityType::Policy)
    }

    /// Entities that act and can be governed.
    pub fn is_agent_like(&self) -> bool {
        matches!(self, EntityType::Agent)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| GraphError::Validation(format!("unknown entity type: {}", s)))
    }
}

/// Closed set of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    GovernedBy,
    InteractsWith,
    DependsOn,
    SimilarTo,
    Contains,
    CreatedBy,
    Affects,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        RelationshipType::GovernedBy,
        RelationshipType::InteractsWith,
        RelationshipType::DependsOn,
        RelationshipType::SimilarTo,
        RelationshipType::Contains,
        RelationshipType::CreatedBy,
        RelationshipType::Affects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::GovernedBy => "governed_by",
            RelationshipType::InteractsWith => "interacts_with",
            RelationshipType::DependsOn => "depends_on",
            RelationshipType::SimilarTo => "similar_to",
            RelationshipType::Contains => "contains",
            RelationshipType::CreatedBy => "created_by",
            RelationshipType::Affects => "affects",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        RelationshipType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| GraphError::Validation(format!("unknown relationship type: {}", s)))
    }
}

/// Free-form attribute value attached to entities and relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A typed node in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A typed, weighted edge (source -> target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    /// Confidence in [0, 1].
    pub strength: f64,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// The endpoint opposite `entity_id`, or None if the relationship does not touch it.
    pub fn other_end(&self, entity_id: &str) -> Option<&str> {
        if self.source_id == entity_id {
            Some(&self.target_id)
        } else if self.target_id == entity_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// Input for [`GraphStore::add_entity`]; the id is generated when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewEntity {
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            id: None,
            entity_type,
            name: name.into(),
            description: String::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Input for [`GraphStore::add_relationship`]; the id is generated when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelationship {
    #[serde(default)]
    pub id: Option<String>,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub strength: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewRelationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
        strength: f64,
    ) -> Self {
        Self {
            id: None,
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            strength,
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_parse_and_display() {
        assert_eq!("policy".parse::<EntityType>().unwrap(), EntityType::Policy);
        assert_eq!(" Agent ".parse::<EntityType>().unwrap(), EntityType::Agent);
        assert!("robot".parse::<EntityType>().is_err());
        assert_eq!(EntityType::Conversation.to_string(), "conversation");
    }

    #[test]
    fn test_relationship_type_parse_accepts_dashes() {
        assert_eq!(
            "governed-by".parse::<RelationshipType>().unwrap(),
            RelationshipType::GovernedBy
        );
        assert_eq!(
            "depends_on".parse::<RelationshipType>().unwrap(),
            RelationshipType::DependsOn
        );
    }

    #[test]
    fn test_other_end() {
        let rel = Relationship {
            id: "r1".into(),
            source_id: "a".into(),
            target_id: "b".into(),
            relationship_type: RelationshipType::Affects,
            strength: 0.4,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        };
        assert_eq!(rel.other_end("a"), Some("b"));
        assert_eq!(rel.other_end("b"), Some("a"));
        assert_eq!(rel.other_end("c"), None);
    }

    #[test]
    fn test_metadata_value_json_shape() {
        let entity = NewEntity::new(EntityType::Record, "ledger")
            .with_metadata("rows", 12.0)
            .with_metadata("archived", false)
            .with_metadata("owner", "ops");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "record");
        assert_eq!(json["metadata"]["rows"], 12.0);
        assert_eq!(json["metadata"]["archived"], false);
        assert_eq!(json["metadata"]["owner"], "ops");

        let nested: MetadataValue =
            serde_json::from_str(r#"{"tags": ["a", "b"], "level": 2}"#).unwrap();
        match nested {
            MetadataValue::Map(map) => {
                assert_eq!(map["level"], MetadataValue::Number(2.0));
                assert!(matches!(map["tags"], MetadataValue::List(_)));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }
}
