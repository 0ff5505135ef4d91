pub mod audit;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod governance;
pub mod graph;
pub mod query;

pub use config::Config;
pub use error::{GraphError, Result};
pub use graph::{
    Entity, EntityType, GraphStore, NewEntity, NewRelationship, Relationship, RelationshipType,
};
pub use query::{GraphQuery, GraphResult, QueryEngine, QueryType};
