//! Pre-execution governance gate.
//!
//! The engine asks the gate before running any query; a rejection turns into
//! an empty result carrying the gate's reason.

use std::collections::HashSet;

use crate::config::GovernanceConfig;
use crate::query::GraphQuery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub valid: bool,
    pub reason: Option<String>,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// External validation/approval service consulted before each query.
pub trait QueryGate: Send + Sync {
    fn validate(&self, query: &GraphQuery) -> GateDecision;
}

/// Approves everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl QueryGate for AllowAll {
    fn validate(&self, _query: &GraphQuery) -> GateDecision {
        GateDecision::allow()
    }
}

/// Gate driven by the `[governance]` config section: an optional depth
/// ceiling and a list of entities that may not be used as a query start.
#[derive(Debug, Clone, Default)]
pub struct ConfigGate {
    max_depth: Option<usize>,
    blocked_entities: HashSet<String>,
}

impl ConfigGate {
    pub fn new(config: &GovernanceConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            blocked_entities: config.blocked_entities.iter().cloned().collect(),
        }
    }
}

impl QueryGate for ConfigGate {
    fn validate(&self, query: &GraphQuery) -> GateDecision {
        if self.blocked_entities.contains(&query.start_entity) {
            return GateDecision::reject(format!(
                "queries starting at {} are not permitted",
                query.start_entity
            ));
        }
        if let (Some(limit), Some(depth)) = (self.max_depth, query.max_depth) {
            if depth > limit {
                return GateDecision::reject(format!(
                    "requested depth {} exceeds the permitted {}",
                    depth, limit
                ));
            }
        }
        GateDecision::allow()
    }
}
