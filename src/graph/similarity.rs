//! Relationship-profile similarity: Jaccard index over the sets of
//! relationship types touching each entity.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::{GraphError, Result};
use crate::graph::{Entity, EntityType, RelationshipType, StoreSnapshot};

/// Jaccard index of two relationship-type sets.
///
/// Two isolated entities are equally disconnected (1.0); an isolated entity
/// shares nothing with a connected one (0.0).
pub fn jaccard(a: &BTreeSet<RelationshipType>, b: &BTreeSet<RelationshipType>) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let intersection = a.intersection(b).count();
            let union = a.union(b).count();
            intersection as f64 / union as f64
        }
    }
}

/// Relationship-type set of every entity that has at least one relationship.
fn type_profiles<'a>(
    snapshot: &'a StoreSnapshot<'_>,
) -> HashMap<&'a str, BTreeSet<RelationshipType>> {
    let mut profiles: HashMap<&str, BTreeSet<RelationshipType>> = HashMap::new();
    for rel in snapshot.relationships() {
        profiles
            .entry(rel.source_id.as_str())
            .or_default()
            .insert(rel.relationship_type);
        profiles
            .entry(rel.target_id.as_str())
            .or_default()
            .insert(rel.relationship_type);
    }
    profiles
}

/// Entities whose relationship profile resembles `start`'s, best first.
///
/// Candidates are every other entity (restricted to `entity_types` when
/// given); those scoring at least `threshold` are kept, sorted by score
/// descending (ties by id), and cut to `max_results`.
pub fn find_similar(
    snapshot: &StoreSnapshot<'_>,
    start: &str,
    entity_types: Option<&HashSet<EntityType>>,
    threshold: f64,
    max_results: usize,
) -> Result<Vec<(Entity, f64)>> {
    if snapshot.entity(start).is_none() {
        return Err(GraphError::NotFound(format!("start entity not found: {}", start)));
    }

    let profiles = type_profiles(snapshot);
    let empty = BTreeSet::new();
    let start_profile = profiles.get(start).unwrap_or(&empty);

    let mut scored: Vec<(Entity, f64)> = snapshot
        .entities()
        .filter(|e| e.id != start)
        .filter(|e| entity_types.map_or(true, |types| types.contains(&e.entity_type)))
        .filter_map(|e| {
            let profile = profiles.get(e.id.as_str()).unwrap_or(&empty);
            let score = jaccard(start_profile, profile);
            (score >= threshold).then(|| (e.clone(), score))
        })
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(max_results);

    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, NewEntity, NewRelationship};

    fn set(types: &[RelationshipType]) -> BTreeSet<RelationshipType> {
        types.iter().copied().collect()
    }

    #[test]
    fn test_jaccard_half_overlap() {
        let a = set(&[RelationshipType::GovernedBy]);
        let b = set(&[RelationshipType::GovernedBy, RelationshipType::InteractsWith]);
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_symmetric_and_bounded() {
        let profiles = [
            set(&[]),
            set(&[RelationshipType::Affects]),
            set(&[RelationshipType::Affects, RelationshipType::Contains]),
            set(&[RelationshipType::DependsOn, RelationshipType::CreatedBy]),
            set(&RelationshipType::ALL),
        ];
        for a in &profiles {
            for b in &profiles {
                let ab = jaccard(a, b);
                assert_eq!(ab, jaccard(b, a));
                assert!((0.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn test_jaccard_empty_rules() {
        let empty = set(&[]);
        let one = set(&[RelationshipType::Contains]);
        assert_eq!(jaccard(&empty, &empty), 1.0);
        assert_eq!(jaccard(&empty, &one), 0.0);
    }

    fn similarity_store() -> GraphStore {
        let store = GraphStore::new();
        for (id, t) in [
            ("start", EntityType::Agent),
            ("twin", EntityType::Agent),
            ("half", EntityType::Agent),
            ("doc", EntityType::Document),
            ("policy", EntityType::Policy),
            ("lonely", EntityType::Agent),
        ] {
            store.add_entity(NewEntity::new(t, id).with_id(id)).unwrap();
        }
        let rels = [
            ("start", "policy", RelationshipType::GovernedBy),
            ("twin", "policy", RelationshipType::GovernedBy),
            ("half", "policy", RelationshipType::GovernedBy),
            ("half", "doc", RelationshipType::InteractsWith),
        ];
        for (from, to, t) in rels {
            store
                .add_relationship(NewRelationship::new(from, to, t, 0.5))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_find_similar_ranks_and_filters() {
        let store = similarity_store();
        let snapshot = store.read();

        let matches = find_similar(&snapshot, "start", None, 0.5, 50).unwrap();
        let got: Vec<(&str, f64)> = matches.iter().map(|(e, s)| (e.id.as_str(), *s)).collect();
        // policy has {governed_by} too; half scores 1/2; doc {interacts_with} scores 0
        assert_eq!(got, vec![("policy", 1.0), ("twin", 1.0), ("half", 0.5)]);

        let agents: HashSet<EntityType> = [EntityType::Agent].into_iter().collect();
        let matches = find_similar(&snapshot, "start", Some(&agents), 0.5, 50).unwrap();
        assert!(matches.iter().all(|(e, _)| e.entity_type == EntityType::Agent));
        assert_eq!(matches.len(), 2);

        let matches = find_similar(&snapshot, "start", None, 0.5, 1).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_find_similar_isolated_start() {
        let store = similarity_store();
        let snapshot = store.read();
        let matches = find_similar(&snapshot, "lonely", None, 0.5, 50).unwrap();
        // only other isolated entities match, and there are none
        assert!(matches.is_empty());
    }

    #[test]
    fn test_find_similar_unknown_start() {
        let store = similarity_store();
        let snapshot = store.read();
        let err = find_similar(&snapshot, "ghost", None, 0.5, 50).unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
    }
}
