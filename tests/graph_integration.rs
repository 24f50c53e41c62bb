//! Integration tests for the graph engine: relationship storage,
//! traversal, and entity resolution through the service surface.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use repolens::graph::{FindDuplicatesOptions, MergeOptions, NeighborhoodOptions};
use repolens::models::{
    EntityId, EntityInput, EntityType, RelationshipFilter, RelationshipInput, RelationshipType,
};
use repolens::models::Direction;
use repolens::service::RetrievalService;
use repolens::RepolensConfig;

fn service() -> RetrievalService {
    RetrievalService::new(RepolensConfig::in_memory()).unwrap()
}

fn seed_entity(service: &RetrievalService, project: &str, id: &str, name: &str, ty: EntityType) {
    let entities = service.entities(project).unwrap();
    let index = service.embeddings(project).unwrap();
    let entity = entities
        .upsert(EntityInput {
            id: Some(EntityId::new(id)),
            name: name.to_string(),
            qualified_name: format!("{project}::{id}"),
            entity_type: Some(ty),
            content: Some(format!("{name} body text")),
            ..Default::default()
        })
        .unwrap();
    let vector = service.embedder().embed(entity.comparison_text()).unwrap();
    index.upsert(&entity.id, &vector).unwrap();
}

fn link(service: &RetrievalService, project: &str, source: &str, target: &str, ty: RelationshipType) {
    service
        .relationships(project)
        .unwrap()
        .create(RelationshipInput::new(
            EntityId::new(source),
            EntityId::new(target),
            ty,
        ))
        .unwrap();
}

#[test]
fn upsert_is_idempotent() {
    let service = service();
    let relationships = service.relationships("p").unwrap();

    let input = || {
        RelationshipInput::new(
            EntityId::new("a"),
            EntityId::new("b"),
            RelationshipType::Calls,
        )
        .with_weight(1.0)
    };

    let first = relationships.upsert(input()).unwrap();
    let second = relationships.upsert(input().with_weight(3.0)).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(relationships.count(None).unwrap(), 1);
    let stored = relationships.get(&first.id).unwrap().unwrap();
    assert!((stored.weight - 3.0).abs() < f32::EPSILON);
}

#[test]
fn create_many_then_upsert_keeps_counts_stable() {
    let service = service();
    let relationships = service.relationships("p").unwrap();

    let inputs = || {
        vec![
            RelationshipInput::new(
                EntityId::new("a"),
                EntityId::new("b"),
                RelationshipType::Calls,
            ),
            RelationshipInput::new(
                EntityId::new("b"),
                EntityId::new("c"),
                RelationshipType::Imports,
            ),
            RelationshipInput::new(
                EntityId::new("c"),
                EntityId::new("d"),
                RelationshipType::Uses,
            ),
        ]
    };

    let before = relationships.count(None).unwrap();
    relationships.create_many(inputs()).unwrap();
    assert_eq!(relationships.count(None).unwrap(), before + 3);

    // the same edges routed through upsert change nothing
    for input in inputs() {
        relationships.upsert(input).unwrap();
    }
    assert_eq!(relationships.count(None).unwrap(), before + 3);
}

#[test]
fn merge_redirects_and_deletes_duplicate() {
    // (A→B CALLS), (C→B CALLS); merge primary=A duplicates=[C]
    let service = service();
    seed_entity(&service, "p", "A", "alpha", EntityType::Concept);
    seed_entity(&service, "p", "B", "beta", EntityType::Concept);
    seed_entity(&service, "p", "C", "gamma", EntityType::Concept);
    link(&service, "p", "A", "B", RelationshipType::Calls);
    link(&service, "p", "C", "B", RelationshipType::Calls);

    let resolver = service.resolver("p").unwrap();
    let outcome = resolver
        .merge(
            &EntityId::new("A"),
            &[EntityId::new("C")],
            &MergeOptions::default(),
        )
        .unwrap();

    let entities = service.entities("p").unwrap();
    let relationships = service.relationships("p").unwrap();

    assert!(entities.get(&EntityId::new("C")).unwrap().is_none());
    assert!(relationships
        .exists(
            &EntityId::new("A"),
            &EntityId::new("B"),
            Some(RelationshipType::Calls)
        )
        .unwrap());
    // no edge still references C in either direction
    let c_edges = relationships
        .get_for_entity(&EntityId::new("C"), Direction::Both, &RelationshipFilter::new())
        .unwrap();
    assert!(c_edges.is_empty());
    // redirect landed on an existing triple: dropped, no duplicate created
    assert_eq!(relationships.count(None).unwrap(), 1);
    assert_eq!(outcome.relationships_redirected, 0);
    assert_eq!(outcome.merged_count, 1);
}

#[test]
fn merge_leaves_no_duplicate_triples() {
    let service = service();
    for (id, name) in [("A", "alpha"), ("C", "gamma"), ("X", "xray"), ("Y", "yank")] {
        seed_entity(&service, "p", id, name, EntityType::Concept);
    }
    // C has one edge that collides after redirect and one that does not
    link(&service, "p", "A", "X", RelationshipType::Uses);
    link(&service, "p", "C", "X", RelationshipType::Uses);
    link(&service, "p", "C", "Y", RelationshipType::Uses);

    let resolver = service.resolver("p").unwrap();
    let outcome = resolver
        .merge(
            &EntityId::new("A"),
            &[EntityId::new("C")],
            &MergeOptions::default(),
        )
        .unwrap();

    assert_eq!(outcome.relationships_redirected, 1);

    let relationships = service.relationships("p").unwrap();
    let out_edges = relationships
        .get_for_entity(&EntityId::new("A"), Direction::Out, &RelationshipFilter::new())
        .unwrap();
    assert_eq!(out_edges.len(), 2);
    // exactly one edge per (source, target, type) triple
    let mut triples: Vec<(String, String)> = out_edges
        .iter()
        .map(|e| (e.target_id.to_string(), e.relationship.to_string()))
        .collect();
    triples.sort();
    triples.dedup();
    assert_eq!(triples.len(), 2);
}

#[test]
fn shortest_path_type_filter_scenario() {
    // A—CALLS→B—IMPORTS→C
    let service = service();
    for (id, name) in [("A", "alpha"), ("B", "beta"), ("C", "carol")] {
        seed_entity(&service, "p", id, name, EntityType::Function);
    }
    link(&service, "p", "A", "B", RelationshipType::Calls);
    link(&service, "p", "B", "C", RelationshipType::Imports);

    let traversal = service.traversal("p").unwrap();

    let filtered = traversal
        .find_shortest_path(
            &EntityId::new("A"),
            &EntityId::new("C"),
            Some(&[RelationshipType::Calls]),
        )
        .unwrap();
    assert!(filtered.is_none());

    let path = traversal
        .find_shortest_path(&EntityId::new("A"), &EntityId::new("C"), None)
        .unwrap()
        .expect("path should exist without a type filter");
    assert_eq!(path.length, 2);
    assert_eq!(path.nodes.len(), 3);
    assert_eq!(path.edges.len(), 2);
    assert_eq!(
        path.nodes.iter().map(EntityId::as_str).collect::<Vec<_>>(),
        vec!["A", "B", "C"],
    );
    assert_eq!(path.edges[0].relationship, RelationshipType::Calls);
    assert_eq!(path.edges[1].relationship, RelationshipType::Imports);
}

#[test]
fn duplicate_group_scenario() {
    let service = service();
    let entities = service.entities("p").unwrap();
    let index = service.embeddings("p").unwrap();

    for (id, name) in [("e1", "AuthService"), ("e2", "Authentication Service")] {
        entities
            .upsert(EntityInput {
                id: Some(EntityId::new(id)),
                name: name.to_string(),
                qualified_name: format!("p::{id}"),
                entity_type: Some(EntityType::Concept),
                ..Default::default()
            })
            .unwrap();
    }
    // near-identical vectors, similarity ≈ 0.92
    index.upsert(&EntityId::new("e1"), &[1.0, 0.28, 0.0]).unwrap();
    index.upsert(&EntityId::new("e2"), &[1.0, 0.0, 0.28]).unwrap();

    let resolver = service.resolver("p").unwrap();
    let groups = resolver
        .find_duplicates(&FindDuplicatesOptions {
            threshold: 0.85,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].primary.id.as_str(), "e1");
    assert_eq!(groups[0].duplicates.len(), 1);
    assert_eq!(groups[0].duplicates[0].id.as_str(), "e2");
    assert!(groups[0].similarity >= 0.85);

    // the second sweep skips both as already processed
    let second = resolver
        .find_duplicates(&FindDuplicatesOptions {
            threshold: 0.85,
            ..Default::default()
        })
        .unwrap();
    assert!(second.is_empty());
}

#[test]
fn neighborhood_respects_weight_filter() {
    let service = service();
    for (id, name) in [("a", "alpha"), ("b", "beta"), ("c", "carol")] {
        seed_entity(&service, "p", id, name, EntityType::Function);
    }
    let relationships = service.relationships("p").unwrap();
    relationships
        .create(
            RelationshipInput::new(
                EntityId::new("a"),
                EntityId::new("b"),
                RelationshipType::Calls,
            )
            .with_weight(0.9),
        )
        .unwrap();
    relationships
        .create(
            RelationshipInput::new(
                EntityId::new("a"),
                EntityId::new("c"),
                RelationshipType::Calls,
            )
            .with_weight(0.1),
        )
        .unwrap();

    let traversal = service.traversal("p").unwrap();
    let hood = traversal
        .get_neighborhood(
            &EntityId::new("a"),
            &NeighborhoodOptions {
                min_weight: Some(0.5),
                ..Default::default()
            },
        )
        .unwrap();

    let names: Vec<&str> = hood.entities.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"beta"));
    assert!(!names.contains(&"carol"));
}

#[test]
fn orphan_cleanup_removes_dangling_edges() {
    let service = service();
    seed_entity(&service, "p", "a", "alpha", EntityType::Function);
    let relationships = service.relationships("p").unwrap();
    // "ghost" was never stored as an entity
    relationships
        .create(RelationshipInput::new(
            EntityId::new("a"),
            EntityId::new("ghost"),
            RelationshipType::Calls,
        ))
        .unwrap();

    let removed = relationships.delete_orphans().unwrap();
    assert_eq!(removed, 1);
    assert_eq!(relationships.count(None).unwrap(), 0);
}

#[test]
fn most_connected_and_average_degree() {
    let service = service();
    for (id, name) in [("hub", "hub"), ("a", "alpha"), ("b", "beta"), ("c", "carol")] {
        seed_entity(&service, "p", id, name, EntityType::Function);
    }
    for target in ["a", "b", "c"] {
        link(&service, "p", "hub", target, RelationshipType::Calls);
    }

    let relationships = service.relationships("p").unwrap();
    let top = relationships.most_connected(1).unwrap();
    assert_eq!(top[0].0.as_str(), "hub");
    assert_eq!(top[0].1, 3);

    // 2*3 edges / 4 touched entities
    let avg = relationships.average_degree().unwrap();
    assert!((avg - 1.5).abs() < f64::EPSILON);
}

#[test]
fn resolve_prefers_exact_over_fuzzy() {
    let service = service();
    seed_entity(&service, "p", "exact", "TokenStore", EntityType::Class);
    seed_entity(&service, "p", "near", "TokenStorage", EntityType::Class);

    let resolver = service.resolver("p").unwrap();
    let resolved = resolver
        .resolve("TokenStore", &repolens::graph::ResolveOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(resolved.id.as_str(), "exact");
}
