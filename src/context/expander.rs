//! Context expansion.
//!
//! Auto-includes structurally related entities (owning file or class via
//! `contains`, imported files, implemented/extended super-types) alongside
//! the ranked candidates, up to a token budget. Expansions inherit a
//! reduced score so the original seeds keep primacy at assembly time.

use super::assembler::estimate_tokens;
use crate::config::ExpanderConfig;
use crate::models::{
    Direction, Entity, EntityId, RelationshipFilter, RelationshipType, ScoredEntity, SearchSource,
};
use crate::storage::{EntityStore, RelationshipStore};
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Structural relationship expander.
pub struct ContextExpander {
    entities: Arc<EntityStore>,
    relationships: Arc<RelationshipStore>,
    config: ExpanderConfig,
}

impl ContextExpander {
    /// Creates an expander.
    #[must_use]
    pub const fn new(
        entities: Arc<EntityStore>,
        relationships: Arc<RelationshipStore>,
        config: ExpanderConfig,
    ) -> Self {
        Self {
            entities,
            relationships,
            config,
        }
    }

    fn entity_tokens(entity: &Entity) -> usize {
        estimate_tokens(entity.comparison_text())
    }

    /// Structural neighbors of one entity: the owner behind an incoming
    /// `contains` edge, plus outgoing `imports`/`implements`/`extends`
    /// targets.
    fn structural_neighbors(&self, id: &EntityId) -> Result<Vec<EntityId>> {
        let mut neighbors = Vec::new();

        for edge in self.relationships.get_for_entity(
            id,
            Direction::In,
            &RelationshipFilter::new().with_types(vec![RelationshipType::Contains]),
        )? {
            neighbors.push(edge.source_id);
        }

        for edge in self.relationships.get_for_entity(
            id,
            Direction::Out,
            &RelationshipFilter::new().with_types(vec![
                RelationshipType::Imports,
                RelationshipType::Implements,
                RelationshipType::Extends,
            ]),
        )? {
            neighbors.push(edge.target_id);
        }

        Ok(neighbors)
    }

    /// Expands the candidate list, returning the additions.
    ///
    /// Each addition respects three budgets: it must not already be
    /// selected, must fit the remaining expansion token budget, and must
    /// fit its seed's share of that budget.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    #[instrument(skip(self, seeds), fields(seeds = seeds.len()))]
    pub fn expand(&self, seeds: &[ScoredEntity]) -> Result<Vec<ScoredEntity>> {
        let mut taken: HashSet<EntityId> = seeds.iter().map(|s| s.entity.id.clone()).collect();
        let mut additions: Vec<ScoredEntity> = Vec::new();
        let mut used_tokens = 0_usize;

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let per_seed_budget = (self.config.max_expansion_tokens as f32
            * self.config.budget_share_per_seed.clamp(0.0, 1.0)) as usize;

        for seed in seeds {
            let mut seed_tokens = 0_usize;
            let mut frontier = vec![seed.entity.id.clone()];

            for _ in 0..self.config.max_hops {
                let mut next = Vec::new();
                for id in &frontier {
                    for neighbor_id in self.structural_neighbors(id)? {
                        if taken.contains(&neighbor_id) {
                            continue;
                        }
                        let Some(neighbor) = self.entities.get(&neighbor_id)? else {
                            continue;
                        };

                        let tokens = Self::entity_tokens(&neighbor);
                        if used_tokens + tokens > self.config.max_expansion_tokens {
                            continue;
                        }
                        if seed_tokens + tokens > per_seed_budget {
                            continue;
                        }

                        used_tokens += tokens;
                        seed_tokens += tokens;
                        taken.insert(neighbor_id.clone());
                        next.push(neighbor_id);
                        additions.push(ScoredEntity::new(
                            neighbor,
                            seed.score * self.config.score_factor,
                            SearchSource::Graph,
                        ));
                    }
                }
                frontier = next;
                if frontier.is_empty() {
                    break;
                }
            }
        }

        metrics::counter!("repolens_context_expansions_total")
            .increment(additions.len() as u64);
        Ok(additions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityInput, EntityType, RelationshipInput};
    use crate::storage::{initialize_project, open_in_memory};
    use std::sync::Mutex;

    fn setup(config: ExpanderConfig) -> (Arc<EntityStore>, Arc<RelationshipStore>, ContextExpander)
    {
        let conn: Arc<Mutex<rusqlite::Connection>> = Arc::new(open_in_memory().unwrap());
        let tables = initialize_project(&conn, "test").unwrap();
        let entities = Arc::new(EntityStore::new(Arc::clone(&conn), tables.clone()));
        let relationships = Arc::new(RelationshipStore::new(conn, tables));
        let expander =
            ContextExpander::new(Arc::clone(&entities), Arc::clone(&relationships), config);
        (entities, relationships, expander)
    }

    fn seed(entities: &EntityStore, id: &str, ty: EntityType, content: &str) -> Entity {
        entities
            .upsert(EntityInput {
                id: Some(EntityId::new(id)),
                name: id.to_string(),
                qualified_name: format!("q::{id}"),
                entity_type: Some(ty),
                content: Some(content.to_string()),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_expands_owner_and_imports() {
        let (entities, relationships, expander) = setup(ExpanderConfig::default());
        let function = seed(&entities, "func", EntityType::Function, "fn f() {}");
        let file = seed(&entities, "file", EntityType::File, "file content");
        let import = seed(&entities, "imported", EntityType::File, "imported content");
        let unrelated = seed(&entities, "unrelated", EntityType::File, "x");

        relationships
            .create(RelationshipInput::new(
                EntityId::new("file"),
                EntityId::new("func"),
                RelationshipType::Contains,
            ))
            .unwrap();
        relationships
            .create(RelationshipInput::new(
                EntityId::new("func"),
                EntityId::new("imported"),
                RelationshipType::Imports,
            ))
            .unwrap();
        let _ = (file, import, unrelated);

        let seeds = vec![ScoredEntity::new(function, 0.8, SearchSource::Keyword)];
        let additions = expander.expand(&seeds).unwrap();

        let ids: Vec<&str> = additions.iter().map(|a| a.entity.id.as_str()).collect();
        assert!(ids.contains(&"file"));
        assert!(ids.contains(&"imported"));
        assert!(!ids.contains(&"unrelated"));

        // reduced score: 0.8 * 0.5
        assert!(additions.iter().all(|a| (a.score - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_skips_already_selected() {
        let (entities, relationships, expander) = setup(ExpanderConfig::default());
        let function = seed(&entities, "func", EntityType::Function, "fn f() {}");
        let file = seed(&entities, "file", EntityType::File, "file content");

        relationships
            .create(RelationshipInput::new(
                EntityId::new("file"),
                EntityId::new("func"),
                RelationshipType::Contains,
            ))
            .unwrap();

        let seeds = vec![
            ScoredEntity::new(function, 0.8, SearchSource::Keyword),
            ScoredEntity::new(file, 0.7, SearchSource::Keyword),
        ];
        let additions = expander.expand(&seeds).unwrap();
        assert!(additions.is_empty());
    }

    #[test]
    fn test_budget_limits_additions() {
        let config = ExpanderConfig {
            max_expansion_tokens: 10,
            budget_share_per_seed: 1.0,
            ..Default::default()
        };
        let (entities, relationships, expander) = setup(config);
        let function = seed(&entities, "func", EntityType::Function, "fn f() {}");
        // 200 chars ≈ 50 tokens, far over the 10-token budget
        seed(&entities, "file", EntityType::File, &"x".repeat(200));

        relationships
            .create(RelationshipInput::new(
                EntityId::new("file"),
                EntityId::new("func"),
                RelationshipType::Contains,
            ))
            .unwrap();

        let seeds = vec![ScoredEntity::new(function, 0.8, SearchSource::Keyword)];
        let additions = expander.expand(&seeds).unwrap();
        assert!(additions.is_empty());
    }

    #[test]
    fn test_two_hop_expansion() {
        let config = ExpanderConfig {
            max_hops: 2,
            ..Default::default()
        };
        let (entities, relationships, expander) = setup(config);
        let method = seed(&entities, "method", EntityType::Method, "fn m() {}");
        seed(&entities, "class", EntityType::Class, "struct C;");
        seed(&entities, "file", EntityType::File, "file body");

        relationships
            .create(RelationshipInput::new(
                EntityId::new("class"),
                EntityId::new("method"),
                RelationshipType::Contains,
            ))
            .unwrap();
        relationships
            .create(RelationshipInput::new(
                EntityId::new("file"),
                EntityId::new("class"),
                RelationshipType::Contains,
            ))
            .unwrap();

        let seeds = vec![ScoredEntity::new(method, 0.8, SearchSource::Keyword)];
        let additions = expander.expand(&seeds).unwrap();

        let ids: Vec<&str> = additions.iter().map(|a| a.entity.id.as_str()).collect();
        assert!(ids.contains(&"class"));
        assert!(ids.contains(&"file"));
    }
}
