//! Search strategies.
//!
//! Four strategies share one contract: given a parsed query and options,
//! produce scored candidates in `[0, 1]`. Strategies are independent; a
//! failing strategy is dropped by the fusion layer without aborting the
//! others.

use crate::Result;
use crate::embedding::EmbeddingProvider;
use crate::graph::bigram_jaccard;
use crate::models::{
    Direction, Entity, EntityId, EntityType, ParsedQuery, RelationshipFilter, ScoredEntity,
    SearchSource,
};
use crate::storage::{EmbeddingIndex, EntityStore, RelationshipStore, SimilarityOptions};
use std::collections::HashMap;
use std::sync::Arc;

/// Options shared by all strategies for one search invocation.
#[derive(Debug, Clone, Default)]
pub struct StrategyOptions {
    /// Per-strategy candidate cap.
    pub limit: usize,
    /// Restrict candidates to these entity types.
    pub entity_types: Option<Vec<EntityType>>,
    /// Precomputed query embedding (HyDE or caller-supplied).
    pub query_embedding: Option<Vec<f32>>,
    /// Minimum cosine score for semantic matches.
    pub semantic_threshold: f32,
    /// Minimum bigram similarity for fuzzy matches.
    pub fuzzy_threshold: f32,
}

/// Common contract for search strategies.
pub trait Strategy: Send + Sync {
    /// The tag this strategy reports on its results.
    fn source(&self) -> SearchSource;

    /// Runs the strategy.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying stores or providers fail; the
    /// fusion layer drops the strategy and continues.
    fn run(&self, parsed: &ParsedQuery, options: &StrategyOptions) -> Result<Vec<ScoredEntity>>;
}

fn type_allowed(entity: &Entity, options: &StrategyOptions) -> bool {
    options
        .entity_types
        .as_ref()
        .is_none_or(|types| types.contains(&entity.entity_type))
}

// ---------------------------------------------------------------------------
// Keyword
// ---------------------------------------------------------------------------

/// Token/substring matching over names, qualified names, and content.
#[derive(Clone)]
pub struct KeywordSearch {
    entities: Arc<EntityStore>,
}

impl KeywordSearch {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(entities: Arc<EntityStore>) -> Self {
        Self { entities }
    }
}

impl Strategy for KeywordSearch {
    fn source(&self) -> SearchSource {
        SearchSource::Keyword
    }

    #[allow(clippy::cast_precision_loss)]
    fn run(&self, parsed: &ParsedQuery, options: &StrategyOptions) -> Result<Vec<ScoredEntity>> {
        let terms = parsed.all_terms();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let total_terms = terms.len() as f32;

        // entity id → (entity, matched term count, name-level hit)
        let mut matches: HashMap<EntityId, (Entity, usize, bool)> = HashMap::new();
        for term in &terms {
            for entity in self.entities.search_text(term, options.limit)? {
                if !type_allowed(&entity, options) {
                    continue;
                }
                let name_hit = entity.name.to_lowercase().contains(term)
                    || entity.qualified_name.to_lowercase().contains(term);
                let entry = matches
                    .entry(entity.id.clone())
                    .or_insert_with(|| (entity, 0, false));
                entry.1 += 1;
                entry.2 |= name_hit;
            }
        }

        let mut results: Vec<ScoredEntity> = matches
            .into_values()
            .map(|(entity, hits, name_hit)| {
                let coverage = (hits as f32 / total_terms).min(1.0);
                let score = if name_hit {
                    (coverage + 0.2).min(1.0)
                } else {
                    coverage * 0.8
                };
                ScoredEntity::new(entity, score, SearchSource::Keyword)
            })
            .collect();

        crate::models::sort_by_score(&mut results);
        results.truncate(options.limit);
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Semantic
// ---------------------------------------------------------------------------

/// Embedding nearest-neighbor search.
#[derive(Clone)]
pub struct SemanticSearch {
    entities: Arc<EntityStore>,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SemanticSearch {
    /// Creates the strategy.
    #[must_use]
    pub fn new(
        entities: Arc<EntityStore>,
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            entities,
            index,
            embedder,
        }
    }
}

impl Strategy for SemanticSearch {
    fn source(&self) -> SearchSource {
        SearchSource::Semantic
    }

    fn run(&self, parsed: &ParsedQuery, options: &StrategyOptions) -> Result<Vec<ScoredEntity>> {
        let vector = match options.query_embedding.clone() {
            Some(vector) => vector,
            None => self.embedder.embed(&parsed.normalized)?,
        };
        if vector.is_empty() {
            return Ok(Vec::new());
        }

        let mut similarity = SimilarityOptions::with_limit(options.limit)
            .with_threshold(options.semantic_threshold);
        if let Some(types) = options.entity_types.clone() {
            similarity = similarity.with_entity_types(types);
        }

        let hits = self.index.find_similar(&vector, &similarity)?;
        let mut results = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            if let Some(entity) = self.entities.get(&id)? {
                results.push(ScoredEntity::new(entity, score, SearchSource::Semantic));
            }
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Graph expansion from entities mentioned in the query.
#[derive(Clone)]
pub struct GraphSearch {
    entities: Arc<EntityStore>,
    relationships: Arc<RelationshipStore>,
}

impl GraphSearch {
    /// Seed score for directly mentioned entities.
    const SEED_SCORE: f32 = 0.9;
    /// Per-hop score decay.
    const HOP_DECAY: f32 = 0.6;

    /// Creates the strategy.
    #[must_use]
    pub const fn new(entities: Arc<EntityStore>, relationships: Arc<RelationshipStore>) -> Self {
        Self {
            entities,
            relationships,
        }
    }

    fn resolve_seed(&self, text: &str) -> Result<Option<Entity>> {
        let exact = self.entities.get_by_name(text, None)?;
        if let Some(entity) = exact.into_iter().next() {
            return Ok(Some(entity));
        }
        Ok(self.entities.search_name(text, None, 1)?.into_iter().next())
    }
}

impl Strategy for GraphSearch {
    fn source(&self) -> SearchSource {
        SearchSource::Graph
    }

    fn run(&self, parsed: &ParsedQuery, options: &StrategyOptions) -> Result<Vec<ScoredEntity>> {
        if parsed.mentions.is_empty() {
            return Ok(Vec::new());
        }

        // score per entity id, keeping the maximum across seeds
        let mut scores: HashMap<EntityId, f32> = HashMap::new();
        for mention in &parsed.mentions {
            let Some(seed) = self.resolve_seed(&mention.text)? else {
                continue;
            };
            scores
                .entry(seed.id.clone())
                .and_modify(|s| *s = s.max(Self::SEED_SCORE))
                .or_insert(Self::SEED_SCORE);

            // two-hop frontier expansion with per-hop decay
            let mut frontier = vec![seed.id.clone()];
            let mut hop_score = Self::SEED_SCORE;
            for _ in 0..2 {
                hop_score *= Self::HOP_DECAY;
                let mut next = Vec::new();
                for id in &frontier {
                    for edge in self.relationships.get_for_entity(
                        id,
                        Direction::Both,
                        &RelationshipFilter::new().with_limit(options.limit),
                    )? {
                        if let Some(neighbor) = edge.other_endpoint(id)
                            && !scores.contains_key(neighbor)
                        {
                            scores.insert(neighbor.clone(), hop_score);
                            next.push(neighbor.clone());
                        }
                    }
                }
                frontier = next;
                if frontier.is_empty() {
                    break;
                }
            }
        }

        let mut results = Vec::with_capacity(scores.len());
        for (id, score) in scores {
            if let Some(entity) = self.entities.get(&id)?
                && type_allowed(&entity, options)
            {
                results.push(ScoredEntity::new(entity, score, SearchSource::Graph));
            }
        }
        crate::models::sort_by_score(&mut results);
        results.truncate(options.limit);
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Fuzzy
// ---------------------------------------------------------------------------

/// Bigram-similarity matching over entity names.
#[derive(Clone)]
pub struct FuzzySearch {
    entities: Arc<EntityStore>,
}

impl FuzzySearch {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(entities: Arc<EntityStore>) -> Self {
        Self { entities }
    }
}

impl Strategy for FuzzySearch {
    fn source(&self) -> SearchSource {
        SearchSource::Fuzzy
    }

    fn run(&self, parsed: &ParsedQuery, options: &StrategyOptions) -> Result<Vec<ScoredEntity>> {
        let mut terms: Vec<&str> = parsed.keywords.iter().map(String::as_str).collect();
        for mention in &parsed.mentions {
            if !terms.contains(&mention.text.as_str()) {
                terms.push(&mention.text);
            }
        }

        let mut best: HashMap<EntityId, (Entity, f32)> = HashMap::new();
        for term in terms {
            // probe by leading characters so near-misses still surface
            let prefix: String = term.chars().take(3).collect();
            if prefix.is_empty() {
                continue;
            }
            for entity in self.entities.search_name(&prefix, None, options.limit)? {
                if !type_allowed(&entity, options) {
                    continue;
                }
                let score = bigram_jaccard(term, &entity.name);
                if score < options.fuzzy_threshold {
                    continue;
                }
                best.entry(entity.id.clone())
                    .and_modify(|(_, s)| *s = s.max(score))
                    .or_insert((entity, score));
            }
        }

        let mut results: Vec<ScoredEntity> = best
            .into_values()
            .map(|(entity, score)| ScoredEntity::new(entity, score, SearchSource::Fuzzy))
            .collect();
        crate::models::sort_by_score(&mut results);
        results.truncate(options.limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::models::{EntityInput, RelationshipInput, RelationshipType};
    use crate::query::QueryParser;
    use crate::storage::{initialize_project, open_in_memory};
    use std::sync::Mutex;

    struct Fixture {
        entities: Arc<EntityStore>,
        relationships: Arc<RelationshipStore>,
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    }

    fn fixture() -> Fixture {
        let conn: Arc<Mutex<rusqlite::Connection>> = Arc::new(open_in_memory().unwrap());
        let tables = initialize_project(&conn, "test").unwrap();
        Fixture {
            entities: Arc::new(EntityStore::new(Arc::clone(&conn), tables.clone())),
            relationships: Arc::new(RelationshipStore::new(Arc::clone(&conn), tables.clone())),
            index: Arc::new(EmbeddingIndex::new(conn, tables, "hash".to_string())),
            embedder: Arc::new(HashingEmbedder::new(64)),
        }
    }

    fn seed(fx: &Fixture, id: &str, name: &str, ty: EntityType, content: &str) {
        let entity = fx
            .entities
            .upsert(EntityInput {
                id: Some(EntityId::new(id)),
                name: name.to_string(),
                qualified_name: format!("q::{name}"),
                entity_type: Some(ty),
                content: Some(content.to_string()),
                ..Default::default()
            })
            .unwrap();
        let vector = fx.embedder.embed(entity.comparison_text()).unwrap();
        fx.index.upsert(&entity.id, &vector).unwrap();
    }

    fn options() -> StrategyOptions {
        StrategyOptions {
            limit: 10,
            semantic_threshold: 0.1,
            fuzzy_threshold: 0.4,
            ..Default::default()
        }
    }

    #[test]
    fn test_keyword_scores_name_hits_higher() {
        let fx = fixture();
        seed(&fx, "e1", "token_refresh", EntityType::Function, "refresh the token");
        seed(&fx, "e2", "unrelated", EntityType::Function, "token mentioned in body");

        let parser = QueryParser::new();
        let parsed = parser.parse("token refresh");
        let results = KeywordSearch::new(Arc::clone(&fx.entities))
            .run(&parsed, &options())
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].entity.id.as_str(), "e1");
        assert!(results[0].score <= 1.0);
    }

    #[test]
    fn test_keyword_respects_type_filter() {
        let fx = fixture();
        seed(&fx, "e1", "token_refresh", EntityType::Function, "");
        seed(&fx, "e2", "token_doc", EntityType::Document, "token docs");

        let parser = QueryParser::new();
        let parsed = parser.parse("token");
        let mut opts = options();
        opts.entity_types = Some(vec![EntityType::Document]);

        let results = KeywordSearch::new(Arc::clone(&fx.entities))
            .run(&parsed, &opts)
            .unwrap();
        assert!(results.iter().all(|r| r.entity.entity_type == EntityType::Document));
    }

    #[test]
    fn test_semantic_finds_overlapping_content() {
        let fx = fixture();
        seed(&fx, "e1", "auth", EntityType::Function, "token refresh rotation logic");
        seed(&fx, "e2", "parser", EntityType::Function, "grammar tree nodes");

        let parser = QueryParser::new();
        let parsed = parser.parse("token rotation");
        let results = SemanticSearch::new(
            Arc::clone(&fx.entities),
            Arc::clone(&fx.index),
            Arc::clone(&fx.embedder),
        )
        .run(&parsed, &options())
        .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].entity.id.as_str(), "e1");
    }

    #[test]
    fn test_semantic_prefers_supplied_embedding() {
        let fx = fixture();
        seed(&fx, "e1", "auth", EntityType::Function, "token refresh");

        let parser = QueryParser::new();
        let parsed = parser.parse("completely unrelated text");
        let mut opts = options();
        opts.query_embedding = Some(fx.embedder.embed("token refresh").unwrap());

        let results = SemanticSearch::new(
            Arc::clone(&fx.entities),
            Arc::clone(&fx.index),
            Arc::clone(&fx.embedder),
        )
        .run(&parsed, &opts)
        .unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn test_graph_expands_from_mentions() {
        let fx = fixture();
        seed(&fx, "svc", "AuthService", EntityType::Class, "");
        seed(&fx, "store", "TokenStore", EntityType::Class, "");
        seed(&fx, "far", "Logger", EntityType::Class, "");
        fx.relationships
            .create(RelationshipInput::new(
                EntityId::new("svc"),
                EntityId::new("store"),
                RelationshipType::Uses,
            ))
            .unwrap();

        let parser = QueryParser::new();
        let parsed = parser.parse("how does `AuthService` work");
        let results = GraphSearch::new(Arc::clone(&fx.entities), Arc::clone(&fx.relationships))
            .run(&parsed, &options())
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.entity.id.as_str()).collect();
        assert!(ids.contains(&"svc"));
        assert!(ids.contains(&"store"));
        assert!(!ids.contains(&"far"));

        // seed outranks its neighbors
        assert_eq!(results[0].entity.id.as_str(), "svc");
    }

    #[test]
    fn test_graph_empty_without_mentions() {
        let fx = fixture();
        let parser = QueryParser::new();
        let parsed = parser.parse("general question about things");
        let results = GraphSearch::new(Arc::clone(&fx.entities), Arc::clone(&fx.relationships))
            .run(&parsed, &options())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_fuzzy_matches_near_names() {
        let fx = fixture();
        seed(&fx, "e1", "authservice", EntityType::Class, "");

        let parser = QueryParser::new();
        let parsed = parser.parse("authservices handler");
        let results = FuzzySearch::new(Arc::clone(&fx.entities))
            .run(&parsed, &options())
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].entity.id.as_str(), "e1");
        assert!(results[0].score >= 0.4);
    }
}
