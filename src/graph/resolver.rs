//! Entity resolution.
//!
//! Finds duplicate entities via embedding similarity, resolves free-text
//! names onto stored entities, and merges duplicates into a primary with
//! relationship redirection and alias accumulation.

use crate::embedding::EmbeddingProvider;
use crate::models::{
    Direction, Entity, EntityId, EntityType, RelationshipFilter, RelationshipInput,
};
use crate::storage::{EmbeddingIndex, EntityStore, RelationshipStore, SimilarityOptions};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Metadata key marking entities already examined by duplicate detection.
///
/// Members of an emitted group keep this flag across runs so repeated
/// sweeps do not resurface the same group.
const DEDUPE_PROCESSED_KEY: &str = "dedupe_processed";

/// Jaccard similarity over 2-character bigrams.
///
/// Both inputs are lowercased and stripped to alphanumerics first.
/// Empty normalization on either side yields 0; equal normalization
/// yields 1 (covering strings too short to form a bigram).
#[must_use]
pub fn bigram_jaccard(a: &str, b: &str) -> f32 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);

    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }
    if norm_a == norm_b {
        return 1.0;
    }

    let bigrams_a = bigrams(&norm_a);
    let bigrams_b = bigrams(&norm_b);
    let union = bigrams_a.union(&bigrams_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = bigrams_a.intersection(&bigrams_b).count();

    #[allow(clippy::cast_precision_loss)]
    let score = intersection as f32 / union as f32;
    score
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn bigrams(s: &str) -> HashSet<[u8; 2]> {
    s.as_bytes().windows(2).map(|w| [w[0], w[1]]).collect()
}

/// Options for duplicate detection.
#[derive(Debug, Clone)]
pub struct FindDuplicatesOptions {
    /// Minimum embedding similarity for group membership.
    pub threshold: f32,
    /// Entity types eligible for deduplication.
    pub types: Vec<EntityType>,
    /// Maximum duplicates per group.
    pub max_duplicates: usize,
}

impl Default for FindDuplicatesOptions {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            types: vec![EntityType::Concept],
            max_duplicates: 10,
        }
    }
}

/// A group of near-duplicate entities.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// The entity kept as canonical (earliest by `created_at`, then id).
    pub primary: Entity,
    /// Entities considered duplicates of the primary.
    pub duplicates: Vec<Entity>,
    /// Average embedding similarity across the group.
    pub similarity: f32,
}

/// Options for name resolution.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Restrict matches to one type.
    pub entity_type: Option<EntityType>,
    /// Minimum similarity for fuzzy and embedding matches.
    pub threshold: f32,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            entity_type: None,
            threshold: 0.8,
        }
    }
}

/// Options for entity merging.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Collect duplicate names and aliases onto the primary.
    pub keep_aliases: bool,
    /// Redirect the duplicates' edges onto the primary.
    pub redirect_relationships: bool,
    /// Delete the duplicates (embeddings first, then rows).
    pub delete_duplicates: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            keep_aliases: true,
            redirect_relationships: true,
            delete_duplicates: true,
        }
    }
}

/// Outcome of a merge operation.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The refreshed primary entity.
    pub entity: Entity,
    /// Number of duplicates processed.
    pub merged_count: usize,
    /// Number of edges newly created by redirection.
    pub relationships_redirected: usize,
    /// Number of aliases newly added to the primary.
    pub aliases_added: usize,
}

/// Duplicate detection and merging over the stores.
///
/// Merges on the same primary must be serialized by the caller; the
/// resolver itself holds only read references plus the store handles.
pub struct EntityResolver {
    entities: Arc<EntityStore>,
    relationships: Arc<RelationshipStore>,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl EntityResolver {
    /// Creates a resolver over the given stores and embedder.
    #[must_use]
    pub fn new(
        entities: Arc<EntityStore>,
        relationships: Arc<RelationshipStore>,
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            entities,
            relationships,
            index,
            embedder,
        }
    }

    fn vector_for(&self, entity: &Entity) -> Result<Vec<f32>> {
        if let Some(vector) = self.index.get(&entity.id)? {
            return Ok(vector);
        }
        self.embedder.embed(entity.comparison_text())
    }

    fn is_processed(entity: &Entity) -> bool {
        entity
            .metadata
            .get(DEDUPE_PROCESSED_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    fn mark_processed(&self, entity: &Entity) -> Result<()> {
        let mut updated = entity.clone();
        updated
            .metadata
            .insert(DEDUPE_PROCESSED_KEY.to_string(), serde_json::Value::Bool(true));
        self.entities.update(&updated)?;
        Ok(())
    }

    /// Finds duplicate groups among entities of the eligible types.
    ///
    /// Iterates entities in `created_at, id` order; for each unprocessed
    /// entity, similar entities at or above the threshold form a group with
    /// that entity as primary. Every group member is marked processed
    /// (persistently), so no entity appears as primary in one group and
    /// duplicate in another, and a later sweep skips the same group.
    ///
    /// # Errors
    ///
    /// Returns an error if storage or embedding fails.
    #[instrument(skip(self, options))]
    pub fn find_duplicates(&self, options: &FindDuplicatesOptions) -> Result<Vec<DuplicateGroup>> {
        let candidates = self.entities.list_by_types(&options.types)?;
        let mut processed: HashSet<EntityId> = candidates
            .iter()
            .filter(|e| Self::is_processed(e))
            .map(|e| e.id.clone())
            .collect();
        let mut groups = Vec::new();

        for entity in candidates {
            if processed.contains(&entity.id) {
                continue;
            }

            let vector = self.vector_for(&entity)?;
            if vector.is_empty() {
                continue;
            }

            let similar = self.index.find_similar(
                &vector,
                &SimilarityOptions::with_limit(options.max_duplicates + 1)
                    .with_threshold(options.threshold)
                    .with_entity_types(options.types.clone())
                    .excluding(entity.id.clone()),
            )?;

            let remaining: Vec<(EntityId, f32)> = similar
                .into_iter()
                .filter(|(id, _)| !processed.contains(id))
                .take(options.max_duplicates)
                .collect();
            if remaining.is_empty() {
                continue;
            }

            #[allow(clippy::cast_precision_loss)]
            let similarity =
                remaining.iter().map(|(_, s)| s).sum::<f32>() / remaining.len() as f32;

            let duplicate_ids: Vec<EntityId> =
                remaining.into_iter().map(|(id, _)| id).collect();
            let duplicates = self.entities.get_many(&duplicate_ids)?;

            processed.insert(entity.id.clone());
            self.mark_processed(&entity)?;
            for dup in &duplicates {
                processed.insert(dup.id.clone());
                self.mark_processed(dup)?;
            }

            tracing::debug!(
                primary = %entity.id,
                duplicates = duplicates.len(),
                similarity,
                "duplicate group found"
            );
            groups.push(DuplicateGroup {
                primary: entity,
                duplicates,
                similarity,
            });
        }

        metrics::counter!("repolens_duplicate_groups_found_total")
            .increment(groups.len() as u64);
        Ok(groups)
    }

    /// Resolves a free-text name onto a stored entity.
    ///
    /// Tries, in order: exact name match, exact qualified-name match,
    /// substring search accepting the first candidate whose bigram Jaccard
    /// similarity reaches the threshold, then embedding nearest-neighbor.
    ///
    /// # Errors
    ///
    /// Returns an error if storage or embedding fails.
    #[instrument(skip(self, options))]
    pub fn resolve(&self, name: &str, options: &ResolveOptions) -> Result<Option<Entity>> {
        // 1. Exact name.
        let exact = self.entities.get_by_name(name, options.entity_type)?;
        if let Some(entity) = exact.into_iter().next() {
            return Ok(Some(entity));
        }

        // 2. Exact qualified name.
        if let Some(entity) = self
            .entities
            .get_by_qualified_name(name, options.entity_type)?
        {
            return Ok(Some(entity));
        }

        // 3. Substring candidates scored by bigram similarity.
        let candidates = self.entities.search_name(name, options.entity_type, 5)?;
        for candidate in candidates {
            if bigram_jaccard(name, &candidate.name) >= options.threshold {
                return Ok(Some(candidate));
            }
        }

        // 4. Embedding nearest-neighbor.
        let vector = self.embedder.embed(name)?;
        if vector.is_empty() {
            return Ok(None);
        }
        let types = options.entity_type.map(|ty| vec![ty]);
        let mut similarity = SimilarityOptions::with_limit(1).with_threshold(options.threshold);
        if let Some(types) = types {
            similarity = similarity.with_entity_types(types);
        }
        let nearest = self.index.find_similar(&vector, &similarity)?;
        match nearest.first() {
            Some((id, _)) => self.entities.get(id),
            None => Ok(None),
        }
    }

    /// Merges duplicates into a primary entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the primary cannot be loaded, or a
    /// storage error.
    #[instrument(skip(self, duplicate_ids, options), fields(primary = %primary_id))]
    pub fn merge(
        &self,
        primary_id: &EntityId,
        duplicate_ids: &[EntityId],
        options: &MergeOptions,
    ) -> Result<MergeOutcome> {
        let primary = self
            .entities
            .get(primary_id)?
            .ok_or_else(|| Error::NotFound(format!("merge primary '{primary_id}'")))?;

        let mut collected_aliases: Vec<String> = Vec::new();
        let mut merged_count = 0;
        let mut relationships_redirected = 0;

        for dup_id in duplicate_ids {
            let Some(duplicate) = self.entities.get(dup_id)? else {
                continue;
            };

            if options.keep_aliases {
                if duplicate.name != primary.name && !collected_aliases.contains(&duplicate.name) {
                    collected_aliases.push(duplicate.name.clone());
                }
                for alias in duplicate.aliases() {
                    if !collected_aliases.contains(&alias) {
                        collected_aliases.push(alias);
                    }
                }
            }

            if options.redirect_relationships {
                relationships_redirected += self.redirect_relationships(dup_id, primary_id)?;
            }

            if options.delete_duplicates {
                self.index.delete_for_entity(dup_id)?;
                self.entities.delete(dup_id)?;
            }

            merged_count += 1;
        }

        // Union collected aliases into the primary, preserving order.
        let mut aliases = primary.aliases();
        let mut aliases_added = 0;
        for alias in collected_aliases {
            if alias != primary.name && !aliases.contains(&alias) {
                aliases.push(alias);
                aliases_added += 1;
            }
        }

        if aliases_added > 0 {
            let mut updated = primary;
            updated.set_aliases(aliases);
            self.entities.update(&updated)?;
        }

        let entity = self
            .entities
            .get(primary_id)?
            .ok_or_else(|| Error::NotFound(format!("merge primary '{primary_id}'")))?;

        metrics::counter!("repolens_entities_merged_total").increment(merged_count as u64);
        Ok(MergeOutcome {
            entity,
            merged_count,
            relationships_redirected,
            aliases_added,
        })
    }

    /// Redirects every edge touching `from` onto `to`.
    ///
    /// Edges that would become self-loops are skipped; edges whose
    /// redirected `(source, target, type)` triple already exists are
    /// dropped without touching the existing row. All edges incident to
    /// `from` are deleted afterwards. Returns the number of edges newly
    /// created.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    #[instrument(skip(self), fields(from = %from, to = %to))]
    pub fn redirect_relationships(&self, from: &EntityId, to: &EntityId) -> Result<usize> {
        let edges =
            self.relationships
                .get_for_entity(from, Direction::Both, &RelationshipFilter::new())?;

        let mut created = 0;
        for edge in edges {
            let new_source = if &edge.source_id == from {
                to.clone()
            } else {
                edge.source_id.clone()
            };
            let new_target = if &edge.target_id == from {
                to.clone()
            } else {
                edge.target_id.clone()
            };

            if new_source == new_target {
                continue;
            }
            if self
                .relationships
                .exists(&new_source, &new_target, Some(edge.relationship))?
            {
                continue;
            }

            self.relationships.create(
                RelationshipInput::new(new_source, new_target, edge.relationship)
                    .with_weight(edge.weight)
                    .with_metadata(edge.metadata),
            )?;
            created += 1;
        }

        self.relationships.delete_for_entity(from)?;
        Ok(created)
    }
}
