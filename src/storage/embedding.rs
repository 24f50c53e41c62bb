//! Embedding index.
//!
//! Maps `entity_id → vector`, one active vector per entity per model;
//! re-embedding replaces the stored row. Nearest-neighbor lookup is an
//! exact cosine scan over the project's vectors, optionally restricted to
//! entity types via a join against the entity table.

use super::project::ProjectTables;
use super::sqlite::{acquire_lock, decode_vector, encode_vector, storage_err};
use crate::models::{EntityId, EntityType};
use crate::{Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// Cosine similarity clamped to `[0, 1]`.
///
/// Returns 0.0 for mismatched dimensions or zero-magnitude vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Options for nearest-neighbor lookup.
#[derive(Debug, Clone, Default)]
pub struct SimilarityOptions {
    /// Maximum matches returned.
    pub limit: usize,
    /// Minimum similarity score (inclusive).
    pub threshold: Option<f32>,
    /// Restrict matches to these entity types.
    pub entity_types: Option<Vec<EntityType>>,
    /// Entity IDs excluded from the result.
    pub exclude: Vec<EntityId>,
}

impl SimilarityOptions {
    /// Creates options with the given limit.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            threshold: None,
            entity_types: None,
            exclude: Vec::new(),
        }
    }

    /// Sets the minimum score.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Restricts matches to the given types.
    #[must_use]
    pub fn with_entity_types(mut self, types: Vec<EntityType>) -> Self {
        self.entity_types = Some(types);
        self
    }

    /// Excludes the given entity from matches.
    #[must_use]
    pub fn excluding(mut self, id: EntityId) -> Self {
        self.exclude.push(id);
        self
    }
}

/// `SQLite`-backed embedding index for one project.
pub struct EmbeddingIndex {
    conn: Arc<Mutex<Connection>>,
    tables: ProjectTables,
    model: String,
}

impl EmbeddingIndex {
    /// Creates an index over an initialized project database for one
    /// embedding model.
    #[must_use]
    pub const fn new(conn: Arc<Mutex<Connection>>, tables: ProjectTables, model: String) -> Self {
        Self { conn, tables, model }
    }

    /// Returns the model this index serves.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        acquire_lock(&self.conn, &self.tables.embeddings)
    }

    /// Stores or replaces the vector for an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    #[instrument(skip(self, vector), fields(entity_id = %entity_id, dims = vector.len()))]
    pub fn upsert(&self, entity_id: &EntityId, vector: &[f32]) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (entity_id, model, dimensions, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(entity_id, model) DO UPDATE SET
                    dimensions = excluded.dimensions,
                    vector = excluded.vector,
                    created_at = excluded.created_at",
                self.tables.embeddings
            ),
            params![
                entity_id.as_str(),
                self.model,
                vector.len() as i64,
                encode_vector(vector),
                current_timestamp(),
            ],
        )
        .map_err(|e| storage_err("upsert_embedding", &e))?;
        metrics::counter!("repolens_embeddings_stored_total").increment(1);
        Ok(())
    }

    /// Retrieves the stored vector for an entity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn get(&self, entity_id: &EntityId) -> Result<Option<Vec<f32>>> {
        let conn = self.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                &format!(
                    "SELECT vector FROM {} WHERE entity_id = ?1 AND model = ?2",
                    self.tables.embeddings
                ),
                params![entity_id.as_str(), self.model],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage_err("get_embedding", &e))?;
        Ok(blob.map(|b| decode_vector(&b)))
    }

    /// Removes every vector for an entity (all models).
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub fn delete_for_entity(&self, entity_id: &EntityId) -> Result<usize> {
        let conn = self.lock();
        let rows = conn
            .execute(
                &format!("DELETE FROM {} WHERE entity_id = ?1", self.tables.embeddings),
                params![entity_id.as_str()],
            )
            .map_err(|e| storage_err("delete_embedding", &e))?;
        Ok(rows)
    }

    /// Nearest-neighbor lookup by cosine similarity.
    ///
    /// Scans the project's vectors for this model, applies the threshold,
    /// type restriction, and exclusions, and returns the top matches sorted
    /// by score descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    #[instrument(skip(self, query_vector, options), fields(dims = query_vector.len()))]
    pub fn find_similar(
        &self,
        query_vector: &[f32],
        options: &SimilarityOptions,
    ) -> Result<Vec<(EntityId, f32)>> {
        let conn = self.lock();

        let sql = format!(
            "SELECT e.entity_id, e.vector, n.entity_type
             FROM {emb} e JOIN {ents} n ON n.id = e.entity_id
             WHERE e.model = ?1",
            emb = self.tables.embeddings,
            ents = self.tables.entities,
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("find_similar_prepare", &e))?;
        let rows = stmt
            .query_map(params![self.model], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                let ty: String = row.get(2)?;
                Ok((id, blob, ty))
            })
            .map_err(|e| storage_err("find_similar", &e))?;

        let allowed: Option<Vec<&'static str>> = options
            .entity_types
            .as_ref()
            .map(|types| types.iter().map(EntityType::as_str).collect());
        let threshold = options.threshold.unwrap_or(0.0);

        let mut matches: Vec<(EntityId, f32)> = Vec::new();
        for (id, blob, ty) in rows.filter_map(std::result::Result::ok) {
            if let Some(ref allowed) = allowed
                && !allowed.contains(&ty.as_str())
            {
                continue;
            }
            let entity_id = EntityId::new(id);
            if options.exclude.contains(&entity_id) {
                continue;
            }
            let score = cosine_similarity(query_vector, &decode_vector(&blob));
            if score >= threshold {
                matches.push((entity_id, score));
            }
        }

        matches.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        matches.truncate(options.limit.max(1));
        Ok(matches)
    }

    /// Number of vectors stored for this model.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE model = ?1",
                    self.tables.embeddings
                ),
                params![self.model],
                |row| row.get(0),
            )
            .map_err(|e| storage_err("count_embeddings", &e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
