//! Entity store.
//!
//! Owns the per-project entity rows. Lookups exist for id, exact name,
//! exact qualified name, substring, and type; deletion cascades to the
//! entity's relationships and embeddings.

use super::project::ProjectTables;
use super::sqlite::{acquire_lock, storage_err};
use crate::models::{Entity, EntityId, EntityInput, EntityType};
use crate::{Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// `SQLite`-backed entity store for one project.
pub struct EntityStore {
    conn: Arc<Mutex<Connection>>,
    tables: ProjectTables,
}

impl EntityStore {
    /// Creates a store over an initialized project database.
    #[must_use]
    pub const fn new(conn: Arc<Mutex<Connection>>, tables: ProjectTables) -> Self {
        Self { conn, tables }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        acquire_lock(&self.conn, &self.tables.entities)
    }

    fn parse_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
        let id: String = row.get("id")?;
        let entity_type: String = row.get("entity_type")?;
        let metadata_json: Option<String> = row.get("metadata")?;
        let start_line: Option<i64> = row.get("start_line")?;
        let end_line: Option<i64> = row.get("end_line")?;

        let metadata: HashMap<String, serde_json::Value> = metadata_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        Ok(Entity {
            id: EntityId::new(id),
            entity_type: EntityType::parse(&entity_type).unwrap_or(EntityType::Concept),
            name: row.get("name")?,
            qualified_name: row.get("qualified_name")?,
            file_path: row.get("file_path")?,
            start_line: start_line.and_then(|v| u32::try_from(v).ok()),
            end_line: end_line.and_then(|v| u32::try_from(v).ok()),
            content: row.get("content")?,
            summary: row.get("summary")?,
            metadata,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn write_row(conn: &Connection, table: &str, entity: &Entity) -> Result<()> {
        let metadata_json =
            serde_json::to_string(&entity.metadata).unwrap_or_else(|_| "{}".to_string());
        conn.execute(
            &format!(
                "INSERT INTO {table} (
                    id, entity_type, name, qualified_name, file_path, start_line, end_line,
                    content, summary, metadata, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(id) DO UPDATE SET
                    entity_type = excluded.entity_type,
                    name = excluded.name,
                    qualified_name = excluded.qualified_name,
                    file_path = excluded.file_path,
                    start_line = excluded.start_line,
                    end_line = excluded.end_line,
                    content = excluded.content,
                    summary = excluded.summary,
                    metadata = excluded.metadata,
                    updated_at = excluded.updated_at"
            ),
            params![
                entity.id.as_str(),
                entity.entity_type.as_str(),
                entity.name,
                entity.qualified_name,
                entity.file_path,
                entity.start_line,
                entity.end_line,
                entity.content,
                entity.summary,
                metadata_json,
                entity.created_at,
                entity.updated_at,
            ],
        )
        .map_err(|e| storage_err("store_entity", &e))?;
        Ok(())
    }

    /// Inserts or updates an entity, assigning timestamps.
    ///
    /// Returns the stored entity. A fresh row receives both timestamps; an
    /// existing row keeps `created_at` and refreshes `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn upsert(&self, input: EntityInput) -> Result<Entity> {
        let mut entity = input.into_entity();
        let now = current_timestamp();
        let conn = self.lock();

        let existing_created: Option<i64> = conn
            .query_row(
                &format!("SELECT created_at FROM {} WHERE id = ?1", self.tables.entities),
                params![entity.id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage_err("lookup_entity_created", &e))?;

        entity.created_at = existing_created.unwrap_or(now);
        entity.updated_at = now;
        Self::write_row(&conn, &self.tables.entities, &entity)?;

        metrics::counter!("repolens_entities_stored_total").increment(1);
        Ok(entity)
    }

    /// Bulk upsert inside a single transaction: all inputs land or none do.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; the transaction rolls back.
    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub fn upsert_many(&self, inputs: Vec<EntityInput>) -> Result<Vec<Entity>> {
        let now = current_timestamp();
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| storage_err("begin_entity_tx", &e))?;

        let mut stored = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut entity = input.into_entity();
            let existing_created: Option<i64> = tx
                .query_row(
                    &format!("SELECT created_at FROM {} WHERE id = ?1", self.tables.entities),
                    params![entity.id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| storage_err("lookup_entity_created", &e))?;
            entity.created_at = existing_created.unwrap_or(now);
            entity.updated_at = now;
            Self::write_row(&tx, &self.tables.entities, &entity)?;
            stored.push(entity);
        }

        tx.commit().map_err(|e| storage_err("commit_entity_tx", &e))?;
        Ok(stored)
    }

    /// Persists an already-materialized entity, refreshing `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn update(&self, entity: &Entity) -> Result<Entity> {
        let mut entity = entity.clone();
        entity.updated_at = current_timestamp();
        let conn = self.lock();
        Self::write_row(&conn, &self.tables.entities, &entity)?;
        Ok(entity)
    }

    /// Retrieves an entity by ID. Absence is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn get(&self, id: &EntityId) -> Result<Option<Entity>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT * FROM {} WHERE id = ?1", self.tables.entities),
            params![id.as_str()],
            Self::parse_row,
        )
        .optional()
        .map_err(|e| storage_err("get_entity", &e))
    }

    /// Retrieves several entities by ID, skipping missing ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub fn get_many(&self, ids: &[EntityId]) -> Result<Vec<Entity>> {
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.get(id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Exact name lookup, optionally restricted by type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_name(&self, name: &str, entity_type: Option<EntityType>) -> Result<Vec<Entity>> {
        let conn = self.lock();
        let (sql, type_param) = entity_type.map_or_else(
            || {
                (
                    format!(
                        "SELECT * FROM {} WHERE name = ?1 ORDER BY updated_at DESC",
                        self.tables.entities
                    ),
                    None,
                )
            },
            |ty| {
                (
                    format!(
                        "SELECT * FROM {} WHERE name = ?1 AND entity_type = ?2 \
                         ORDER BY updated_at DESC",
                        self.tables.entities
                    ),
                    Some(ty.as_str().to_string()),
                )
            },
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("get_by_name_prepare", &e))?;
        let rows = match type_param {
            Some(ty) => stmt.query_map(params![name, ty], Self::parse_row),
            None => stmt.query_map(params![name], Self::parse_row),
        }
        .map_err(|e| storage_err("get_by_name", &e))?;

        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Exact qualified-name lookup, optionally restricted by type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_qualified_name(
        &self,
        qualified_name: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Option<Entity>> {
        let conn = self.lock();
        let result = match entity_type {
            Some(ty) => conn
                .query_row(
                    &format!(
                        "SELECT * FROM {} WHERE qualified_name = ?1 AND entity_type = ?2",
                        self.tables.entities
                    ),
                    params![qualified_name, ty.as_str()],
                    Self::parse_row,
                )
                .optional(),
            None => conn
                .query_row(
                    &format!(
                        "SELECT * FROM {} WHERE qualified_name = ?1 LIMIT 1",
                        self.tables.entities
                    ),
                    params![qualified_name],
                    Self::parse_row,
                )
                .optional(),
        };
        result.map_err(|e| storage_err("get_by_qualified_name", &e))
    }

    /// Substring search over name and qualified name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search_name(
        &self,
        fragment: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let conn = self.lock();
        let pattern = format!("%{fragment}%");
        let (sql, type_param) = entity_type.map_or_else(
            || {
                (
                    format!(
                        "SELECT * FROM {} WHERE name LIKE ?1 OR qualified_name LIKE ?1 \
                         ORDER BY length(name) ASC LIMIT {limit}",
                        self.tables.entities
                    ),
                    None,
                )
            },
            |ty| {
                (
                    format!(
                        "SELECT * FROM {} WHERE (name LIKE ?1 OR qualified_name LIKE ?1) \
                         AND entity_type = ?2 ORDER BY length(name) ASC LIMIT {limit}",
                        self.tables.entities
                    ),
                    Some(ty.as_str().to_string()),
                )
            },
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("search_name_prepare", &e))?;
        let rows = match type_param {
            Some(ty) => stmt.query_map(params![pattern, ty], Self::parse_row),
            None => stmt.query_map(params![pattern], Self::parse_row),
        }
        .map_err(|e| storage_err("search_name", &e))?;

        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Substring search over name, qualified name, content, and summary.
    ///
    /// Used by the keyword search strategy.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search_text(&self, term: &str, limit: usize) -> Result<Vec<Entity>> {
        let conn = self.lock();
        let pattern = format!("%{term}%");
        let sql = format!(
            "SELECT * FROM {} WHERE name LIKE ?1 OR qualified_name LIKE ?1 \
             OR content LIKE ?1 OR summary LIKE ?1 \
             ORDER BY updated_at DESC LIMIT {limit}",
            self.tables.entities
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("search_text_prepare", &e))?;
        let rows = stmt
            .query_map(params![pattern], Self::parse_row)
            .map_err(|e| storage_err("search_text", &e))?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Lists entities of the given types ordered by `created_at`, then id.
    ///
    /// The deterministic order makes duplicate-group primaries stable.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_by_types(&self, types: &[EntityType]) -> Result<Vec<Entity>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock();
        let placeholders = types
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT * FROM {} WHERE entity_type IN ({placeholders}) \
             ORDER BY created_at ASC, id ASC",
            self.tables.entities
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("list_by_types_prepare", &e))?;
        let type_params: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
        let param_refs: Vec<&dyn rusqlite::ToSql> = type_params
            .iter()
            .map(|t| t as &dyn rusqlite::ToSql)
            .collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::parse_row)
            .map_err(|e| storage_err("list_by_types", &e))?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Deletes an entity, cascading to its relationships and embeddings.
    ///
    /// Returns `true` if the entity existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    #[instrument(skip(self), fields(entity_id = %id))]
    pub fn delete(&self, id: &EntityId) -> Result<bool> {
        let conn = self.lock();
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE source_id = ?1 OR target_id = ?1",
                self.tables.relationships
            ),
            params![id.as_str()],
        )
        .map_err(|e| storage_err("delete_entity_edges", &e))?;
        conn.execute(
            &format!("DELETE FROM {} WHERE entity_id = ?1", self.tables.embeddings),
            params![id.as_str()],
        )
        .map_err(|e| storage_err("delete_entity_embeddings", &e))?;
        let rows = conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", self.tables.entities),
                params![id.as_str()],
            )
            .map_err(|e| storage_err("delete_entity", &e))?;

        if rows > 0 {
            metrics::counter!("repolens_entities_deleted_total").increment(1);
        }
        Ok(rows > 0)
    }

    /// Total entity count.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", self.tables.entities),
                [],
                |row| row.get(0),
            )
            .map_err(|e| storage_err("count_entities", &e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Entity counts grouped by type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_by_type(&self) -> Result<HashMap<EntityType, usize>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT entity_type, COUNT(*) FROM {} GROUP BY entity_type",
                self.tables.entities
            ))
            .map_err(|e| storage_err("count_by_type_prepare", &e))?;
        let rows = stmt
            .query_map([], |row| {
                let ty: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((ty, count))
            })
            .map_err(|e| storage_err("count_by_type", &e))?;

        let mut counts = HashMap::new();
        for row in rows.filter_map(std::result::Result::ok) {
            if let Some(ty) = EntityType::parse(&row.0) {
                counts.insert(ty, usize::try_from(row.1).unwrap_or(0));
            }
        }
        Ok(counts)
    }
}
