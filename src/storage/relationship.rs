//! Relationship store.
//!
//! Persistent directed multigraph for one project. `(source, target, type)`
//! is unique; `upsert` updates weight and metadata in place so edge IDs stay
//! stable across re-indexing.
//!
//! Per-endpoint queries order by **weight descending, then id ascending**,
//! and the `(source = ? OR target = ?)` disjunction is parenthesized so the
//! remaining filters apply to both branches.

use super::project::ProjectTables;
use super::sqlite::{acquire_lock, storage_err};
use crate::models::{
    Direction, EntityId, Relationship, RelationshipFilter, RelationshipId, RelationshipInput,
    RelationshipType,
};
use crate::{Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// `SQLite`-backed relationship store for one project.
pub struct RelationshipStore {
    conn: Arc<Mutex<Connection>>,
    tables: ProjectTables,
}

impl RelationshipStore {
    /// Creates a store over an initialized project database.
    #[must_use]
    pub const fn new(conn: Arc<Mutex<Connection>>, tables: ProjectTables) -> Self {
        Self { conn, tables }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        acquire_lock(&self.conn, &self.tables.relationships)
    }

    fn parse_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
        let id: String = row.get("id")?;
        let source_id: String = row.get("source_id")?;
        let target_id: String = row.get("target_id")?;
        let relationship: String = row.get("relationship")?;
        let metadata_json: Option<String> = row.get("metadata")?;

        Ok(Relationship {
            id: RelationshipId::new(id),
            source_id: EntityId::new(source_id),
            target_id: EntityId::new(target_id),
            relationship: RelationshipType::parse(&relationship)
                .unwrap_or(RelationshipType::RelatesTo),
            weight: row.get("weight")?,
            metadata: metadata_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            created_at: row.get("created_at")?,
        })
    }

    fn insert_row(conn: &Connection, table: &str, input: &RelationshipInput) -> Result<Relationship> {
        let rel = Relationship {
            id: RelationshipId::generate(),
            source_id: input.source_id.clone(),
            target_id: input.target_id.clone(),
            relationship: input.relationship,
            weight: input.weight.unwrap_or(1.0).max(0.0),
            metadata: input.metadata.clone().unwrap_or_default(),
            created_at: current_timestamp(),
        };
        let metadata_json =
            serde_json::to_string(&rel.metadata).unwrap_or_else(|_| "{}".to_string());
        conn.execute(
            &format!(
                "INSERT INTO {table} (id, source_id, target_id, relationship, weight, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                rel.id.as_str(),
                rel.source_id.as_str(),
                rel.target_id.as_str(),
                rel.relationship.as_str(),
                f64::from(rel.weight),
                metadata_json,
                rel.created_at,
            ],
        )
        .map_err(|e| storage_err("create_relationship", &e))?;
        Ok(rel)
    }

    fn find_triple(
        conn: &Connection,
        table: &str,
        source: &EntityId,
        target: &EntityId,
        relationship: RelationshipType,
    ) -> Result<Option<Relationship>> {
        conn.query_row(
            &format!(
                "SELECT * FROM {table} WHERE source_id = ?1 AND target_id = ?2 AND relationship = ?3"
            ),
            params![source.as_str(), target.as_str(), relationship.as_str()],
            Self::parse_row,
        )
        .optional()
        .map_err(|e| storage_err("find_relationship_triple", &e))
    }

    /// Inserts an edge, returning the stored row with its generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including a duplicate
    /// `(source, target, type)` triple — use [`Self::upsert`] for
    /// re-indexing paths).
    #[instrument(skip(self, input), fields(relationship = %input.relationship))]
    pub fn create(&self, input: RelationshipInput) -> Result<Relationship> {
        let conn = self.lock();
        let rel = Self::insert_row(&conn, &self.tables.relationships, &input)?;
        metrics::counter!("repolens_relationships_stored_total").increment(1);
        Ok(rel)
    }

    /// Inserts the edge, or updates weight and metadata when the
    /// `(source, target, type)` triple already exists.
    ///
    /// The existing row keeps its id, preserving id stability across
    /// re-indexing runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    #[instrument(skip(self, input), fields(relationship = %input.relationship))]
    pub fn upsert(&self, input: RelationshipInput) -> Result<Relationship> {
        let conn = self.lock();
        if let Some(mut existing) = Self::find_triple(
            &conn,
            &self.tables.relationships,
            &input.source_id,
            &input.target_id,
            input.relationship,
        )? {
            existing.weight = input.weight.unwrap_or(existing.weight).max(0.0);
            if let Some(metadata) = input.metadata {
                existing.metadata = metadata;
            }
            let metadata_json =
                serde_json::to_string(&existing.metadata).unwrap_or_else(|_| "{}".to_string());
            conn.execute(
                &format!(
                    "UPDATE {} SET weight = ?1, metadata = ?2 WHERE id = ?3",
                    self.tables.relationships
                ),
                params![f64::from(existing.weight), metadata_json, existing.id.as_str()],
            )
            .map_err(|e| storage_err("upsert_relationship", &e))?;
            return Ok(existing);
        }

        let rel = Self::insert_row(&conn, &self.tables.relationships, &input)?;
        metrics::counter!("repolens_relationships_stored_total").increment(1);
        Ok(rel)
    }

    /// Atomic bulk insert: either every input is visible or none are.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; the transaction rolls back.
    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub fn create_many(&self, inputs: Vec<RelationshipInput>) -> Result<Vec<Relationship>> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| storage_err("begin_relationship_tx", &e))?;

        let mut stored = Vec::with_capacity(inputs.len());
        for input in &inputs {
            stored.push(Self::insert_row(&tx, &self.tables.relationships, input)?);
        }

        tx.commit()
            .map_err(|e| storage_err("commit_relationship_tx", &e))?;
        metrics::counter!("repolens_relationships_stored_total").increment(stored.len() as u64);
        Ok(stored)
    }

    /// Retrieves an edge by id. Absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn get(&self, id: &RelationshipId) -> Result<Option<Relationship>> {
        let conn = self.lock();
        conn.query_row(
            &format!("SELECT * FROM {} WHERE id = ?1", self.tables.relationships),
            params![id.as_str()],
            Self::parse_row,
        )
        .optional()
        .map_err(|e| storage_err("get_relationship", &e))
    }

    /// Deletes an edge by id. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub fn delete(&self, id: &RelationshipId) -> Result<bool> {
        let conn = self.lock();
        let rows = conn
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", self.tables.relationships),
                params![id.as_str()],
            )
            .map_err(|e| storage_err("delete_relationship", &e))?;
        Ok(rows > 0)
    }

    /// Deletes every edge touching the entity (either endpoint).
    ///
    /// Returns the number of edges removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub fn delete_for_entity(&self, id: &EntityId) -> Result<usize> {
        let conn = self.lock();
        let rows = conn
            .execute(
                &format!(
                    "DELETE FROM {} WHERE source_id = ?1 OR target_id = ?1",
                    self.tables.relationships
                ),
                params![id.as_str()],
            )
            .map_err(|e| storage_err("delete_for_entity", &e))?;
        Ok(rows)
    }

    /// Deletes every edge from `source` to `target` of any type.
    ///
    /// Returns the number of edges removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub fn delete_between(&self, source: &EntityId, target: &EntityId) -> Result<usize> {
        let conn = self.lock();
        let rows = conn
            .execute(
                &format!(
                    "DELETE FROM {} WHERE source_id = ?1 AND target_id = ?2",
                    self.tables.relationships
                ),
                params![source.as_str(), target.as_str()],
            )
            .map_err(|e| storage_err("delete_between", &e))?;
        Ok(rows)
    }

    /// Edges touching an entity in the requested direction, filtered and
    /// ordered by weight descending then id ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_for_entity(
        &self,
        id: &EntityId,
        direction: Direction,
        filter: &RelationshipFilter,
    ) -> Result<Vec<Relationship>> {
        let conn = self.lock();

        // The direction clause is parenthesized so type/weight filters apply
        // to both branches of the OR.
        let direction_clause = match direction {
            Direction::Out => "source_id = ?1",
            Direction::In => "target_id = ?1",
            Direction::Both => "(source_id = ?1 OR target_id = ?1)",
        };

        let mut conditions = vec![direction_clause.to_string()];
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(id.as_str().to_string())];

        if let Some(ref types) = filter.types
            && !types.is_empty()
        {
            let placeholders: Vec<String> = types
                .iter()
                .map(|ty| {
                    params_vec.push(Box::new(ty.as_str().to_string()));
                    format!("?{}", params_vec.len())
                })
                .collect();
            conditions.push(format!("relationship IN ({})", placeholders.join(", ")));
        }

        if let Some(min_weight) = filter.min_weight {
            params_vec.push(Box::new(f64::from(min_weight)));
            conditions.push(format!("weight >= ?{}", params_vec.len()));
        }

        let limit_clause = filter
            .limit
            .map_or_else(String::new, |l| format!(" LIMIT {l}"));
        let sql = format!(
            "SELECT * FROM {} WHERE {} ORDER BY weight DESC, id ASC{limit_clause}",
            self.tables.relationships,
            conditions.join(" AND "),
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("get_for_entity_prepare", &e))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(std::convert::AsRef::as_ref).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::parse_row)
            .map_err(|e| storage_err("get_for_entity", &e))?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Edges of one type, ordered by weight descending then id ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_type(
        &self,
        relationship: RelationshipType,
        limit: Option<usize>,
    ) -> Result<Vec<Relationship>> {
        let conn = self.lock();
        let limit_clause = limit.map_or_else(String::new, |l| format!(" LIMIT {l}"));
        let sql = format!(
            "SELECT * FROM {} WHERE relationship = ?1 ORDER BY weight DESC, id ASC{limit_clause}",
            self.tables.relationships
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("get_by_type_prepare", &e))?;
        let rows = stmt
            .query_map(params![relationship.as_str()], Self::parse_row)
            .map_err(|e| storage_err("get_by_type", &e))?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// True if an edge `source → target` exists (of `relationship` when
    /// given, of any type otherwise).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn exists(
        &self,
        source: &EntityId,
        target: &EntityId,
        relationship: Option<RelationshipType>,
    ) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = match relationship {
            Some(ty) => conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE source_id = ?1 AND target_id = ?2 \
                     AND relationship = ?3",
                    self.tables.relationships
                ),
                params![source.as_str(), target.as_str(), ty.as_str()],
                |row| row.get(0),
            ),
            None => conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE source_id = ?1 AND target_id = ?2",
                    self.tables.relationships
                ),
                params![source.as_str(), target.as_str()],
                |row| row.get(0),
            ),
        }
        .map_err(|e| storage_err("relationship_exists", &e))?;
        Ok(count > 0)
    }

    /// Edge count, optionally restricted to one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, relationship: Option<RelationshipType>) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = match relationship {
            Some(ty) => conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE relationship = ?1",
                    self.tables.relationships
                ),
                params![ty.as_str()],
                |row| row.get(0),
            ),
            None => conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", self.tables.relationships),
                [],
                |row| row.get(0),
            ),
        }
        .map_err(|e| storage_err("count_relationships", &e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Edge counts grouped by type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats_by_type(&self) -> Result<HashMap<RelationshipType, usize>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT relationship, COUNT(*) FROM {} GROUP BY relationship",
                self.tables.relationships
            ))
            .map_err(|e| storage_err("stats_by_type_prepare", &e))?;
        let rows = stmt
            .query_map([], |row| {
                let ty: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((ty, count))
            })
            .map_err(|e| storage_err("stats_by_type", &e))?;

        let mut stats = HashMap::new();
        for (ty, count) in rows.filter_map(std::result::Result::ok) {
            if let Some(ty) = RelationshipType::parse(&ty) {
                stats.insert(ty, usize::try_from(count).unwrap_or(0));
            }
        }
        Ok(stats)
    }

    /// Entities ranked by total degree (in + out), descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn most_connected(&self, limit: usize) -> Result<Vec<(EntityId, usize)>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT endpoint, COUNT(*) AS degree FROM (
                SELECT source_id AS endpoint FROM {table}
                UNION ALL
                SELECT target_id AS endpoint FROM {table}
             ) GROUP BY endpoint ORDER BY degree DESC, endpoint ASC LIMIT {limit}",
            table = self.tables.relationships
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("most_connected_prepare", &e))?;
        let rows = stmt
            .query_map([], |row| {
                let endpoint: String = row.get(0)?;
                let degree: i64 = row.get(1)?;
                Ok((EntityId::new(endpoint), usize::try_from(degree).unwrap_or(0)))
            })
            .map_err(|e| storage_err("most_connected", &e))?;
        Ok(rows.filter_map(std::result::Result::ok).collect())
    }

    /// Average degree: `2·|E| / |V_touched|`, where `V_touched` counts
    /// distinct entities appearing on either end of an edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_degree(&self) -> Result<f64> {
        let edges = self.count(None)?;
        let conn = self.lock();
        let touched: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM (
                        SELECT source_id AS endpoint FROM {table}
                        UNION
                        SELECT target_id AS endpoint FROM {table}
                     )",
                    table = self.tables.relationships
                ),
                [],
                |row| row.get(0),
            )
            .map_err(|e| storage_err("average_degree", &e))?;
        if touched == 0 {
            return Ok(0.0);
        }
        Ok(2.0 * edges as f64 / touched as f64)
    }

    /// Removes edges whose endpoints no longer exist in the entity table.
    ///
    /// Returns the number of orphaned edges removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    #[instrument(skip(self))]
    pub fn delete_orphans(&self) -> Result<usize> {
        let conn = self.lock();
        let rows = conn
            .execute(
                &format!(
                    "DELETE FROM {rels} WHERE
                        source_id NOT IN (SELECT id FROM {ents})
                        OR target_id NOT IN (SELECT id FROM {ents})",
                    rels = self.tables.relationships,
                    ents = self.tables.entities,
                ),
                [],
            )
            .map_err(|e| storage_err("delete_orphans", &e))?;
        if rows > 0 {
            metrics::counter!("repolens_orphan_edges_removed_total").increment(rows as u64);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::project::initialize_project;
    use crate::storage::sqlite::open_in_memory;

    fn store() -> RelationshipStore {
        let conn = open_in_memory().unwrap();
        let tables = initialize_project(&conn, "test").unwrap();
        RelationshipStore::new(Arc::new(conn), tables)
    }

    fn edge(source: &str, target: &str, ty: RelationshipType) -> RelationshipInput {
        RelationshipInput::new(EntityId::new(source), EntityId::new(target), ty)
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let rel = store.create(edge("a", "b", RelationshipType::Calls)).unwrap();
        assert!(rel.id.as_str().starts_with("rel_"));

        let fetched = store.get(&rel.id).unwrap().unwrap();
        assert_eq!(fetched.source_id.as_str(), "a");
        assert!((fetched.weight - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = store();
        assert!(store.get(&RelationshipId::new("missing")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = store();
        let first = store
            .upsert(edge("a", "b", RelationshipType::Calls).with_weight(1.0))
            .unwrap();
        let second = store
            .upsert(edge("a", "b", RelationshipType::Calls).with_weight(2.5))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!((second.weight - 2.5).abs() < f32::EPSILON);
        assert_eq!(store.count(None).unwrap(), 1);
    }

    #[test]
    fn test_create_many_is_atomic_and_counted() {
        let store = store();
        let before = store.count(None).unwrap();
        store
            .create_many(vec![
                edge("a", "b", RelationshipType::Calls),
                edge("b", "c", RelationshipType::Imports),
                edge("c", "d", RelationshipType::Uses),
            ])
            .unwrap();
        assert_eq!(store.count(None).unwrap(), before + 3);
    }

    #[test]
    fn test_get_for_entity_direction_and_ordering() {
        let store = store();
        store
            .create(edge("a", "b", RelationshipType::Calls).with_weight(0.5))
            .unwrap();
        store
            .create(edge("a", "c", RelationshipType::Imports).with_weight(2.0))
            .unwrap();
        store
            .create(edge("x", "a", RelationshipType::Uses).with_weight(1.0))
            .unwrap();

        let out = store
            .get_for_entity(&EntityId::new("a"), Direction::Out, &RelationshipFilter::new())
            .unwrap();
        assert_eq!(out.len(), 2);
        // weight DESC ordering
        assert_eq!(out[0].target_id.as_str(), "c");

        let inbound = store
            .get_for_entity(&EntityId::new("a"), Direction::In, &RelationshipFilter::new())
            .unwrap();
        assert_eq!(inbound.len(), 1);

        let both = store
            .get_for_entity(&EntityId::new("a"), Direction::Both, &RelationshipFilter::new())
            .unwrap();
        assert_eq!(both.len(), 3);
    }

    #[test]
    fn test_get_for_entity_filters_apply_to_both_branches() {
        let store = store();
        store
            .create(edge("a", "b", RelationshipType::Calls).with_weight(0.2))
            .unwrap();
        store
            .create(edge("c", "a", RelationshipType::Calls).with_weight(0.9))
            .unwrap();

        let filtered = store
            .get_for_entity(
                &EntityId::new("a"),
                Direction::Both,
                &RelationshipFilter::new().with_min_weight(0.5),
            )
            .unwrap();
        // the low-weight outgoing edge must be filtered even though the
        // direction clause is an OR
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].source_id.as_str(), "c");
    }

    #[test]
    fn test_type_filter_and_limit() {
        let store = store();
        store.create(edge("a", "b", RelationshipType::Calls)).unwrap();
        store.create(edge("a", "c", RelationshipType::Imports)).unwrap();
        store.create(edge("a", "d", RelationshipType::Calls)).unwrap();

        let calls = store
            .get_for_entity(
                &EntityId::new("a"),
                Direction::Out,
                &RelationshipFilter::new().with_types(vec![RelationshipType::Calls]),
            )
            .unwrap();
        assert_eq!(calls.len(), 2);

        let limited = store
            .get_for_entity(
                &EntityId::new("a"),
                Direction::Out,
                &RelationshipFilter::new().with_limit(1),
            )
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_exists() {
        let store = store();
        store.create(edge("a", "b", RelationshipType::Calls)).unwrap();

        assert!(store
            .exists(&EntityId::new("a"), &EntityId::new("b"), None)
            .unwrap());
        assert!(store
            .exists(
                &EntityId::new("a"),
                &EntityId::new("b"),
                Some(RelationshipType::Calls)
            )
            .unwrap());
        assert!(!store
            .exists(
                &EntityId::new("a"),
                &EntityId::new("b"),
                Some(RelationshipType::Imports)
            )
            .unwrap());
        assert!(!store
            .exists(&EntityId::new("b"), &EntityId::new("a"), None)
            .unwrap());
    }

    #[test]
    fn test_delete_variants() {
        let store = store();
        let rel = store.create(edge("a", "b", RelationshipType::Calls)).unwrap();
        store.create(edge("b", "c", RelationshipType::Calls)).unwrap();
        store.create(edge("c", "a", RelationshipType::Uses)).unwrap();

        assert!(store.delete(&rel.id).unwrap());
        assert!(!store.delete(&rel.id).unwrap());

        assert_eq!(store.delete_for_entity(&EntityId::new("c")).unwrap(), 2);
        assert_eq!(store.count(None).unwrap(), 0);
    }

    #[test]
    fn test_delete_between() {
        let store = store();
        store.create(edge("a", "b", RelationshipType::Calls)).unwrap();
        store.create(edge("a", "b", RelationshipType::Uses)).unwrap();
        store.create(edge("b", "a", RelationshipType::Calls)).unwrap();

        let removed = store
            .delete_between(&EntityId::new("a"), &EntityId::new("b"))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count(None).unwrap(), 1);
    }

    #[test]
    fn test_stats_and_degree() {
        let store = store();
        store.create(edge("a", "b", RelationshipType::Calls)).unwrap();
        store.create(edge("a", "c", RelationshipType::Calls)).unwrap();
        store.create(edge("b", "c", RelationshipType::Imports)).unwrap();

        let stats = store.stats_by_type().unwrap();
        assert_eq!(stats.get(&RelationshipType::Calls), Some(&2));
        assert_eq!(stats.get(&RelationshipType::Imports), Some(&1));

        let top = store.most_connected(2).unwrap();
        assert_eq!(top.len(), 2);
        // a: degree 2, b: degree 2, c: degree 2 — endpoint ASC tie-break
        assert_eq!(top[0].0.as_str(), "a");

        // 2*3 edges / 3 touched entities = 2.0
        let avg = store.average_degree().unwrap();
        assert!((avg - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_average_degree_empty() {
        let store = store();
        assert!(store.average_degree().unwrap().abs() < f64::EPSILON);
    }
}
