//! Feedback store.
//!
//! Append-only log of per-query usage signals, aggregated on demand into
//! per-entity statistics.

use super::project::ProjectTables;
use super::sqlite::{acquire_lock, storage_err};
use crate::models::{EntityFeedbackStats, EntityId, FeedbackRecord, FeedbackSignal};
use crate::{Result, current_timestamp};
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// `SQLite`-backed feedback log for one project.
pub struct FeedbackStore {
    conn: Arc<Mutex<Connection>>,
    tables: ProjectTables,
}

impl FeedbackStore {
    /// Creates a store over an initialized project database.
    #[must_use]
    pub const fn new(conn: Arc<Mutex<Connection>>, tables: ProjectTables) -> Self {
        Self { conn, tables }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        acquire_lock(&self.conn, &self.tables.feedback)
    }

    fn insert_row(
        conn: &Connection,
        table: &str,
        query_id: &str,
        entity_id: &EntityId,
        signal: FeedbackSignal,
    ) -> Result<FeedbackRecord> {
        let record = FeedbackRecord {
            id: format!("fb_{}", uuid::Uuid::new_v4().simple()),
            query_id: query_id.to_string(),
            entity_id: entity_id.clone(),
            signal,
            created_at: current_timestamp(),
        };
        conn.execute(
            &format!(
                "INSERT INTO {table} (id, query_id, entity_id, signal, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![
                record.id,
                record.query_id,
                record.entity_id.as_str(),
                record.signal.as_str(),
                record.created_at,
            ],
        )
        .map_err(|e| storage_err("record_feedback", &e))?;
        Ok(record)
    }

    /// Appends one signal to the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    #[instrument(skip(self), fields(entity_id = %entity_id, signal = %signal))]
    pub fn record(
        &self,
        query_id: &str,
        entity_id: &EntityId,
        signal: FeedbackSignal,
    ) -> Result<FeedbackRecord> {
        let conn = self.lock();
        let record = Self::insert_row(&conn, &self.tables.feedback, query_id, entity_id, signal)?;
        metrics::counter!("repolens_feedback_recorded_total", "signal" => signal.as_str())
            .increment(1);
        Ok(record)
    }

    /// Appends a batch of signals inside one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; the transaction rolls back.
    pub fn record_batch(
        &self,
        query_id: &str,
        signals: &[(EntityId, FeedbackSignal)],
    ) -> Result<Vec<FeedbackRecord>> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| storage_err("begin_feedback_tx", &e))?;

        let mut records = Vec::with_capacity(signals.len());
        for (entity_id, signal) in signals {
            records.push(Self::insert_row(
                &tx,
                &self.tables.feedback,
                query_id,
                entity_id,
                *signal,
            )?);
        }

        tx.commit()
            .map_err(|e| storage_err("commit_feedback_tx", &e))?;
        Ok(records)
    }

    /// Aggregated statistics for one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats_for(&self, entity_id: &EntityId) -> Result<EntityFeedbackStats> {
        Ok(self
            .stats_for_many(std::slice::from_ref(entity_id))?
            .remove(entity_id)
            .unwrap_or_default())
    }

    /// Aggregated statistics for a set of entities.
    ///
    /// Entities with no recorded signals are absent from the returned map.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats_for_many(
        &self,
        entity_ids: &[EntityId],
    ) -> Result<HashMap<EntityId, EntityFeedbackStats>> {
        if entity_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.lock();
        let placeholders: Vec<String> = (1..=entity_ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT entity_id, signal, COUNT(*) FROM {} WHERE entity_id IN ({}) \
             GROUP BY entity_id, signal",
            self.tables.feedback,
            placeholders.join(", "),
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_err("stats_prepare", &e))?;
        let id_params: Vec<String> = entity_ids.iter().map(|id| id.as_str().to_string()).collect();
        let param_refs: Vec<&dyn rusqlite::ToSql> = id_params
            .iter()
            .map(|id| id as &dyn rusqlite::ToSql)
            .collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let entity_id: String = row.get(0)?;
                let signal: String = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok((entity_id, signal, count))
            })
            .map_err(|e| storage_err("stats_for_many", &e))?;

        let mut stats: HashMap<EntityId, EntityFeedbackStats> = HashMap::new();
        for (entity_id, signal, count) in rows.filter_map(std::result::Result::ok) {
            let entry = stats.entry(EntityId::new(entity_id)).or_default();
            let count = u32::try_from(count).unwrap_or(0);
            match FeedbackSignal::parse(&signal) {
                Some(FeedbackSignal::Used) => entry.used_count += count,
                Some(FeedbackSignal::Ignored) => entry.ignored_count += count,
                Some(FeedbackSignal::ExplicitPositive) => entry.positive_count += count,
                Some(FeedbackSignal::ExplicitNegative) => entry.negative_count += count,
                None => {},
            }
        }
        for entry in stats.values_mut() {
            entry.total_returns = entry.used_count + entry.ignored_count;
        }
        Ok(stats)
    }

    /// Total signals in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", self.tables.feedback),
                [],
                |row| row.get(0),
            )
            .map_err(|e| storage_err("count_feedback", &e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
