//! Relevance feedback.
//!
//! Learns per-entity preference from past usage and applies it as a
//! multiplicative score adjustment.
//!
//! # Multiplier
//!
//! | Condition | Value |
//! |-----------|-------|
//! | Fewer than 5 total signals | 1.0 (insufficient data) |
//! | Otherwise | `0.5 + use_rate + 0.1·min(pos,3) − 0.15·min(neg,3)` |
//!
//! The result is clamped to `[0.3, 1.7]`.

use crate::models::{
    Entity, EntityFeedbackStats, EntityId, FeedbackRecord, FeedbackSignal, ScoredEntity,
    sort_by_score,
};
use crate::storage::FeedbackStore;
use crate::Result;
use std::sync::Arc;
use tracing::instrument;

/// Minimum total signals before the multiplier leaves neutral.
const MIN_SIGNALS: u32 = 5;

/// Multiplier clamp bounds.
const MULTIPLIER_FLOOR: f32 = 0.3;
const MULTIPLIER_CEIL: f32 = 1.7;

/// Computes the score multiplier for one entity's statistics.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score_multiplier(stats: &EntityFeedbackStats) -> f32 {
    if stats.total_signals() < MIN_SIGNALS {
        return 1.0;
    }

    let base = 0.5 + stats.use_rate();
    let positive = 0.1 * stats.positive_count.min(3) as f32;
    let negative = 0.15 * stats.negative_count.min(3) as f32;
    (base + positive - negative).clamp(MULTIPLIER_FLOOR, MULTIPLIER_CEIL)
}

/// Feedback recording and score adjustment.
pub struct RelevanceFeedback {
    store: Arc<FeedbackStore>,
}

impl RelevanceFeedback {
    /// Creates the service over a feedback store.
    #[must_use]
    pub const fn new(store: Arc<FeedbackStore>) -> Self {
        Self { store }
    }

    /// Records one signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record(
        &self,
        query_id: &str,
        entity_id: &EntityId,
        signal: FeedbackSignal,
    ) -> Result<FeedbackRecord> {
        self.store.record(query_id, entity_id, signal)
    }

    /// Records a batch of signals atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record_batch(
        &self,
        query_id: &str,
        signals: &[(EntityId, FeedbackSignal)],
    ) -> Result<Vec<FeedbackRecord>> {
        self.store.record_batch(query_id, signals)
    }

    /// Classifies each candidate as used or ignored based on whether any of
    /// its known names appears (case-insensitively) in the response text,
    /// then records one signal per candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    #[instrument(skip(self, candidates, response_text), fields(candidates = candidates.len()))]
    pub fn detect_usage(
        &self,
        query_id: &str,
        candidates: &[Entity],
        response_text: &str,
    ) -> Result<Vec<FeedbackRecord>> {
        let haystack = response_text.to_lowercase();
        let signals: Vec<(EntityId, FeedbackSignal)> = candidates
            .iter()
            .map(|entity| {
                let used = entity
                    .known_names()
                    .iter()
                    .any(|name| !name.is_empty() && haystack.contains(&name.to_lowercase()));
                let signal = if used {
                    FeedbackSignal::Used
                } else {
                    FeedbackSignal::Ignored
                };
                (entity.id.clone(), signal)
            })
            .collect();
        self.record_batch(query_id, &signals)
    }

    /// Aggregated statistics for one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn stats_for(&self, entity_id: &EntityId) -> Result<EntityFeedbackStats> {
        self.store.stats_for(entity_id)
    }

    /// Multiplies every candidate's score by its feedback multiplier and
    /// re-sorts descending.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be read.
    #[instrument(skip(self, results), fields(count = results.len()))]
    pub fn adjust(&self, results: &mut Vec<ScoredEntity>) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        let ids: Vec<EntityId> = results.iter().map(|r| r.entity.id.clone()).collect();
        let stats = self.store.stats_for_many(&ids)?;

        for result in results.iter_mut() {
            let multiplier = stats
                .get(&result.entity.id)
                .map_or(1.0, score_multiplier);
            result.score *= multiplier;
        }
        sort_by_score(results);
        Ok(())
    }
}
