//! Heuristic reranking.
//!
//! Applies monotone multiplicative boosts to fused candidates: exact
//! mention matches, filter matches, and freshness. Boosts may push a score
//! above 1.0; ordering is what matters downstream.

use crate::models::{ParsedQuery, ScoredEntity, sort_by_score};
use crate::current_timestamp;

/// Heuristic score booster applied after fusion.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReranker;

impl HeuristicReranker {
    const MENTION_BOOST: f32 = 1.3;
    const TYPE_FILTER_BOOST: f32 = 1.15;
    const FILE_FILTER_BOOST: f32 = 1.15;
    const FRESH_WEEK_BOOST: f32 = 1.1;
    const FRESH_MONTH_BOOST: f32 = 1.05;

    /// Creates a reranker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Reranks candidates in place and re-sorts them.
    pub fn rerank(&self, results: &mut Vec<ScoredEntity>, parsed: &ParsedQuery) {
        let now = current_timestamp();

        for result in results.iter_mut() {
            let entity = &result.entity;
            let mut boost = 1.0_f32;

            let mention_hit = parsed.mentions.iter().any(|m| {
                entity.name.eq_ignore_ascii_case(&m.text)
                    || entity.qualified_name.eq_ignore_ascii_case(&m.text)
            });
            if mention_hit {
                boost *= Self::MENTION_BOOST;
            }

            if let Some(ref types) = parsed.filters.types
                && types.contains(&entity.entity_type)
            {
                boost *= Self::TYPE_FILTER_BOOST;
            }

            if let Some(ref files) = parsed.filters.files
                && let Some(ref path) = entity.file_path
                && files.iter().any(|f| path.contains(f.as_str()))
            {
                boost *= Self::FILE_FILTER_BOOST;
            }

            let age = now - entity.updated_at;
            if age <= 7 * 86_400 {
                boost *= Self::FRESH_WEEK_BOOST;
            } else if age <= 30 * 86_400 {
                boost *= Self::FRESH_MONTH_BOOST;
            }

            result.score *= boost;
        }

        sort_by_score(results);
    }
}
