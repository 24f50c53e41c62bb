//! HyDE query-embedding expansion.
//!
//! Generates a short hypothetical answer to the query, embeds it, and
//! sanity-checks the embedding with a 1-NN lookup against the project
//! index. The hypothetical embedding is only adopted when that lookup
//! scores at least the configured floor; anything else (including provider
//! failure) silently leaves the original query embedding in place.

use crate::embedding::EmbeddingProvider;
use crate::llm::CompletionProvider;
use crate::storage::{EmbeddingIndex, SimilarityOptions};
use std::sync::Arc;
use tracing::instrument;

/// Hypothetical-document embedding expander.
pub struct HydeExpander {
    provider: Arc<dyn CompletionProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<EmbeddingIndex>,
    min_check_score: f32,
}

impl HydeExpander {
    /// Creates an expander.
    #[must_use]
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<EmbeddingIndex>,
        min_check_score: f32,
    ) -> Self {
        Self {
            provider,
            embedder,
            index,
            min_check_score,
        }
    }

    /// Attempts to produce a query embedding from a hypothetical answer.
    ///
    /// Returns `None` on provider failure, embedding failure, or a failed
    /// quick-check; the caller proceeds without HyDE in every such case.
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub fn expand(&self, query: &str) -> Option<Vec<f32>> {
        let prompt = format!(
            "Write a short, plausible answer to the following question about a \
             codebase, as if quoting its documentation. Three sentences maximum. \
             No preamble.\n\nQuestion: {query}"
        );

        let hypothetical = match self.provider.complete(&prompt) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "hyde provider failed, skipping");
                metrics::counter!("repolens_hyde_failures_total").increment(1);
                return None;
            },
        };

        let embedding = match self.embedder.embed(&hypothetical) {
            Ok(vector) if !vector.is_empty() => vector,
            _ => return None,
        };

        // Quick check: the hypothetical should land near something real.
        let nearest = self
            .index
            .find_similar(&embedding, &SimilarityOptions::with_limit(1))
            .ok()?;
        match nearest.first() {
            Some((_, score)) if *score >= self.min_check_score => {
                metrics::counter!("repolens_hyde_accepted_total").increment(1);
                Some(embedding)
            },
            _ => {
                tracing::debug!("hyde quick-check below floor, ignoring hypothetical");
                None
            },
        }
    }
}
