//! Multi-strategy search.
//!
//! Runs the selected strategies concurrently, fuses their candidates by
//! taking the **maximum** score per entity, then applies heuristic
//! reranking. One failing strategy never aborts the others; its results
//! are simply dropped and the failure logged.

mod hyde;
mod rerank;
mod strategy;

pub use hyde::HydeExpander;
pub use rerank::HeuristicReranker;
pub use strategy::{
    FuzzySearch, GraphSearch, KeywordSearch, SemanticSearch, Strategy, StrategyOptions,
};

use crate::config::SearchConfig;
use crate::models::{
    EntityId, EntityType, ParsedQuery, QueryIntent, ScoredEntity, SearchSource, sort_by_score,
};
use crate::query::QueryParser;
use crate::Result;
use std::collections::HashMap;
use tracing::instrument;

/// Options for one search invocation.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Strategies to run; chosen from intent when absent.
    pub strategies: Option<Vec<SearchSource>>,
    /// Maximum fused results returned.
    pub limit: usize,
    /// Restrict candidates to these entity types.
    pub entity_types: Option<Vec<EntityType>>,
    /// Precomputed query embedding (HyDE or caller-supplied).
    pub query_embedding: Option<Vec<f32>>,
}

/// Accumulates strategy results, keeping the maximum score per entity.
///
/// Weighted contributions from decomposed sub-queries fuse through the
/// same rule: `max` is commutative, so strategy and sub-query order never
/// affect the outcome.
#[derive(Debug, Default)]
pub struct FusionMap {
    entries: HashMap<EntityId, ScoredEntity>,
}

impl FusionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds candidates in, scaling each score by `weight` and keeping the
    /// per-entity maximum.
    pub fn fuse(&mut self, results: Vec<ScoredEntity>, weight: f32) {
        for mut result in results {
            result.score *= weight;
            match self.entries.get_mut(&result.entity.id) {
                Some(existing) => {
                    if result.score > existing.score {
                        *existing = result;
                    }
                },
                None => {
                    self.entries.insert(result.entity.id.clone(), result);
                },
            }
        }
    }

    /// Consumes the map into a score-sorted candidate list.
    #[must_use]
    pub fn into_sorted(self) -> Vec<ScoredEntity> {
        let mut results: Vec<ScoredEntity> = self.entries.into_values().collect();
        sort_by_score(&mut results);
        results
    }

    /// Number of distinct entities accumulated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been fused yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parallel multi-strategy search with max-score fusion.
pub struct MultiStrategySearch {
    parser: QueryParser,
    keyword: KeywordSearch,
    semantic: SemanticSearch,
    graph: GraphSearch,
    fuzzy: FuzzySearch,
    reranker: HeuristicReranker,
    config: SearchConfig,
}

impl MultiStrategySearch {
    /// Creates the search service from its strategies.
    #[must_use]
    pub fn new(
        keyword: KeywordSearch,
        semantic: SemanticSearch,
        graph: GraphSearch,
        fuzzy: FuzzySearch,
        config: SearchConfig,
    ) -> Self {
        Self {
            parser: QueryParser::new(),
            keyword,
            semantic,
            graph,
            fuzzy,
            reranker: HeuristicReranker::new(),
            config,
        }
    }

    /// Chooses strategies from the classified intent.
    #[must_use]
    pub fn strategies_for(parsed: &ParsedQuery) -> Vec<SearchSource> {
        let mut strategies = match parsed.intent {
            QueryIntent::Find | QueryIntent::List => vec![
                SearchSource::Keyword,
                SearchSource::Semantic,
                SearchSource::Fuzzy,
            ],
            QueryIntent::Debug | QueryIntent::Why => vec![
                SearchSource::Graph,
                SearchSource::Keyword,
                SearchSource::Semantic,
            ],
            _ => vec![SearchSource::Semantic, SearchSource::Keyword],
        };
        if !parsed.mentions.is_empty() && !strategies.contains(&SearchSource::Graph) {
            strategies.push(SearchSource::Graph);
        }
        strategies
    }

    fn strategy(&self, source: SearchSource) -> &dyn Strategy {
        match source {
            SearchSource::Keyword => &self.keyword,
            SearchSource::Semantic => &self.semantic,
            SearchSource::Graph => &self.graph,
            SearchSource::Fuzzy => &self.fuzzy,
        }
    }

    fn strategy_options(&self, options: &SearchOptions) -> StrategyOptions {
        StrategyOptions {
            limit: self.config.per_strategy_limit.max(options.limit),
            entity_types: options.entity_types.clone(),
            query_embedding: options.query_embedding.clone(),
            semantic_threshold: self.config.semantic_threshold,
            fuzzy_threshold: self.config.fuzzy_threshold,
        }
    }

    /// Runs the chosen strategies concurrently and fuses their output.
    ///
    /// Failed strategies are dropped; the fused list is unreranked and
    /// untruncated so decomposition can keep folding results in.
    ///
    /// # Errors
    ///
    /// Never fails on individual strategy errors; only on panics in the
    /// spawn scaffolding, which are not expected.
    #[instrument(skip(self, parsed, options), fields(intent = %parsed.intent))]
    pub fn run_strategies(
        &self,
        parsed: &ParsedQuery,
        options: &SearchOptions,
    ) -> Result<Vec<(SearchSource, Vec<ScoredEntity>)>> {
        let sources = options
            .strategies
            .clone()
            .unwrap_or_else(|| Self::strategies_for(parsed));
        let strategy_options = self.strategy_options(options);

        let mut collected = Vec::with_capacity(sources.len());
        std::thread::scope(|scope| {
            let handles: Vec<_> = sources
                .iter()
                .map(|source| {
                    let source = *source;
                    let strategy = self.strategy(source);
                    let opts = &strategy_options;
                    (
                        source,
                        scope.spawn(move || strategy.run(parsed, opts)),
                    )
                })
                .collect();

            for (source, handle) in handles {
                match handle.join() {
                    Ok(Ok(results)) => collected.push((source, results)),
                    Ok(Err(e)) => {
                        tracing::warn!(strategy = %source, error = %e, "search strategy failed");
                        metrics::counter!(
                            "repolens_strategy_failures_total",
                            "strategy" => source.as_str()
                        )
                        .increment(1);
                    },
                    Err(_) => {
                        tracing::warn!(strategy = %source, "search strategy panicked");
                    },
                }
            }
        });

        Ok(collected)
    }

    /// Searches with a pre-parsed query, fusing by max score.
    ///
    /// # Errors
    ///
    /// Returns an error only for scaffolding failures; strategy errors
    /// degrade to partial results.
    pub fn search_parsed(
        &self,
        parsed: &ParsedQuery,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredEntity>> {
        let mut fusion = FusionMap::new();
        for (_, results) in self.run_strategies(parsed, options)? {
            fusion.fuse(results, 1.0);
        }

        let mut results = fusion.into_sorted();
        self.reranker.rerank(&mut results, parsed);
        results.truncate(effective_limit(options.limit, self.config.default_limit));
        Ok(results)
    }

    /// Parses the query and searches.
    ///
    /// # Errors
    ///
    /// Returns an error only for scaffolding failures.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<ScoredEntity>> {
        let parsed = self.parser.parse(query);
        self.search_parsed(&parsed, options)
    }

    /// The query parser used for strategy selection.
    #[must_use]
    pub const fn parser(&self) -> &QueryParser {
        &self.parser
    }

    /// The reranker applied after fusion.
    #[must_use]
    pub const fn reranker(&self) -> &HeuristicReranker {
        &self.reranker
    }
}

pub(crate) fn effective_limit(requested: usize, default: usize) -> usize {
    if requested == 0 { default } else { requested }
}
