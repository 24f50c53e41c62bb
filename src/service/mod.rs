//! Retrieval service.
//!
//! Orchestrates the pipeline per project:
//!
//! ```text
//! gate → parse → (hyde) → (decompose) → multi-strategy search
//!      → rerank → feedback adjust → (expand) → assemble
//! ```
//!
//! Store handles are memoized per project and constructed at most once;
//! [`RetrievalService::clear_project_cache`] evicts them. A cooperative
//! [`CancellationToken`] is honored between steps: a cancelled query
//! yields an empty result with confidence 0.

use crate::config::{AssemblerConfig, RepolensConfig};
use crate::context::{ContextAssembler, ContextExpander, RelevanceFeedback};
use crate::embedding::{EmbeddingProvider, HashingEmbedder};
use crate::graph::{EntityResolver, GraphTraversal};
use crate::llm::CompletionProvider;
use crate::models::{ContextFormat, ContextResult, EntityType, SearchSource};
use crate::query::{QueryParser, RetrievalGate};
use crate::search::{
    FusionMap, FuzzySearch, GraphSearch, HydeExpander, KeywordSearch, MultiStrategySearch,
    SearchOptions, SemanticSearch,
};
use crate::storage::{
    EmbeddingIndex, EntityStore, FeedbackStore, RelationshipStore, initialize_project,
    open_database, open_in_memory,
};
use crate::Result;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// Cooperative cancellation signal checked between pipeline steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Options for one `query_context` invocation.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Run the admission gate first.
    pub gate: bool,
    /// Attempt HyDE query-embedding expansion.
    pub hyde: bool,
    /// Search decomposed sub-queries when the parser splits the query.
    pub decompose: bool,
    /// Expand structural context around the selected candidates.
    pub expand: bool,
    /// Restrict candidates to these entity types.
    pub include_types: Option<Vec<EntityType>>,
    /// Maximum candidates entering assembly.
    pub max_results: Option<usize>,
    /// Token budget override for assembly.
    pub max_tokens: Option<usize>,
    /// Minimum relevance override for assembly.
    pub min_score: Option<f32>,
    /// Explicit strategy selection.
    pub strategies: Option<Vec<SearchSource>>,
    /// Output format override.
    pub format: Option<ContextFormat>,
    /// Cooperative cancellation signal.
    pub cancellation: Option<CancellationToken>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            gate: true,
            hyde: false,
            decompose: true,
            expand: true,
            include_types: None,
            max_results: None,
            max_tokens: None,
            min_score: None,
            strategies: None,
            format: None,
            cancellation: None,
        }
    }
}

/// Confidence from the top-k scores with decaying weights `0.7^i`.
#[must_use]
pub fn pipeline_confidence(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let k = scores.len().min(5);
    let mut numerator = 0.0_f32;
    let mut denominator = 0.0_f32;
    let mut weight = 1.0_f32;
    for score in &scores[..k] {
        numerator += weight * score;
        denominator += weight;
        weight *= 0.7;
    }
    (numerator / denominator).clamp(0.0, 1.0)
}

/// Memoized per-project store handles and services.
struct ProjectHandles {
    entities: Arc<EntityStore>,
    relationships: Arc<RelationshipStore>,
    index: Arc<EmbeddingIndex>,
    traversal: Arc<GraphTraversal>,
    resolver: Arc<EntityResolver>,
    search: Arc<MultiStrategySearch>,
    expander: Arc<ContextExpander>,
    feedback: Arc<RelevanceFeedback>,
    hyde: Option<Arc<HydeExpander>>,
}

/// The retrieval pipeline, one instance per database.
pub struct RetrievalService {
    config: RepolensConfig,
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Option<Arc<dyn CompletionProvider>>,
    gate: RetrievalGate,
    parser: QueryParser,
    assembler: ContextAssembler,
    projects: Mutex<HashMap<String, Arc<ProjectHandles>>>,
}

impl RetrievalService {
    /// Creates a service with the default hashing embedder and no
    /// completion provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn new(config: RepolensConfig) -> Result<Self> {
        Self::with_providers(config, Arc::new(HashingEmbedder::default()), None)
    }

    /// Creates a service with explicit providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn with_providers(
        config: RepolensConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Option<Arc<dyn CompletionProvider>>,
    ) -> Result<Self> {
        let conn = if config.db_path.to_str() == Some(":memory:") {
            open_in_memory()?
        } else {
            if let Some(parent) = config.db_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| crate::Error::OperationFailed {
                    operation: "create_data_dir".to_string(),
                    cause: e.to_string(),
                })?;
            }
            open_database(&config.db_path)?
        };

        let gate = RetrievalGate::new(completion.clone(), config.gate.clone());
        Ok(Self {
            config,
            conn: Arc::new(conn),
            embedder,
            completion,
            gate,
            parser: QueryParser::new(),
            assembler: ContextAssembler::new(),
            projects: Mutex::new(HashMap::new()),
        })
    }

    fn handles(&self, project: &str) -> Result<Arc<ProjectHandles>> {
        // The map lock is held through construction: at-most-once per
        // project even under concurrent first queries.
        let mut projects = match self.projects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handles) = projects.get(project) {
            return Ok(Arc::clone(handles));
        }

        let tables = initialize_project(&self.conn, project)?;
        let entities = Arc::new(EntityStore::new(Arc::clone(&self.conn), tables.clone()));
        let relationships = Arc::new(RelationshipStore::new(
            Arc::clone(&self.conn),
            tables.clone(),
        ));
        let index = Arc::new(EmbeddingIndex::new(
            Arc::clone(&self.conn),
            tables.clone(),
            self.config.embedding_model.clone(),
        ));
        let feedback_store = Arc::new(FeedbackStore::new(Arc::clone(&self.conn), tables));

        let traversal = Arc::new(GraphTraversal::new(
            Arc::clone(&entities),
            Arc::clone(&relationships),
        ));
        let resolver = Arc::new(EntityResolver::new(
            Arc::clone(&entities),
            Arc::clone(&relationships),
            Arc::clone(&index),
            Arc::clone(&self.embedder),
        ));
        let search = Arc::new(MultiStrategySearch::new(
            KeywordSearch::new(Arc::clone(&entities)),
            SemanticSearch::new(
                Arc::clone(&entities),
                Arc::clone(&index),
                Arc::clone(&self.embedder),
            ),
            GraphSearch::new(Arc::clone(&entities), Arc::clone(&relationships)),
            FuzzySearch::new(Arc::clone(&entities)),
            self.config.search.clone(),
        ));
        let expander = Arc::new(ContextExpander::new(
            Arc::clone(&entities),
            Arc::clone(&relationships),
            self.config.expander.clone(),
        ));
        let feedback = Arc::new(RelevanceFeedback::new(feedback_store));
        let hyde = self.completion.clone().map(|provider| {
            Arc::new(HydeExpander::new(
                provider,
                Arc::clone(&self.embedder),
                Arc::clone(&index),
                self.config.search.hyde_min_check_score,
            ))
        });

        let handles = Arc::new(ProjectHandles {
            entities,
            relationships,
            index,
            traversal,
            resolver,
            search,
            expander,
            feedback,
            hyde,
        });
        projects.insert(project.to_string(), Arc::clone(&handles));
        metrics::counter!("repolens_projects_initialized_total").increment(1);
        Ok(handles)
    }

    /// Evicts the memoized handles for a project.
    pub fn clear_project_cache(&self, project: &str) {
        let mut projects = match self.projects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        projects.remove(project);
    }

    fn assembler_config(&self, options: &QueryOptions) -> AssemblerConfig {
        let mut config = self.config.assembler.clone();
        if let Some(max_tokens) = options.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(min_score) = options.min_score {
            config.min_relevance = min_score;
        }
        if let Some(format) = options.format {
            config.format = format;
        }
        config
    }

    fn cancelled(options: &QueryOptions) -> bool {
        options
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Answers a natural-language query with token-budgeted context.
    ///
    /// # Errors
    ///
    /// Returns an error for storage failures or project-name collisions.
    /// Provider failures and individual strategy failures degrade to
    /// partial results; cancellation yields an empty result with
    /// confidence 0.
    #[instrument(skip(self, query, options), fields(query_len = query.len()))]
    pub fn query_context(
        &self,
        project: &str,
        query: &str,
        options: &QueryOptions,
    ) -> Result<ContextResult> {
        // Step 1: admission gate.
        if options.gate {
            let decision = self.gate.should_retrieve(query);
            if !decision.should_retrieve {
                tracing::debug!(reason = %decision.reason, "gate suppressed retrieval");
                return Ok(ContextResult::empty(0.0));
            }
        }
        if Self::cancelled(options) {
            return Ok(ContextResult::empty(0.0));
        }

        let handles = self.handles(project)?;
        let parsed = self.parser.parse(query);

        // Step 2: HyDE query embedding (optional, degrades to none).
        let query_embedding = if options.hyde {
            handles
                .hyde
                .as_ref()
                .and_then(|hyde| hyde.expand(&parsed.normalized))
        } else {
            None
        };
        if Self::cancelled(options) {
            return Ok(ContextResult::empty(0.0));
        }

        let search_options = SearchOptions {
            strategies: options.strategies.clone(),
            limit: options
                .max_results
                .unwrap_or(self.config.search.default_limit),
            entity_types: options
                .include_types
                .clone()
                .or_else(|| parsed.filters.types.clone()),
            query_embedding,
        };

        // Steps 3-4: search, decomposed or direct.
        let mut results = if options.decompose && parsed.was_decomposed {
            let mut fusion = FusionMap::new();
            for sub_query in &parsed.sub_queries {
                let sub_parsed = self.parser.parse(&sub_query.text);
                for (_, strategy_results) in
                    handles.search.run_strategies(&sub_parsed, &search_options)?
                {
                    fusion.fuse(strategy_results, sub_query.weight);
                }
                if Self::cancelled(options) {
                    return Ok(ContextResult::empty(0.0));
                }
            }
            let mut fused = fusion.into_sorted();
            handles.search.reranker().rerank(&mut fused, &parsed);
            fused
        } else {
            handles.search.search_parsed(&parsed, &search_options)?
        };
        if Self::cancelled(options) {
            return Ok(ContextResult::empty(0.0));
        }

        // Step 4: feedback adjustment, then the candidate cap.
        handles.feedback.adjust(&mut results)?;
        let limit = options
            .max_results
            .unwrap_or(self.config.search.default_limit)
            .max(1);
        results.truncate(limit);

        // Step 5: structural expansion.
        if options.expand && !results.is_empty() {
            if Self::cancelled(options) {
                return Ok(ContextResult::empty(0.0));
            }
            match handles.expander.expand(&results) {
                Ok(additions) => results.extend(additions),
                Err(e) => {
                    tracing::warn!(error = %e, "context expansion failed, continuing");
                },
            }
        }
        if Self::cancelled(options) {
            return Ok(ContextResult::empty(0.0));
        }

        // Step 6: confidence over the post-expansion candidate set.
        // Expansion appends below the seeds, so re-sort the scores before
        // taking the top-k.
        let confidence = {
            let mut scores: Vec<f32> = results.iter().map(|r| r.score).collect();
            scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            pipeline_confidence(&scores)
        };

        // Step 7: assembly.
        let mut result = self
            .assembler
            .assemble(&results, &self.assembler_config(options));
        result.confidence = confidence;

        metrics::counter!("repolens_queries_total").increment(1);
        Ok(result)
    }

    /// Entity store handle for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if project initialization fails.
    pub fn entities(&self, project: &str) -> Result<Arc<EntityStore>> {
        Ok(Arc::clone(&self.handles(project)?.entities))
    }

    /// Relationship store handle for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if project initialization fails.
    pub fn relationships(&self, project: &str) -> Result<Arc<RelationshipStore>> {
        Ok(Arc::clone(&self.handles(project)?.relationships))
    }

    /// Embedding index handle for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if project initialization fails.
    pub fn embeddings(&self, project: &str) -> Result<Arc<EmbeddingIndex>> {
        Ok(Arc::clone(&self.handles(project)?.index))
    }

    /// Graph traversal handle for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if project initialization fails.
    pub fn traversal(&self, project: &str) -> Result<Arc<GraphTraversal>> {
        Ok(Arc::clone(&self.handles(project)?.traversal))
    }

    /// Entity resolver handle for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if project initialization fails.
    pub fn resolver(&self, project: &str) -> Result<Arc<EntityResolver>> {
        Ok(Arc::clone(&self.handles(project)?.resolver))
    }

    /// Relevance feedback handle for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if project initialization fails.
    pub fn feedback(&self, project: &str) -> Result<Arc<RelevanceFeedback>> {
        Ok(Arc::clone(&self.handles(project)?.feedback))
    }

    /// The embedding provider backing this service.
    #[must_use]
    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, EntityInput, RelationshipInput, RelationshipType};

    fn service() -> RetrievalService {
        RetrievalService::new(RepolensConfig::in_memory()).unwrap()
    }

    fn seed(service: &RetrievalService, project: &str, id: &str, name: &str, content: &str) {
        let entities = service.entities(project).unwrap();
        let index = service.embeddings(project).unwrap();
        let entity = entities
            .upsert(EntityInput {
                id: Some(EntityId::new(id)),
                name: name.to_string(),
                qualified_name: format!("q::{name}"),
                entity_type: Some(EntityType::Function),
                content: Some(content.to_string()),
                ..Default::default()
            })
            .unwrap();
        let vector = service.embedder().embed(entity.comparison_text()).unwrap();
        index.upsert(&entity.id, &vector).unwrap();
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_pipeline_confidence() {
        assert_eq!(pipeline_confidence(&[]), 0.0);
        assert_eq!(pipeline_confidence(&[0.8]), 0.8);

        // decaying weights favor the head of the list
        let front_loaded = pipeline_confidence(&[0.9, 0.1]);
        let back_loaded = pipeline_confidence(&[0.1, 0.9]);
        assert!(front_loaded > back_loaded);

        // clamped to [0, 1]
        assert!(pipeline_confidence(&[1.8, 1.6]) <= 1.0);
    }

    #[test]
    fn test_gate_suppresses_trivial_query() {
        let service = service();
        let result = service
            .query_context("demo", "hello", &QueryOptions::default())
            .unwrap();
        assert!(result.context.is_empty());
        assert!(result.confidence.abs() < f32::EPSILON);
        assert!(!result.truncated);
    }

    #[test]
    fn test_query_returns_context() {
        let service = service();
        seed(&service, "demo", "e1", "token_refresh", "rotate the session token");

        let result = service
            .query_context(
                "demo",
                "find the token refresh logic",
                &QueryOptions::default(),
            )
            .unwrap();
        assert!(result.context.contains("token_refresh"));
        assert!(result.confidence > 0.0);
        assert!(!result.sources.is_empty());
    }

    #[test]
    fn test_cancellation_yields_empty() {
        let service = service();
        seed(&service, "demo", "e1", "token_refresh", "rotate the token");

        let token = CancellationToken::new();
        token.cancel();
        let options = QueryOptions {
            cancellation: Some(token),
            ..Default::default()
        };
        let result = service
            .query_context("demo", "find the token refresh logic", &options)
            .unwrap();
        assert!(result.context.is_empty());
        assert!(result.confidence.abs() < f32::EPSILON);
        assert!(!result.truncated);
    }

    #[test]
    fn test_project_isolation() {
        let service = service();
        seed(&service, "alpha", "e1", "token_refresh", "rotate the token");

        let result = service
            .query_context(
                "beta",
                "find the token refresh logic",
                &QueryOptions::default(),
            )
            .unwrap();
        assert!(result.sources.is_empty());
    }

    #[test]
    fn test_handles_are_memoized() {
        let service = service();
        let first = service.entities("demo").unwrap();
        let second = service.entities("demo").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        service.clear_project_cache("demo");
        let third = service.entities("demo").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_expansion_includes_owner_file() {
        let service = service();
        seed(&service, "demo", "func", "token_refresh", "rotate the token");
        seed(&service, "demo", "file", "auth.rs", "full file text");
        service
            .relationships("demo")
            .unwrap()
            .create(RelationshipInput::new(
                EntityId::new("file"),
                EntityId::new("func"),
                RelationshipType::Contains,
            ))
            .unwrap();

        let result = service
            .query_context(
                "demo",
                "find the token refresh logic",
                &QueryOptions::default(),
            )
            .unwrap();
        assert!(
            result
                .sources
                .iter()
                .any(|s| s.entity_id.as_str() == "file")
        );
    }

    #[test]
    fn test_confidence_reflects_expansion_additions() {
        // One strong seed plus its owning file reachable only through
        // expansion: the owner enters at half the seed score, so the
        // weighted top-k average must drop when expansion runs.
        let service = service();
        seed(&service, "demo", "func", "token_refresh", "rotate the token");
        seed(&service, "demo", "file", "auth_module", "module source body");
        service
            .relationships("demo")
            .unwrap()
            .create(RelationshipInput::new(
                EntityId::new("file"),
                EntityId::new("func"),
                RelationshipType::Contains,
            ))
            .unwrap();

        let without_expansion = service
            .query_context(
                "demo",
                "find the token refresh logic",
                &QueryOptions {
                    expand: false,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(without_expansion.sources.len(), 1);

        let with_expansion = service
            .query_context(
                "demo",
                "find the token refresh logic",
                &QueryOptions::default(),
            )
            .unwrap();
        assert_eq!(with_expansion.sources.len(), 2);

        assert!(with_expansion.confidence > 0.0);
        assert!(
            with_expansion.confidence < without_expansion.confidence,
            "expansion-added candidate must enter the confidence top-k"
        );
    }
}
