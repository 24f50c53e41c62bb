//! Configuration.
//!
//! Defaults live here; every knob can be overridden through `REPOLENS_*`
//! environment variables (loaded via `dotenvy` in the binary).

use crate::models::ContextFormat;
use std::path::PathBuf;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Retrieval gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// When false, the gate always admits the query.
    pub enabled: bool,
    /// Cache gate decisions by raw query.
    pub cache_enabled: bool,
    /// Decision cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Decision cache capacity.
    pub cache_capacity: usize,
    /// Slow-path provider timeout in milliseconds.
    pub provider_timeout_ms: u64,
    /// Project description included in the provider prompt.
    pub project_description: String,
    /// Entity type names included in the provider prompt.
    pub entity_types: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_enabled: true,
            cache_ttl_secs: 300,
            cache_capacity: 256,
            provider_timeout_ms: 2_000,
            project_description: "a software repository".to_string(),
            entity_types: crate::models::EntityType::all()
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
        }
    }
}

impl GateConfig {
    /// Applies `REPOLENS_GATE_*` environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_bool("REPOLENS_GATE_ENABLED") {
            config.enabled = v;
        }
        if let Some(v) = env_bool("REPOLENS_GATE_CACHE_ENABLED") {
            config.cache_enabled = v;
        }
        if let Some(v) = env_parse("REPOLENS_GATE_CACHE_TTL_SECS") {
            config.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("REPOLENS_GATE_PROVIDER_TIMEOUT_MS") {
            config.provider_timeout_ms = v;
        }
        config
    }
}

/// Multi-strategy search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Default result limit when the caller does not override it.
    pub default_limit: usize,
    /// Per-strategy result fan-out before fusion.
    pub per_strategy_limit: usize,
    /// Enable HyDE query-embedding expansion.
    pub hyde_enabled: bool,
    /// Minimum 1-NN score for accepting a hypothetical embedding.
    pub hyde_min_check_score: f32,
    /// Minimum bigram similarity for fuzzy matches.
    pub fuzzy_threshold: f32,
    /// Minimum cosine score for semantic matches.
    pub semantic_threshold: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            per_strategy_limit: 25,
            hyde_enabled: false,
            hyde_min_check_score: 0.3,
            fuzzy_threshold: 0.4,
            semantic_threshold: 0.2,
        }
    }
}

impl SearchConfig {
    /// Applies `REPOLENS_SEARCH_*` environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("REPOLENS_SEARCH_DEFAULT_LIMIT") {
            config.default_limit = v;
        }
        if let Some(v) = env_bool("REPOLENS_SEARCH_HYDE_ENABLED") {
            config.hyde_enabled = v;
        }
        if let Some(v) = env_parse("REPOLENS_SEARCH_FUZZY_THRESHOLD") {
            config.fuzzy_threshold = v;
        }
        config
    }
}

/// Context expander configuration.
#[derive(Debug, Clone)]
pub struct ExpanderConfig {
    /// Maximum structural hops from each seed.
    pub max_hops: u32,
    /// Token ceiling for everything added by expansion.
    pub max_expansion_tokens: usize,
    /// Fraction of the expansion budget a single seed may consume.
    pub budget_share_per_seed: f32,
    /// Score factor inherited by expansion entities.
    pub score_factor: f32,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            max_hops: 1,
            max_expansion_tokens: 1_000,
            budget_share_per_seed: 0.5,
            score_factor: 0.5,
        }
    }
}

/// Context assembler configuration.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Hard token budget for the assembled context.
    pub max_tokens: usize,
    /// Append the sources block.
    pub include_sources: bool,
    /// Output format.
    pub format: ContextFormat,
    /// Candidates below this score are skipped.
    pub min_relevance: f32,
    /// Partition output into code / documentation / conversation groups.
    pub group_by_type: bool,
    /// Render raw code content (not just summaries).
    pub include_code_content: bool,
    /// Truncate each entity's content to this many characters.
    pub max_content_length: Option<usize>,
    /// Text prepended to the context.
    pub prefix: Option<String>,
    /// Text appended to the context.
    pub suffix: Option<String>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4_000,
            include_sources: true,
            format: ContextFormat::Markdown,
            min_relevance: 0.1,
            group_by_type: false,
            include_code_content: true,
            max_content_length: None,
            prefix: None,
            suffix: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct RepolensConfig {
    /// `SQLite` database path.
    pub db_path: PathBuf,
    /// Embedding model identifier for the vector index.
    pub embedding_model: String,
    /// Gate configuration.
    pub gate: GateConfig,
    /// Search configuration.
    pub search: SearchConfig,
    /// Expander configuration.
    pub expander: ExpanderConfig,
    /// Assembler defaults.
    pub assembler: AssemblerConfig,
}

impl Default for RepolensConfig {
    fn default() -> Self {
        Self {
            db_path: crate::storage::default_db_path(),
            embedding_model: "hash-256".to_string(),
            gate: GateConfig::default(),
            search: SearchConfig::default(),
            expander: ExpanderConfig::default(),
            assembler: AssemblerConfig::default(),
        }
    }
}

impl RepolensConfig {
    /// Builds configuration from defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            gate: GateConfig::from_env(),
            search: SearchConfig::from_env(),
            ..Self::default()
        };
        if let Ok(path) = std::env::var("REPOLENS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(model) = std::env::var("REPOLENS_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        config
    }

    /// In-memory configuration for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }
}
