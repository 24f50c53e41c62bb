//! Search and context-result types.

use super::entity::{Entity, EntityId, EntityType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Search strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    /// Token/substring matching over names and content.
    Keyword,
    /// Embedding nearest-neighbor search.
    Semantic,
    /// Graph expansion from mentioned entities.
    Graph,
    /// Bigram-similarity matching over names.
    Fuzzy,
}

impl SearchSource {
    /// Returns all strategy variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Keyword, Self::Semantic, Self::Graph, Self::Fuzzy]
    }

    /// Returns the strategy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
            Self::Graph => "graph",
            Self::Fuzzy => "fuzzy",
        }
    }

    /// Parses a strategy from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "keyword" | "text" => Some(Self::Keyword),
            "semantic" | "vector" => Some(Self::Semantic),
            "graph" => Some(Self::Graph),
            "fuzzy" => Some(Self::Fuzzy),
            _ => None,
        }
    }
}

impl fmt::Display for SearchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scored candidate produced by a search strategy.
#[derive(Debug, Clone)]
pub struct ScoredEntity {
    /// The matched entity.
    pub entity: Entity,
    /// Relevance score in [0, 1] before reranking; reranking and feedback
    /// adjustment may push it above 1.0.
    pub score: f32,
    /// Strategy that produced this candidate.
    pub source: SearchSource,
}

impl ScoredEntity {
    /// Creates a scored candidate.
    #[must_use]
    pub const fn new(entity: Entity, score: f32, source: SearchSource) -> Self {
        Self {
            entity,
            score,
            source,
        }
    }
}

/// Sorts candidates by score descending with a stable id tie-break.
pub fn sort_by_score(results: &mut [ScoredEntity]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entity.id.cmp(&b.entity.id))
    });
}

/// Output format for assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextFormat {
    /// Markdown headings and fenced code blocks.
    #[default]
    Markdown,
    /// `<entity>` elements with escaped text.
    Xml,
    /// Unadorned text.
    Plain,
}

impl ContextFormat {
    /// Returns the format as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Xml => "xml",
            Self::Plain => "plain",
        }
    }

    /// Parses a format from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "xml" => Some(Self::Xml),
            "plain" | "text" => Some(Self::Plain),
            _ => None,
        }
    }
}

/// Source attribution for one assembled entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    /// The attributed entity.
    pub entity_id: EntityId,
    /// Entity name.
    pub name: String,
    /// Entity type.
    pub entity_type: EntityType,
    /// Source file, when known.
    pub file_path: Option<String>,
    /// Start line, when known.
    pub line: Option<u32>,
    /// Relevance score at assembly time.
    pub relevance: f32,
}

/// Assembled, token-budgeted context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextResult {
    /// The formatted context string.
    pub context: String,
    /// Attribution for the included entities (capped at 10 in the rendered
    /// sources block; the full list is kept here).
    pub sources: Vec<ContextSource>,
    /// Pipeline confidence in [0, 1].
    pub confidence: f32,
    /// Estimated tokens consumed by `context`.
    pub tokens_used: usize,
    /// True when at least one candidate was dropped solely for budget.
    pub truncated: bool,
}

impl ContextResult {
    /// An empty result with the given confidence.
    #[must_use]
    pub fn empty(confidence: f32) -> Self {
        Self {
            confidence,
            ..Self::default()
        }
    }
}
