//! # Repolens
//!
//! A repository knowledge base serving relevance-ranked context to AI
//! coding assistants.
//!
//! Repolens indexes source files and documentation into typed entities
//! connected by typed, weighted relationships, and answers natural-language
//! queries with a token-budgeted, attributed context snippet.
//!
//! ## Pipeline
//!
//! ```text
//! gate → parse → (hyde) → (decompose) → multi-strategy search
//!      → rerank → feedback adjust → (expand) → assemble
//! ```
//!
//! ## Features
//!
//! - Per-project SQLite storage (entities, relationships, embeddings, feedback)
//! - Graph traversal: neighborhoods, shortest paths, reachability, subgraphs
//! - Entity resolution with embedding + bigram-similarity duplicate merging
//! - Parallel keyword / semantic / graph / fuzzy search with max-score fusion
//! - Learned relevance feedback that re-weights candidates per entity
//!
//! ## Example
//!
//! ```rust,ignore
//! use repolens::{RetrievalService, QueryOptions};
//!
//! let service = RetrievalService::new(config)?;
//! let result = service.query_context("myproject", "how does `AuthService` refresh tokens?",
//!     &QueryOptions::default())?;
//! println!("{}", result.context);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod graph;
pub mod llm;
pub mod models;
pub mod observability;
pub mod query;
pub mod search;
pub mod service;
pub mod storage;

// Re-exports for convenience
pub use config::{AssemblerConfig, ExpanderConfig, GateConfig, RepolensConfig, SearchConfig};
pub use embedding::EmbeddingProvider;
pub use llm::CompletionProvider;
pub use models::{
    ContextFormat, ContextResult, Direction, Entity, EntityId, EntityType, FeedbackSignal,
    ParsedQuery, QueryIntent, Relationship, RelationshipId, RelationshipType, ScoredEntity,
    SearchSource,
};
pub use service::{CancellationToken, QueryOptions, RetrievalService};

/// Error type for repolens operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed queries, empty identifiers, bad options |
/// | `NotFound` | Merge primary missing; required record absent |
/// | `Invariant` | Project table-name collision, impossible upsert state |
/// | `External` | Completion/embedding provider unreachable or malformed |
/// | `Cancelled` | Cooperative cancellation observed between pipeline steps |
/// | `OperationFailed` | `SQLite` failures, I/O errors |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required record could not be found.
    ///
    /// Raised only where absence is a contract violation (e.g. the merge
    /// primary). Plain lookups return `Ok(None)` instead.
    #[error("not found: {0}")]
    NotFound(String),

    /// A programmer-facing invariant was violated.
    ///
    /// Raised when:
    /// - Two project names sanitize to the same table prefix
    /// - An upsert reaches an impossible state
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// An external provider failed.
    ///
    /// The pipeline degrades gracefully on this variant: the gate falls back
    /// to its default decision, HyDE is skipped, and failed search strategies
    /// are dropped while the others continue.
    #[error("provider '{provider}' failed: {cause}")]
    External {
        /// The provider that failed.
        provider: String,
        /// The underlying cause.
        cause: String,
    },

    /// The operation was cancelled cooperatively.
    #[error("cancelled during {0}")]
    Cancelled(String),

    /// A storage or I/O operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for repolens operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so storage rows and feedback records share one clock source.
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
