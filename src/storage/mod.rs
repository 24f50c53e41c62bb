//! Persistence layer.
//!
//! Tabular and vector storage over `SQLite`, namespaced per project.
//! One connection serves a database; the mutex serializes writes while WAL
//! mode keeps readers responsive.
//!
//! # Ownership
//!
//! - [`EntityStore`] exclusively owns entity rows
//! - [`RelationshipStore`] exclusively owns edges
//! - [`EmbeddingIndex`] owns vectors
//! - [`FeedbackStore`] owns the feedback log
//!
//! Graph traversal and the resolver hold only read references to stores;
//! cycles exist only in graph data, addressed by id.

mod embedding;
mod entity;
mod feedback;
mod project;
mod relationship;
pub(crate) mod sqlite;

pub use embedding::{EmbeddingIndex, SimilarityOptions, cosine_similarity};
pub use entity::EntityStore;
pub use feedback::FeedbackStore;
pub use project::{ProjectTables, initialize_project, sanitize_project_name};
pub use relationship::RelationshipStore;
pub use sqlite::{default_db_path, open_database, open_in_memory};
