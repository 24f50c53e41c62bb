//! Embedding generation.
//!
//! The pipeline treats embedding generation as an external provider behind
//! [`EmbeddingProvider`]. The bundled [`HashingEmbedder`] produces
//! deterministic pseudo-embeddings from token hashes so search, duplicate
//! detection, and tests work without a model server; production deployments
//! swap in an HTTP-backed provider.

// Allow cast precision loss for hash-based embedding calculations.
#![allow(clippy::cast_precision_loss)]

mod hashed;

pub use hashed::HashingEmbedder;

use crate::Result;

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
