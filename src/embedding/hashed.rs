//! Hash-based pseudo-embedder.
//!
//! Buckets lowercase word tokens into a fixed-dimension vector by FNV-1a
//! hash and L2-normalizes the result. Deterministic, dependency-free, and
//! good enough for lexical-overlap similarity; not a semantic model.

use super::EmbeddingProvider;
use crate::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(token: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic token-hash embedder.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Default vector size.
    pub const DEFAULT_DIMENSIONS: usize = 256;

    /// Creates an embedder with the given dimensionality (minimum 8).
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self {
            dimensions: if dimensions < 8 { 8 } else { dimensions },
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.dimensions as u64) as usize;
            // A second hash decides the sign so unrelated tokens cancel
            // rather than accumulate.
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("token refresh logic").unwrap();
        let b = embedder.embed("token refresh logic").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimensions() {
        let embedder = HashingEmbedder::new(64);
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.embed("hello").unwrap().len(), 64);

        // floor applies
        assert_eq!(HashingEmbedder::new(2).dimensions(), 8);
    }

    #[test]
    fn test_overlap_scores_higher() {
        let embedder = HashingEmbedder::default();
        let base = embedder.embed("authentication token service").unwrap();
        let close = embedder.embed("authentication token handler").unwrap();
        let far = embedder.embed("parser grammar tree").unwrap();

        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let vector = embedder.embed("").unwrap();
        assert!(vector.iter().all(|v| v.abs() < f32::EPSILON));
    }

    #[test]
    fn test_embed_batch() {
        let embedder = HashingEmbedder::new(32);
        let batch = embedder.embed_batch(&["one", "two"]).unwrap();
        assert_eq!(batch.len(), 2);
    }
}
