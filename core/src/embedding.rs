//! Deterministic hash projection used when no learned embedding is available.
//!
//! This is a bag-of-bytes fallback, not a semantic embedding. Texts with
//! similar byte-hash distributions land close in cosine space and nothing
//! more. [`Embedding::source`] lets callers surface the degraded quality.

use serde::{Deserialize, Serialize};

use crate::normalize::normalize;

/// 32-bit FNV offset basis.
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
/// 32-bit FNV prime.
pub const FNV_PRIME: u32 = 16_777_619;

/// Writes the unit-normalized hash projection of `text` into `embedding`.
///
/// The rolling hash is updated per byte and the running value picks the
/// bucket that receives `1.0`. Empty `text` or an empty `embedding` leaves
/// the buffer as the caller initialized it; otherwise it is zeroed first.
pub fn hash_embedding(text: &[u8], embedding: &mut [f32]) {
    if text.is_empty() || embedding.is_empty() {
        return;
    }

    embedding.fill(0.0);
    let dimension = embedding.len() as u64;
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in text {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
        let bucket = (u64::from(hash) % dimension) as usize;
        embedding[bucket] += 1.0;
    }

    normalize(embedding);
}

/// Where an [`Embedding`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSource {
    /// Produced by an external model and handed in as-is.
    Provided,
    /// Produced by [`hash_embedding`].
    HashFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub source: EmbeddingSource,
}

impl Embedding {
    pub fn provided(values: Vec<f32>) -> Self {
        Self {
            values,
            source: EmbeddingSource::Provided,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.source, EmbeddingSource::HashFallback)
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// Fixed-dimension wrapper around [`hash_embedding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embed(&self, text: &str) -> Embedding {
        let mut values = vec![0.0; self.dimension];
        hash_embedding(text.as_bytes(), &mut values);
        Embedding {
            values,
            source: EmbeddingSource::HashFallback,
        }
    }

    /// Returns `provided` when present, the hash projection of `text` otherwise.
    pub fn embed_or_fallback(&self, text: &str, provided: Option<Vec<f32>>) -> Embedding {
        match provided {
            Some(values) if values.len() == self.dimension => Embedding::provided(values),
            _ => self.embed(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{cosine_similarity, l2_norm};

    #[test]
    fn hash_embedding_is_deterministic() {
        let mut first = vec![0.0; 64];
        let mut second = vec![0.0; 64];
        hash_embedding(b"motion to suppress evidence", &mut first);
        hash_embedding(b"motion to suppress evidence", &mut second);
        let first_bits: Vec<u32> = first.iter().map(|value| value.to_bits()).collect();
        let second_bits: Vec<u32> = second.iter().map(|value| value.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn hash_embedding_is_unit_length() {
        let mut values = vec![0.0; 32];
        hash_embedding(b"witness statement", &mut values);
        assert!((l2_norm(&values) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embedding_follows_rolling_fnv_buckets() {
        let mut values = vec![0.0; 7];
        hash_embedding(b"ab", &mut values);

        let mut expected = vec![0.0f32; 7];
        let mut hash = FNV_OFFSET_BASIS;
        for byte in [b'a', b'b'] {
            hash = (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME);
            expected[(hash % 7) as usize] += 1.0;
        }
        normalize(&mut expected);
        assert_eq!(values, expected);
    }

    #[test]
    fn hash_embedding_overwrites_previous_contents() {
        let mut values = vec![9.0; 16];
        hash_embedding(b"x", &mut values);
        assert_eq!(values.iter().filter(|value| **value != 0.0).count(), 1);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut values = vec![3.0; 4];
        hash_embedding(b"", &mut values);
        assert_eq!(values, vec![3.0; 4]);
        hash_embedding(b"text", &mut []);
    }

    #[test]
    fn identical_texts_are_maximally_similar() {
        let embedder = HashEmbedder::new(48);
        let left = embedder.embed("exhibit A");
        let right = embedder.embed("exhibit A");
        assert!((cosine_similarity(&left.values, &right.values) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn fallback_is_marked_degraded() {
        let embedder = HashEmbedder::new(3);
        assert!(embedder.embed("text").is_degraded());

        let provided = embedder.embed_or_fallback("text", Some(vec![0.1, 0.2, 0.3]));
        assert!(!provided.is_degraded());
        assert_eq!(provided.values, vec![0.1, 0.2, 0.3]);

        let wrong_dimension = embedder.embed_or_fallback("text", Some(vec![0.1]));
        assert!(wrong_dimension.is_degraded());
        assert_eq!(wrong_dimension.dimension(), 3);
    }
}
