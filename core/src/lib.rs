#![forbid(unsafe_code)]
//! Vector similarity kernel for simkernel.
//!
//! Synchronous, allocation-free numeric routines over flat `f32` buffers:
//! distance and similarity primitives, in-place normalization, 4-lane SIMD
//! variants, batch scoring with a selectable metric and a deterministic hash
//! embedding fallback. Nothing here blocks, logs or panics on degenerate input.

pub mod batch;
pub mod buffer;
pub mod embedding;
pub mod normalize;
pub mod simd;
pub mod vector;

pub use batch::{
    compute_batch_similarity, distance_to_similarity, top_k, BatchScorer, ScoredIndex,
    SimilarityMetric,
};
pub use buffer::{check_output, BufferError, OwnedBatch, VectorBatch};
pub use embedding::{hash_embedding, Embedding, EmbeddingSource, HashEmbedder};
pub use normalize::{normalize, normalize_rows, z_score_normalize};
pub use simd::{
    cosine_similarity_simd, dot_product_simd, euclidean_distance_simd, manhattan_distance_simd,
    Backend,
};
pub use vector::{
    cosine_similarity, cosine_similarity_checked, dot_product, dot_product_checked,
    euclidean_distance, euclidean_distance_checked, l2_norm, manhattan_distance,
    manhattan_distance_checked, validate_vectors, VectorError, VectorSide,
    VectorValidationOptions,
};
