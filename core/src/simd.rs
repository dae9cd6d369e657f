use serde::{Deserialize, Serialize};
use wide::f32x4;

use crate::vector::cosine_from_parts;

const SIMD_WIDTH: usize = 4;

/// Kernel implementation used by the batch scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Scalar,
    Simd,
}

impl Backend {
    /// Picks the lane-parallel kernels when the target has native 128-bit lanes.
    pub const fn detect() -> Self {
        if cfg!(any(
            target_feature = "sse2",
            target_feature = "neon",
            target_feature = "simd128"
        )) {
            Self::Simd
        } else {
            Self::Scalar
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::detect()
    }
}

fn load_f32x4(values: &[f32]) -> f32x4 {
    debug_assert_eq!(values.len(), SIMD_WIDTH);
    f32x4::from([values[0], values[1], values[2], values[3]])
}

fn simd_scan(
    left: &[f32],
    right: &[f32],
    mut simd_step: impl FnMut(f32x4, f32x4),
    mut scalar_step: impl FnMut(f32, f32),
) {
    debug_assert_eq!(left.len(), right.len());
    let mut left_chunks = left.chunks_exact(SIMD_WIDTH);
    let mut right_chunks = right.chunks_exact(SIMD_WIDTH);

    for (left_chunk, right_chunk) in left_chunks.by_ref().zip(right_chunks.by_ref()) {
        simd_step(load_f32x4(left_chunk), load_f32x4(right_chunk));
    }

    for (&left_value, &right_value) in left_chunks.remainder().iter().zip(right_chunks.remainder())
    {
        scalar_step(left_value, right_value);
    }
}

/// 4-lane dot product. Empty input is `0.0`.
pub fn dot_product_simd(left: &[f32], right: &[f32]) -> f32 {
    let mut simd_sum = f32x4::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            simd_sum += left_v * right_v;
        },
        |left_value, right_value| {
            scalar_sum += left_value * right_value;
        },
    );

    simd_sum.reduce_add() + scalar_sum
}

/// 4-lane cosine similarity with the same zero-norm and empty-input rules as
/// [`crate::cosine_similarity`].
pub fn cosine_similarity_simd(left: &[f32], right: &[f32]) -> f32 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let (dot, left_sq_sum, right_sq_sum) = simd_dot_and_norms(left, right);
    cosine_from_parts(dot, left_sq_sum, right_sq_sum)
}

/// 4-lane Euclidean distance. Empty input is `+inf`.
pub fn euclidean_distance_simd(left: &[f32], right: &[f32]) -> f32 {
    if left.is_empty() || right.is_empty() {
        return f32::INFINITY;
    }

    let mut simd_sum = f32x4::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            let delta = left_v - right_v;
            simd_sum += delta * delta;
        },
        |left_value, right_value| {
            let delta = left_value - right_value;
            scalar_sum += delta * delta;
        },
    );

    (simd_sum.reduce_add() + scalar_sum).sqrt()
}

/// 4-lane Manhattan distance. Empty input is `+inf`.
pub fn manhattan_distance_simd(left: &[f32], right: &[f32]) -> f32 {
    if left.is_empty() || right.is_empty() {
        return f32::INFINITY;
    }

    let mut simd_sum = f32x4::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            simd_sum += (left_v - right_v).abs();
        },
        |left_value, right_value| {
            scalar_sum += (left_value - right_value).abs();
        },
    );

    simd_sum.reduce_add() + scalar_sum
}

fn simd_dot_and_norms(left: &[f32], right: &[f32]) -> (f32, f32, f32) {
    let mut dot_sum = f32x4::ZERO;
    let mut left_sq_sum = f32x4::ZERO;
    let mut right_sq_sum = f32x4::ZERO;
    let mut dot_scalar = 0.0;
    let mut left_sq_scalar = 0.0;
    let mut right_sq_scalar = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            dot_sum += left_v * right_v;
            left_sq_sum += left_v * left_v;
            right_sq_sum += right_v * right_v;
        },
        |left_value, right_value| {
            dot_scalar += left_value * right_value;
            left_sq_scalar += left_value * left_value;
            right_sq_scalar += right_value * right_value;
        },
    );

    (
        dot_sum.reduce_add() + dot_scalar,
        left_sq_sum.reduce_add() + left_sq_scalar,
        right_sq_sum.reduce_add() + right_sq_scalar,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{cosine_similarity, dot_product, euclidean_distance, manhattan_distance};

    fn pseudo_random_vector(seed: u64, len: usize) -> Vec<f32> {
        let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
            })
            .collect()
    }

    fn assert_relative(left: f32, right: f32, tolerance: f32) {
        let scale = left.abs().max(right.abs()).max(1.0);
        assert!(
            (left - right).abs() / scale < tolerance,
            "expected {left} ~= {right}"
        );
    }

    #[test]
    fn simd_matches_scalar_on_ragged_lengths() {
        for len in [1usize, 3, 4, 5, 7, 13, 64, 101, 257] {
            let left = pseudo_random_vector(len as u64, len);
            let right = pseudo_random_vector(len as u64 + 1_000, len);
            assert_relative(
                dot_product_simd(&left, &right),
                dot_product(&left, &right),
                1e-4,
            );
            assert_relative(
                cosine_similarity_simd(&left, &right),
                cosine_similarity(&left, &right),
                1e-4,
            );
            assert_relative(
                euclidean_distance_simd(&left, &right),
                euclidean_distance(&left, &right),
                1e-4,
            );
            assert_relative(
                manhattan_distance_simd(&left, &right),
                manhattan_distance(&left, &right),
                1e-4,
            );
        }
    }

    #[test]
    fn simd_keeps_sentinels() {
        assert_eq!(dot_product_simd(&[], &[]), 0.0);
        assert_eq!(cosine_similarity_simd(&[], &[]), 0.0);
        assert_eq!(euclidean_distance_simd(&[], &[]), f32::INFINITY);
        assert_eq!(manhattan_distance_simd(&[], &[]), f32::INFINITY);
        assert_eq!(
            cosine_similarity_simd(&[0.0; 6], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            0.0
        );
    }

    #[test]
    fn simd_cosine_of_vector_with_itself_is_one() {
        let values = pseudo_random_vector(9, 37);
        assert_relative(cosine_similarity_simd(&values, &values), 1.0, 1e-5);
    }
}
