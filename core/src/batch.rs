use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffer::{check_output, BufferError, VectorBatch};
use crate::simd::{
    cosine_similarity_simd, dot_product_simd, euclidean_distance_simd, manhattan_distance_simd,
    Backend,
};
use crate::vector::{cosine_similarity, dot_product, euclidean_distance, manhattan_distance};

/// Work (`count * dimension`) above which [`BatchScorer`] fans rows out over rayon.
pub const PARALLEL_MIN_WORK_DEFAULT: usize = 2_000_000;

/// Similarity metric applied by the batch engine.
///
/// Selector values are stable: cosine=0, euclidean=1, dot_product=2, manhattan=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
    Manhattan,
}

impl SimilarityMetric {
    pub const fn from_selector(selector: u32) -> Option<Self> {
        match selector {
            0 => Some(Self::Cosine),
            1 => Some(Self::Euclidean),
            2 => Some(Self::DotProduct),
            3 => Some(Self::Manhattan),
            _ => None,
        }
    }

    pub const fn selector(self) -> u32 {
        match self {
            Self::Cosine => 0,
            Self::Euclidean => 1,
            Self::DotProduct => 2,
            Self::Manhattan => 3,
        }
    }

    /// Scores one pair with the scalar kernel, higher meaning more similar.
    pub fn score(self, left: &[f32], right: &[f32]) -> f32 {
        self.score_with(Backend::Scalar, left, right)
    }

    /// Distances go through `1 / (1 + d)`; cosine and dot keep their native scale.
    pub fn score_with(self, backend: Backend, left: &[f32], right: &[f32]) -> f32 {
        match (self, backend) {
            (Self::Cosine, Backend::Scalar) => cosine_similarity(left, right),
            (Self::Cosine, Backend::Simd) => cosine_similarity_simd(left, right),
            (Self::DotProduct, Backend::Scalar) => dot_product(left, right),
            (Self::DotProduct, Backend::Simd) => dot_product_simd(left, right),
            (Self::Euclidean, Backend::Scalar) => {
                distance_to_similarity(euclidean_distance(left, right))
            }
            (Self::Euclidean, Backend::Simd) => {
                distance_to_similarity(euclidean_distance_simd(left, right))
            }
            (Self::Manhattan, Backend::Scalar) => {
                distance_to_similarity(manhattan_distance(left, right))
            }
            (Self::Manhattan, Backend::Simd) => {
                distance_to_similarity(manhattan_distance_simd(left, right))
            }
        }
    }
}

/// Maps a distance in `[0, inf]` to a similarity in `[0, 1]`.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Scores `query` against every candidate, writing one value per slot of `output`.
///
/// Shape problems are reported before anything is written. An unknown
/// `metric_selector` fills every slot with `0.0`.
pub fn compute_batch_similarity(
    query: &[f32],
    candidates: &VectorBatch<'_>,
    output: &mut [f32],
    metric_selector: u32,
) -> Result<(), BufferError> {
    BatchScorer::default().score_selector(query, candidates, output, metric_selector)
}

/// Batch engine with a fixed kernel backend.
#[derive(Debug, Clone, Copy)]
pub struct BatchScorer {
    backend: Backend,
    parallel_min_work: usize,
}

impl Default for BatchScorer {
    fn default() -> Self {
        Self::new(Backend::detect())
    }
}

impl BatchScorer {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            parallel_min_work: PARALLEL_MIN_WORK_DEFAULT,
        }
    }

    /// Overrides the work threshold for parallel scoring. `usize::MAX` disables it.
    pub fn with_parallel_min_work(mut self, parallel_min_work: usize) -> Self {
        self.parallel_min_work = parallel_min_work.max(1);
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn score_selector(
        &self,
        query: &[f32],
        candidates: &VectorBatch<'_>,
        output: &mut [f32],
        metric_selector: u32,
    ) -> Result<(), BufferError> {
        match SimilarityMetric::from_selector(metric_selector) {
            Some(metric) => self.score(query, candidates, output, metric),
            None => {
                check_shape(query, candidates, output)?;
                output[..candidates.count()].fill(0.0);
                Ok(())
            }
        }
    }

    pub fn score(
        &self,
        query: &[f32],
        candidates: &VectorBatch<'_>,
        output: &mut [f32],
        metric: SimilarityMetric,
    ) -> Result<(), BufferError> {
        check_shape(query, candidates, output)?;
        let count = candidates.count();
        if count == 0 {
            return Ok(());
        }

        let backend = self.backend;
        let dimension = candidates.dimension();
        let output = &mut output[..count];
        let work = count.saturating_mul(dimension);

        if work >= self.parallel_min_work && rayon::current_num_threads() > 1 {
            output
                .par_iter_mut()
                .zip(candidates.as_slice().par_chunks_exact(dimension))
                .for_each(|(slot, candidate)| {
                    *slot = metric.score_with(backend, query, candidate);
                });
        } else {
            for (slot, candidate) in output.iter_mut().zip(candidates.rows()) {
                *slot = metric.score_with(backend, query, candidate);
            }
        }
        Ok(())
    }
}

fn check_shape(
    query: &[f32],
    candidates: &VectorBatch<'_>,
    output: &[f32],
) -> Result<(), BufferError> {
    if query.len() != candidates.dimension() {
        return Err(BufferError::RowLength {
            expected: candidates.dimension(),
            got: query.len(),
        });
    }
    check_output(output, candidates.count())
}

/// One ranked entry returned by [`top_k`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: f32,
}

/// Returns the `keep` highest scores, best first, ties broken by lower index.
///
/// NaN scores are skipped.
pub fn top_k(scores: &[f32], keep: usize) -> Vec<ScoredIndex> {
    if keep == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(keep.min(scores.len()));
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        let candidate = HeapCandidate { index, score };
        if heap.len() < keep {
            heap.push(candidate);
            continue;
        }
        let should_replace = heap
            .peek()
            .is_some_and(|worst| candidate.cmp(worst).is_lt());
        if should_replace {
            let _ = heap.pop();
            heap.push(candidate);
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|candidate| ScoredIndex {
            index: candidate.index,
            score: candidate.score,
        })
        .collect()
}

// Ordered so that "less" means "ranks higher"; the max-heap top is the worst kept entry.
#[derive(Debug, Clone, Copy)]
struct HeapCandidate {
    index: usize,
    score: f32,
}

impl PartialEq for HeapCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for HeapCandidate {}

impl PartialOrd for HeapCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.index.cmp(&other.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(left: f32, right: f32) {
        assert!((left - right).abs() < 1e-5, "expected {left} ~= {right}");
    }

    fn axis_batch() -> Vec<f32> {
        vec![
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            -1.0, 0.0, 0.0, 0.0,
        ]
    }

    #[test]
    fn cosine_batch_scores_axis_candidates() {
        let data = axis_batch();
        let candidates = VectorBatch::new(&data, 4, 3).expect("shape must be valid");
        let mut output = [f32::NAN; 3];
        compute_batch_similarity(&[1.0, 0.0, 0.0, 0.0], &candidates, &mut output, 0)
            .expect("batch must succeed");
        assert_close(output[0], 1.0);
        assert_close(output[1], 0.0);
        assert_close(output[2], -1.0);
    }

    #[test]
    fn distance_metrics_are_converted_to_similarity() {
        let data = axis_batch();
        let candidates = VectorBatch::new(&data, 4, 3).expect("shape must be valid");
        let query = [1.0, 0.0, 0.0, 0.0];

        let mut euclidean = [0.0; 3];
        compute_batch_similarity(&query, &candidates, &mut euclidean, 1)
            .expect("batch must succeed");
        assert_close(euclidean[0], 1.0);
        assert_close(euclidean[1], 1.0 / (1.0 + 2.0f32.sqrt()));
        assert_close(euclidean[2], 1.0 / 3.0);

        let mut manhattan = [0.0; 3];
        compute_batch_similarity(&query, &candidates, &mut manhattan, 3)
            .expect("batch must succeed");
        assert_close(manhattan[0], 1.0);
        assert_close(manhattan[1], 1.0 / 3.0);
        assert_close(manhattan[2], 1.0 / 3.0);

        let mut dot = [0.0; 3];
        compute_batch_similarity(&query, &candidates, &mut dot, 2).expect("batch must succeed");
        assert_eq!(dot, [1.0, 0.0, -1.0]);
    }

    #[test]
    fn unknown_selector_fills_zeros() {
        let data = axis_batch();
        let candidates = VectorBatch::new(&data, 4, 3).expect("shape must be valid");
        let mut output = [5.0; 3];
        compute_batch_similarity(&[1.0, 0.0, 0.0, 0.0], &candidates, &mut output, 42)
            .expect("unknown selector must not fail");
        assert_eq!(output, [0.0; 3]);
    }

    #[test]
    fn shape_errors_leave_output_untouched() {
        let data = axis_batch();
        let candidates = VectorBatch::new(&data, 4, 3).expect("shape must be valid");

        let mut short = [7.0; 2];
        let error = compute_batch_similarity(&[1.0, 0.0, 0.0, 0.0], &candidates, &mut short, 0)
            .expect_err("must fail");
        assert_eq!(
            error,
            BufferError::OutputTooShort {
                required: 3,
                actual: 2
            }
        );
        assert_eq!(short, [7.0; 2]);

        let mut output = [7.0; 3];
        let error = compute_batch_similarity(&[1.0, 0.0], &candidates, &mut output, 0)
            .expect_err("must fail");
        assert_eq!(
            error,
            BufferError::RowLength {
                expected: 4,
                got: 2
            }
        );
        assert_eq!(output, [7.0; 3]);
    }

    #[test]
    fn backends_and_parallel_path_agree() {
        let dimension = 13;
        let count = 64;
        let data: Vec<f32> = (0..dimension * count)
            .map(|index| ((index * 37 % 101) as f32 / 50.0) - 1.0)
            .collect();
        let candidates = VectorBatch::new(&data, dimension, count).expect("shape must be valid");
        let query: Vec<f32> = (0..dimension).map(|index| index as f32 / 7.0 - 0.9).collect();

        for metric in [
            SimilarityMetric::Cosine,
            SimilarityMetric::Euclidean,
            SimilarityMetric::DotProduct,
            SimilarityMetric::Manhattan,
        ] {
            let mut scalar = vec![0.0; count];
            let mut simd = vec![0.0; count];
            let mut parallel = vec![0.0; count];
            BatchScorer::new(Backend::Scalar)
                .score(&query, &candidates, &mut scalar, metric)
                .expect("scalar batch must succeed");
            BatchScorer::new(Backend::Simd)
                .score(&query, &candidates, &mut simd, metric)
                .expect("simd batch must succeed");
            BatchScorer::new(Backend::Simd)
                .with_parallel_min_work(1)
                .score(&query, &candidates, &mut parallel, metric)
                .expect("parallel batch must succeed");

            for index in 0..count {
                let scale = scalar[index].abs().max(1.0);
                assert!((scalar[index] - simd[index]).abs() / scale < 1e-4);
                assert_eq!(simd[index].to_bits(), parallel[index].to_bits());
            }
        }
    }

    #[test]
    fn metric_selector_roundtrip_and_serde_names() {
        for selector in 0..4 {
            let metric = SimilarityMetric::from_selector(selector).expect("selector must exist");
            assert_eq!(metric.selector(), selector);
        }
        assert!(SimilarityMetric::from_selector(4).is_none());
        let encoded =
            serde_json::to_string(&SimilarityMetric::DotProduct).expect("metric must serialize");
        assert_eq!(encoded, "\"dot_product\"");
    }

    #[test]
    fn top_k_orders_by_score_then_index() {
        let scores = [0.2, 0.9, f32::NAN, 0.9, -1.0, 0.5];
        let ranked = top_k(&scores, 3);
        let indices: Vec<usize> = ranked.iter().map(|entry| entry.index).collect();
        assert_eq!(indices, vec![1, 3, 5]);
        assert!(top_k(&scores, 0).is_empty());
        assert_eq!(top_k(&scores, 10).len(), 5);
    }
}
