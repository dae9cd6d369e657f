use crate::buffer::OwnedBatch;
use crate::vector::{l2_norm, ZERO_NORM_EPSILON};

/// Variance floor used by [`z_score_normalize`].
pub const VARIANCE_EPSILON: f32 = 1e-8;

/// Scales `values` to unit L2 length in place.
///
/// A vector whose norm is below [`ZERO_NORM_EPSILON`] is left unchanged.
pub fn normalize(values: &mut [f32]) {
    let norm = l2_norm(values);
    if norm < ZERO_NORM_EPSILON {
        return;
    }
    for value in values.iter_mut() {
        *value /= norm;
    }
}

/// Replaces each element with `tanh(0.5 * (x - mean) / std_dev)` in place.
///
/// Uses the population standard deviation with [`VARIANCE_EPSILON`] added to
/// the variance, so a constant vector maps to all zeros. Output lies in `(-1, 1)`.
pub fn z_score_normalize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }

    let count = values.len() as f32;
    let mean = values.iter().sum::<f32>() / count;
    let variance = values
        .iter()
        .map(|value| {
            let delta = value - mean;
            delta * delta
        })
        .sum::<f32>()
        / count;
    let std_dev = (variance + VARIANCE_EPSILON).sqrt();

    for value in values.iter_mut() {
        *value = (0.5 * (*value - mean) / std_dev).tanh();
    }
}

/// Applies [`normalize`] to every row of `batch`.
pub fn normalize_rows(batch: &mut OwnedBatch) {
    for row in batch.rows_mut() {
        normalize(row);
    }
}
