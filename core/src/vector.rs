use std::error::Error;
use std::fmt;

/// Norm threshold under which a vector is treated as zero.
pub const ZERO_NORM_EPSILON: f32 = 1e-12;

/// Identifies which input vector triggered a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSide {
    Left,
    Right,
}

/// Runtime validation options for the checked vector operations.
#[derive(Debug, Clone, Copy)]
pub struct VectorValidationOptions {
    /// When true, NaN and +/-Inf values are rejected.
    pub strict_finite: bool,
}

impl Default for VectorValidationOptions {
    fn default() -> Self {
        Self::strict()
    }
}

impl VectorValidationOptions {
    /// Returns strict production-safe defaults.
    pub const fn strict() -> Self {
        Self {
            strict_finite: true,
        }
    }

    /// Returns permissive options that allow non-finite values.
    pub const fn permissive() -> Self {
        Self {
            strict_finite: false,
        }
    }
}

/// Error type for the checked vector operations.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorError {
    /// Returned when vectors do not share the same dimension.
    DimensionMismatch { left: usize, right: usize },
    /// Returned when one or both vectors are empty.
    EmptyVector,
    /// Returned when strict mode rejects NaN or Infinity values.
    NonFinite {
        side: VectorSide,
        index: usize,
        value: f32,
    },
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { left, right } => {
                write!(f, "dimension mismatch: left={}, right={}", left, right)
            }
            Self::EmptyVector => write!(f, "vector is empty"),
            Self::NonFinite { side, index, value } => {
                let side = match side {
                    VectorSide::Left => "left",
                    VectorSide::Right => "right",
                };
                write!(
                    f,
                    "non-finite value in {side} vector at index {index}: {value}"
                )
            }
        }
    }
}

impl Error for VectorError {}

/// Validates a vector pair before it is handed to the sentinel kernel.
pub fn validate_vectors(
    left: &[f32],
    right: &[f32],
    options: VectorValidationOptions,
) -> Result<(), VectorError> {
    if left.is_empty() || right.is_empty() {
        return Err(VectorError::EmptyVector);
    }
    if left.len() != right.len() {
        return Err(VectorError::DimensionMismatch {
            left: left.len(),
            right: right.len(),
        });
    }

    if options.strict_finite {
        check_finite(left, VectorSide::Left)?;
        check_finite(right, VectorSide::Right)?;
    }

    Ok(())
}

fn check_finite(values: &[f32], side: VectorSide) -> Result<(), VectorError> {
    match values
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        Some((index, value)) => Err(VectorError::NonFinite { side, index, value }),
        None => Ok(()),
    }
}

// The sentinel kernel below never fails. Both slices must have the same
// length; release builds compute over the common prefix.

/// Computes `dot / (|left| * |right|)`.
///
/// Returns `0.0` for empty input or when either norm is below
/// [`ZERO_NORM_EPSILON`].
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let (dot, left_sq_sum, right_sq_sum) = dot_and_norms(left, right);
    cosine_from_parts(dot, left_sq_sum, right_sq_sum)
}

pub(crate) fn cosine_from_parts(dot: f32, left_sq_sum: f32, right_sq_sum: f32) -> f32 {
    let left_norm = left_sq_sum.sqrt();
    let right_norm = right_sq_sum.sqrt();
    if left_norm < ZERO_NORM_EPSILON || right_norm < ZERO_NORM_EPSILON {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

/// Computes the Euclidean (L2) distance. Empty input is `+inf`.
pub fn euclidean_distance(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    if left.is_empty() || right.is_empty() {
        return f32::INFINITY;
    }

    left.iter()
        .zip(right)
        .map(|(left_value, right_value)| {
            let delta = left_value - right_value;
            delta * delta
        })
        .sum::<f32>()
        .sqrt()
}

/// Computes the dot product. Empty input is `0.0`.
pub fn dot_product(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right)
        .map(|(left_value, right_value)| left_value * right_value)
        .sum()
}

/// Computes the Manhattan (L1) distance. Empty input is `+inf`.
pub fn manhattan_distance(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    if left.is_empty() || right.is_empty() {
        return f32::INFINITY;
    }

    left.iter()
        .zip(right)
        .map(|(left_value, right_value)| (left_value - right_value).abs())
        .sum()
}

/// Computes the L2 norm of a single vector.
pub fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|value| value * value).sum::<f32>().sqrt()
}

pub(crate) fn dot_and_norms(left: &[f32], right: &[f32]) -> (f32, f32, f32) {
    left.iter().zip(right).fold(
        (0.0f32, 0.0f32, 0.0f32),
        |(dot, left_sq, right_sq), (left_value, right_value)| {
            (
                dot + left_value * right_value,
                left_sq + left_value * left_value,
                right_sq + right_value * right_value,
            )
        },
    )
}

/// Computes cosine similarity after validating both inputs.
pub fn cosine_similarity_checked(
    left: &[f32],
    right: &[f32],
    options: VectorValidationOptions,
) -> Result<f32, VectorError> {
    validate_vectors(left, right, options)?;
    Ok(cosine_similarity(left, right))
}

/// Computes the Euclidean distance after validating both inputs.
pub fn euclidean_distance_checked(
    left: &[f32],
    right: &[f32],
    options: VectorValidationOptions,
) -> Result<f32, VectorError> {
    validate_vectors(left, right, options)?;
    Ok(euclidean_distance(left, right))
}

/// Computes the dot product after validating both inputs.
pub fn dot_product_checked(
    left: &[f32],
    right: &[f32],
    options: VectorValidationOptions,
) -> Result<f32, VectorError> {
    validate_vectors(left, right, options)?;
    Ok(dot_product(left, right))
}

/// Computes the Manhattan distance after validating both inputs.
pub fn manhattan_distance_checked(
    left: &[f32],
    right: &[f32],
    options: VectorValidationOptions,
) -> Result<f32, VectorError> {
    validate_vectors(left, right, options)?;
    Ok(manhattan_distance(left, right))
}
