use std::error::Error;
use std::fmt;

/// Error type for buffer shape validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Returned when a non-empty batch declares a zero dimension.
    ZeroDimension,
    /// Returned when the backing storage is shorter than `dimension * count`.
    TooShort { required: usize, actual: usize },
    /// Returned when `dimension * count` does not fit in `usize`.
    Overflow,
    /// Returned when a pushed row does not match the batch stride.
    RowLength { expected: usize, got: usize },
    /// Returned when a score buffer cannot hold one value per candidate.
    OutputTooShort { required: usize, actual: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDimension => write!(f, "batch dimension must be > 0"),
            Self::TooShort { required, actual } => {
                write!(
                    f,
                    "batch buffer too short: required={required}, actual={actual}"
                )
            }
            Self::Overflow => write!(f, "batch size overflows usize"),
            Self::RowLength { expected, got } => {
                write!(f, "invalid row length: expected {expected}, got {got}")
            }
            Self::OutputTooShort { required, actual } => {
                write!(
                    f,
                    "score buffer too short: required={required}, actual={actual}"
                )
            }
        }
    }
}

impl Error for BufferError {}

/// Borrowed view over `count` vectors of `dimension` floats stored back to back.
///
/// Row `i` starts at offset `i * dimension`. Shape is checked once at
/// construction; row access afterwards is zero-copy slicing.
#[derive(Debug, Clone, Copy)]
pub struct VectorBatch<'a> {
    data: &'a [f32],
    dimension: usize,
    count: usize,
}

impl<'a> VectorBatch<'a> {
    pub fn new(data: &'a [f32], dimension: usize, count: usize) -> Result<Self, BufferError> {
        let required = required_len(dimension, count)?;
        if data.len() < required {
            return Err(BufferError::TooShort {
                required,
                actual: data.len(),
            });
        }

        Ok(Self {
            data: &data[..required],
            dimension,
            count,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the packed storage, exactly `dimension * count` long.
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Returns candidate `index`, or `None` past the end of the batch.
    pub fn row(&self, index: usize) -> Option<&'a [f32]> {
        if index >= self.count {
            return None;
        }
        let start = index * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &'a [f32]> + 'a {
        let dimension = self.dimension.max(1);
        let count = self.count;
        self.data.chunks_exact(dimension).take(count)
    }
}

/// Owned fixed-stride storage for a growing set of vectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OwnedBatch {
    data: Vec<f32>,
    dimension: usize,
}

impl OwnedBatch {
    pub fn with_capacity(dimension: usize, count: usize) -> Result<Self, BufferError> {
        if dimension == 0 {
            return Err(BufferError::ZeroDimension);
        }
        let capacity = required_len(dimension, count)?;
        Ok(Self {
            data: Vec::with_capacity(capacity),
            dimension,
        })
    }

    /// Packs `rows` into one contiguous buffer, rejecting any row of the wrong length.
    pub fn from_rows<R: AsRef<[f32]>>(dimension: usize, rows: &[R]) -> Result<Self, BufferError> {
        let mut batch = Self::with_capacity(dimension, rows.len())?;
        for row in rows {
            batch.push(row.as_ref())?;
        }
        Ok(batch)
    }

    pub fn push(&mut self, row: &[f32]) -> Result<(), BufferError> {
        if row.len() != self.dimension {
            return Err(BufferError::RowLength {
                expected: self.dimension,
                got: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        let start = index.checked_mul(self.dimension)?;
        self.data.get_mut(start..start + self.dimension)
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.data.chunks_exact_mut(self.dimension.max(1))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_batch(&self) -> VectorBatch<'_> {
        VectorBatch {
            data: &self.data,
            dimension: self.dimension,
            count: self.len(),
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Checks that a caller-allocated score buffer has one slot per candidate.
pub fn check_output(output: &[f32], count: usize) -> Result<(), BufferError> {
    if output.len() < count {
        return Err(BufferError::OutputTooShort {
            required: count,
            actual: output.len(),
        });
    }
    Ok(())
}

fn required_len(dimension: usize, count: usize) -> Result<usize, BufferError> {
    if dimension == 0 && count > 0 {
        return Err(BufferError::ZeroDimension);
    }
    dimension.checked_mul(count).ok_or(BufferError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_view_slices_rows_by_stride() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let batch = VectorBatch::new(&data, 2, 3).expect("shape must be valid");
        assert_eq!(batch.row(0), Some(&[1.0, 2.0][..]));
        assert_eq!(batch.row(2), Some(&[5.0, 6.0][..]));
        assert_eq!(batch.row(3), None);
        assert_eq!(batch.rows().count(), 3);
    }

    #[test]
    fn batch_view_ignores_trailing_storage() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let batch = VectorBatch::new(&data, 2, 2).expect("shape must be valid");
        assert_eq!(batch.as_slice().len(), 4);
        assert_eq!(batch.rows().count(), 2);
    }

    #[test]
    fn batch_view_rejects_short_buffer() {
        let data = [1.0, 2.0, 3.0];
        let error = VectorBatch::new(&data, 2, 2).expect_err("must fail");
        assert_eq!(
            error,
            BufferError::TooShort {
                required: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn batch_view_rejects_zero_dimension_and_overflow() {
        assert_eq!(
            VectorBatch::new(&[], 0, 1).expect_err("must fail"),
            BufferError::ZeroDimension
        );
        assert_eq!(
            VectorBatch::new(&[], usize::MAX, 2).expect_err("must fail"),
            BufferError::Overflow
        );
    }

    #[test]
    fn empty_batch_is_allowed() {
        let batch = VectorBatch::new(&[], 4, 0).expect("empty batch must be valid");
        assert!(batch.is_empty());
        assert_eq!(batch.rows().count(), 0);
    }

    #[test]
    fn owned_batch_push_enforces_stride() {
        let mut batch = OwnedBatch::with_capacity(3, 2).expect("capacity must be valid");
        batch.push(&[1.0, 2.0, 3.0]).expect("row must fit");
        let error = batch.push(&[1.0]).expect_err("must fail");
        assert_eq!(
            error,
            BufferError::RowLength {
                expected: 3,
                got: 1
            }
        );
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.as_batch().count(), 1);
    }

    #[test]
    fn owned_batch_rows_are_mutable_in_place() {
        let mut batch =
            OwnedBatch::from_rows(2, &[vec![1.0, 1.0], vec![2.0, 2.0]]).expect("rows must fit");
        if let Some(row) = batch.row_mut(1) {
            row[0] = 9.0;
        }
        assert_eq!(batch.as_slice(), &[1.0, 1.0, 9.0, 2.0]);
        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn check_output_requires_one_slot_per_candidate() {
        assert!(check_output(&[0.0; 3], 3).is_ok());
        assert_eq!(
            check_output(&[0.0; 2], 3).expect_err("must fail"),
            BufferError::OutputTooShort {
                required: 3,
                actual: 2
            }
        );
    }
}
