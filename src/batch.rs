//! Feature containers
//!
//! All numeric data in the crate flows through two containers:
//!
//! - [`FeatureBatch`]: the canonical row-major `N x D` matrix of feature
//!   vectors. Every component (sampler, index, scorer) operates on this.
//! - [`FeatureTensor`]: a raw feature map `[N, d1, d2, ...]` as produced by
//!   an external feature extractor, before its trailing shape is flattened.
//!
//! Row order is significant everywhere: rows map 1:1 to spatial patch
//! positions within an image when flattened row-major.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Data length mismatch: {len} elements cannot form {rows} rows of dimension {dim}")]
    LengthMismatch { len: usize, rows: usize, dim: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Tensor shape must have at least one axis")]
    EmptyShape,

    #[error("Cannot concatenate an empty list of batches")]
    NoBatches,
}

/// Row-major `N x D` matrix of feature vectors.
///
/// Immutable once constructed; samplers and indexes never mutate their
/// input batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    data: Vec<f32>,
    rows: usize,
    dim: usize,
}

impl FeatureBatch {
    /// Create a batch from a flat row-major buffer.
    pub fn new(data: Vec<f32>, rows: usize, dim: usize) -> Result<Self, BatchError> {
        if data.len() != rows * dim {
            return Err(BatchError::LengthMismatch {
                len: data.len(),
                rows,
                dim,
            });
        }
        Ok(Self { data, rows, dim })
    }

    /// Internal constructor for buffers whose size is correct by
    /// construction.
    pub(crate) fn from_parts(data: Vec<f32>, rows: usize, dim: usize) -> Self {
        debug_assert_eq!(data.len(), rows * dim);
        Self { data, rows, dim }
    }

    /// Create a batch from per-row vectors. All rows must share one length.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, BatchError> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(BatchError::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            dim,
        })
    }

    /// Concatenate batches along the row axis, preserving order.
    pub fn concat(parts: &[FeatureBatch]) -> Result<Self, BatchError> {
        let first = parts.first().ok_or(BatchError::NoBatches)?;
        let dim = first.dim;
        let total_rows: usize = parts.iter().map(|p| p.rows).sum();
        let mut data = Vec::with_capacity(total_rows * dim);
        for part in parts {
            if part.dim != dim {
                return Err(BatchError::DimensionMismatch {
                    expected: dim,
                    actual: part.dim,
                });
            }
            data.extend_from_slice(&part.data);
        }
        Ok(Self {
            data,
            rows: total_rows,
            dim,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow one row as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `index >= rows`.
    #[inline]
    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    /// The flat row-major buffer.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim.max(1))
    }

    /// Gather the given rows into a new batch, in the order given.
    pub fn select(&self, indices: &[usize]) -> FeatureBatch {
        let mut data = Vec::with_capacity(indices.len() * self.dim);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        FeatureBatch {
            data,
            rows: indices.len(),
            dim: self.dim,
        }
    }

    /// Reinterpret as a rank-2 [`FeatureTensor`].
    pub fn into_tensor(self) -> FeatureTensor {
        FeatureTensor {
            shape: vec![self.rows, self.dim],
            data: self.data,
        }
    }
}

/// Raw feature map `[N, d1, d2, ...]` from an external feature producer.
///
/// The first axis is the sample axis; the trailing shape is arbitrary and
/// gets flattened row-major before indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl FeatureTensor {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, BatchError> {
        if shape.is_empty() {
            return Err(BatchError::EmptyShape);
        }
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(BatchError::LengthMismatch {
                len: data.len(),
                rows: shape[0],
                dim: expected / shape[0].max(1),
            });
        }
        Ok(Self { data, shape })
    }

    /// Number of samples (size of the first axis).
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flatten the trailing shape row-major: `[N, d1, d2, ...]` becomes
    /// `N x (d1*d2*...)`. The buffer is already row-major, so this is a
    /// reinterpretation, not a data movement.
    pub fn flatten_rows(self) -> FeatureBatch {
        let rows = self.shape[0];
        let dim: usize = self.shape[1..].iter().product();
        FeatureBatch {
            data: self.data,
            rows,
            dim,
        }
    }
}
