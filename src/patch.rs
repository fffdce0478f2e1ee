//! Patch-grid reshaping and score reduction
//!
//! Per-patch distances come back from the index as one flat vector per
//! image. [`reshape_to_grid`] folds that vector back into the spatial
//! patch grid; [`reduce_to_scalar`] collapses a multi-axis score tensor to
//! one scalar per sample for image-level decisions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReshapeError {
    #[error("Shape mismatch: {len} scores cannot fill a {rows}x{cols} grid")]
    ShapeMismatch {
        len: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Tensor data length {len} does not match shape {shape:?}")]
    TensorShape { len: usize, shape: Vec<usize> },
}

/// Spatial patch-grid geometry of one image: (rows, cols).
///
/// Captured at bank-construction time from the observed feature geometry
/// and persisted alongside the index so a reloaded bank can reshape
/// without the caller resupplying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchShape {
    pub rows: usize,
    pub cols: usize,
}

impl PatchShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 2-D anomaly map aligned to the image's patch grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMap {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl ScoreMap {
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Score at grid position (row, col).
    ///
    /// # Panics
    ///
    /// Panics when out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        assert!(row < self.rows && col < self.cols);
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Back to the flat row-major vector.
    pub fn flatten(self) -> Vec<f32> {
        self.data
    }
}

/// Reshape a flat score vector into its spatial grid. Requires the exact
/// length `rows * cols`.
pub fn reshape_to_grid(scores: &[f32], shape: PatchShape) -> Result<ScoreMap, ReshapeError> {
    if scores.len() != shape.len() {
        return Err(ReshapeError::ShapeMismatch {
            len: scores.len(),
            rows: shape.rows,
            cols: shape.cols,
        });
    }
    Ok(ScoreMap {
        data: scores.to_vec(),
        rows: shape.rows,
        cols: shape.cols,
    })
}

/// Multi-axis score tensor; first axis is the sample axis.
#[derive(Debug, Clone)]
pub struct ScoreTensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl ScoreTensor {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self, ReshapeError> {
        let expected: usize = shape.iter().product();
        if shape.is_empty() || data.len() != expected {
            return Err(ReshapeError::TensorShape {
                len: data.len(),
                shape,
            });
        }
        Ok(Self { data, shape })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

/// Reduce a score tensor to one scalar per sample.
///
/// The last axis is max-reduced until at most two axes remain; a remaining
/// 2-D tensor is then reduced per row by the mean of its `top_k` largest
/// values when `top_k > 1` (clamped to the row length), or by the row max
/// otherwise. A 1-D input is returned as-is.
pub fn reduce_to_scalar(tensor: &ScoreTensor, top_k: usize) -> Vec<f32> {
    let mut data = tensor.data.clone();
    let mut shape = tensor.shape.clone();

    while shape.len() > 2 {
        let last = shape.pop().unwrap_or(1).max(1);
        data = data
            .chunks_exact(last)
            .map(|chunk| chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .collect();
    }

    if shape.len() == 1 {
        return data;
    }

    let row_len = shape[1].max(1);
    data.chunks_exact(row_len)
        .map(|row| {
            if top_k > 1 {
                let k = top_k.min(row.len());
                let mut sorted = row.to_vec();
                sorted.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
                sorted[..k].iter().sum::<f32>() / k as f32
            } else {
                row.iter().copied().fold(f32::NEG_INFINITY, f32::max)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reshape_roundtrip() {
        let scores: Vec<f32> = (0..6).map(|v| v as f32).collect();
        let map = reshape_to_grid(&scores, PatchShape::new(2, 3)).unwrap();
        assert_eq!(map.get(0, 2), 2.0);
        assert_eq!(map.get(1, 0), 3.0);
        assert_eq!(map.flatten(), scores);
    }

    #[test]
    fn test_reshape_shape_mismatch() {
        let scores = vec![1.0; 5];
        assert!(matches!(
            reshape_to_grid(&scores, PatchShape::new(2, 3)),
            Err(ReshapeError::ShapeMismatch {
                len: 5,
                rows: 2,
                cols: 3
            })
        ));
    }

    #[test]
    fn test_reduce_constant_tensor() {
        // Max through two trailing axes is a no-op on a constant tensor.
        let tensor = ScoreTensor::new(vec![7.5; 24], vec![2, 3, 4]).unwrap();
        assert_eq!(reduce_to_scalar(&tensor, 0), vec![7.5, 7.5]);
    }

    #[test]
    fn test_reduce_max_per_row() {
        let tensor = ScoreTensor::new(vec![1.0, 5.0, 3.0, 2.0, 0.0, 4.0], vec![2, 3]).unwrap();
        assert_eq!(reduce_to_scalar(&tensor, 0), vec![5.0, 4.0]);
    }

    #[test]
    fn test_reduce_topk_mean() {
        let tensor = ScoreTensor::new(vec![1.0, 5.0, 3.0, 2.0, 0.0, 4.0], vec![2, 3]).unwrap();
        // top-2 means: (5+3)/2 and (4+2)/2
        assert_eq!(reduce_to_scalar(&tensor, 2), vec![4.0, 3.0]);
    }

    #[test]
    fn test_reduce_3d_takes_last_axis_max_first() {
        // [1, 2, 2]: rows after reduction are [max(1,9), max(2,3)] = [9, 3]
        let tensor = ScoreTensor::new(vec![1.0, 9.0, 2.0, 3.0], vec![1, 2, 2]).unwrap();
        assert_eq!(reduce_to_scalar(&tensor, 0), vec![9.0]);
    }

    #[test]
    fn test_reduce_1d_passthrough() {
        let tensor = ScoreTensor::new(vec![0.5, 0.25], vec![2]).unwrap();
        assert_eq!(reduce_to_scalar(&tensor, 0), vec![0.5, 0.25]);
    }

    #[test]
    fn test_tensor_shape_validation() {
        assert!(matches!(
            ScoreTensor::new(vec![1.0; 5], vec![2, 3]),
            Err(ReshapeError::TensorShape { .. })
        ));
    }

    #[test]
    fn test_patch_shape_serde() {
        let shape = PatchShape::new(36, 36);
        let json = serde_json::to_string(&shape).unwrap();
        let back: PatchShape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shape);
    }
}
