//! L2 distance kernels
//!
//! Scalar kernels written as chunked iterator folds that LLVM
//! auto-vectorizes with `-C target-cpu=native`, plus rayon-parallel helpers
//! for whole-batch computations. Distance rows are embarrassingly parallel;
//! the greedy selection loop that consumes them is not, so parallelism
//! lives here and nowhere else in the sampler.

use rayon::prelude::*;

use crate::batch::FeatureBatch;

/// Squared L2 distance between two equal-length vectors.
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// True (non-squared) L2 distance between two equal-length vectors.
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// Full pairwise true-Euclidean distance matrix between the rows of `a`
/// and the rows of `b`, flattened row-major as `a.rows() x b.rows()`.
///
/// Rows are computed in parallel. O(a.rows * b.rows) memory; callers are
/// responsible for budgeting the allocation.
pub fn pairwise(a: &FeatureBatch, b: &FeatureBatch) -> Vec<f32> {
    debug_assert_eq!(a.dim(), b.dim());
    let cols = b.rows();
    let mut out = vec![0.0f32; a.rows() * cols];
    out.par_chunks_mut(cols.max(1))
        .enumerate()
        .for_each(|(i, row_out)| {
            let row = a.row(i);
            for (j, cell) in row_out.iter_mut().enumerate() {
                *cell = l2_distance(row, b.row(j));
            }
        });
    out
}

/// True-Euclidean distance from every row of `batch` to a single `target`
/// vector, computed in parallel.
pub fn distances_to_row(batch: &FeatureBatch, target: &[f32]) -> Vec<f32> {
    debug_assert_eq!(batch.dim(), target.len());
    (0..batch.rows())
        .into_par_iter()
        .map(|i| l2_distance(batch.row(i), target))
        .collect()
}
