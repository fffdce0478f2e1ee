//! Feature merging
//!
//! A feature extractor typically emits several feature maps per image (one
//! per backbone stage). The merger reduces each map's trailing shape to a
//! flat vector and concatenates the maps along the feature axis, so every
//! sample ends up as one flat vector. Row order and row count are preserved
//! across all groups; a pure transform with no side effects.

use thiserror::Error;

use crate::batch::{FeatureBatch, FeatureTensor};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Cannot merge an empty list of feature groups")]
    NoGroups,

    #[error("Row count mismatch between feature groups: expected {expected}, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },
}

/// Concatenating feature merger.
///
/// `[N, c1, h, w]`, `[N, c2]`, ... become one `N x (c1*h*w + c2 + ...)`
/// batch.
pub struct ConcatMerger;

impl ConcatMerger {
    /// Flatten each group row-major and concatenate along the feature axis.
    ///
    /// Fails if any group reports a different row count than the first.
    pub fn merge(groups: Vec<FeatureTensor>) -> Result<FeatureBatch, MergeError> {
        if groups.is_empty() {
            return Err(MergeError::NoGroups);
        }

        let flattened: Vec<FeatureBatch> =
            groups.into_iter().map(FeatureTensor::flatten_rows).collect();

        let rows = flattened[0].rows();
        for group in &flattened {
            if group.rows() != rows {
                return Err(MergeError::RowCountMismatch {
                    expected: rows,
                    actual: group.rows(),
                });
            }
        }

        let total_dim: usize = flattened.iter().map(|g| g.dim()).sum();
        let mut data = Vec::with_capacity(rows * total_dim);
        for i in 0..rows {
            for group in &flattened {
                data.extend_from_slice(group.row(i));
            }
        }

        Ok(FeatureBatch::from_parts(data, rows, total_dim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_single_group_flattens() {
        // [2, 2, 2] -> 2 x 4
        let t = FeatureTensor::new((0..8).map(|v| v as f32).collect(), vec![2, 2, 2]).unwrap();
        let merged = ConcatMerger::merge(vec![t]).unwrap();
        assert_eq!(merged.rows(), 2);
        assert_eq!(merged.dim(), 4);
        assert_eq!(merged.row(1), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_merge_concatenates_along_feature_axis() {
        let a = FeatureTensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let b = FeatureTensor::new(vec![10.0, 20.0], vec![2, 1]).unwrap();
        let merged = ConcatMerger::merge(vec![a, b]).unwrap();
        assert_eq!(merged.rows(), 2);
        assert_eq!(merged.dim(), 3);
        assert_eq!(merged.row(0), &[1.0, 2.0, 10.0]);
        assert_eq!(merged.row(1), &[3.0, 4.0, 20.0]);
    }

    #[test]
    fn test_merge_row_count_mismatch() {
        let a = FeatureTensor::new(vec![1.0, 2.0], vec![2, 1]).unwrap();
        let b = FeatureTensor::new(vec![1.0, 2.0, 3.0], vec![3, 1]).unwrap();
        let result = ConcatMerger::merge(vec![a, b]);
        assert!(matches!(
            result,
            Err(MergeError::RowCountMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_merge_empty_list() {
        assert!(matches!(
            ConcatMerger::merge(vec![]),
            Err(MergeError::NoGroups)
        ));
    }
}
