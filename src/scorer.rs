//! Nearest-neighbor anomaly scorer
//!
//! Glues the merger and the index together: `fit` merges reference feature
//! groups into the memory bank and indexes them; `predict` merges query
//! groups, finds each sample's k nearest bank entries, and scores the
//! sample as the mean of those (squared) distances.

use std::path::Path;

use thiserror::Error;

use crate::batch::{FeatureBatch, FeatureTensor};
use crate::format::{self, FormatError};
use crate::index::{IndexError, Neighbors, NearestNeighborIndex};
use crate::merge::{ConcatMerger, MergeError};

/// Stable artifact names inside a save directory.
const INDEX_FILE: &str = "nnscorer_index.pbank";
const FEATURES_FILE: &str = "nnscorer_features.pbank";

#[derive(Error, Debug)]
pub enum ScorerError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

pub struct NearestNeighborScorer {
    n_neighbors: usize,
    index: NearestNeighborIndex,
    bank: Option<FeatureBatch>,
}

impl NearestNeighborScorer {
    /// `n_neighbors` is the k used at predict time (1 in the usual
    /// anomaly-scoring configuration). A zero k is not corrected here; it
    /// surfaces at predict time as [`IndexError::InvalidK`].
    pub fn new(n_neighbors: usize, index: NearestNeighborIndex) -> Self {
        Self {
            n_neighbors,
            index,
            bank: None,
        }
    }

    /// Merge reference feature groups, retain the merged bank, and fit the
    /// index on it.
    pub fn fit(&mut self, groups: Vec<FeatureTensor>) -> Result<(), ScorerError> {
        let merged = ConcatMerger::merge(groups)?;
        self.index.fit(&merged)?;
        self.bank = Some(merged);
        Ok(())
    }

    /// Score query feature groups against the bank.
    ///
    /// Returns per-sample scores (mean of the k nearest squared distances,
    /// in input order) along with the raw distances and neighbor indices.
    pub fn predict(&self, groups: Vec<FeatureTensor>) -> Result<(Vec<f32>, Neighbors), ScorerError> {
        let queries = ConcatMerger::merge(groups)?;
        let neighbors = self.index.query(&queries, self.n_neighbors, None)?;

        let scores = (0..neighbors.rows())
            .map(|i| {
                let row = neighbors.distances_row(i);
                row.iter().sum::<f32>() / row.len() as f32
            })
            .collect();
        Ok((scores, neighbors))
    }

    /// Persist the index artifact into `dir`; when `save_features` is set,
    /// also write the raw merged bank as a separate artifact for
    /// inspection.
    pub fn save<P: AsRef<Path>>(&self, dir: P, save_features: bool) -> Result<(), ScorerError> {
        let dir = dir.as_ref();
        self.index.save(dir.join(INDEX_FILE))?;
        if save_features {
            if let Some(bank) = &self.bank {
                format::write_bank(dir.join(FEATURES_FILE), bank)?;
            }
        }
        Ok(())
    }

    /// Save, then release index resources.
    pub fn save_and_reset<P: AsRef<Path>>(&mut self, dir: P) -> Result<(), ScorerError> {
        self.save(dir, false)?;
        self.reset();
        Ok(())
    }

    /// Restore the index from `dir`, and the raw bank too when its
    /// artifact exists.
    pub fn load<P: AsRef<Path>>(&mut self, dir: P) -> Result<(), ScorerError> {
        let dir = dir.as_ref();
        self.index.load(dir.join(INDEX_FILE))?;
        let features_path = dir.join(FEATURES_FILE);
        if features_path.exists() {
            self.bank = Some(format::read_bank(features_path)?);
        }
        Ok(())
    }

    /// Release the index and drop the retained bank.
    pub fn reset(&mut self) {
        self.index.reset();
        self.bank = None;
    }

    pub fn is_fitted(&self) -> bool {
        self.index.is_fitted()
    }

    /// The merged reference bank, when held in memory.
    pub fn bank(&self) -> Option<&FeatureBatch> {
        self.bank.as_ref()
    }
}
