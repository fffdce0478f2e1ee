//! Nearest-neighbor index
//!
//! [`NearestNeighborIndex`] wraps one exact flat (brute-force) search
//! structure behind a fit / query / save / load / reset lifecycle.
//! [`IndexKind`] is the seam where approximate structures would plug in;
//! only the flat backend exists today.
//!
//! Distances returned by queries are **squared** Euclidean, sorted
//! ascending per query row. Squared L2 preserves neighbor ordering and
//! skips the square root on the hot path; downstream scores stay
//! non-negative and monotone in embedding distance.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use rayon::prelude::*;
use thiserror::Error;

use crate::batch::FeatureBatch;
use crate::distance::l2_distance_squared;
use crate::format::{self, FormatError};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index has not been fitted; call fit or load first")]
    NotFitted,

    #[error("Dimension mismatch: index holds {expected}-dim vectors, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid k={k}: index holds {count} vectors")]
    InvalidK { k: usize, count: usize },

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

/// Search backend selector. Flat is exact brute force; approximate
/// backends would be added here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum IndexKind {
    #[default]
    Flat,
}

/// Index configuration.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub kind: IndexKind,

    /// Worker threads for query parallelism; 0 uses the global rayon pool.
    pub num_threads: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::Flat,
            num_threads: 0,
        }
    }
}

/// k-NN query result: flat `M x k` buffers of squared distances and
/// neighbor indices, ascending by distance within each row.
#[derive(Debug, Clone)]
pub struct Neighbors {
    pub distances: Vec<f32>,
    pub indices: Vec<usize>,
    pub k: usize,
}

impl Neighbors {
    pub fn rows(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.distances.len() / self.k
        }
    }

    pub fn distances_row(&self, row: usize) -> &[f32] {
        &self.distances[row * self.k..(row + 1) * self.k]
    }

    pub fn indices_row(&self, row: usize) -> &[usize] {
        &self.indices[row * self.k..(row + 1) * self.k]
    }
}

/// Max-heap entry so the heap root is always the worst of the current
/// top-k candidates.
#[derive(Clone, Copy)]
struct Candidate {
    index: usize,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Exact brute-force search over an owned bank of vectors.
struct FlatIndex {
    vectors: FeatureBatch,
}

impl FlatIndex {
    fn fit(vectors: FeatureBatch) -> Self {
        let mut index = Self { vectors };
        index.train();
        index
    }

    /// Training hook; a no-op for flat search, kept so approximate
    /// backends can share the fit lifecycle.
    fn train(&mut self) {}

    fn search(&self, queries: &FeatureBatch, k: usize) -> Result<Neighbors, IndexError> {
        let count = self.vectors.rows();
        if queries.dim() != self.vectors.dim() {
            return Err(IndexError::DimensionMismatch {
                expected: self.vectors.dim(),
                actual: queries.dim(),
            });
        }
        if k == 0 || k > count {
            return Err(IndexError::InvalidK { k, count });
        }

        let per_row: Vec<(Vec<f32>, Vec<usize>)> = (0..queries.rows())
            .into_par_iter()
            .map(|qi| {
                let query = queries.row(qi);
                let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
                for (i, row) in self.vectors.iter_rows().enumerate() {
                    let distance = l2_distance_squared(query, row);
                    if heap.len() < k {
                        heap.push(Candidate { index: i, distance });
                    } else if distance < heap.peek().map(|c| c.distance).unwrap_or(f32::MAX) {
                        heap.pop();
                        heap.push(Candidate { index: i, distance });
                    }
                }
                let mut best = heap.into_sorted_vec();
                best.truncate(k);
                (
                    best.iter().map(|c| c.distance).collect(),
                    best.iter().map(|c| c.index).collect(),
                )
            })
            .collect();

        let mut distances = Vec::with_capacity(queries.rows() * k);
        let mut indices = Vec::with_capacity(queries.rows() * k);
        for (d, i) in per_row {
            distances.extend(d);
            indices.extend(i);
        }
        Ok(Neighbors {
            distances,
            indices,
            k,
        })
    }
}

/// Nearest-neighbor index with an explicit fit / query / persist / reset
/// lifecycle. Owns at most one fitted backend; `fit` and `load` replace it
/// wholesale.
pub struct NearestNeighborIndex {
    config: IndexConfig,
    pool: Option<rayon::ThreadPool>,
    index: Option<FlatIndex>,
}

impl NearestNeighborIndex {
    pub fn new(config: IndexConfig) -> Result<Self, IndexError> {
        let pool = if config.num_threads > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.num_threads)
                    .build()
                    .map_err(|e| IndexError::ThreadPool(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            config,
            pool,
            index: None,
        })
    }

    /// Build a fresh index over `vectors`, discarding any prior index.
    pub fn fit(&mut self, vectors: &FeatureBatch) -> Result<(), IndexError> {
        match self.config.kind {
            IndexKind::Flat => {
                self.index = Some(FlatIndex::fit(vectors.clone()));
            }
        }
        tracing::debug!(
            rows = vectors.rows(),
            dim = vectors.dim(),
            "fitted flat index"
        );
        Ok(())
    }

    /// k-NN search against the fitted index, or against a one-off index
    /// over `index_override` (leaving the fitted index untouched).
    pub fn query(
        &self,
        queries: &FeatureBatch,
        k: usize,
        index_override: Option<&FeatureBatch>,
    ) -> Result<Neighbors, IndexError> {
        let run = |index: &FlatIndex| match &self.pool {
            Some(pool) => pool.install(|| index.search(queries, k)),
            None => index.search(queries, k),
        };

        match index_override {
            Some(vectors) => {
                let one_off = FlatIndex::fit(vectors.clone());
                run(&one_off)
            }
            None => {
                let index = self.index.as_ref().ok_or(IndexError::NotFitted)?;
                run(index)
            }
        }
    }

    /// Serialize the fitted bank to a single .pbank artifact.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), IndexError> {
        let index = self.index.as_ref().ok_or(IndexError::NotFitted)?;
        format::write_bank(path, &index.vectors)?;
        Ok(())
    }

    /// Load an artifact, fully replacing any in-memory index.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), IndexError> {
        let vectors = format::read_bank(path)?;
        tracing::debug!(
            rows = vectors.rows(),
            dim = vectors.dim(),
            "loaded index bank"
        );
        self.index = Some(FlatIndex::fit(vectors));
        Ok(())
    }

    /// Release the index and return to the pre-fit state. Idempotent.
    pub fn reset(&mut self) {
        self.index = None;
    }

    pub fn is_fitted(&self) -> bool {
        self.index.is_some()
    }

    /// Number of indexed vectors, if fitted.
    pub fn len(&self) -> Option<usize> {
        self.index.as_ref().map(|i| i.vectors.rows())
    }

    /// Dimension of indexed vectors, if fitted.
    pub fn dim(&self) -> Option<usize> {
        self.index.as_ref().map(|i| i.vectors.dim())
    }
}
