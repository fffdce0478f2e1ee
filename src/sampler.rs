//! Greedy coreset sampling
//!
//! Selects a representative subset of feature rows under a percentage
//! budget by farthest-point (greedy k-center) selection: repeatedly pick
//! the row farthest from everything selected so far, then shrink every
//! row's distance-to-selected-set by element-wise minimum against the new
//! pick. The loop is irreducibly sequential; only the distance rows it
//! consumes are computed in parallel.
//!
//! Two variants:
//!
//! - [`GreedyCoresetSampler`]: exact. Materializes the full `N x N`
//!   distance matrix (O(N^2) time and memory) and bootstraps each row's
//!   score from the L2 norm of its matrix row, i.e. its distance to an
//!   implicit origin point. Small N only; no fallback when the matrix does
//!   not fit the memory budget.
//! - [`ApproximateGreedyCoresetSampler`]: bootstraps from the mean distance
//!   to a handful of random anchor rows instead of the full matrix, and
//!   falls back to a slower streaming computation when even the anchor
//!   matrix exceeds the budget.
//!
//! The two bootstraps intentionally differ (row norm vs. anchor mean); the
//! asymmetry is inherited from the system this engine replaces and is kept
//! rather than unified, since it affects which row is picked first.
//!
//! Inputs with more than [`SamplerConfig::projection_dim`] dimensions are
//! first passed through a fresh random linear projection. Without an
//! explicit `seed` this preprocessing (and the approximate variant's anchor
//! choice) is non-deterministic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::batch::FeatureBatch;
use crate::distance::{distances_to_row, l2_distance, pairwise};

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Percentage {0} not in (0, 1]")]
    InvalidPercentage(f64),

    #[error("Distance matrix of {rows}x{cols} f32 exceeds memory limit of {limit} bytes")]
    MatrixTooLarge {
        rows: usize,
        cols: usize,
        limit: usize,
    },

    #[error("Cannot sample from an empty feature batch")]
    EmptyBatch,
}

/// Configuration shared by both sampler variants.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Fraction of rows to keep, in (0, 1]. The selected count is
    /// `floor(N * percentage)`.
    pub percentage: f64,

    /// Features with more dimensions than this are randomly projected down
    /// before distance computation (default: 128).
    pub projection_dim: usize,

    /// Seed for the random projection and anchor choice (None = entropy).
    pub seed: Option<u64>,

    /// Upper bound on any single distance-matrix allocation, in bytes
    /// (None = unlimited). The exact sampler fails outright when its
    /// `N x N` matrix would exceed this; the approximate sampler falls back
    /// to a streaming path.
    pub memory_limit_bytes: Option<usize>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            percentage: 0.1,
            projection_dim: 128,
            seed: None,
            memory_limit_bytes: None,
        }
    }
}

impl SamplerConfig {
    fn validate(&self) -> Result<(), SamplerError> {
        if !(self.percentage > 0.0 && self.percentage <= 1.0) {
            return Err(SamplerError::InvalidPercentage(self.percentage));
        }
        Ok(())
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::seed_from_u64(rand::thread_rng().gen()),
        }
    }

    fn fits_budget(&self, rows: usize, cols: usize) -> bool {
        match self.memory_limit_bytes {
            Some(limit) => rows
                .checked_mul(cols)
                .and_then(|c| c.checked_mul(std::mem::size_of::<f32>()))
                .map(|bytes| bytes <= limit)
                .unwrap_or(false),
            None => true,
        }
    }
}

/// Subset selection over a feature batch.
///
/// Implementations return selection-ordered, duplicate-free row indices,
/// all within `[0, N)`.
pub trait CoresetSampler {
    fn select(&self, features: &FeatureBatch) -> Result<Vec<usize>, SamplerError>;

    /// Select and gather in one step.
    fn run(&self, features: &FeatureBatch) -> Result<FeatureBatch, SamplerError> {
        let indices = self.select(features)?;
        Ok(features.select(&indices))
    }
}

/// Project features down to `target_dim` with a fresh random linear map.
///
/// Weights are uniform in `[-1/sqrt(D), 1/sqrt(D)]`, the conventional
/// fan-in bound for an untrained linear layer.
fn random_projection(features: &FeatureBatch, target_dim: usize, rng: &mut StdRng) -> FeatureBatch {
    let dim = features.dim();
    let bound = 1.0 / (dim as f32).sqrt();
    let weights: Vec<f32> = (0..target_dim * dim)
        .map(|_| rng.gen_range(-bound..bound))
        .collect();

    let mut data = vec![0.0f32; features.rows() * target_dim];
    data.par_chunks_mut(target_dim)
        .enumerate()
        .for_each(|(i, out_row)| {
            let row = features.row(i);
            for (t, cell) in out_row.iter_mut().enumerate() {
                let w = &weights[t * dim..(t + 1) * dim];
                *cell = row.iter().zip(w.iter()).map(|(x, y)| x * y).sum();
            }
        });
    FeatureBatch::from_parts(data, features.rows(), target_dim)
}

/// Pick the index of the largest score. First maximal index wins ties, so
/// selection order is deterministic for a fixed seed.
fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, &s) in scores.iter().enumerate() {
        if s > best_score {
            best_score = s;
            best = i;
        }
    }
    best
}

/// Exact greedy coreset sampler. O(N^2) time and memory.
pub struct GreedyCoresetSampler {
    config: SamplerConfig,
}

impl GreedyCoresetSampler {
    pub fn new(config: SamplerConfig) -> Result<Self, SamplerError> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl CoresetSampler for GreedyCoresetSampler {
    fn select(&self, features: &FeatureBatch) -> Result<Vec<usize>, SamplerError> {
        let n = features.rows();
        if n == 0 {
            return Err(SamplerError::EmptyBatch);
        }

        let projected;
        let reduced = if features.dim() > self.config.projection_dim {
            let mut rng = self.config.rng();
            projected = random_projection(features, self.config.projection_dim, &mut rng);
            &projected
        } else {
            features
        };

        if !self.config.fits_budget(n, n) {
            // The exact variant has no fallback; callers wanting one use
            // the approximate sampler.
            return Err(SamplerError::MatrixTooLarge {
                rows: n,
                cols: n,
                limit: self.config.memory_limit_bytes.unwrap_or(0),
            });
        }

        let matrix = pairwise(reduced, reduced);

        // Bootstrap: each row's distance-to-selected-set starts as the L2
        // norm of its distance-matrix row (distance to an implicit origin).
        let mut scores: Vec<f32> = matrix
            .par_chunks(n)
            .map(|row| row.iter().map(|d| d * d).sum::<f32>().sqrt())
            .collect();

        let count = (n as f64 * self.config.percentage).floor() as usize;
        let mut indices = Vec::with_capacity(count);
        for _ in 0..count {
            let pick = argmax(&scores);
            indices.push(pick);
            for (i, score) in scores.iter_mut().enumerate() {
                *score = score.min(matrix[i * n + pick]);
            }
            // A picked row can never win again, even when every remaining
            // score has collapsed to zero.
            scores[pick] = f32::NEG_INFINITY;
        }

        tracing::debug!("exact coreset: selected {} of {} rows", indices.len(), n);
        Ok(indices)
    }
}

/// Approximate greedy coreset sampler.
///
/// Avoids the `N x N` matrix by bootstrapping from `num_starting_points`
/// random anchor rows and recomputing one `N`-length distance column per
/// iteration. Slower per pick, but O(N) memory.
pub struct ApproximateGreedyCoresetSampler {
    config: SamplerConfig,

    /// Number of random anchor rows for the bootstrap (clamped to N).
    num_starting_points: usize,

    /// Hard cap on the selected count, independent of `percentage`.
    max_samples: Option<usize>,
}

impl ApproximateGreedyCoresetSampler {
    /// Default of 10 starting anchors, no hard cap.
    pub fn new(config: SamplerConfig) -> Result<Self, SamplerError> {
        config.validate()?;
        Ok(Self {
            config,
            num_starting_points: 10,
            max_samples: None,
        })
    }

    /// Override the anchor count used for the bootstrap.
    pub fn num_starting_points(mut self, n: usize) -> Self {
        self.num_starting_points = n;
        self
    }

    /// Cap the selected count: final count is
    /// `min(floor(N * percentage), cap)`.
    pub fn max_samples(mut self, cap: usize) -> Self {
        self.max_samples = Some(cap);
        self
    }

    /// Mean distance from every row to the anchor rows.
    ///
    /// Fast path materializes the `N x k` anchor matrix; when that exceeds
    /// the memory budget, falls back to a streaming per-row computation of
    /// the same quantity and surfaces the exhaustion as a warning.
    fn anchor_means(&self, reduced: &FeatureBatch, anchors: &[usize]) -> Vec<f32> {
        let n = reduced.rows();
        let k = anchors.len();

        if self.config.fits_budget(n, k) {
            let anchor_batch = reduced.select(anchors);
            let matrix = pairwise(reduced, &anchor_batch);
            matrix
                .par_chunks(k)
                .map(|row| row.iter().sum::<f32>() / k as f32)
                .collect()
        } else {
            tracing::warn!(
                rows = n,
                anchors = k,
                "anchor distance matrix exceeds memory budget; \
                 falling back to streaming computation"
            );
            (0..n)
                .into_par_iter()
                .map(|i| {
                    let row = reduced.row(i);
                    anchors
                        .iter()
                        .map(|&a| l2_distance(row, reduced.row(a)))
                        .sum::<f32>()
                        / k as f32
                })
                .collect()
        }
    }
}

impl CoresetSampler for ApproximateGreedyCoresetSampler {
    fn select(&self, features: &FeatureBatch) -> Result<Vec<usize>, SamplerError> {
        let n = features.rows();
        if n == 0 {
            return Err(SamplerError::EmptyBatch);
        }

        let mut rng = self.config.rng();
        let projected;
        let reduced = if features.dim() > self.config.projection_dim {
            projected = random_projection(features, self.config.projection_dim, &mut rng);
            &projected
        } else {
            features
        };

        let num_anchors = self.num_starting_points.min(n).max(1);
        let anchors = rand::seq::index::sample(&mut rng, n, num_anchors).into_vec();

        // Bootstrap: mean distance to the anchors. Deliberately not the
        // exact variant's row-norm bootstrap; see the module docs.
        let mut scores = self.anchor_means(reduced, &anchors);

        let mut count = (n as f64 * self.config.percentage).floor() as usize;
        if let Some(cap) = self.max_samples {
            count = count.min(cap);
        }

        let mut indices = Vec::with_capacity(count);
        for _ in 0..count {
            let pick = argmax(&scores);
            indices.push(pick);
            let column = distances_to_row(reduced, reduced.row(pick));
            for (score, d) in scores.iter_mut().zip(column.iter()) {
                *score = score.min(*d);
            }
            scores[pick] = f32::NEG_INFINITY;
        }

        tracing::debug!(
            "approximate coreset: selected {} of {} rows ({} anchors)",
            indices.len(),
            n,
            num_anchors
        );
        Ok(indices)
    }
}
