//! Memory bank manager
//!
//! Top-level façade owning one scorer and one coreset sampler. `fill`
//! concatenates reference feature batches, subsamples them into the
//! coreset, and fits the scorer; `predict` scores query features and
//! reassembles the per-patch scores into the spatial anomaly map.
//!
//! Lifecycle: `Empty -> Filled -> (saved | reset -> Empty)`; `load`
//! enters Filled directly. One manager instance exclusively owns its
//! index; concurrent calls on the same instance must be serialized by the
//! caller.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::batch::{BatchError, FeatureBatch};
use crate::index::{IndexConfig, NearestNeighborIndex};
use crate::patch::{reshape_to_grid, PatchShape, ReshapeError, ScoreMap};
use crate::sampler::{
    ApproximateGreedyCoresetSampler, CoresetSampler, SamplerConfig, SamplerError,
};
use crate::scorer::{NearestNeighborScorer, ScorerError};

/// Stable name of the patch-shape metadata artifact.
const SHAPE_FILE: &str = "patch_shape.json";

/// Configuration errors carry the operation that was in progress; all
/// other module errors pass through untranslated.
#[derive(Error, Debug)]
pub enum BankError {
    #[error("{op}: no coreset sampler configured")]
    MissingSampler { op: &'static str },

    #[error("{op}: memory bank is empty; call fill_memory_bank or load first")]
    NotFilled { op: &'static str },

    #[error("{op}: no patch shape available; pass one or load a saved bank")]
    MissingPatchShape { op: &'static str },

    #[error("{op}: patch shape record unreadable: {reason}")]
    ShapeRecord { op: &'static str, reason: String },

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Scorer(#[from] ScorerError),

    #[error(transparent)]
    Reshape(#[from] ReshapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankState {
    Empty,
    Filled,
}

pub struct MemoryBankManager {
    scorer: NearestNeighborScorer,
    sampler: Option<Box<dyn CoresetSampler + Send>>,
    patch_shape: Option<PatchShape>,
    state: BankState,
}

impl MemoryBankManager {
    /// Manager with an explicit scorer and optional sampler. A manager
    /// without a sampler can still `load` and `predict`, but not `fill`.
    pub fn new(
        scorer: NearestNeighborScorer,
        sampler: Option<Box<dyn CoresetSampler + Send>>,
    ) -> Self {
        Self {
            scorer,
            sampler,
            patch_shape: None,
            state: BankState::Empty,
        }
    }

    /// The usual configuration: 1-NN scoring over a flat index, with an
    /// approximate greedy coreset sampler at the given ratio.
    pub fn with_coreset_ratio(ratio: f64, seed: Option<u64>) -> Result<Self, BankError> {
        let sampler = ApproximateGreedyCoresetSampler::new(SamplerConfig {
            percentage: ratio,
            seed,
            ..SamplerConfig::default()
        })?;
        let index = NearestNeighborIndex::new(IndexConfig::default())
            .map_err(ScorerError::from)?;
        Ok(Self::new(
            NearestNeighborScorer::new(1, index),
            Some(Box::new(sampler)),
        ))
    }

    /// Concatenate reference batches, subsample the coreset, and fit the
    /// scorer on the subset. Transitions Empty -> Filled.
    pub fn fill_memory_bank(&mut self, batches: &[FeatureBatch]) -> Result<(), BankError> {
        let sampler = self
            .sampler
            .as_ref()
            .ok_or(BankError::MissingSampler { op: "fill" })?;

        let all = FeatureBatch::concat(batches)?;
        let sampled = sampler.run(&all)?;
        tracing::debug!(
            total = all.rows(),
            sampled = sampled.rows(),
            "filling memory bank"
        );
        self.scorer.fit(vec![sampled.into_tensor()])?;
        self.state = BankState::Filled;
        Ok(())
    }

    /// Score query features and reshape the per-patch scores into the
    /// spatial anomaly map. An explicit `patch_shape` is remembered for
    /// subsequent calls; without one the last-known shape (from a prior
    /// call, `save`, or `load`) is used.
    pub fn predict(
        &mut self,
        features: &FeatureBatch,
        patch_shape: Option<PatchShape>,
    ) -> Result<ScoreMap, BankError> {
        self.ensure_filled("predict")?;
        if let Some(shape) = patch_shape {
            self.patch_shape = Some(shape);
        }
        let shape = self
            .patch_shape
            .ok_or(BankError::MissingPatchShape { op: "predict" })?;

        let (scores, _) = self.scorer.predict(vec![features.clone().into_tensor()])?;
        Ok(reshape_to_grid(&scores, shape)?)
    }

    /// Score query features without spatial reshaping, for callers that
    /// manage their own layout. Output order matches input order.
    pub fn predict_no_reshape(&self, features: &FeatureBatch) -> Result<Vec<f32>, BankError> {
        self.ensure_filled("predict_no_reshape")?;
        let (scores, _) = self.scorer.predict(vec![features.clone().into_tensor()])?;
        Ok(scores)
    }

    /// Persist the scorer state and the patch-shape record as two
    /// artifacts in `dir`.
    pub fn save<P: AsRef<Path>>(&mut self, dir: P, patch_shape: PatchShape) -> Result<(), BankError> {
        self.ensure_filled("save")?;
        let dir = dir.as_ref();
        self.scorer.save(dir, false)?;
        let json = serde_json::to_string(&patch_shape).map_err(|e| BankError::ShapeRecord {
            op: "save",
            reason: e.to_string(),
        })?;
        fs::write(dir.join(SHAPE_FILE), json)?;
        self.patch_shape = Some(patch_shape);
        Ok(())
    }

    /// Restore scorer state and patch shape from `dir`. A missing or
    /// corrupt shape record is a configuration error.
    pub fn load<P: AsRef<Path>>(&mut self, dir: P) -> Result<(), BankError> {
        let dir = dir.as_ref();
        self.scorer.load(dir)?;
        let raw = fs::read_to_string(dir.join(SHAPE_FILE)).map_err(|e| BankError::ShapeRecord {
            op: "load",
            reason: e.to_string(),
        })?;
        let shape: PatchShape = serde_json::from_str(&raw).map_err(|e| BankError::ShapeRecord {
            op: "load",
            reason: e.to_string(),
        })?;
        self.patch_shape = Some(shape);
        self.state = BankState::Filled;
        Ok(())
    }

    /// Release index resources and return to Empty. Idempotent.
    pub fn reset(&mut self) {
        self.scorer.reset();
        self.patch_shape = None;
        self.state = BankState::Empty;
    }

    pub fn state(&self) -> BankState {
        self.state
    }

    pub fn patch_shape(&self) -> Option<PatchShape> {
        self.patch_shape
    }

    fn ensure_filled(&self, op: &'static str) -> Result<(), BankError> {
        if self.state != BankState::Filled {
            return Err(BankError::NotFilled { op });
        }
        Ok(())
    }
}
