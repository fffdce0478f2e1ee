//! Patchbank – memory-bank anomaly scoring core
//!
//! Builds a compact memory bank of "normal" reference feature vectors and
//! scores new vectors by their distance to the nearest bank entry,
//! reassembling per-patch scores into a spatial anomaly map.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MemoryBankManager                        │
//! │     fill (sample → fit) · predict (query → anomaly map)     │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │   Greedy Coreset Samplers    │   NearestNeighborScorer      │
//! │   exact / approximate        │   ConcatMerger + flat k-NN   │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │        L2 kernels · .pbank persistence · patch grids        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fill path: feature batches → merge → coreset sampler → index fit.
//! Inference path: feature batch → merge → k-NN query → per-patch
//! distances → patch-grid anomaly map.

pub mod bank;
pub mod batch;
pub mod distance;
pub mod format;
pub mod index;
pub mod merge;
pub mod patch;
pub mod sampler;
pub mod scorer;

pub use bank::{BankError, BankState, MemoryBankManager};
pub use batch::{FeatureBatch, FeatureTensor};
pub use distance::{l2_distance, l2_distance_squared};
pub use index::{IndexConfig, IndexKind, NearestNeighborIndex, Neighbors};
pub use merge::ConcatMerger;
pub use patch::{reduce_to_scalar, reshape_to_grid, PatchShape, ScoreMap, ScoreTensor};
pub use sampler::{
    ApproximateGreedyCoresetSampler, CoresetSampler, GreedyCoresetSampler, SamplerConfig,
};
pub use scorer::NearestNeighborScorer;
