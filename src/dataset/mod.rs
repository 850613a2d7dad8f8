//! Dataset module: shard-oriented container for serialized training
//! examples.
//!
//! One [`ActionDataset`] holds one shard (or the concatenation of several)
//! of per-example ground-truth adjacencies, node-feature indices, and
//! labels, produced by the propagation engine and encoded through
//! [`crate::codec`]. It supports incremental accumulation, fold-based
//! train/test batching, and sharded persistence/reload without data loss.
//!
//! # Module Organization
//!
//! - `loader`: the [`ActionDataset`] container, [`FeatureTable`] numeric
//!   tables, and per-example decode types
//! - `batch`: deterministic batch iteration and the [`KFold`] splitter
//!
//! # Public API
//!
//! ```rust
//! use cascade_core::dataset::{ActionDataset, BatchOptions, KFold, SplitSpec};
//! ```

mod batch;
mod loader;


pub use batch::{Batch, Batches, BatchOptions, KFold, SplitSpec};
pub use loader::{
    ActionDataset, AdjacencySet, CooMatrix, Example, FeatureTable, NodeBlock, SHARD_EXT,
};
