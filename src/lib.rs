//! # cascade-core
//!
//! A Rust library for generating and serializing synthetic information-diffusion
//! datasets over directed graphs for downstream machine-learning consumption.
//!
//! The name "cascade" comes from "information cascade" - the way content spreads
//! from node to node through a follow network.
//!
//! ## Overview
//!
//! cascade-core models how discrete **information items** spread from root nodes
//! to followers over time. A [`propagation::PropagationNet`] overlays a directed
//! follow graph with per-item diffusion timelines, records every infection as a
//! timestamped edge annotation, and exposes the result as time-bounded **action
//! matrices** usable as ML features and labels. An [`dataset::ActionDataset`]
//! accumulates the encoded examples, batches them with reproducible train/test
//! splits, and persists them as concatenable shards.
//!
//! ### Key Features
//!
//! - **Seeded simulation**: root sampling and probabilistic diffusion driven by
//!   one explicitly constructed RNG, so every dataset is reproducible
//! - **Typed action keys**: edge-weight channels (`follow`, `propagate_<item>`,
//!   custom families) validated against an explicit catalog, not string
//!   conventions
//! - **Time-bounded queries**: restrict any action matrix to events that had
//!   occurred by a given timestamp, or collapse it to a 0/1 existence matrix
//! - **Event replay**: deterministic listener invocation over the stored
//!   timelines for side-effecting feature extraction
//! - **Three sparse/dense representations**: dense matrices, flattened triple
//!   lists, and coordinate (COO) arrays, interconverted by pure functions
//! - **Sharded persistence**: ceiling-division sharding with lossless reload by
//!   name prefix
//!
//! ## Architecture
//!
//! The library is organized around several key components:
//!
//! - **[`propagation`]**: the diffusion engine (`PropagationNet`, `ActionGraph`)
//! - **[`codec`]**: pure conversions between dense, triple-list, and COO forms
//! - **[`dataset`]**: shard container, batch iteration, k-fold splitting
//! - **[`properties`]**: identifiers, action keys, edge weights, events
//! - **[`event`]**: listener registry invoked during replay
//! - **[`config`]**: TOML-backed run parameters
//!
//! ## Quick Start
//!
//! Simulate one item over a small follow graph and derive a dataset:
//!
//! ```rust,no_run
//! use cascade_core::{
//!     codec::matrix_to_list,
//!     dataset::{ActionDataset, BatchOptions},
//!     propagation::{PropagationNet, PropagationSpec},
//!     properties::{ActionKey, NodeId},
//! };
//! use ndarray::Array2;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let nodes: Vec<NodeId> = (0..50).map(NodeId).collect();
//!     let edges: Vec<(NodeId, NodeId)> =
//!         (0..50).map(|i| (NodeId(i), NodeId((i + 1) % 50))).collect();
//!
//!     // Simulate 4 items with infection probability 0.3, seeded.
//!     let net = PropagationNet::new(
//!         nodes,
//!         edges,
//!         4,
//!         PropagationSpec::Probability(0.3),
//!         &[],
//!         42,
//!     )?;
//!
//!     // Per-item ground truth, restricted to the first two rounds.
//!     let early = net.get_action_matrix(&ActionKey::propagate(0), Some(2.0), false);
//!     let triples = matrix_to_list(&early, 0.0);
//!
//!     // Accumulate into a shard container and persist.
//!     let actions = vec![ActionKey::follow(), ActionKey::propagate(0)];
//!     let mut dataset = ActionDataset::new("./data", actions, false, true)?;
//!     let follow = net.get_action_matrix(&ActionKey::follow(), None, false);
//!     dataset.update_matrix_lists(
//!         vec![vec![matrix_to_list(&follow, 0.0), triples]],
//!         vec![(0..50).collect()],
//!     );
//!     dataset.update_x_features(Array2::ones((50, 8)));
//!     dataset.update_ys(Array2::zeros((1, 2)));
//!     dataset.dump("cascade", 1)?;
//!
//!     for batch in dataset.batches(&BatchOptions::default()) {
//!         println!("batch of {}", batch.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Diffusion timelines
//!
//! Every item's history is an ordered sequence of
//! [`properties::PropagationEvent`]s. The first entry is always the synthetic
//! root event (`parent == None`); times never decrease. Timelines are either
//! simulated from a probability or supplied explicitly and validated.
//!
//! ### Action matrices
//!
//! Each edge carries zero or more named action annotations whose value is the
//! timestamp the action occurred at. `get_action_matrix` projects one channel
//! into an `N×N` matrix, optionally zeroing entries later than a bound -
//! temporal diffusion as plain adjacency data.
//!
//! ### Local vs global indices
//!
//! A dataset example selects a subset of global nodes; its adjacency triples
//! use 0-based local indices over that subset, while `selected_node_indices`
//! maps them back to rows of the shared feature table.
//!
//! ## Module Guide
//!
//! Start with [`propagation::PropagationNet`] for simulation, then explore
//! [`dataset::ActionDataset`] for accumulation and batching. See
//! [`properties`] for the identifier and action-key types.

pub mod codec;
pub mod config;
pub mod dataset;
pub mod error;
pub mod event;
pub mod propagation;
pub mod properties;

pub use error::*;
