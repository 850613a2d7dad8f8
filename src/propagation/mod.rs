//! Propagation module: directed-graph diffusion engine.
//!
//! This module provides the simulation core that models how discrete
//! information items spread from root nodes to followers over time, records
//! the resulting per-item edge events, and exposes them as time-bounded
//! action matrices.
//!
//! # Module Organization
//!
//! - `graph`: the [`ActionGraph`] substrate, an owned directed graph with
//!   per-edge action annotations
//! - `net`: the [`PropagationNet`] engine: construction, diffusion
//!   simulation, matrix queries, listener replay, snapshot persistence
//!
//! # Public API
//!
//! ```rust
//! use cascade_core::propagation::{ActionGraph, PropagationNet, PropagationSpec};
//! ```

mod graph;
mod net;

#[cfg(test)]
mod tests;

pub use graph::ActionGraph;
pub use net::{PropagationNet, PropagationSpec, SNAPSHOT_EXT};
