//! Directed graph substrate for the propagation engine.
//!
//! [`ActionGraph`] is an owned `petgraph::Graph` of [`NodeId`] nodes with
//! [`ActionWeights`] edge payloads, plus a node lookup index. It exposes only
//! the operations the engine needs: node/edge insertion, weighted-edge
//! queries, neighbor/predecessor lookup, and action-filtered edge scans.
//! Nodes are never removed, so a node's petgraph index doubles as its dense
//! matrix row/column.

use petgraph::{graph::NodeIndex, visit::EdgeRef, Direction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::properties::{ActionKey, ActionWeights, NodeId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionGraph {
    graph: petgraph::Graph<NodeId, ActionWeights>,
    index: BTreeMap<NodeId, NodeIndex>,
}

impl Default for ActionGraph {
    fn default() -> Self {
        ActionGraph {
            graph: petgraph::Graph::new(),
            index: BTreeMap::new(),
        }
    }
}

impl ActionGraph {
    pub fn new() -> ActionGraph {
        ActionGraph::default()
    }

    /// Inserts `node` if absent and returns its index. Insertion order is
    /// the dense matrix row/column order.
    pub fn add_node(&mut self, node: NodeId) -> NodeIndex {
        match self.index.get(&node) {
            Some(idx) => *idx,
            None => {
                let idx = self.graph.add_node(node);
                self.index.insert(node, idx);
                idx
            }
        }
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.index.contains_key(&node)
    }

    /// The dense matrix row/column of `node`, i.e. its insertion position.
    pub fn node_position(&self, node: NodeId) -> Option<usize> {
        self.index.get(&node).map(|idx| idx.index())
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.graph.raw_nodes().iter().map(|n| n.weight).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Inserts a directed edge carrying `weights`, creating missing
    /// endpoints. An existing edge has its annotations merged in, with the
    /// incoming values taking precedence.
    pub fn add_edge(&mut self, source: NodeId, sink: NodeId, weights: ActionWeights) {
        let source_idx = self.add_node(source);
        let sink_idx = self.add_node(sink);
        match self.graph.find_edge(source_idx, sink_idx) {
            Some(edge_idx) => {
                let existing = &mut self.graph[edge_idx];
                for (key, value) in weights.weights {
                    existing.set(key, value);
                }
            }
            None => {
                self.graph.add_edge(source_idx, sink_idx, weights);
            }
        }
    }

    /// Annotates edge `(source, sink)` with `key = value`, inserting the edge
    /// (and missing endpoints) if necessary.
    pub fn add_action(&mut self, source: NodeId, sink: NodeId, key: ActionKey, value: f64) {
        let mut weights = ActionWeights::empty();
        weights.set(key, value);
        self.add_edge(source, sink, weights);
    }

    pub fn edge_weights(&self, source: NodeId, sink: NodeId) -> Option<&ActionWeights> {
        let source_idx = *self.index.get(&source)?;
        let sink_idx = *self.index.get(&sink)?;
        let edge_idx = self.graph.find_edge(source_idx, sink_idx)?;
        Some(&self.graph[edge_idx])
    }

    /// The annotation value for `key` on edge `(source, sink)`, if present.
    pub fn action_weight(&self, source: NodeId, sink: NodeId, key: &ActionKey) -> Option<f64> {
        self.edge_weights(source, sink)?.get(key)
    }

    pub fn out_neighbors(&self, node: NodeId) -> Vec<NodeId> {
        match self.index.get(&node) {
            Some(idx) => self
                .graph
                .neighbors_directed(*idx, Direction::Outgoing)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        match self.index.get(&node) {
            Some(idx) => self
                .graph
                .neighbors_directed(*idx, Direction::Incoming)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Predecessors of `node` along edges carrying the `key` annotation.
    pub fn predecessors_with_action(&self, node: NodeId, key: &ActionKey) -> Vec<NodeId> {
        match self.index.get(&node) {
            Some(idx) => self
                .graph
                .edges_directed(*idx, Direction::Incoming)
                .filter(|edge| edge.weight().contains(key))
                .map(|edge| self.graph[edge.source()])
                .collect(),
            None => Vec::new(),
        }
    }

    /// All `(source, sink)` pairs whose edge carries the `key` annotation.
    pub fn edges_with_action(&self, key: &ActionKey) -> Vec<(NodeId, NodeId)> {
        self.graph
            .raw_edges()
            .iter()
            .filter(|edge| edge.weight.contains(key))
            .map(|edge| (self.graph[edge.source()], self.graph[edge.target()]))
            .collect()
    }

    /// Iterates every edge as `(source, sink, weights)`.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, &ActionWeights)> {
        self.graph
            .raw_edges()
            .iter()
            .map(|edge| (self.graph[edge.source()], self.graph[edge.target()], &edge.weight))
    }
}
