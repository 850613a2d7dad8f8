//! Performance benchmarks for the propagation engine
//!
//! These benchmarks measure:
//! - Probabilistic diffusion simulation at construction
//! - Action-matrix projection over the full node set
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cascade_core::{
    propagation::{PropagationNet, PropagationSpec},
    properties::{ActionKey, NodeId},
};

/// Ring-with-chords follow graph so diffusion branches.
fn build_follow_graph(num_nodes: u32) -> (Vec<NodeId>, Vec<(NodeId, NodeId)>) {
    let nodes: Vec<NodeId> = (0..num_nodes).map(NodeId).collect();
    let mut edges = Vec::with_capacity(2 * num_nodes as usize);
    for i in 0..num_nodes {
        edges.push((NodeId(i), NodeId((i + 1) % num_nodes)));
        edges.push((NodeId(i), NodeId((i + 7) % num_nodes)));
    }
    (nodes, edges)
}

fn bench_simulation(c: &mut Criterion) {
    let (nodes, edges) = build_follow_graph(500);
    c.bench_function("simulate_500_nodes_10_items", |b| {
        b.iter(|| {
            PropagationNet::new(
                black_box(nodes.clone()),
                black_box(edges.clone()),
                10,
                PropagationSpec::Probability(0.2),
                &[],
                42,
            )
            .unwrap()
        })
    });
}

fn bench_action_matrix(c: &mut Criterion) {
    let (nodes, edges) = build_follow_graph(500);
    let net = PropagationNet::new(
        nodes,
        edges,
        10,
        PropagationSpec::Probability(0.2),
        &[],
        42,
    )
    .unwrap();
    c.bench_function("action_matrix_500_nodes", |b| {
        b.iter(|| net.get_action_matrix(black_box(&ActionKey::propagate(3)), Some(5.0), false))
    });
}

criterion_group!(benches, bench_simulation, bench_action_matrix);
criterion_main!(benches);
