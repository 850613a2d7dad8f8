//! Tests for the propagation engine.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use super::*;
use crate::{
    event::EventKind,
    properties::{ActionKey, NodeId, PropagationEvent},
};

fn n(id: u32) -> NodeId {
    NodeId(id)
}

/// Three-node chain with one explicitly propagated item:
/// 0 -> 1 at t=1, 1 -> 2 at t=2.
fn chain_net() -> PropagationNet {
    let mut timelines = BTreeMap::new();
    timelines.insert(
        0,
        vec![
            PropagationEvent::root(0.0, n(0)),
            PropagationEvent::new(1.0, n(0), n(1)),
            PropagationEvent::new(2.0, n(1), n(2)),
        ],
    );
    PropagationNet::new(
        [n(0), n(1), n(2)],
        [(n(0), n(1)), (n(1), n(2))],
        1,
        PropagationSpec::Explicit(timelines),
        &[],
        42,
    )
    .unwrap()
}

fn simulated_net(seed: u64) -> PropagationNet {
    // Two directed rings over 10 nodes so diffusion has somewhere to go.
    let nodes: Vec<NodeId> = (0..10).map(n).collect();
    let mut edges = Vec::new();
    for i in 0..10u32 {
        edges.push((n(i), n((i + 1) % 10)));
        edges.push((n(i), n((i + 3) % 10)));
    }
    PropagationNet::new(
        nodes,
        edges,
        3,
        PropagationSpec::Probability(0.7),
        &[],
        seed,
    )
    .unwrap()
}

#[test]
fn test_dense_round_trip_scenario() {
    let net = chain_net();
    let matrix = net.get_action_matrix(&ActionKey::propagate(0), None, false);
    assert_eq!(matrix.shape(), &[3, 3]);
    assert_eq!(matrix[[0, 1]], 1.0);
    assert_eq!(matrix[[1, 2]], 2.0);
    assert_eq!(matrix.iter().filter(|&&v| v != 0.0).count(), 2);

    // Restricting to events that had occurred by t=1 zeroes the later edge
    // but keeps the boundary value.
    let bounded = net.get_action_matrix(&ActionKey::propagate(0), Some(1.0), false);
    assert_eq!(bounded[[0, 1]], 1.0);
    assert_eq!(bounded[[1, 2]], 0.0);
}

#[test]
fn test_binary_collapse() {
    let net = chain_net();
    let binary = net.get_action_matrix(&ActionKey::propagate(0), None, true);
    assert_eq!(binary[[0, 1]], 1.0);
    assert_eq!(binary[[1, 2]], 1.0);
    assert_eq!(binary.iter().filter(|&&v| v != 0.0).count(), 2);
}

#[test]
fn test_follow_matrix_marks_every_edge() {
    let net = chain_net();
    let follow = net.get_action_matrix(&ActionKey::follow(), None, false);
    assert_eq!(follow[[0, 1]], 1.0);
    assert_eq!(follow[[1, 2]], 1.0);
    assert_eq!(follow[[2, 0]], 0.0);
}

#[test]
#[should_panic(expected = "unregistered action key")]
fn test_unregistered_action_key_panics() {
    let net = chain_net();
    net.get_action_matrix(&ActionKey::propagate(5), None, false);
}

#[test]
fn test_propagation_ordering_invariant() {
    let net = simulated_net(7);
    for (_, events) in net.propagations() {
        assert!(!events.is_empty());
        assert!(events[0].is_root());
        assert_eq!(events.iter().filter(|e| e.is_root()).count(), 1);
        for pair in events.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
    }
}

#[test]
fn test_simulation_is_seed_deterministic() {
    let a = simulated_net(11);
    let b = simulated_net(11);
    assert_eq!(
        a.propagations().collect::<Vec<_>>(),
        b.propagations().collect::<Vec<_>>()
    );
}

#[test]
fn test_zero_probability_infects_nobody() {
    let net = PropagationNet::new(
        [n(0), n(1)],
        [(n(0), n(1))],
        2,
        PropagationSpec::Probability(0.0),
        &[],
        3,
    )
    .unwrap();
    for (_, events) in net.propagations() {
        assert_eq!(events.len(), 1);
        assert!(events[0].is_root());
    }
}

#[test]
fn test_certain_probability_reaches_chain_by_distance() {
    // p = 1 on a 0 -> 1 -> 2 -> 3 chain: whoever is root, every reachable
    // node is infected at its hop distance from the root.
    let net = PropagationNet::new(
        (0..4).map(n),
        (0..3).map(|i| (n(i), n(i + 1))),
        1,
        PropagationSpec::Probability(1.0),
        &[],
        5,
    )
    .unwrap();
    let events = net.propagation(0).unwrap();
    let root = events[0].node;
    for event in &events[1..] {
        let distance = event.node.0 - root.0;
        assert_eq!(event.time, f64::from(distance));
    }
    assert_eq!(events.len(), (4 - root.0) as usize);
}

#[test]
fn test_replay_determinism_and_order() {
    let mut net = chain_net();
    let seen: Rc<RefCell<Vec<(f64, Option<NodeId>, NodeId, usize)>>> =
        Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    net.add_event_listener(EventKind::Propagate, move |_, event, item| {
        sink.borrow_mut()
            .push((event.time, event.parent, event.node, item));
        Ok(())
    });

    net.simulate_propagation().unwrap();
    let first_run = seen.borrow().clone();
    assert_eq!(
        first_run,
        vec![
            (0.0, None, n(0), 0),
            (1.0, Some(n(0)), n(1), 0),
            (2.0, Some(n(1)), n(2), 0),
        ]
    );

    seen.borrow_mut().clear();
    net.simulate_propagation().unwrap();
    assert_eq!(*seen.borrow(), first_run);
}

#[test]
fn test_listener_error_aborts_replay() {
    let mut net = chain_net();
    let calls = Rc::new(RefCell::new(0usize));
    let counter = Rc::clone(&calls);
    net.add_event_listener(EventKind::Propagate, move |_, _, _| {
        *counter.borrow_mut() += 1;
        Err(crate::error::CascadeError::Listener(
            "buffer full".to_string(),
        ))
    });
    assert!(net.simulate_propagation().is_err());
    assert_eq!(*calls.borrow(), 1);
    // The registry survives an aborted replay.
    assert_eq!(net.listener_count(EventKind::Propagate), 1);
}

#[test]
fn test_listeners_can_update_item_attributes() {
    let mut net = chain_net();
    let depths: Rc<RefCell<BTreeMap<usize, u32>>> = Rc::new(RefCell::new(BTreeMap::new()));
    let sink = Rc::clone(&depths);
    net.add_event_listener(EventKind::Propagate, move |_, event, item| {
        if !event.is_root() {
            *sink.borrow_mut().entry(item).or_insert(0) += 1;
        }
        Ok(())
    });
    net.simulate_propagation().unwrap();
    let depth = depths.borrow()[&0];
    net.set_info_attr(0, "depth", depth).unwrap();
    assert_eq!(net.get_info_attr::<u32>(0, "depth"), Some(2));
}

#[test]
fn test_set_info_attr_unknown_item_is_not_found() {
    let mut net = chain_net();
    assert!(net.set_info_attr(9, "depth", 1).is_err());
}

#[test]
fn test_propagate_writeback_annotates_edges() {
    let net = chain_net();
    let key = ActionKey::propagate(0);
    let mut edges = net.edges_with_action(&key);
    edges.sort();
    assert_eq!(edges, vec![(n(0), n(1)), (n(1), n(2))]);

    assert_eq!(net.predecessors_with_action(n(2), &key), vec![n(1)]);
    assert_eq!(net.predecessors(n(1)), vec![n(0)]);
}

#[test]
fn test_roots_and_last_time() {
    let net = chain_net();
    assert_eq!(net.roots(), vec![n(0)]);
    assert_eq!(net.last_propagation_time(), Some(2.0));
}

#[test]
fn test_title_encodes_key_attributes() {
    let net = chain_net();
    assert_eq!(net.title(), "num_info_1_nodes_3_edges_2_seed_42");
    assert_eq!(format!("{net}"), net.title());
}

#[test]
fn test_explicit_timeline_validation() {
    let make = |events: Vec<PropagationEvent>| {
        let mut timelines = BTreeMap::new();
        timelines.insert(0, events);
        PropagationNet::new(
            [n(0), n(1)],
            [(n(0), n(1))],
            1,
            PropagationSpec::Explicit(timelines),
            &[],
            0,
        )
    };

    // Missing root marker.
    assert!(make(vec![PropagationEvent::new(1.0, n(0), n(1))]).is_err());
    // Decreasing times.
    assert!(make(vec![
        PropagationEvent::root(5.0, n(0)),
        PropagationEvent::new(1.0, n(0), n(1)),
    ])
    .is_err());
    // Unknown node.
    assert!(make(vec![
        PropagationEvent::root(0.0, n(0)),
        PropagationEvent::new(1.0, n(0), n(7)),
    ])
    .is_err());
    // Valid.
    assert!(make(vec![
        PropagationEvent::root(0.0, n(0)),
        PropagationEvent::new(1.0, n(0), n(1)),
    ])
    .is_ok());
}

#[test]
fn test_probability_out_of_range_rejected() {
    let result = PropagationNet::new(
        [n(0)],
        [],
        1,
        PropagationSpec::Probability(1.5),
        &[],
        0,
    );
    assert!(result.is_err());
}

#[test]
fn test_snapshot_dump_and_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut net = chain_net();
    net.set_info_attr(0, "depth", 2u32).unwrap();
    let path = net.dump("retweet_net", dir.path()).unwrap();
    assert!(path.ends_with("retweet_net_num_info_1_nodes_3_edges_2_seed_42.bin"));

    // Exact-name load.
    let by_name =
        PropagationNet::load(path.file_name().unwrap().to_str().unwrap(), dir.path()).unwrap();
    assert_eq!(by_name.title(), net.title());
    assert_eq!(
        by_name.propagations().collect::<Vec<_>>(),
        net.propagations().collect::<Vec<_>>()
    );

    // Item attributes survive the snapshot.
    assert_eq!(by_name.get_info_attr::<u32>(0, "depth"), Some(2));

    // Prefix fallback load.
    let by_prefix = PropagationNet::load("retweet_net", dir.path()).unwrap();
    assert_eq!(by_prefix.title(), net.title());

    // A loaded engine starts with no listeners.
    assert_eq!(by_prefix.listener_count(EventKind::Propagate), 0);
}

#[test]
fn test_snapshot_load_missing_propagates_error() {
    let dir = tempfile::TempDir::new().unwrap();
    assert!(PropagationNet::load("no_such_prefix", dir.path()).is_err());
}

#[test]
fn test_custom_action_catalog_and_add_action() {
    let mut timelines = BTreeMap::new();
    timelines.insert(0, vec![PropagationEvent::root(0.0, n(0))]);
    let mut net = PropagationNet::new(
        [n(0), n(1)],
        [(n(0), n(1))],
        1,
        PropagationSpec::Explicit(timelines),
        &["retweet".to_string()],
        0,
    )
    .unwrap();

    let key = ActionKey::custom("retweet", 0);
    net.add_action(n(0), n(1), key.clone(), 4.0);
    let matrix = net.get_action_matrix(&key, None, false);
    assert_eq!(matrix[[0, 1]], 4.0);
    assert_eq!(net.edges_with_action(&key), vec![(n(0), n(1))]);
}
