//! The propagation engine: a directed graph augmented with per-item
//! diffusion timelines, an event-listener mechanism, and derived
//! time-bounded action matrices.

use ndarray::Array2;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::CascadeError,
    event::{EventKind, ListenerSet, PropagationCallback},
    properties::{
        ActionCatalog, ActionKey, ActionWeights, ItemAttributes, ItemId, NodeId, PropagationEvent,
    },
};

use super::graph::ActionGraph;

/// File extension for persisted engine snapshots.
pub const SNAPSHOT_EXT: &str = "bin";

/// How the per-item diffusion timelines are obtained at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropagationSpec {
    /// Simulate diffusion: for each item, pick a root uniformly at random
    /// and spread along `follow` edges with this per-edge probability.
    Probability(f64),
    /// Caller-supplied event sequences, validated at construction: one
    /// leading root event, non-decreasing times, known nodes.
    Explicit(BTreeMap<ItemId, Vec<PropagationEvent>>),
}

/// A directed follow graph overlaid with per-item information-diffusion
/// state.
///
/// Composition rather than inheritance: the owned [ActionGraph] supplies
/// node/edge storage and lookup, while this type layers the propagation
/// timelines, the action-key catalog, per-item attributes, and the
/// event-listener registry on top. The structural node/edge sets are fixed
/// after construction; only edge annotations and item attributes mutate.
///
/// The listener registry is not part of the persisted state: a snapshot
/// loaded from disk starts with no listeners registered.
#[derive(Debug, Serialize, Deserialize)]
pub struct PropagationNet {
    seed: u64,
    num_info: usize,
    graph: ActionGraph,
    catalog: ActionCatalog,
    info_to_propagation: BTreeMap<ItemId, Vec<PropagationEvent>>,
    info_to_attributes: BTreeMap<ItemId, ItemAttributes>,
    #[serde(skip)]
    listeners: ListenerSet,
}

impl PropagationNet {
    /// Builds the follow graph and the per-item diffusion timelines.
    ///
    /// Every edge is annotated with `follow = 1` at construction. With
    /// [PropagationSpec::Probability], roots and infections are drawn from a
    /// single `StdRng` seeded by `seed`; with [PropagationSpec::Explicit]
    /// the supplied sequences are validated instead. Either way, every
    /// non-root event is written back onto the graph as a
    /// `propagate_<item>` edge annotation holding the event time.
    pub fn new(
        nodes: impl IntoIterator<Item = NodeId>,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
        num_info: usize,
        propagation: PropagationSpec,
        custom_actions: &[String],
        seed: u64,
    ) -> Result<PropagationNet, CascadeError> {
        let mut graph = ActionGraph::new();
        for node in nodes {
            graph.add_node(node);
        }
        for (source, sink) in edges {
            graph.add_edge(source, sink, ActionWeights::follow());
        }

        let catalog = ActionCatalog::build(num_info, custom_actions);

        let info_to_propagation = match propagation {
            PropagationSpec::Probability(p) => {
                if !(0.0..=1.0).contains(&p) {
                    return Err(CascadeError::Custom(format!(
                        "Propagation probability must lie in [0, 1], received {p}"
                    )));
                }
                if graph.node_count() == 0 && num_info > 0 {
                    return Err(CascadeError::Custom(
                        "Cannot sample propagation roots from an empty node set".to_string(),
                    ));
                }
                let mut rng = StdRng::seed_from_u64(seed);
                let node_pool = graph.nodes();
                let max_iter = graph.node_count();
                let mut timelines = BTreeMap::new();
                for item in 0..num_info {
                    let root = *node_pool
                        .choose(&mut rng)
                        .expect("node pool checked non-empty above");
                    let events = diffuse(&graph, root, p, max_iter, &mut rng);
                    timelines.insert(item, events);
                }
                timelines
            }
            PropagationSpec::Explicit(timelines) => {
                for (&item, events) in timelines.iter() {
                    validate_timeline(&graph, num_info, item, events)?;
                }
                timelines
            }
        };

        // Temporal diffusion becomes a queryable edge attribute alongside
        // `follow`: each non-root event annotates its (parent, node) edge.
        for (&item, events) in info_to_propagation.iter() {
            for event in events.iter().skip(1) {
                if let Some(parent) = event.parent {
                    graph.add_action(parent, event.node, ActionKey::propagate(item), event.time);
                }
            }
        }

        let info_to_attributes = info_to_propagation
            .keys()
            .map(|&item| (item, ItemAttributes::default()))
            .collect();

        Ok(PropagationNet {
            seed,
            num_info,
            graph,
            catalog,
            info_to_propagation,
            info_to_attributes,
            listeners: ListenerSet::default(),
        })
    }

    // Data Methods

    /// Produces the `N×N` matrix of `action_key` annotations, with cell
    /// `(u, v)` holding the edge weight or `0`. With `time_stamp`, cells
    /// whose weight exceeds the stamp are zeroed (values equal to the stamp
    /// are retained). With `binary`, collapses to a 0/1 existence matrix.
    ///
    /// Panics if `action_key` is not in the registered catalog.
    pub fn get_action_matrix(
        &self,
        action_key: &ActionKey,
        time_stamp: Option<f64>,
        binary: bool,
    ) -> Array2<f64> {
        assert!(
            self.catalog.contains(action_key),
            "unregistered action key: {action_key}"
        );
        let n = self.graph.node_count();
        let mut matrix = Array2::zeros((n, n));
        for (source, sink, weights) in self.graph.edges() {
            if let Some(weight) = weights.get(action_key) {
                if time_stamp.is_none_or(|ts| weight <= ts) {
                    let i = self
                        .graph
                        .node_position(source)
                        .expect("edge endpoints are graph nodes");
                    let j = self
                        .graph
                        .node_position(sink)
                        .expect("edge endpoints are graph nodes");
                    matrix[[i, j]] = weight;
                }
            }
        }
        if binary {
            matrix.mapv(|v| if v != 0.0 { 1.0 } else { 0.0 })
        } else {
            matrix
        }
    }

    // Propagation Methods

    /// Replays every stored timeline in item order, invoking the
    /// [EventKind::Propagate] listeners for each event (the synthetic root
    /// event included). The engine mutates no state of its own during
    /// replay; a listener error aborts the replay and propagates.
    pub fn simulate_propagation(&mut self) -> Result<(), CascadeError> {
        // The registry is moved out for the duration of the replay so
        // listeners can borrow the engine immutably while running FnMut.
        let mut listeners = std::mem::take(&mut self.listeners);
        let mut result = Ok(());
        'replay: for (&item, events) in self.info_to_propagation.iter() {
            for event in events {
                if let Err(err) = listeners.emit(EventKind::Propagate, self, event, item) {
                    result = Err(err);
                    break 'replay;
                }
            }
        }
        self.listeners = listeners;
        result
    }

    /// The maximum final event time across all items, or `None` when no
    /// timelines exist.
    pub fn last_propagation_time(&self) -> Option<f64> {
        self.info_to_propagation
            .values()
            .filter_map(|events| events.last().map(|event| event.time))
            .fold(None, |acc, t| Some(acc.map_or(t, |m: f64| m.max(t))))
    }

    /// Per-item root nodes, in item order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.info_to_propagation
            .values()
            .filter_map(|events| events.first().map(|event| event.node))
            .collect()
    }

    pub fn propagation(&self, item: ItemId) -> Option<&[PropagationEvent]> {
        self.info_to_propagation.get(&item).map(Vec::as_slice)
    }

    pub fn propagations(&self) -> impl Iterator<Item = (ItemId, &[PropagationEvent])> {
        self.info_to_propagation
            .iter()
            .map(|(&item, events)| (item, events.as_slice()))
    }

    // Attributes Manipulation Methods

    /// Annotates edge `(source, sink)` with `action_key = value`, inserting
    /// the edge if necessary.
    ///
    /// Panics if `action_key` is not in the registered catalog.
    pub fn add_action(&mut self, source: NodeId, sink: NodeId, action_key: ActionKey, value: f64) {
        assert!(
            self.catalog.contains(&action_key),
            "unregistered action key: {action_key}"
        );
        self.graph.add_action(source, sink, action_key, value);
    }

    pub fn get_info_attr<T: serde::de::DeserializeOwned>(
        &self,
        item: ItemId,
        attr: &str,
    ) -> Option<T> {
        self.info_to_attributes.get(&item)?.get(attr)
    }

    /// The full attribute table for `item`.
    pub fn info_attributes(&self, item: ItemId) -> Option<&ItemAttributes> {
        self.info_to_attributes.get(&item)
    }

    pub fn set_info_attr<T: serde::Serialize>(
        &mut self,
        item: ItemId,
        attr: &str,
        value: T,
    ) -> Result<(), CascadeError> {
        let attributes = self
            .info_to_attributes
            .get_mut(&item)
            .ok_or_else(|| CascadeError::NotFound(format!("No attributes for item {item}")))?;
        attributes.set(attr, value)?;
        Ok(())
    }

    /// All edges carrying the `action_key` annotation.
    pub fn edges_with_action(&self, action_key: &ActionKey) -> Vec<(NodeId, NodeId)> {
        self.graph.edges_with_action(action_key)
    }

    // Event Listener Methods

    /// Registers `callback` for `kind` events during replay. Registration
    /// is append-only; bound state is captured by the closure.
    pub fn add_event_listener<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&PropagationNet, &PropagationEvent, ItemId) -> Result<(), CascadeError> + 'static,
    {
        let boxed: PropagationCallback = Box::new(callback);
        self.listeners.add(kind, boxed);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.count(kind)
    }

    // Graph Accessors

    pub fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        self.graph.predecessors(node)
    }

    pub fn predecessors_with_action(&self, node: NodeId, action_key: &ActionKey) -> Vec<NodeId> {
        self.graph.predecessors_with_action(node, action_key)
    }

    pub fn out_neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.graph.out_neighbors(node)
    }

    /// All nodes in insertion order, which is the matrix row/column order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.graph.nodes()
    }

    /// The dense matrix row/column of `node`.
    pub fn node_index(&self, node: NodeId) -> Option<usize> {
        self.graph.node_position(node)
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn num_info(&self) -> usize {
        self.num_info
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn actions(&self) -> &ActionCatalog {
        &self.catalog
    }

    // Util Methods

    /// Descriptive snapshot title encoding item count, node count, edge
    /// count, and seed.
    pub fn title(&self) -> String {
        format!(
            "num_info_{}_nodes_{}_edges_{}_seed_{}",
            self.num_info,
            self.graph.node_count(),
            self.graph.edge_count(),
            self.seed
        )
    }

    // Persistence

    /// Serializes the full engine state to
    /// `<dir>/<file_prefix>_<title>.bin`, writing through a temporary path
    /// so a partial write is never left under the final name. Returns the
    /// written path.
    pub fn dump(&self, file_prefix: &str, dir: impl AsRef<Path>) -> Result<PathBuf, CascadeError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}_{}.{}", file_prefix, self.title(), SNAPSHOT_EXT));
        let bytes = bincode::serialize(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        tracing::info!("Dump: {}", path.display());
        Ok(path)
    }

    /// Loads a snapshot by exact file name; on failure, falls back to the
    /// lexicographically last file in `dir` matching
    /// `<file_name_or_prefix>*.bin`. If the fallback finds no candidate the
    /// original error propagates.
    pub fn load(
        file_name_or_prefix: &str,
        dir: impl AsRef<Path>,
    ) -> Result<PropagationNet, CascadeError> {
        let dir = dir.as_ref();
        let exact = dir.join(file_name_or_prefix);
        match read_snapshot(&exact) {
            Ok(net) => {
                tracing::info!("Load: {}", exact.display());
                Ok(net)
            }
            Err(exact_err) => {
                let suffix = format!(".{SNAPSHOT_EXT}");
                let mut names: Vec<String> = fs::read_dir(dir)?
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .filter(|name| name.starts_with(file_name_or_prefix) && name.ends_with(&suffix))
                    .collect();
                names.sort();
                match names.last() {
                    Some(name) => {
                        let path = dir.join(name);
                        let net = read_snapshot(&path)?;
                        tracing::info!("Load: {}", path.display());
                        Ok(net)
                    }
                    None => Err(exact_err),
                }
            }
        }
    }
}

impl Display for PropagationNet {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

fn read_snapshot(path: &Path) -> Result<PropagationNet, CascadeError> {
    let bytes = fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Probabilistic diffusion from `root`. At each iteration every infected
/// node may infect each not-yet-infected out-neighbor with probability `p`;
/// the walk halts when an iteration infects nobody or after `max_iter`
/// rounds. Event times are iteration indices; the root event carries time 0.
fn diffuse(
    graph: &ActionGraph,
    root: NodeId,
    p: f64,
    max_iter: usize,
    rng: &mut StdRng,
) -> Vec<PropagationEvent> {
    let mut events = vec![PropagationEvent::root(0.0, root)];
    let mut infected = BTreeSet::from([root]);
    for t in 1..=max_iter {
        let mut round: Vec<(NodeId, NodeId)> = Vec::new();
        let mut round_nodes: BTreeSet<NodeId> = BTreeSet::new();
        for &parent in infected.iter() {
            for node in graph.out_neighbors(parent) {
                if infected.contains(&node) || round_nodes.contains(&node) {
                    continue;
                }
                if rng.gen::<f64>() < p {
                    round.push((parent, node));
                    round_nodes.insert(node);
                }
            }
        }
        if round.is_empty() {
            break;
        }
        for (parent, node) in round {
            infected.insert(node);
            events.push(PropagationEvent::new(t as f64, parent, node));
        }
    }
    events
}

/// Explicit timelines must satisfy the stored-sequence invariants before
/// they are adopted: a known item id, exactly one leading root event,
/// non-decreasing times, and endpoints drawn from the constructed node set.
fn validate_timeline(
    graph: &ActionGraph,
    num_info: usize,
    item: ItemId,
    events: &[PropagationEvent],
) -> Result<(), CascadeError> {
    if item >= num_info {
        return Err(CascadeError::Propagation {
            item,
            reason: format!("item id out of range (num_info = {num_info})"),
        });
    }
    let root = events.first().ok_or_else(|| CascadeError::Propagation {
        item,
        reason: "empty event sequence".to_string(),
    })?;
    if !root.is_root() {
        return Err(CascadeError::Propagation {
            item,
            reason: "first event must be the synthetic root marker".to_string(),
        });
    }
    let mut prev_time = root.time;
    for event in events.iter().skip(1) {
        if event.is_root() {
            return Err(CascadeError::Propagation {
                item,
                reason: "root marker may only appear first".to_string(),
            });
        }
        if event.time < prev_time {
            return Err(CascadeError::Propagation {
                item,
                reason: format!(
                    "event times must be non-decreasing ({} after {})",
                    event.time, prev_time
                ),
            });
        }
        prev_time = event.time;
        for endpoint in [event.parent.expect("checked non-root above"), event.node] {
            if !graph.contains_node(endpoint) {
                return Err(CascadeError::Propagation {
                    item,
                    reason: format!("unknown node {endpoint}"),
                });
            }
        }
    }
    if !graph.contains_node(root.node) {
        return Err(CascadeError::Propagation {
            item,
            reason: format!("unknown root node {}", root.node),
        });
    }
    Ok(())
}
