/// [crate::properties] contains the basic building blocks for assembling and manipulating
/// [crate::propagation::PropagationNet]s and the datasets derived from them.
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
};
use toml::Table;

use crate::error::CascadeError;

/// Identifier for one information item whose diffusion is tracked. Items are
/// numbered `0..num_info` at engine construction and never renumbered.
pub type ItemId = usize;

/// Weight recorded on every `follow` edge at construction.
pub const FOLLOW_WEIGHT: f64 = 1.0;

/// A node identifier within a [crate::propagation::PropagationNet].
///
/// Opaque to the engine; the dense matrix row/column of a node is its
/// insertion order at construction, not the `NodeId` value itself.
#[repr(transparent)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(src: u32) -> NodeId {
        NodeId(src)
    }
}

/// [ActionKind] identifies what type of node to node relationship an edge
/// annotation represents. `Follow` is structural (set on every edge at
/// construction), `Propagate` records diffusion events, and `Custom` covers
/// caller-registered action families (e.g. `retweet`, `like`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Follow,
    Propagate,
    Custom(String),
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ActionKind::Follow => write!(f, "follow"),
            ActionKind::Propagate => write!(f, "propagate"),
            ActionKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// [ActionKey] is a named edge-weight channel: an [ActionKind] plus the item
/// it is scoped to, if any. `follow` carries no item; every `propagate` and
/// custom action is tracked per item.
///
/// The `Display` form matches the legacy string convention
/// (`follow`, `propagate_3`, `retweet_0`) and is what appears in logs and
/// snapshot titles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionKey {
    pub kind: ActionKind,
    pub item: Option<ItemId>,
}

impl ActionKey {
    pub fn follow() -> ActionKey {
        ActionKey {
            kind: ActionKind::Follow,
            item: None,
        }
    }

    pub fn propagate(item: ItemId) -> ActionKey {
        ActionKey {
            kind: ActionKind::Propagate,
            item: Some(item),
        }
    }

    pub fn custom(name: impl Into<String>, item: ItemId) -> ActionKey {
        ActionKey {
            kind: ActionKind::Custom(name.into()),
            item: Some(item),
        }
    }
}

impl Display for ActionKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.item {
            Some(item) => write!(f, "{}_{}", self.kind, item),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl TryFrom<&str> for ActionKey {
    type Error = CascadeError;

    /// Parses the legacy string form. A trailing `_<n>` is read as the item
    /// id; a bare `follow` is the structural key.
    fn try_from(src: &str) -> Result<ActionKey, CascadeError> {
        if src == "follow" {
            return Ok(ActionKey::follow());
        }
        let (name, item) = match src.rsplit_once('_') {
            Some((name, digits)) if !name.is_empty() => match digits.parse::<ItemId>() {
                Ok(item) => (name, item),
                Err(_) => {
                    return Err(CascadeError::Custom(format!(
                        "Invalid str for ActionKey. Received {src}. Expected '<kind>_<item>' with a numeric item id"
                    )))
                }
            },
            _ => {
                return Err(CascadeError::Custom(format!(
                    "Invalid str for ActionKey. Received {src}. Expected 'follow' or '<kind>_<item>'"
                )))
            }
        };
        match name {
            "propagate" => Ok(ActionKey::propagate(item)),
            custom => Ok(ActionKey::custom(custom, item)),
        }
    }
}

/// [ActionCatalog] is the explicit set of action keys a
/// [crate::propagation::PropagationNet] will answer matrix queries for.
/// Built once at construction: `follow`, one `propagate_<i>` per item, and
/// one `<custom>_<i>` per registered custom kind and item. Membership is
/// checked against this set instead of string prefix conventions.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCatalog(BTreeSet<ActionKey>);

impl ActionCatalog {
    pub fn build(num_info: usize, custom_kinds: &[String]) -> ActionCatalog {
        let mut keys = BTreeSet::new();
        keys.insert(ActionKey::follow());
        for item in 0..num_info {
            keys.insert(ActionKey::propagate(item));
        }
        for kind in custom_kinds {
            for item in 0..num_info {
                keys.insert(ActionKey::custom(kind.clone(), item));
            }
        }
        ActionCatalog(keys)
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.0.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ActionKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// [ActionWeights] is the edge data structure used within a
/// [crate::propagation::ActionGraph]. Each edge carries zero or more action
/// annotations simultaneously, keyed by [ActionKey], where the weight value
/// is the timestamp at which that action occurred on the edge.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionWeights {
    pub weights: BTreeMap<ActionKey, f64>,
}

impl ActionWeights {
    pub fn empty() -> ActionWeights {
        ActionWeights {
            weights: BTreeMap::new(),
        }
    }

    /// A weight set carrying only the structural `follow` annotation.
    pub fn follow() -> ActionWeights {
        let mut weights = ActionWeights::empty();
        weights.set(ActionKey::follow(), FOLLOW_WEIGHT);
        weights
    }

    pub fn get(&self, key: &ActionKey) -> Option<f64> {
        self.weights.get(key).copied()
    }

    /// Inserts or overwrites the annotation for `key`.
    pub fn set(&mut self, key: ActionKey, value: f64) {
        self.weights.insert(key, value);
    }

    pub fn contains(&self, key: &ActionKey) -> bool {
        self.weights.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// A single diffusion event: `node` became infected via `parent` at `time`.
/// The synthetic root event that opens every item sequence has
/// `parent == None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropagationEvent {
    pub time: f64,
    pub parent: Option<NodeId>,
    pub node: NodeId,
}

impl PropagationEvent {
    pub fn new(time: f64, parent: NodeId, node: NodeId) -> PropagationEvent {
        PropagationEvent {
            time,
            parent: Some(parent),
            node,
        }
    }

    pub fn root(time: f64, node: NodeId) -> PropagationEvent {
        PropagationEvent {
            time,
            parent: None,
            node,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl Display for PropagationEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "({}, {}, {})", self.time, parent, self.node),
            None => write!(f, "({}, ROOT, {})", self.time, self.node),
        }
    }
}

/// [ItemAttributes] holds the free-form per-item attribute payload, mutated
/// externally through the engine's accessor methods. All metadata is stored
/// in a TOML table so listeners can attach arbitrary typed values.
///
/// Serialized as its TOML string form, so the payload survives
/// non-self-describing formats like the binary snapshot encoding.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ItemAttributes {
    /// An arbitrary data payload for the item, represented as a TOML table.
    pub payload: Table,
}

impl serde::Serialize for ItemAttributes {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let text = toml::to_string(&self.payload).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> serde::Deserialize<'de> for ItemAttributes {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let payload = toml::from_str(&text).map_err(serde::de::Error::custom)?;
        Ok(ItemAttributes { payload })
    }
}

impl ItemAttributes {
    /// Get a typed value from the payload by key
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.payload
            .get(key)
            .and_then(|v| v.clone().try_into().ok())
    }

    /// Set a key-value pair in the payload
    pub fn set<T: serde::Serialize>(
        &mut self,
        key: &str,
        value: T,
    ) -> Result<(), toml::ser::Error> {
        let value_toml = toml::Value::try_from(value)?;
        self.payload.insert(key.to_string(), value_toml);
        Ok(())
    }

    /// Check if payload contains a key
    pub fn contains_key(&self, key: &str) -> bool {
        self.payload.contains_key(key)
    }
}
