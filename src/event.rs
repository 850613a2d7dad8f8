//! Event-listener protocol for propagation replay.
//!
//! Listeners are side-effecting callbacks registered on a
//! [crate::propagation::PropagationNet] and invoked synchronously while
//! [crate::propagation::PropagationNet::simulate_propagation] replays the
//! stored diffusion timelines. Registration is append-only; there is no
//! removal API. Callback-bound state is captured by the closure itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};

use crate::{
    error::CascadeError,
    propagation::PropagationNet,
    properties::{ItemId, PropagationEvent},
};

/// The event types a listener may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// One stored diffusion event, replayed in item order then event order.
    Propagate,
}

/// Callback signature for propagation listeners. Returning an error aborts
/// the replay and propagates to the caller.
pub type PropagationCallback =
    Box<dyn FnMut(&PropagationNet, &PropagationEvent, ItemId) -> Result<(), CascadeError>>;

/// Append-only registry of listeners, keyed by [EventKind]. Invocation order
/// within a kind is registration order.
#[derive(Default)]
pub struct ListenerSet {
    listeners: BTreeMap<EventKind, Vec<PropagationCallback>>,
}

impl ListenerSet {
    pub fn add(&mut self, kind: EventKind, callback: PropagationCallback) {
        self.listeners.entry(kind).or_default().push(callback);
    }

    /// Invokes every listener registered for `kind`, in registration order.
    pub fn emit(
        &mut self,
        kind: EventKind,
        net: &PropagationNet,
        event: &PropagationEvent,
        item: ItemId,
    ) -> Result<(), CascadeError> {
        if let Some(callbacks) = self.listeners.get_mut(&kind) {
            for callback in callbacks.iter_mut() {
                callback(net, event, item)?;
            }
        }
        Ok(())
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }
}

impl Debug for ListenerSet {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let counts: BTreeMap<&EventKind, usize> = self
            .listeners
            .iter()
            .map(|(kind, callbacks)| (kind, callbacks.len()))
            .collect();
        f.debug_struct("ListenerSet").field("counts", &counts).finish()
    }
}
