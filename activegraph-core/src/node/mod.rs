//! C5: the node runtime. Every node kind implements the same contract
//! (`ActiveNode`) and shares the bookkeeping in [`NodeCore`]: current
//! value/fault storage, the subscriber set, and change notification.
//!
//! Recomputation always re-reads a child's *current* `value()`/`fault()`
//! rather than a separately cached copy (§4.5 intro), so a node only needs
//! to remember which children it is currently subscribed to, not their last
//! observed values.

use crate::expr::ExprNode;
use crate::fault::Fault;
use crate::value::{Listener, ListenerId, ObjectRef, Value, ValueType};
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};
use triomphe::Arc as TArc;

pub mod array;
pub mod binary;
pub mod coalesce;
pub mod compiler;
pub mod conditional;
pub mod constant;
pub mod construct;
pub mod index;
pub mod invoke;
pub mod logical;
pub mod member;
pub mod method_call;
pub mod parameter;
pub mod type_is;
pub mod unary;

/// A strong reference to a live runtime node, as held by a parent node or a
/// consumer handle (§3 "Ownership": strong from parents/consumers, weak
/// from the cache).
pub type NodeRef = Arc<dyn ActiveNode>;

/// The set of source objects a node currently holds live subscriptions on.
/// Used for the teardown invariant (§8 "Teardown") and for diagnostics.
#[derive(Debug, Default)]
pub struct Refs {
    pub objects: Vec<ObjectRef>,
}

/// The per-node contract (C5). All methods are safe to call concurrently;
/// implementations guard their own state and never call back into another
/// node's lock while holding their own (§5).
pub trait ActiveNode: fmt::Debug + Send + Sync {
    fn current_value(&self) -> Option<Value>;
    fn current_fault(&self) -> Option<Fault>;
    fn typ(&self) -> ValueType;
    fn spec(&self) -> &TArc<ExprNode>;
    fn subscribe(&self, listener: Listener) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
    /// Source objects this node currently holds a live subscription on
    /// (own plus, transitively, its currently-active children).
    fn refs(&self, out: &mut Refs);
    /// This node's currently-subscribed structural children, for C9's
    /// per-subexpression rendering (`render::render_node`). A short-circuit
    /// node kind (`Conditional`/`Coalesce`/`AndAlso`/`OrElse`) reports only
    /// whichever children it is presently subscribed to; a leaf reports
    /// none.
    fn children(&self) -> Vec<NodeRef> {
        Vec::new()
    }
}

/// Shared value/fault storage and subscriber set embedded in every
/// concrete node. `value`/`fault` observe invariant 1 (§3): exactly one is
/// ever meaningful at rest, the other takes the type default / absent.
pub struct NodeCore {
    state: Mutex<CoreState>,
    listeners: Mutex<rustc_hash_map::FxHashMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
}

struct CoreState {
    value: Option<Value>,
    fault: Option<Fault>,
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state.lock();
        f.debug_struct("NodeCore")
            .field("value", &s.value)
            .field("fault", &s.fault)
            .finish()
    }
}

impl NodeCore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoreState { value: None, fault: None }),
            listeners: Mutex::new(Default::default()),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn value(&self) -> Option<Value> {
        self.state.lock().value.clone()
    }

    pub fn fault(&self) -> Option<Fault> {
        self.state.lock().fault.clone()
    }

    /// Set the node's resting state and, if it differs from the previous
    /// one, notify subscribers. Returns whether a notification fired.
    /// Listener callbacks run with no lock held (§5: snapshot before
    /// firing, never call out while holding the node's own lock).
    pub fn set(&self, value: Option<Value>, fault: Option<Fault>) -> bool {
        let changed = {
            let mut s = self.state.lock();
            let changed = s.value != value || s.fault != fault;
            if changed {
                s.value = value;
                s.fault = fault;
            }
            changed
        };
        if changed {
            self.notify();
        }
        changed
    }

    fn notify(&self) {
        let snapshot: Vec<Listener> = {
            let g = self.listeners.lock();
            g.values().cloned().collect()
        };
        for l in snapshot {
            l();
        }
    }

    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().insert(id, listener);
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }
}

/// Build a callback that, once the owning node is torn down, becomes a
/// no-op rather than a dangling call -- the standard weak-self listener
/// idiom for wiring a node to its children without a reference cycle.
pub fn weak_listener<T, F>(weak: Weak<T>, on_fire: F) -> Listener
where
    T: Send + Sync + 'static,
    F: Fn(&Arc<T>) + Send + Sync + 'static,
{
    Arc::new(move || {
        if let Some(strong) = weak.upgrade() {
            on_fire(&strong)
        }
    })
}

/// Apply the universal fault-propagation rule (§4.5): adopt the first
/// (left-to-right) fault among currently-consulted children, else `None`.
pub fn first_fault<'a, I: IntoIterator<Item = Option<&'a Fault>>>(faults: I) -> Option<Fault> {
    faults.into_iter().flatten().next().cloned()
}

/// Subscribe one shared listener to every child eagerly (used by node
/// kinds with no short-circuit, e.g. `Unary`/`Binary`/`Call`), returning
/// the per-child listener ids needed to unsubscribe on teardown.
pub fn subscribe_each(children: &[NodeRef], listener: &Listener) -> Vec<ListenerId> {
    children.iter().map(|c| c.subscribe(listener.clone())).collect()
}

pub fn unsubscribe_each(children: &[NodeRef], ids: &[ListenerId]) {
    for (c, id) in children.iter().zip(ids.iter()) {
        c.unsubscribe(*id);
    }
}

// A tiny local re-export so node submodules can write `FxHashMap` without
// every one of them depending on `fxhash` directly.
pub(crate) mod rustc_hash_map {
    pub use fxhash::FxHashMap;
}

/// A minimal, directly-settable `ActiveNode` used as a child stand-in in
/// each node kind's own unit tests, so those tests can drive fault/value
/// transitions without compiling a full expression tree.
#[cfg(test)]
pub(crate) mod test_support {
    use super::{ActiveNode, NodeCore, Refs};
    use crate::expr::{ExprKind, ExprNode};
    use crate::fault::Fault;
    use crate::value::{Listener, ListenerId, Value, ValueType};
    use std::sync::Arc;
    use triomphe::Arc as TArc;

    #[derive(Debug)]
    pub struct FakeNode {
        spec: TArc<ExprNode>,
        typ: ValueType,
        core: NodeCore,
    }

    impl FakeNode {
        pub fn new(typ: ValueType) -> Arc<Self> {
            Arc::new(Self { spec: ExprNode::new(ExprKind::Constant(Value::Null), typ), typ, core: NodeCore::new() })
        }

        pub fn settled(typ: ValueType, value: Value) -> Arc<Self> {
            let node = Self::new(typ);
            node.set(Some(value), None);
            node
        }

        pub fn faulted(typ: ValueType, fault: Fault) -> Arc<Self> {
            let node = Self::new(typ);
            node.set(None, Some(fault));
            node
        }

        /// Drive this node to a new resting state, firing subscribers if it
        /// changed. Returns whether a notification fired.
        pub fn set(&self, value: Option<Value>, fault: Option<Fault>) -> bool {
            self.core.set(value, fault)
        }
    }

    impl ActiveNode for FakeNode {
        fn current_value(&self) -> Option<Value> {
            self.core.value()
        }
        fn current_fault(&self) -> Option<Fault> {
            self.core.fault()
        }
        fn typ(&self) -> ValueType {
            self.typ
        }
        fn spec(&self) -> &TArc<ExprNode> {
            &self.spec
        }
        fn subscribe(&self, listener: Listener) -> ListenerId {
            self.core.subscribe(listener)
        }
        fn unsubscribe(&self, id: ListenerId) {
            self.core.unsubscribe(id)
        }
        fn refs(&self, _out: &mut Refs) {}
    }
}
