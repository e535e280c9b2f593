//! §4.5.7 Coalesce: `left ?? right`. A faulted `left` propagates directly
//! and `right` is never subscribed or consulted; `right` is subscribed
//! only while `left` currently holds `null`, moved transactionally like
//! `Conditional`'s branch.

use super::{weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::{ConversionFn, ExprNode};
use crate::fault::Fault;
use crate::value::{ListenerId, Value, ValueType};
use parking_lot::Mutex;
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct CoalesceNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    left: NodeRef,
    right: NodeRef,
    conversion: Option<ConversionFn>,
    core: NodeCore,
    left_listener: ListenerId,
    right_sub: Mutex<Option<ListenerId>>,
}

impl CoalesceNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        left: NodeRef,
        right: NodeRef,
        conversion: Option<ConversionFn>,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<CoalesceNode>| n.recompute());
            let left_listener = left.subscribe(listener);
            Self {
                spec,
                typ,
                left,
                right,
                conversion,
                core: NodeCore::new(),
                left_listener,
                right_sub: Mutex::new(None),
            }
        });
        node.rewire(false);
        node.recompute();
        node
    }

    fn needs_right(&self) -> bool {
        if self.left.current_fault().is_some() {
            return false;
        }
        matches!(self.left.current_value(), None | Some(Value::Null))
    }

    fn rewire(self: &Arc<Self>, wanted: bool) {
        let mut sub = self.right_sub.lock();
        let have = sub.is_some();
        if have == wanted {
            return;
        }
        if wanted {
            let listener = weak_listener(Arc::downgrade(self), |n: &Arc<CoalesceNode>| n.recompute());
            *sub = Some(self.right.subscribe(listener));
        } else if let Some(id) = sub.take() {
            self.right.unsubscribe(id);
        }
    }

    fn recompute(self: &Arc<Self>) {
        let wanted = self.needs_right();
        self.rewire(wanted);

        let (value, fault) = match self.left.current_fault() {
            Some(f) => (None, Some(f)),
            None => match self.left.current_value() {
                None => (None, None),
                Some(Value::Null) => match self.right.current_fault() {
                    Some(f) => (None, Some(f)),
                    None => match self.right.current_value() {
                        None => (None, None),
                        Some(r) => match self.apply_conversion(&r) {
                            Ok(v) => (Some(v), None),
                            Err(e) => (None, Some(e)),
                        },
                    },
                },
                Some(l) => (Some(l), None),
            },
        };
        self.core.set(value, fault);
    }

    /// A failing conversion surfaces whatever `Fault` the caller's
    /// `ConversionFn` closure chooses to return (typically
    /// `Fault::Conversion`) rather than this node wrapping it in one of its
    /// own -- the closure is the only place that knows why the target type
    /// was rejected.
    fn apply_conversion(&self, v: &Value) -> Result<Value, Fault> {
        match &self.conversion {
            Some(f) => (f.0)(v),
            None => Ok(v.clone()),
        }
    }
}

impl ActiveNode for CoalesceNode {
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
    fn subscribe(&self, listener: crate::value::Listener) -> ListenerId {
        self.core.subscribe(listener)
    }
    fn unsubscribe(&self, id: ListenerId) {
        self.core.unsubscribe(id)
    }
    fn refs(&self, out: &mut Refs) {
        self.left.refs(out);
        if self.right_sub.lock().is_some() {
            self.right.refs(out);
        }
    }
    fn children(&self) -> Vec<NodeRef> {
        let mut v = vec![self.left.clone()];
        if self.right_sub.lock().is_some() {
            v.push(self.right.clone());
        }
        v
    }
}

impl Drop for CoalesceNode {
    fn drop(&mut self) {
        self.left.unsubscribe(self.left_listener);
        if let Some(id) = self.right_sub.get_mut().take() {
            self.right.unsubscribe(id);
        }
    }
}
