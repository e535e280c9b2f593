//! §4.5.8 AndAlso/OrElse: short-circuit both value and fault. `right` is
//! subscribed only while `left`'s current value doesn't already decide the
//! result (i.e. `left` is `false` for `AndAlso`, `true` for `OrElse`).

use super::{weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::ExprNode;
use crate::fault::Fault;
use crate::value::{ListenerId, Value, ValueType};
use parking_lot::Mutex;
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    AndAlso,
    OrElse,
}

#[derive(Debug)]
pub struct LogicalNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    op: LogicalOp,
    left: NodeRef,
    right: NodeRef,
    core: NodeCore,
    left_listener: ListenerId,
    right_sub: Mutex<Option<ListenerId>>,
}

impl LogicalNode {
    pub fn new(spec: TArc<ExprNode>, typ: ValueType, op: LogicalOp, left: NodeRef, right: NodeRef) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<LogicalNode>| n.recompute());
            let left_listener = left.subscribe(listener);
            Self { spec, typ, op, left, right, core: NodeCore::new(), left_listener, right_sub: Mutex::new(None) }
        });
        node.rewire(false);
        node.recompute();
        node
    }

    /// The left value that, by itself, already determines the result
    /// (`false` short-circuits `AndAlso`, `true` short-circuits `OrElse`).
    fn deciding_value(&self) -> bool {
        matches!(self.op, LogicalOp::AndAlso)
    }

    fn needs_right(&self) -> bool {
        if self.left.current_fault().is_some() {
            return false;
        }
        match self.left.current_value() {
            Some(Value::Bool(b)) => b != self.deciding_value(),
            _ => false,
        }
    }

    fn rewire(self: &Arc<Self>, wanted: bool) {
        let mut sub = self.right_sub.lock();
        if sub.is_some() == wanted {
            return;
        }
        if wanted {
            let listener = weak_listener(Arc::downgrade(self), |n: &Arc<LogicalNode>| n.recompute());
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
                Some(Value::Bool(b)) if b == self.deciding_value() => (Some(Value::Bool(b)), None),
                Some(Value::Bool(_)) => match self.right.current_fault() {
                    Some(f) => (None, Some(f)),
                    None => (self.right.current_value(), None),
                },
                Some(_) => (None, None),
            },
        };
        self.core.set(value, fault);
    }
}

impl ActiveNode for LogicalNode {
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

impl Drop for LogicalNode {
    fn drop(&mut self) {
        self.left.unsubscribe(self.left_listener);
        if let Some(id) = self.right_sub.get_mut().take() {
            self.right.unsubscribe(id);
        }
    }
}
