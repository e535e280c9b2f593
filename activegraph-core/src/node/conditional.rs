//! §4.5.6 Conditional. `test` is subscribed eagerly and permanently; the
//! active branch is subscribed only while selected, moving the subscription
//! transactionally (subscribe new branch, recompute, then unsubscribe the
//! old one) so a listener fired during the switch never observes neither
//! branch subscribed.

use super::{weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::ExprNode;
use crate::fault::Fault;
use crate::value::{ListenerId, Value, ValueType};
use parking_lot::Mutex;
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct ConditionalNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    test: NodeRef,
    if_true: NodeRef,
    if_false: NodeRef,
    core: NodeCore,
    test_listener: ListenerId,
    branch: Mutex<BranchWiring>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    True,
    False,
}

struct BranchWiring {
    current: Option<(Branch, ListenerId)>,
}

impl std::fmt::Debug for BranchWiring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchWiring").field("current", &self.current.map(|(b, _)| b)).finish()
    }
}

impl ConditionalNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        test: NodeRef,
        if_true: NodeRef,
        if_false: NodeRef,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<ConditionalNode>| n.recompute());
            let test_listener = test.subscribe(listener);
            Self {
                spec,
                typ,
                test,
                if_true,
                if_false,
                core: NodeCore::new(),
                test_listener,
                branch: Mutex::new(BranchWiring { current: None }),
            }
        });
        node.rewire(None);
        node.recompute();
        node
    }

    fn selected_branch(&self) -> Option<Branch> {
        if self.test.current_fault().is_some() {
            return None;
        }
        match self.test.current_value() {
            Some(Value::Bool(true)) => Some(Branch::True),
            Some(Value::Bool(false)) => Some(Branch::False),
            _ => None,
        }
    }

    fn branch_node(&self, b: Branch) -> &NodeRef {
        match b {
            Branch::True => &self.if_true,
            Branch::False => &self.if_false,
        }
    }

    /// Self is passed as `Arc<Self>` so the branch listener can be wired via
    /// a weak-self callback identical to the node's own change listener.
    fn rewire(self: &Arc<Self>, wanted: Option<Branch>) {
        let wanted = wanted.or_else(|| self.selected_branch());
        let mut wiring = self.branch.lock();
        if wiring.current.map(|(b, _)| b) == wanted {
            return;
        }
        let new_sub = wanted.map(|b| {
            let listener = weak_listener(Arc::downgrade(self), |n: &Arc<ConditionalNode>| n.recompute());
            (b, self.branch_node(b).subscribe(listener))
        });
        if let Some((old_b, old_id)) = wiring.current.take() {
            self.branch_node(old_b).unsubscribe(old_id);
        }
        wiring.current = new_sub;
    }

    fn recompute(self: &Arc<Self>) {
        let selected = self.selected_branch();
        self.rewire(selected);

        let (value, fault) = if let Some(f) = self.test.current_fault() {
            (None, Some(f))
        } else {
            match selected {
                None => (None, None),
                Some(b) => {
                    let node = self.branch_node(b);
                    match node.current_fault() {
                        Some(f) => (None, Some(f)),
                        None => (node.current_value(), None),
                    }
                }
            }
        };
        self.core.set(value, fault);
    }
}

impl ActiveNode for ConditionalNode {
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
        self.test.refs(out);
        if let Some((b, _)) = self.branch.lock().current {
            self.branch_node(b).refs(out);
        }
    }
    fn children(&self) -> Vec<NodeRef> {
        let mut v = vec![self.test.clone()];
        if let Some((b, _)) = self.branch.lock().current {
            v.push(self.branch_node(b).clone());
        }
        v
    }
}

impl Drop for ConditionalNode {
    fn drop(&mut self) {
        self.test.unsubscribe(self.test_listener);
        if let Some((b, id)) = self.branch.get_mut().current.take() {
            match b {
                Branch::True => self.if_true.unsubscribe(id),
                Branch::False => self.if_false.unsubscribe(id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::FakeNode;

    fn spec() -> TArc<ExprNode> {
        ExprNode::new(crate::expr::ExprKind::Constant(Value::Null), ValueType::I64)
    }

    fn build(test: NodeRef, if_true: NodeRef, if_false: NodeRef) -> Arc<ConditionalNode> {
        ConditionalNode::new(spec(), ValueType::I64, test, if_true, if_false)
    }

    #[test]
    fn picks_true_branch_without_reading_false_branch() {
        let test = FakeNode::settled(ValueType::Bool, Value::Bool(true));
        let if_true = FakeNode::settled(ValueType::I64, Value::I64(1));
        let if_false = FakeNode::new(ValueType::I64);
        let n = build(test, if_true, if_false.clone());
        assert_eq!(n.current_value(), Some(Value::I64(1)));
        assert!(if_false.current_value().is_none());
    }

    #[test]
    fn non_bool_test_value_leaves_node_pending() {
        let test = FakeNode::settled(ValueType::Any, Value::Null);
        let if_true = FakeNode::settled(ValueType::I64, Value::I64(1));
        let if_false = FakeNode::settled(ValueType::I64, Value::I64(2));
        let n = build(test, if_true, if_false);
        assert_eq!(n.current_value(), None);
        assert_eq!(n.current_fault(), None);
    }

    #[test]
    fn test_fault_propagates_without_picking_a_branch() {
        let test = FakeNode::faulted(ValueType::Bool, Fault::NullTarget { member: "t".into() });
        let if_true = FakeNode::new(ValueType::I64);
        let if_false = FakeNode::new(ValueType::I64);
        let n = build(test, if_true.clone(), if_false.clone());
        assert!(matches!(n.current_fault(), Some(Fault::NullTarget { .. })));
        assert!(if_true.current_value().is_none());
        assert!(if_false.current_value().is_none());
    }

    #[test]
    fn recovers_and_switches_branch_when_test_changes() {
        let test = FakeNode::settled(ValueType::Bool, Value::Bool(false));
        let if_true = FakeNode::settled(ValueType::I64, Value::I64(1));
        let if_false = FakeNode::settled(ValueType::I64, Value::I64(2));
        let n = build(test.clone(), if_true.clone(), if_false.clone());
        assert_eq!(n.current_value(), Some(Value::I64(2)));

        test.set(Some(Value::Bool(true)), None);
        assert_eq!(n.current_value(), Some(Value::I64(1)));

        // Now that the false branch is no longer subscribed, a change on
        // it must not affect the node.
        if_false.set(Some(Value::I64(99)), None);
        assert_eq!(n.current_value(), Some(Value::I64(1)));
    }
}
