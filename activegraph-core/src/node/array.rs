//! §4.5.11 NewArrayInit: a fixed-size array literal. All elements are
//! eagerly subscribed; the result is a `Value::Array` snapshot rebuilt
//! whenever any element changes.

use super::{subscribe_each, unsubscribe_each, weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::ExprNode;
use crate::fault::Fault;
use crate::value::{ListenerId, Value, ValueType};
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct ArrayNode {
    spec: TArc<ExprNode>,
    elements: Vec<NodeRef>,
    core: NodeCore,
    element_listeners: Vec<ListenerId>,
}

impl ArrayNode {
    /// `element_type` is carried in `spec` (`ExprKind::NewArrayInit`'s
    /// first field) and not duplicated here; the node itself only needs
    /// the compiled element nodes.
    pub fn new(spec: TArc<ExprNode>, elements: Vec<NodeRef>) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<ArrayNode>| n.recompute());
            let element_listeners = subscribe_each(&elements, &listener);
            Self { spec, elements, core: NodeCore::new(), element_listeners }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        let mut values = Vec::with_capacity(self.elements.len());
        for e in &self.elements {
            if let Some(f) = e.current_fault() {
                self.core.set(None, Some(f));
                return;
            }
            match e.current_value() {
                Some(v) => values.push(v),
                None => {
                    self.core.set(None, None);
                    return;
                }
            }
        }
        self.core.set(Some(Value::Array(Arc::from(values))), None);
    }
}

impl ActiveNode for ArrayNode {
    fn current_value(&self) -> Option<Value> {
        self.core.value()
    }
    fn current_fault(&self) -> Option<Fault> {
        self.core.fault()
    }
    fn typ(&self) -> ValueType {
        ValueType::Array
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
        for e in &self.elements {
            e.refs(out);
        }
    }
    fn children(&self) -> Vec<NodeRef> {
        self.elements.clone()
    }
}

impl Drop for ArrayNode {
    fn drop(&mut self) {
        unsubscribe_each(&self.elements, &self.element_listeners);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::FakeNode;

    fn spec() -> TArc<ExprNode> {
        ExprNode::new(crate::expr::ExprKind::Constant(Value::Null), ValueType::Array)
    }

    #[test]
    fn builds_array_from_settled_elements() {
        let a = FakeNode::settled(ValueType::I64, Value::I64(1));
        let b = FakeNode::settled(ValueType::I64, Value::I64(2));
        let n = ArrayNode::new(spec(), vec![a, b]);
        assert_eq!(n.current_value(), Some(Value::Array(Arc::from([Value::I64(1), Value::I64(2)]))));
    }

    #[test]
    fn pending_element_leaves_array_pending() {
        let a = FakeNode::settled(ValueType::I64, Value::I64(1));
        let b = FakeNode::new(ValueType::I64);
        let n = ArrayNode::new(spec(), vec![a, b]);
        assert_eq!(n.current_value(), None);
        assert_eq!(n.current_fault(), None);
    }

    #[test]
    fn any_element_fault_faults_the_whole_array() {
        let a = FakeNode::settled(ValueType::I64, Value::I64(1));
        let b = FakeNode::faulted(ValueType::I64, Fault::NullTarget { member: "b".into() });
        let n = ArrayNode::new(spec(), vec![a, b]);
        assert!(matches!(n.current_fault(), Some(Fault::NullTarget { .. })));
    }

    #[test]
    fn rebuilds_on_element_change() {
        let a = FakeNode::settled(ValueType::I64, Value::I64(1));
        let b = FakeNode::settled(ValueType::I64, Value::I64(2));
        let n = ArrayNode::new(spec(), vec![a, b.clone()]);
        b.set(Some(Value::I64(20)), None);
        assert_eq!(n.current_value(), Some(Value::Array(Arc::from([Value::I64(1), Value::I64(20)]))));
    }
}
