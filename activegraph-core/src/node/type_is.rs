//! §4.5.9 TypeIs: `operand is Type`. A faulted operand propagates that
//! fault; an unfaulted operand is answered with a plain `bool`, never a
//! fault of this node's own.

use super::{unsubscribe_each, weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::convert;
use crate::expr::ExprNode;
use crate::fault::Fault;
use crate::value::{ListenerId, Value, ValueType};
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct TypeIsNode {
    spec: TArc<ExprNode>,
    target: ValueType,
    operand: NodeRef,
    core: NodeCore,
    operand_listener: ListenerId,
}

impl TypeIsNode {
    pub fn new(spec: TArc<ExprNode>, target: ValueType, operand: NodeRef) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<TypeIsNode>| n.recompute());
            let operand_listener = operand.subscribe(listener);
            Self { spec, target, operand, core: NodeCore::new(), operand_listener }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        let (value, fault) = match self.operand.current_fault() {
            Some(f) => (None, Some(f)),
            None => match self.operand.current_value() {
                Some(v) => (Some(Value::Bool(convert::is_a(&v, self.target))), None),
                None => (None, None),
            },
        };
        self.core.set(value, fault);
    }
}

impl ActiveNode for TypeIsNode {
    fn current_value(&self) -> Option<Value> {
        self.core.value()
    }
    fn current_fault(&self) -> Option<Fault> {
        self.core.fault()
    }
    fn typ(&self) -> ValueType {
        ValueType::Bool
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
        self.operand.refs(out);
    }
    fn children(&self) -> Vec<NodeRef> {
        vec![self.operand.clone()]
    }
}

impl Drop for TypeIsNode {
    fn drop(&mut self) {
        unsubscribe_each(std::slice::from_ref(&self.operand), std::slice::from_ref(&self.operand_listener));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::FakeNode;

    fn spec() -> TArc<ExprNode> {
        ExprNode::new(crate::expr::ExprKind::Constant(Value::Null), ValueType::Bool)
    }

    #[test]
    fn true_when_operand_matches() {
        let operand = FakeNode::settled(ValueType::Any, Value::I64(1));
        let n = TypeIsNode::new(spec(), ValueType::I64, operand);
        assert_eq!(n.current_value(), Some(Value::Bool(true)));
    }

    #[test]
    fn false_when_operand_does_not_match() {
        let operand = FakeNode::settled(ValueType::Any, Value::String("x".into()));
        let n = TypeIsNode::new(spec(), ValueType::I64, operand);
        assert_eq!(n.current_value(), Some(Value::Bool(false)));
    }

    #[test]
    fn faulted_operand_propagates_the_fault() {
        let operand = FakeNode::faulted(ValueType::Any, Fault::NullTarget { member: "x".into() });
        let n = TypeIsNode::new(spec(), ValueType::I64, operand);
        assert_eq!(n.current_value(), None);
        assert!(matches!(n.current_fault(), Some(Fault::NullTarget { .. })));
    }

    #[test]
    fn tracks_operand_changes() {
        let operand = FakeNode::settled(ValueType::Any, Value::Bool(true));
        let n = TypeIsNode::new(spec(), ValueType::Bool, operand.clone());
        assert_eq!(n.current_value(), Some(Value::Bool(true)));

        operand.set(Some(Value::I64(1)), None);
        assert_eq!(n.current_value(), Some(Value::Bool(false)));
    }
}
