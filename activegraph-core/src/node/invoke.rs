//! §4.5.10 Invoke: a quoted lambda invocation, `(|params| body)(args...)`.
//! There is no delegate `Value` variant in this engine's closed value set
//! (§9 Open Questions), so the only supported invocation target is a
//! quoted `Lambda` compiled in place by C4: `body` is compiled once with
//! the lambda's parameter ordinals bound to the freshly compiled `args`
//! nodes, and this node is a thin forwarding proxy over the resulting
//! subtree so it still occupies its own place in the graph (its own
//! `spec`, its own subscriber set).

use super::{weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::ExprNode;
use crate::fault::Fault;
use crate::value::{ListenerId, Value, ValueType};
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct InvokeNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    body: NodeRef,
    core: NodeCore,
    body_listener: ListenerId,
}

impl InvokeNode {
    pub fn new(spec: TArc<ExprNode>, typ: ValueType, body: NodeRef) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<InvokeNode>| n.recompute());
            let body_listener = body.subscribe(listener);
            Self { spec, typ, body, core: NodeCore::new(), body_listener }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        self.core.set(self.body.current_value(), self.body.current_fault());
    }
}

impl ActiveNode for InvokeNode {
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
        self.body.refs(out);
    }
    fn children(&self) -> Vec<NodeRef> {
        vec![self.body.clone()]
    }
}

impl Drop for InvokeNode {
    fn drop(&mut self) {
        self.body.unsubscribe(self.body_listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::FakeNode;

    fn spec() -> TArc<ExprNode> {
        ExprNode::new(crate::expr::ExprKind::Constant(Value::Null), ValueType::I64)
    }

    #[test]
    fn forwards_body_value() {
        let body = FakeNode::settled(ValueType::I64, Value::I64(4));
        let n = InvokeNode::new(spec(), ValueType::I64, body);
        assert_eq!(n.current_value(), Some(Value::I64(4)));
    }

    #[test]
    fn forwards_body_fault() {
        let body = FakeNode::faulted(ValueType::I64, Fault::NullTarget { member: "x".into() });
        let n = InvokeNode::new(spec(), ValueType::I64, body);
        assert!(matches!(n.current_fault(), Some(Fault::NullTarget { .. })));
    }

    #[test]
    fn own_subscribers_fire_when_body_recomputes() {
        let body = FakeNode::settled(ValueType::I64, Value::I64(1));
        let n = InvokeNode::new(spec(), ValueType::I64, body.clone());
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let fired2 = fired.clone();
        n.subscribe(Arc::new(move || fired2.store(true, std::sync::atomic::Ordering::SeqCst)));

        body.set(Some(Value::I64(2)), None);
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(n.current_value(), Some(Value::I64(2)));
    }
}
