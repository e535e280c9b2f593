//! §4.5.5 Unary. Recomputes on any child change; applies the operator or
//! the resolved user-defined method. `NegateChecked`/`ConvertChecked` use
//! overflow-checking arithmetic.

use super::{unsubscribe_each, weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::convert;
use crate::expr::{ExprNode, MethodDescriptor, UnaryOp};
use crate::fault::Fault;
use crate::value::{ListenerId, Listener, Value, ValueType};
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct UnaryNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    op: UnaryOp,
    result_type: ValueType,
    method: Option<MethodDescriptor>,
    operand: NodeRef,
    core: NodeCore,
    operand_listener: ListenerId,
}

impl UnaryNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        op: UnaryOp,
        result_type: ValueType,
        method: Option<MethodDescriptor>,
        operand: NodeRef,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<UnaryNode>| n.recompute());
            let operand_listener = operand.subscribe(listener);
            Self { spec, typ, op, result_type, method, operand, core: NodeCore::new(), operand_listener }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        let fault = self.operand.current_fault();
        let (value, fault) = match fault {
            Some(f) => (None, Some(f)),
            None => match self.operand.current_value() {
                None => (None, None),
                Some(v) => match self.apply(&v) {
                    Ok(v) => (Some(v), None),
                    Err(e) => (None, Some(e)),
                },
            },
        };
        self.core.set(value, fault);
    }

    fn apply(&self, v: &Value) -> Result<Value, Fault> {
        if let Some(method) = &self.method {
            return (method.invoke)(None, std::slice::from_ref(v));
        }
        use UnaryOp::*;
        match (self.op, v) {
            (Negate, Value::I64(i)) => Ok(Value::I64(i.wrapping_neg())),
            (Negate, Value::F64(f)) => Ok(Value::F64(-f)),
            (NegateChecked, Value::I64(i)) => i
                .checked_neg()
                .map(Value::I64)
                .ok_or_else(|| Fault::Operator { message: "negation overflowed".into() }),
            (NegateChecked, Value::F64(f)) => Ok(Value::F64(-f)),
            (UnaryPlus, Value::I64(i)) => Ok(Value::I64(*i)),
            (UnaryPlus, Value::F64(f)) => Ok(Value::F64(*f)),
            (Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (OnesComplement, Value::I64(i)) => Ok(Value::I64(!i)),
            (Increment, Value::I64(i)) => Ok(Value::I64(i.wrapping_add(1))),
            (Increment, Value::F64(f)) => Ok(Value::F64(f + 1.0)),
            (Decrement, Value::I64(i)) => Ok(Value::I64(i.wrapping_sub(1))),
            (Decrement, Value::F64(f)) => Ok(Value::F64(f - 1.0)),
            (Convert, _) => convert::convert(v, self.result_type, false),
            (ConvertChecked, _) => convert::convert(v, self.result_type, true),
            (op, v) => Err(Fault::ArgumentOutOfRange {
                operator: format!("{op:?} on {:?}", v.type_of()).into(),
            }),
        }
    }
}

impl ActiveNode for UnaryNode {
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
    fn refs(&self, out: &mut Refs) {
        self.operand.refs(out);
    }
    fn children(&self) -> Vec<NodeRef> {
        vec![self.operand.clone()]
    }
}

impl Drop for UnaryNode {
    fn drop(&mut self) {
        unsubscribe_each(std::slice::from_ref(&self.operand), std::slice::from_ref(&self.operand_listener));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::FakeNode;

    fn spec(typ: ValueType) -> TArc<ExprNode> {
        ExprNode::new(crate::expr::ExprKind::Constant(Value::Null), typ)
    }

    #[test]
    fn negate_checked_overflows_on_i64_min() {
        let operand = FakeNode::settled(ValueType::I64, Value::I64(i64::MIN));
        let node = UnaryNode::new(spec(ValueType::I64), ValueType::I64, UnaryOp::NegateChecked, ValueType::I64, None, operand);
        assert_eq!(node.current_value(), None);
        assert!(matches!(node.current_fault(), Some(Fault::Operator { .. })));
    }

    #[test]
    fn not_flips_bool_and_tracks_operand_changes() {
        let operand = FakeNode::settled(ValueType::Bool, Value::Bool(false));
        let node = UnaryNode::new(spec(ValueType::Bool), ValueType::Bool, UnaryOp::Not, ValueType::Bool, None, operand.clone());
        assert_eq!(node.current_value(), Some(Value::Bool(true)));

        operand.set(Some(Value::Bool(true)), None);
        assert_eq!(node.current_value(), Some(Value::Bool(false)));
    }

    #[test]
    fn fault_propagates_from_operand() {
        let operand = FakeNode::settled(ValueType::I64, Value::I64(1));
        let node = UnaryNode::new(spec(ValueType::I64), ValueType::I64, UnaryOp::Negate, ValueType::I64, None, operand.clone());
        assert_eq!(node.current_value(), Some(Value::I64(-1)));

        operand.set(None, Some(Fault::NullTarget { member: "x".into() }));
        assert_eq!(node.current_value(), None);
        assert!(matches!(node.current_fault(), Some(Fault::NullTarget { .. })));
    }

    #[test]
    fn user_method_overrides_builtin_operator() {
        let operand = FakeNode::settled(ValueType::I64, Value::I64(5));
        let method = MethodDescriptor {
            name: "double".into(),
            invoke: Arc::new(|_target, args| Ok(Value::I64(match &args[0] {
                Value::I64(n) => n * 2,
                _ => unreachable!(),
            }))),
        };
        let node = UnaryNode::new(spec(ValueType::I64), ValueType::I64, UnaryOp::Negate, ValueType::I64, Some(method), operand);
        assert_eq!(node.current_value(), Some(Value::I64(10)));
    }

    #[test]
    fn unsupported_combination_faults() {
        let operand = FakeNode::settled(ValueType::String, Value::String("x".into()));
        let node = UnaryNode::new(spec(ValueType::String), ValueType::String, UnaryOp::Not, ValueType::String, None, operand);
        assert!(matches!(node.current_fault(), Some(Fault::ArgumentOutOfRange { .. })));
    }
}
