//! §4.5.5 Binary. Both operands are eagerly subscribed (no short-circuit:
//! both are always needed to decide the result), left operand's fault wins
//! ties per the universal left-to-right rule.

use super::{unsubscribe_each, weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::{BinaryOp, ExprNode, MethodDescriptor};
use crate::fault::Fault;
use crate::value::{ListenerId, Value, ValueType};
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct BinaryNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    op: BinaryOp,
    method: Option<MethodDescriptor>,
    left: NodeRef,
    right: NodeRef,
    core: NodeCore,
    left_listener: ListenerId,
    right_listener: ListenerId,
}

impl BinaryNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        op: BinaryOp,
        method: Option<MethodDescriptor>,
        left: NodeRef,
        right: NodeRef,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<BinaryNode>| n.recompute());
            let left_listener = left.subscribe(listener.clone());
            let right_listener = right.subscribe(listener);
            Self { spec, typ, op, method, left, right, core: NodeCore::new(), left_listener, right_listener }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        let fault = self.left.current_fault().or_else(|| self.right.current_fault());
        let (value, fault) = match fault {
            Some(f) => (None, Some(f)),
            None => match (self.left.current_value(), self.right.current_value()) {
                (Some(l), Some(r)) => match self.apply(&l, &r) {
                    Ok(v) => (Some(v), None),
                    Err(e) => (None, Some(e)),
                },
                _ => (None, None),
            },
        };
        self.core.set(value, fault);
    }

    fn apply(&self, l: &Value, r: &Value) -> Result<Value, Fault> {
        if let Some(method) = &self.method {
            return (method.invoke)(None, &[l.clone(), r.clone()]);
        }
        use BinaryOp::*;
        match (self.op, l, r) {
            (Add, Value::I64(a), Value::I64(b)) => Ok(Value::I64(a.wrapping_add(*b))),
            (Add, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a + b)),
            (Add, Value::String(a), Value::String(b)) => Ok(Value::String(arcstr::format!("{a}{b}"))),
            (AddChecked, Value::I64(a), Value::I64(b)) => a
                .checked_add(*b)
                .map(Value::I64)
                .ok_or_else(|| overflow("AddChecked")),
            (AddChecked, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a + b)),
            (Subtract, Value::I64(a), Value::I64(b)) => Ok(Value::I64(a.wrapping_sub(*b))),
            (Subtract, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a - b)),
            (SubtractChecked, Value::I64(a), Value::I64(b)) => a
                .checked_sub(*b)
                .map(Value::I64)
                .ok_or_else(|| overflow("SubtractChecked")),
            (SubtractChecked, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a - b)),
            (Multiply, Value::I64(a), Value::I64(b)) => Ok(Value::I64(a.wrapping_mul(*b))),
            (Multiply, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a * b)),
            (MultiplyChecked, Value::I64(a), Value::I64(b)) => a
                .checked_mul(*b)
                .map(Value::I64)
                .ok_or_else(|| overflow("MultiplyChecked")),
            (MultiplyChecked, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a * b)),
            (Divide, Value::I64(a), Value::I64(b)) => {
                if *b == 0 {
                    Err(Fault::Operator { message: "division by zero".into() })
                } else {
                    Ok(Value::I64(a.wrapping_div(*b)))
                }
            }
            (Divide, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a / b)),
            (Modulo, Value::I64(a), Value::I64(b)) => {
                if *b == 0 {
                    Err(Fault::Operator { message: "modulo by zero".into() })
                } else {
                    Ok(Value::I64(a.wrapping_rem(*b)))
                }
            }
            (Modulo, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a % b)),
            (Power, Value::F64(a), Value::F64(b)) => Ok(Value::F64(a.powf(*b))),
            (Power, Value::I64(a), Value::I64(b)) => Ok(Value::F64((*a as f64).powf(*b as f64))),
            (Equal, a, b) => Ok(Value::Bool(a == b)),
            (NotEqual, a, b) => Ok(Value::Bool(a != b)),
            (LessThan, a, b) => cmp(a, b).map(|o| Value::Bool(o.is_lt())),
            (GreaterThan, a, b) => cmp(a, b).map(|o| Value::Bool(o.is_gt())),
            (LessThanOrEqual, a, b) => cmp(a, b).map(|o| Value::Bool(o.is_le())),
            (GreaterThanOrEqual, a, b) => cmp(a, b).map(|o| Value::Bool(o.is_ge())),
            (And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
            (And, Value::I64(a), Value::I64(b)) => Ok(Value::I64(a & b)),
            (Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            (Or, Value::I64(a), Value::I64(b)) => Ok(Value::I64(a | b)),
            (ExclusiveOr, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a ^ b)),
            (ExclusiveOr, Value::I64(a), Value::I64(b)) => Ok(Value::I64(a ^ b)),
            (op, l, r) => Err(Fault::ArgumentOutOfRange {
                operator: arcstr::format!("{op:?} on ({:?}, {:?})", l.type_of(), r.type_of()),
            }),
        }
    }
}

fn overflow(op: &str) -> Fault {
    Fault::Operator { message: arcstr::format!("{op} overflowed") }
}

fn cmp(a: &Value, b: &Value) -> Result<std::cmp::Ordering, Fault> {
    match (a, b) {
        (Value::I64(x), Value::I64(y)) => Ok(x.cmp(y)),
        (Value::F64(x), Value::F64(y)) => {
            x.partial_cmp(y).ok_or_else(|| Fault::Operator { message: "NaN is unordered".into() })
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Ok(x.cmp(y)),
        (Value::TimeSpan(x), Value::TimeSpan(y)) => Ok(x.cmp(y)),
        (x, y) => Err(Fault::ArgumentOutOfRange {
            operator: arcstr::format!("comparison on ({:?}, {:?})", x.type_of(), y.type_of()),
        }),
    }
}

impl ActiveNode for BinaryNode {
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
        self.right.refs(out);
    }
    fn children(&self) -> Vec<NodeRef> {
        vec![self.left.clone(), self.right.clone()]
    }
}

impl Drop for BinaryNode {
    fn drop(&mut self) {
        unsubscribe_each(&[self.left.clone(), self.right.clone()], &[self.left_listener, self.right_listener]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::FakeNode;

    fn spec() -> TArc<ExprNode> {
        ExprNode::new(crate::expr::ExprKind::Constant(Value::Null), ValueType::I64)
    }

    fn node(op: BinaryOp, left: NodeRef, right: NodeRef) -> Arc<BinaryNode> {
        BinaryNode::new(spec(), ValueType::I64, op, None, left, right)
    }

    #[test]
    fn add_checked_overflows() {
        let left = FakeNode::settled(ValueType::I64, Value::I64(i64::MAX));
        let right = FakeNode::settled(ValueType::I64, Value::I64(1));
        let n = node(BinaryOp::AddChecked, left, right);
        assert!(matches!(n.current_fault(), Some(Fault::Operator { .. })));
    }

    #[test]
    fn divide_by_zero_faults() {
        let left = FakeNode::settled(ValueType::I64, Value::I64(10));
        let right = FakeNode::settled(ValueType::I64, Value::I64(0));
        let n = node(BinaryOp::Divide, left, right);
        assert!(matches!(n.current_fault(), Some(Fault::Operator { .. })));
    }

    #[test]
    fn left_fault_wins_over_right_fault() {
        let left = FakeNode::faulted(ValueType::I64, Fault::NullTarget { member: "l".into() });
        let right = FakeNode::faulted(ValueType::I64, Fault::NullTarget { member: "r".into() });
        let n = node(BinaryOp::Add, left, right);
        match n.current_fault() {
            Some(Fault::NullTarget { member }) => assert_eq!(member.as_str(), "l"),
            other => panic!("expected left's fault, got {other:?}"),
        }
    }

    #[test]
    fn recomputes_when_either_operand_changes() {
        let left = FakeNode::settled(ValueType::I64, Value::I64(1));
        let right = FakeNode::settled(ValueType::I64, Value::I64(2));
        let n = node(BinaryOp::Add, left.clone(), right.clone());
        assert_eq!(n.current_value(), Some(Value::I64(3)));

        right.set(Some(Value::I64(5)), None);
        assert_eq!(n.current_value(), Some(Value::I64(8)));

        left.set(Some(Value::I64(10)), None);
        assert_eq!(n.current_value(), Some(Value::I64(15)));
    }

    #[test]
    fn user_method_overrides_builtin_operator() {
        let left = FakeNode::settled(ValueType::I64, Value::I64(2));
        let right = FakeNode::settled(ValueType::I64, Value::I64(3));
        let method = MethodDescriptor {
            name: "max".into(),
            invoke: Arc::new(|_target, args| {
                let (Value::I64(a), Value::I64(b)) = (&args[0], &args[1]) else { unreachable!() };
                Ok(Value::I64(*a.max(b)))
            }),
        };
        let n = BinaryNode::new(spec(), ValueType::I64, BinaryOp::Add, Some(method), left, right);
        assert_eq!(n.current_value(), Some(Value::I64(3)));
    }

    #[test]
    fn nan_comparison_faults() {
        let left = FakeNode::settled(ValueType::F64, Value::F64(f64::NAN));
        let right = FakeNode::settled(ValueType::F64, Value::F64(1.0));
        let n = node(BinaryOp::LessThan, left, right);
        assert!(matches!(n.current_fault(), Some(Fault::Operator { .. })));
    }
}
