//! §4.5.1 Constant: immutable, never subscribes.

use super::{ActiveNode, Refs};
use crate::expr::ExprNode;
use crate::fault::Fault;
use crate::value::{Listener, ListenerId, Value, ValueType};
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct ConstantNode {
    spec: TArc<ExprNode>,
    value: Value,
    typ: ValueType,
}

impl ConstantNode {
    pub fn new(spec: TArc<ExprNode>, value: Value, typ: ValueType) -> Arc<Self> {
        Arc::new(Self { spec, value, typ })
    }
}

impl ActiveNode for ConstantNode {
    fn current_value(&self) -> Option<Value> {
        Some(self.value.clone())
    }

    fn current_fault(&self) -> Option<Fault> {
        None
    }

    fn typ(&self) -> ValueType {
        self.typ
    }

    fn spec(&self) -> &TArc<ExprNode> {
        &self.spec
    }

    fn subscribe(&self, _listener: Listener) -> ListenerId {
        ListenerId(u64::MAX)
    }

    fn unsubscribe(&self, _id: ListenerId) {}

    fn refs(&self, _out: &mut Refs) {}
}
