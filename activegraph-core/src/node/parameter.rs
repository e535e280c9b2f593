//! §4.5.2 Parameter: the bound argument value, immutable through the
//! graph's lifetime. Does not itself subscribe; member accesses above it
//! subscribe to the bound object directly.

use super::{ActiveNode, Refs};
use crate::expr::ExprNode;
use crate::fault::Fault;
use crate::value::{Listener, ListenerId, Value, ValueType};
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct ParameterNode {
    spec: TArc<ExprNode>,
    value: Value,
}

impl ParameterNode {
    pub fn new(spec: TArc<ExprNode>, value: Value) -> Arc<Self> {
        Arc::new(Self { spec, value })
    }
}

impl ActiveNode for ParameterNode {
    fn current_value(&self) -> Option<Value> {
        Some(self.value.clone())
    }

    fn current_fault(&self) -> Option<Fault> {
        None
    }

    fn typ(&self) -> ValueType {
        self.value.type_of()
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
