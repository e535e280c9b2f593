//! §4.5.11 New / MemberInit: object construction. `New` runs the
//! constructor invoker over its (eagerly subscribed) argument nodes;
//! `MemberInit` runs `New` then applies each member binding's current
//! value on top, re-running bindings whenever a bound expression changes.
//! Rejects `by_value` (struct-like) constructed types per §9 Open
//! Question 2: such types have no stable identity for member assignment
//! to mutate in place.

use super::{subscribe_each, unsubscribe_each, weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::{CtorDescriptor, ExprNode, MemberDescriptor};
use crate::fault::Fault;
use crate::options::{maybe_dispose_replaced, Options};
use crate::value::{ListenerId, Value, ValueType};
use smallvec::SmallVec;
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct NewNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    descriptor: CtorDescriptor,
    args: Vec<NodeRef>,
    options: Arc<Options>,
    core: NodeCore,
    arg_listeners: Vec<ListenerId>,
}

impl NewNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        descriptor: CtorDescriptor,
        args: Vec<NodeRef>,
        options: Arc<Options>,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<NewNode>| n.recompute());
            let arg_listeners = subscribe_each(&args, &listener);
            Self { spec, typ, descriptor, args, options, core: NodeCore::new(), arg_listeners }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        let mut arg_values: SmallVec<[Value; 4]> = SmallVec::with_capacity(self.args.len());
        let mut fault = None;
        for a in &self.args {
            if let Some(f) = a.current_fault() {
                fault = Some(f);
                break;
            }
            match a.current_value() {
                Some(v) => arg_values.push(v),
                None => {
                    self.core.set(None, None);
                    return;
                }
            }
        }

        let (new_value, new_fault) = match fault {
            Some(f) => (None, Some(f)),
            None => match (self.descriptor.invoke)(None, &arg_values) {
                Ok(v) => (Some(v), None),
                Err(e) => (None, Some(e)),
            },
        };

        let previous = self.core.value();
        self.core.set(new_value.clone(), new_fault);
        if self.options.should_dispose_constructed(&self.descriptor.name) {
            maybe_dispose_replaced(&self.options, &self.spec, previous.as_ref(), new_value.as_ref());
        }
    }
}

impl ActiveNode for NewNode {
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
        for a in &self.args {
            a.refs(out);
        }
    }
    fn children(&self) -> Vec<NodeRef> {
        self.args.clone()
    }
}

impl Drop for NewNode {
    fn drop(&mut self) {
        unsubscribe_each(&self.args, &self.arg_listeners);
        if self.options.should_dispose_constructed(&self.descriptor.name) {
            if let Some(v) = self.core.value() {
                crate::options::dispose_value(&self.options, &v);
            }
        }
    }
}

/// One compiled `MemberInit` binding: the member to assign and the node
/// computing its value.
#[derive(Debug)]
pub struct CompiledBinding {
    pub member: MemberDescriptor,
    pub value: NodeRef,
}

#[derive(Debug)]
pub struct MemberInitNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    new_expr: NodeRef,
    bindings: Vec<CompiledBinding>,
    core: NodeCore,
    new_listener: ListenerId,
    binding_listeners: Vec<ListenerId>,
}

impl MemberInitNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        new_expr: NodeRef,
        bindings: Vec<CompiledBinding>,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<MemberInitNode>| n.recompute());
            let new_listener = new_expr.subscribe(listener.clone());
            let binding_listeners =
                bindings.iter().map(|b| b.value.subscribe(listener.clone())).collect();
            Self { spec, typ, new_expr, bindings, core: NodeCore::new(), new_listener, binding_listeners }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        if let Some(f) = self.new_expr.current_fault() {
            self.core.set(None, Some(f));
            return;
        }
        let Some(target) = self.new_expr.current_value() else {
            self.core.set(None, None);
            return;
        };
        let Value::Object(obj) = &target else {
            self.core.set(
                None,
                Some(Fault::Reflection { message: "MemberInit target is not an object".into() }),
            );
            return;
        };

        for binding in &self.bindings {
            if let Some(f) = binding.value.current_fault() {
                self.core.set(None, Some(f));
                return;
            }
            let Some(value) = binding.value.current_value() else {
                self.core.set(None, None);
                return;
            };
            if let Err(e) = obj.0.set(&binding.member.name, value) {
                self.core.set(None, Some(e));
                return;
            }
        }

        self.core.set(Some(target), None);
    }
}

impl ActiveNode for MemberInitNode {
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
        self.new_expr.refs(out);
        for b in &self.bindings {
            b.value.refs(out);
        }
    }
    fn children(&self) -> Vec<NodeRef> {
        let mut v = Vec::with_capacity(self.bindings.len() + 1);
        v.push(self.new_expr.clone());
        v.extend(self.bindings.iter().map(|b| b.value.clone()));
        v
    }
}

impl Drop for MemberInitNode {
    fn drop(&mut self) {
        self.new_expr.unsubscribe(self.new_listener);
        for (b, id) in self.bindings.iter().zip(self.binding_listeners.iter()) {
            b.value.unsubscribe(*id);
        }
    }
}
