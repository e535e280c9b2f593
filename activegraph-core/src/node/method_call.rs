//! §4.5.10 Call: `target?.Method(args...)`. `target` is `None` for a static
//! method. All children (target, if any, plus every argument) are
//! subscribed eagerly; the first left-to-right fault wins, target before
//! args, matching evaluation order.

use super::{subscribe_each, unsubscribe_each, weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::{ExprNode, MethodDescriptor};
use crate::fault::Fault;
use crate::options::{maybe_dispose_replaced, Options};
use crate::value::{ListenerId, Value, ValueType};
use smallvec::SmallVec;
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct CallNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    descriptor: MethodDescriptor,
    target: Option<NodeRef>,
    args: Vec<NodeRef>,
    options: Arc<Options>,
    core: NodeCore,
    target_listener: Option<ListenerId>,
    arg_listeners: Vec<ListenerId>,
}

impl CallNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        descriptor: MethodDescriptor,
        target: Option<NodeRef>,
        args: Vec<NodeRef>,
        options: Arc<Options>,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<CallNode>| n.recompute());
            let target_listener = target.as_ref().map(|t| t.subscribe(listener.clone()));
            let arg_listeners = subscribe_each(&args, &listener);
            Self {
                spec,
                typ,
                descriptor,
                target,
                args,
                options,
                core: NodeCore::new(),
                target_listener,
                arg_listeners,
            }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        let target_fault = self.target.as_ref().and_then(|t| t.current_fault());
        let target_value = match &self.target {
            Some(t) => match t.current_value() {
                Some(v) => Some(v),
                None => {
                    self.core.set(None, None);
                    return;
                }
            },
            None => None,
        };
        if matches!(target_value, Some(Value::Null)) {
            self.core.set(None, Some(Fault::NullTarget { member: self.descriptor.name.clone() }));
            return;
        }

        let mut arg_values: SmallVec<[Value; 4]> = SmallVec::with_capacity(self.args.len());
        let mut fault = target_fault;
        if fault.is_none() {
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
        }

        let (new_value, new_fault) = match fault {
            Some(f) => (None, Some(f)),
            None => match (self.descriptor.invoke)(target_value.as_ref(), &arg_values) {
                Ok(v) => (Some(v), None),
                Err(e) => (None, Some(e)),
            },
        };

        let previous = self.core.value();
        self.core.set(new_value.clone(), new_fault);
        maybe_dispose_replaced(&self.options, &self.spec, previous.as_ref(), new_value.as_ref());
    }
}

impl ActiveNode for CallNode {
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
        if let Some(t) = &self.target {
            t.refs(out);
        }
        for a in &self.args {
            a.refs(out);
        }
    }
    fn children(&self) -> Vec<NodeRef> {
        let mut v = Vec::with_capacity(self.args.len() + 1);
        if let Some(t) = &self.target {
            v.push(t.clone());
        }
        v.extend(self.args.iter().cloned());
        v
    }
}

impl Drop for CallNode {
    fn drop(&mut self) {
        if let (Some(t), Some(id)) = (&self.target, self.target_listener) {
            t.unsubscribe(id);
        }
        unsubscribe_each(&self.args, &self.arg_listeners);
        if let Some(v) = self.core.value() {
            crate::options::dispose_value(&self.options, &v);
        }
    }
}
