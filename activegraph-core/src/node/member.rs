//! §4.5.3 Member: reads a field/property off `target`, subscribes to the
//! target object's property-changed notifier, and moves that subscription
//! when `target` itself changes to point at a different object.

use super::{weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::{ExprNode, MemberDescriptor};
use crate::fault::Fault;
use crate::options::{maybe_dispose_replaced, Options};
use crate::value::{ListenerId, Value, ValueType};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct MemberNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    descriptor: MemberDescriptor,
    target: NodeRef,
    options: Arc<Options>,
    core: NodeCore,
    self_weak: Weak<MemberNode>,
    target_listener: ListenerId,
    wiring: Mutex<Wiring>,
}

#[derive(Default)]
struct Wiring {
    object_sub: Option<(Value, ListenerId)>,
}

impl MemberNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        descriptor: MemberDescriptor,
        target: NodeRef,
        options: Arc<Options>,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<MemberNode>| n.recompute());
            let target_listener = target.subscribe(listener);
            Self {
                spec,
                typ,
                descriptor,
                target,
                options,
                core: NodeCore::new(),
                self_weak: weak.clone(),
                target_listener,
                wiring: Mutex::new(Wiring::default()),
            }
        });
        node.recompute();
        node
    }

    fn recompute(&self) {
        let target_fault = self.target.current_fault();
        let target_value = self.target.current_value();

        let (new_value, new_fault) = match (&target_fault, &target_value) {
            (Some(f), _) => (None, Some(f.clone())),
            (None, None) => (None, None),
            (None, Some(Value::Null)) => {
                (None, Some(Fault::NullTarget { member: self.descriptor.name.clone() }))
            }
            (None, Some(v)) => match self.read_member(v) {
                Ok(value) => (Some(value), None),
                Err(e) => (None, Some(e)),
            },
        };

        self.rewire_object_subscription(target_value.as_ref());

        let previous = self.core.value();
        self.core.set(new_value.clone(), new_fault);
        maybe_dispose_replaced(&self.options, &self.spec, previous.as_ref(), new_value.as_ref());
    }

    fn read_member(&self, target: &Value) -> Result<Value, Fault> {
        match target {
            Value::Object(o) => o.0.get(&self.descriptor.name),
            _ => Err(Fault::Reflection {
                message: arcstr::format!("{} is not an object", self.descriptor.name).into(),
            }),
        }
    }

    /// Move the property-changed subscription to whatever object `target`
    /// currently holds, unsubscribing from the previous one. A no-op when
    /// the target object hasn't changed.
    fn rewire_object_subscription(&self, target_value: Option<&Value>) {
        let mut wiring = self.wiring.lock();
        let same =
            matches!((&wiring.object_sub, target_value), (Some((prev, _)), Some(cur)) if prev == cur);
        if same {
            return;
        }
        if let Some((prev, id)) = wiring.object_sub.take() {
            if let Value::Object(o) = &prev {
                o.0.unsubscribe_property(&self.descriptor.name, id);
            }
        }
        if let Some(Value::Object(o)) = target_value {
            let listener = weak_listener(self.self_weak.clone(), |n: &Arc<MemberNode>| n.recompute());
            let id = o.0.subscribe_property(&self.descriptor.name, listener);
            wiring.object_sub = Some((target_value.unwrap().clone(), id));
        }
    }
}

impl ActiveNode for MemberNode {
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
        self.target.refs(out);
        if let Some((Value::Object(o), _)) = &self.wiring.lock().object_sub {
            out.objects.push(o.clone());
        }
    }

    fn children(&self) -> Vec<NodeRef> {
        vec![self.target.clone()]
    }
}

impl Drop for MemberNode {
    /// §3 Lifecycle: unsubscribe from all sources and dispose the last
    /// value, exactly once, on final release.
    fn drop(&mut self) {
        self.target.unsubscribe(self.target_listener);
        if let Some((Value::Object(o), id)) = self.wiring.get_mut().object_sub.take() {
            o.0.unsubscribe_property(&self.descriptor.name, id);
        }
        if let Some(v) = self.core.value() {
            crate::options::dispose_value(&self.options, &v);
        }
    }
}
