//! §4.5.4 Index: `target[args...]`. Subscribes to `target`'s collection
//! notifier (items for a list, the resolved key for a dictionary) in
//! addition to each index argument, rewiring the collection subscription
//! whenever `target` or the resolved key changes.

use super::{subscribe_each, unsubscribe_each, weak_listener, ActiveNode, NodeCore, NodeRef, Refs};
use crate::expr::{ExprNode, IndexerDescriptor};
use crate::fault::Fault;
use crate::options::{maybe_dispose_replaced, Options};
use crate::value::{ListenerId, Value, ValueType};
use parking_lot::Mutex;
use std::sync::Arc;
use triomphe::Arc as TArc;

#[derive(Debug)]
pub struct IndexNode {
    spec: TArc<ExprNode>,
    typ: ValueType,
    descriptor: IndexerDescriptor,
    target: NodeRef,
    args: Vec<NodeRef>,
    options: Arc<Options>,
    core: NodeCore,
    target_listener: ListenerId,
    arg_listeners: Vec<ListenerId>,
    collection_sub: Mutex<Option<CollectionSub>>,
}

struct CollectionSub {
    object: Value,
    key: CollectionKey,
    id: ListenerId,
}

#[derive(Clone, PartialEq)]
enum CollectionKey {
    List,
    Dict(Value),
}

impl IndexNode {
    pub fn new(
        spec: TArc<ExprNode>,
        typ: ValueType,
        descriptor: IndexerDescriptor,
        target: NodeRef,
        args: Vec<NodeRef>,
        options: Arc<Options>,
    ) -> Arc<Self> {
        let node = Arc::new_cyclic(|weak| {
            let listener = weak_listener(weak.clone(), |n: &Arc<IndexNode>| n.recompute());
            let target_listener = target.subscribe(listener.clone());
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
                collection_sub: Mutex::new(None),
            }
        });
        node.recompute();
        node
    }

    /// `Err` carries the first (left-to-right) fault among index args;
    /// `Ok(None)` means at least one arg is not yet settled.
    fn arg_values(&self) -> Result<Option<Vec<Value>>, Fault> {
        for a in &self.args {
            if let Some(f) = a.current_fault() {
                return Err(f);
            }
        }
        let mut values = Vec::with_capacity(self.args.len());
        for a in &self.args {
            match a.current_value() {
                Some(v) => values.push(v),
                None => return Ok(None),
            }
        }
        Ok(Some(values))
    }

    fn recompute(self: &Arc<Self>) {
        let target_fault = self.target.current_fault();
        let target_value = self.target.current_value();

        let (new_value, new_fault) = if let Some(f) = target_fault {
            (None, Some(f))
        } else {
            match &target_value {
                None => (None, None),
                Some(Value::Null) => {
                    (None, Some(Fault::NullTarget { member: self.descriptor.name.clone() }))
                }
                Some(target) => match self.arg_values() {
                    Err(f) => (None, Some(f)),
                    Ok(None) => (None, None),
                    Ok(Some(args)) => match self.read(target, &args) {
                        Ok(v) => (Some(v), None),
                        Err(e) => (None, Some(e)),
                    },
                },
            }
        };

        self.rewire_collection_subscription(target_value.as_ref());

        let previous = self.core.value();
        self.core.set(new_value.clone(), new_fault);
        maybe_dispose_replaced(&self.options, &self.spec, previous.as_ref(), new_value.as_ref());
    }

    fn read(&self, target: &Value, args: &[Value]) -> Result<Value, Fault> {
        let Value::Object(o) = target else {
            return Err(Fault::Reflection {
                message: arcstr::format!("{} target is not an object", self.descriptor.name),
            });
        };
        if let Some(list) = o.0.as_list() {
            let idx = match args.first() {
                Some(Value::I64(i)) if *i >= 0 => *i as usize,
                _ => return Err(Fault::ArgumentOutOfRange { operator: self.descriptor.name.clone() }),
            };
            return list.get(idx);
        }
        if let Some(dict) = o.0.as_dict() {
            let key = args
                .first()
                .cloned()
                .ok_or_else(|| Fault::ArgumentOutOfRange { operator: self.descriptor.name.clone() })?;
            return dict.get(&key);
        }
        Err(Fault::Reflection {
            message: arcstr::format!("{} target is not indexable", self.descriptor.name),
        })
    }

    /// The dictionary key this node is currently indexing with, if the
    /// target is a dictionary and its args are fully settled. Used only to
    /// decide which key's change notifier to subscribe to.
    fn dict_key(&self) -> Option<Value> {
        match self.arg_values() {
            Ok(Some(args)) => args.into_iter().next(),
            _ => None,
        }
    }

    fn rewire_collection_subscription(self: &Arc<Self>, target_value: Option<&Value>) {
        let wanted_key = match target_value {
            Some(Value::Object(o)) if o.0.as_list().is_some() => Some(CollectionKey::List),
            Some(Value::Object(o)) if o.0.as_dict().is_some() => self.dict_key().map(CollectionKey::Dict),
            _ => None,
        };

        let mut sub = self.collection_sub.lock();
        let unchanged = matches!(
            (&*sub, target_value, &wanted_key),
            (Some(s), Some(cur), Some(key)) if &s.object == cur && &s.key == key
        );
        if unchanged {
            return;
        }
        if let Some(old) = sub.take() {
            if let Value::Object(o) = &old.object {
                match &old.key {
                    CollectionKey::List => {
                        if let Some(l) = o.0.as_list() {
                            l.unsubscribe_items(old.id);
                        }
                    }
                    CollectionKey::Dict(k) => {
                        if let Some(d) = o.0.as_dict() {
                            d.unsubscribe_key(k, old.id);
                        }
                    }
                }
            }
        }
        if let (Some(Value::Object(o)), Some(key)) = (target_value, &wanted_key) {
            let listener = weak_listener(Arc::downgrade(self), |n: &Arc<IndexNode>| n.recompute());
            let id = match key {
                CollectionKey::List => o.0.as_list().map(|l| l.subscribe_items(listener)),
                CollectionKey::Dict(k) => o.0.as_dict().map(|d| d.subscribe_key(k.clone(), listener)),
            };
            if let Some(id) = id {
                *sub = Some(CollectionSub { object: target_value.unwrap().clone(), key: key.clone(), id });
            }
        }
    }
}

impl ActiveNode for IndexNode {
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
        for a in &self.args {
            a.refs(out);
        }
        if let Some(s) = &*self.collection_sub.lock() {
            if let Value::Object(o) = &s.object {
                out.objects.push(o.clone());
            }
        }
    }

    fn children(&self) -> Vec<NodeRef> {
        let mut v = vec![self.target.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

impl Drop for IndexNode {
    fn drop(&mut self) {
        self.target.unsubscribe(self.target_listener);
        unsubscribe_each(&self.args, &self.arg_listeners);
        if let Some(old) = self.collection_sub.get_mut().take() {
            if let Value::Object(o) = &old.object {
                match &old.key {
                    CollectionKey::List => {
                        if let Some(l) = o.0.as_list() {
                            l.unsubscribe_items(old.id);
                        }
                    }
                    CollectionKey::Dict(k) => {
                        if let Some(d) = o.0.as_dict() {
                            d.unsubscribe_key(k, old.id);
                        }
                    }
                }
            }
        }
        if let Some(v) = self.core.value() {
            crate::options::dispose_value(&self.options, &v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::IndexerDescriptor;
    use crate::node::test_doubles::{FakeDict, FakeList};
    use crate::node::test_support::FakeNode;
    use crate::value::ObjectRef;

    fn spec() -> TArc<ExprNode> {
        ExprNode::new(crate::expr::ExprKind::Constant(Value::Null), ValueType::Any)
    }

    fn descriptor() -> IndexerDescriptor {
        IndexerDescriptor { name: "Item".into() }
    }

    #[test]
    fn reads_list_by_positional_index() {
        let list = FakeList::new(vec![Value::I64(10), Value::I64(20)]);
        let target = FakeNode::settled(ValueType::Any, Value::Object(ObjectRef(list)));
        let idx = FakeNode::settled(ValueType::I64, Value::I64(1));
        let n = IndexNode::new(spec(), ValueType::Any, descriptor(), target, vec![idx], Arc::new(Options::default()));
        assert_eq!(n.current_value(), Some(Value::I64(20)));
    }

    #[test]
    fn tracks_list_item_replacement() {
        let list = FakeList::new(vec![Value::I64(10), Value::I64(20)]);
        let target = FakeNode::settled(ValueType::Any, Value::Object(ObjectRef(list.clone())));
        let idx = FakeNode::settled(ValueType::I64, Value::I64(1));
        let n = IndexNode::new(spec(), ValueType::Any, descriptor(), target, vec![idx], Arc::new(Options::default()));
        assert_eq!(n.current_value(), Some(Value::I64(20)));

        list.replace(1, Value::I64(99));
        assert_eq!(n.current_value(), Some(Value::I64(99)));
    }

    #[test]
    fn tracks_index_argument_change() {
        let list = FakeList::new(vec![Value::I64(10), Value::I64(20), Value::I64(30)]);
        let target = FakeNode::settled(ValueType::Any, Value::Object(ObjectRef(list)));
        let idx = FakeNode::settled(ValueType::I64, Value::I64(0));
        let n = IndexNode::new(spec(), ValueType::Any, descriptor(), target, vec![idx.clone()], Arc::new(Options::default()));
        assert_eq!(n.current_value(), Some(Value::I64(10)));

        idx.set(Some(Value::I64(2)), None);
        assert_eq!(n.current_value(), Some(Value::I64(30)));
    }

    #[test]
    fn negative_index_faults() {
        let list = FakeList::new(vec![Value::I64(10)]);
        let target = FakeNode::settled(ValueType::Any, Value::Object(ObjectRef(list)));
        let idx = FakeNode::settled(ValueType::I64, Value::I64(-1));
        let n = IndexNode::new(spec(), ValueType::Any, descriptor(), target, vec![idx], Arc::new(Options::default()));
        assert!(matches!(n.current_fault(), Some(Fault::ArgumentOutOfRange { .. })));
    }

    #[test]
    fn null_target_faults() {
        let target = FakeNode::settled(ValueType::Any, Value::Null);
        let idx = FakeNode::settled(ValueType::I64, Value::I64(0));
        let n = IndexNode::new(spec(), ValueType::Any, descriptor(), target, vec![idx], Arc::new(Options::default()));
        assert!(matches!(n.current_fault(), Some(Fault::NullTarget { .. })));
    }

    #[test]
    fn reads_dict_by_key_and_tracks_that_keys_notifier() {
        let mut entries = std::collections::HashMap::new();
        entries.insert(Value::String("a".into()), Value::I64(1));
        let dict = FakeDict::new(entries);
        let target = FakeNode::settled(ValueType::Any, Value::Object(ObjectRef(dict.clone())));
        let key = FakeNode::settled(ValueType::String, Value::String("a".into()));
        let n = IndexNode::new(spec(), ValueType::Any, descriptor(), target, vec![key], Arc::new(Options::default()));
        assert_eq!(n.current_value(), Some(Value::I64(1)));

        dict.insert(Value::String("a".into()), Value::I64(2));
        assert_eq!(n.current_value(), Some(Value::I64(2)));
    }
}
