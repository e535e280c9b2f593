//! End-to-end scenarios over the compiled node graph, exercising the
//! fault-propagation, short-circuit, and teardown invariants from first
//! principles rather than via any textual front end.

use activegraph_core::expr::{
    BinaryOp, CtorDescriptor, ExprKind, ExprNode, IndexerDescriptor, MemberDescriptor,
};
use activegraph_core::fault::Fault;
use activegraph_core::node::compiler::compile_root;
use activegraph_core::options::Options;
use activegraph_core::value::{
    Disposable, Listener, ListenerId, ObjectRef, ObservableList, ObservableObject, Value, ValueType,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use triomphe::Arc as TArc;

/// A mutable, observable "object": a bag of named fields with
/// property-changed notification and a dispose/read counter.
#[derive(Default)]
struct TestObject {
    fields: Mutex<HashMap<String, Value>>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_listener: AtomicU64,
    dispose_count: AtomicU64,
    read_count: AtomicU64,
}

impl fmt::Debug for TestObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestObject").field("fields", &self.fields.lock()).finish()
    }
}

impl TestObject {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_field(&self, name: &str, value: Value) {
        self.fields.lock().insert(name.to_string(), value);
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .get(name)
            .map(|v| v.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        for l in snapshot {
            l();
        }
    }

    fn value_ref(self: &Arc<Self>) -> Value {
        Value::Object(ObjectRef(self.clone()))
    }
}

impl ObservableObject for TestObject {
    fn get(&self, member: &str) -> Result<Value, Fault> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.fields.lock().get(member).cloned().unwrap_or(Value::Null))
    }

    fn subscribe_property(&self, name: &str, listener: Listener) -> ListenerId {
        let id = ListenerId::new(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().entry(name.to_string()).or_default().push((id, listener));
        id
    }

    fn unsubscribe_property(&self, name: &str, id: ListenerId) {
        if let Some(v) = self.listeners.lock().get_mut(name) {
            v.retain(|(i, _)| *i != id);
        }
    }

    fn as_disposable(&self) -> Option<&dyn Disposable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Disposable for TestObject {
    fn dispose_sync(&self) -> Result<(), Fault> {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A fixed observable list backing `Index` tests.
struct TestList {
    items: Mutex<Vec<Value>>,
    listeners: Mutex<HashMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
}

impl fmt::Debug for TestList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestList").field("items", &self.items.lock()).finish()
    }
}

impl TestList {
    fn new(items: Vec<Value>) -> Arc<Self> {
        Arc::new(Self { items: Mutex::new(items), listeners: Mutex::new(HashMap::new()), next_listener: AtomicU64::new(0) })
    }
}

impl ObservableObject for TestList {
    fn get(&self, _member: &str) -> Result<Value, Fault> {
        Err(Fault::Reflection { message: "TestList has no members".into() })
    }
    fn subscribe_property(&self, _name: &str, _listener: Listener) -> ListenerId {
        ListenerId::new(u64::MAX)
    }
    fn unsubscribe_property(&self, _name: &str, _id: ListenerId) {}
    fn as_list(&self) -> Option<&dyn ObservableList> {
        Some(self)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ObservableList for TestList {
    fn len(&self) -> usize {
        self.items.lock().len()
    }
    fn get(&self, index: usize) -> Result<Value, Fault> {
        self.items
            .lock()
            .get(index)
            .cloned()
            .ok_or_else(|| Fault::ArgumentOutOfRange { operator: "Item".into() })
    }
    fn subscribe_items(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().insert(id, listener);
        id
    }
    fn unsubscribe_items(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }
}

fn param(ordinal: usize, typ: ValueType) -> TArc<ExprNode> {
    ExprNode::new(ExprKind::Parameter(ordinal), typ)
}

fn constant(v: Value) -> TArc<ExprNode> {
    let typ = v.type_of();
    ExprNode::new(ExprKind::Constant(v), typ)
}

fn member(target: TArc<ExprNode>, name: &str, typ: ValueType) -> TArc<ExprNode> {
    ExprNode::new(ExprKind::Member(target, MemberDescriptor { name: name.into() }), typ)
}

#[test]
fn coalesce_recovers_when_left_becomes_non_null() {
    let left = TestObject::new();
    left.set_field("v", Value::Null);
    let left_member = member(param(0, ValueType::Any), "v", ValueType::Any);
    let right = constant(Value::I64(99));
    let expr = ExprNode::new(ExprKind::Coalesce(left_member, right, None), ValueType::Any);

    let options = Arc::new(Options::default());
    let node = compile_root(expr, &[left.value_ref()], options).unwrap();
    assert_eq!(node.current_value(), Some(Value::I64(99)));

    left.set_field("v", Value::I64(7));
    assert_eq!(node.current_value(), Some(Value::I64(7)));
}

#[test]
fn coalesce_does_not_read_right_when_left_present() {
    let left = TestObject::new();
    left.set_field("v", Value::I64(1));
    let right_source = TestObject::new();
    let left_member = member(param(0, ValueType::Any), "v", ValueType::Any);
    let right_member = member(param(1, ValueType::Any), "v", ValueType::Any);
    let expr = ExprNode::new(ExprKind::Coalesce(left_member, right_member, None), ValueType::Any);

    let options = Arc::new(Options::default());
    let node = compile_root(expr, &[left.value_ref(), right_source.value_ref()], options).unwrap();
    assert_eq!(node.current_value(), Some(Value::I64(1)));
    assert_eq!(right_source.read_count.load(Ordering::SeqCst), 0);
}

#[test]
fn and_also_short_circuits_on_false() {
    let left = TestObject::new();
    left.set_field("b", Value::Bool(false));
    let right = TestObject::new();
    let left_member = member(param(0, ValueType::Bool), "b", ValueType::Bool);
    let right_member = member(param(1, ValueType::Bool), "b", ValueType::Bool);
    let expr = ExprNode::new(ExprKind::AndAlso(left_member, right_member), ValueType::Bool);

    let options = Arc::new(Options::default());
    let node = compile_root(expr, &[left.value_ref(), right.value_ref()], options).unwrap();
    assert_eq!(node.current_value(), Some(Value::Bool(false)));
    assert_eq!(right.read_count.load(Ordering::SeqCst), 0);

    left.set_field("b", Value::Bool(true));
    right.set_field("b", Value::Bool(true));
    assert_eq!(node.current_value(), Some(Value::Bool(true)));
    assert!(right.read_count.load(Ordering::SeqCst) > 0);
}

#[test]
fn conditional_recovers_from_fault_by_switching_branch() {
    // if_true is a member access through a null target, which always
    // faults; if_false is a plain constant.
    let test_obj = TestObject::new();
    test_obj.set_field("b", Value::Bool(true));
    let null_holder = TestObject::new();
    null_holder.set_field("inner", Value::Null);

    let test_expr = member(param(0, ValueType::Bool), "b", ValueType::Bool);
    let faulting_branch = member(
        member(param(1, ValueType::Any), "inner", ValueType::Any),
        "x",
        ValueType::Any,
    );
    let safe_branch = constant(Value::I64(5));
    let expr = ExprNode::new(
        ExprKind::Conditional(test_expr, faulting_branch, safe_branch),
        ValueType::Any,
    );

    let options = Arc::new(Options::default());
    let node = compile_root(expr, &[test_obj.value_ref(), null_holder.value_ref()], options).unwrap();
    assert!(node.current_fault().is_some());
    assert_eq!(node.current_value(), None);

    test_obj.set_field("b", Value::Bool(false));
    assert!(node.current_fault().is_none());
    assert_eq!(node.current_value(), Some(Value::I64(5)));
}

#[test]
fn sum_over_two_sources_updates_on_either_change() {
    let a = TestObject::new();
    a.set_field("n", Value::I64(2));
    let b = TestObject::new();
    b.set_field("n", Value::I64(3));

    let a_member = member(param(0, ValueType::I64), "n", ValueType::I64);
    let b_member = member(param(1, ValueType::I64), "n", ValueType::I64);
    let expr = ExprNode::new(ExprKind::Binary(BinaryOp::Add, a_member, b_member, None), ValueType::I64);

    let options = Arc::new(Options::default());
    let node = compile_root(expr, &[a.value_ref(), b.value_ref()], options).unwrap();
    assert_eq!(node.current_value(), Some(Value::I64(5)));

    a.set_field("n", Value::I64(10));
    assert_eq!(node.current_value(), Some(Value::I64(13)));

    b.set_field("n", Value::I64(-10));
    assert_eq!(node.current_value(), Some(Value::I64(0)));
}

#[test]
fn index_with_derived_index_tracks_both_list_and_index_source() {
    let list_holder = TestObject::new();
    let list = TestList::new(vec![Value::I64(10), Value::I64(20), Value::I64(30)]);
    list_holder.set_field("items", Value::Object(ObjectRef(list.clone())));

    let idx_holder = TestObject::new();
    idx_holder.set_field("i", Value::I64(1));

    let list_member = member(param(0, ValueType::Any), "items", ValueType::Any);
    let idx_member = member(param(1, ValueType::I64), "i", ValueType::I64);
    let expr = ExprNode::new(
        ExprKind::Index(list_member, IndexerDescriptor { name: "Item".into() }, Arc::from([idx_member])),
        ValueType::Any,
    );

    let options = Arc::new(Options::default());
    let node =
        compile_root(expr, &[list_holder.value_ref(), idx_holder.value_ref()], options).unwrap();
    assert_eq!(node.current_value(), Some(Value::I64(20)));

    idx_holder.set_field("i", Value::I64(2));
    assert_eq!(node.current_value(), Some(Value::I64(30)));
}

#[test]
fn member_access_disposes_replaced_value() {
    let holder = TestObject::new();
    let first = TestObject::new();
    let second = TestObject::new();
    holder.set_field("current", first.value_ref());

    let expr = member(param(0, ValueType::Any), "current", ValueType::Any);
    let options = Arc::new(Options::builder().add_expression_value_disposal(&expr).build());
    let node = compile_root(expr, &[holder.value_ref()], options).unwrap();
    assert_eq!(first.dispose_count.load(Ordering::SeqCst), 0);

    holder.set_field("current", second.value_ref());
    assert_eq!(first.dispose_count.load(Ordering::SeqCst), 1);
    assert_eq!(second.dispose_count.load(Ordering::SeqCst), 0);

    drop(node);
    assert_eq!(second.dispose_count.load(Ordering::SeqCst), 1);
}

#[test]
fn new_invokes_constructor_over_compiled_arguments() {
    let descriptor = CtorDescriptor {
        name: "Point".into(),
        by_value: false,
        invoke: Arc::new(|_target: Option<&Value>, args: &[Value]| Ok(Value::Array(Arc::from(args.to_vec())))),
    };
    let expr = ExprNode::new(
        ExprKind::New(descriptor, Arc::from([constant(Value::I64(1)), constant(Value::I64(2))])),
        ValueType::Array,
    );
    let options = Arc::new(Options::default());
    let node = compile_root(expr, &[], options).unwrap();
    assert_eq!(node.current_value(), Some(Value::Array(Arc::from([Value::I64(1), Value::I64(2)]))));
}
