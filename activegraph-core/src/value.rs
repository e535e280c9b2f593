//! The dynamic value model the engine computes over, and the narrow
//! contract (C1 §9 "observation sources") through which it observes
//! property- and collection-changed notifications on caller-supplied
//! objects.
//!
//! Rust has no runtime reflection, so where the original design reads a
//! member or invokes a method via reflection, here the caller supplies the
//! accessor as part of the expression tree (see [`crate::expr::MemberDescriptor`]
//! and [`crate::expr::MethodDescriptor`]). The traits in this module are the
//! "small interfaces the engine subscribes through" called for in the
//! design notes.

use crate::fault::Fault;
use arcstr::ArcStr;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::{
    any::Any,
    fmt,
    future::Future,
    hash::{Hash, Hasher},
    pin::Pin,
    sync::Arc,
};
use uuid::Uuid;

/// A future-returning asynchronous dispose (§4.7, §5 "runs off-thread").
/// Kept runtime-agnostic: this crate never spawns it itself.
pub type AsyncDispose = Pin<Box<dyn Future<Output = Result<(), Fault>> + Send>>;

/// Capability a source object may optionally expose so the engine can
/// dispose of a replaced or torn-down value (§4.7).
pub trait Disposable: Send + Sync {
    /// Synchronous dispose. Default no-op for async-only objects.
    fn dispose_sync(&self) -> Result<(), Fault> {
        Ok(())
    }

    /// Asynchronous dispose; `Some` takes precedence at call sites that
    /// can accept either.
    fn dispose_async(&self) -> Option<AsyncDispose> {
        None
    }
}

/// Opaque handle returned by a subscribe call; pass back to the matching
/// unsubscribe to release that specific listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    /// Mint a fresh id. Exposed so `ObservableObject`/`ObservableList`/
    /// `ObservableDictionary` implementors outside this crate can hand out
    /// their own ids from `subscribe_property`/`subscribe_items`/`subscribe_key`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// A change notification callback. Per the API surface (spec §6) the
/// callback carries no payload; the receiver re-reads `value`/`fault`.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// A source object the engine can read members of and, optionally,
/// subscribe to property-changed notifications on.
pub trait ObservableObject: Any + Send + Sync + fmt::Debug {
    /// Read the named member. Errors become a `Reflection` fault at the
    /// consulting node.
    fn get(&self, member: &str) -> Result<Value, Fault>;

    /// Assign the named member, used by `MemberInit` (§4.5.11). Objects
    /// that expose no settable members (most do not) keep the default,
    /// which faults.
    fn set(&self, member: &str, _value: Value) -> Result<(), Fault> {
        Err(Fault::Reflection { message: arcstr::format!("{member} is not settable") })
    }

    /// Subscribe to changes of the named property. Implementors that do
    /// not support change notification may treat this as a no-op and
    /// return a `ListenerId` that `unsubscribe_property` also ignores.
    fn subscribe_property(&self, name: &str, listener: Listener) -> ListenerId;

    fn unsubscribe_property(&self, name: &str, id: ListenerId);

    /// Present this object as a positionally-indexable, observable list,
    /// if it is one.
    fn as_list(&self) -> Option<&dyn ObservableList> {
        None
    }

    /// Present this object as a keyed, observable dictionary, if it is one.
    fn as_dict(&self) -> Option<&dyn ObservableDictionary> {
        None
    }

    /// Present this object as disposable, if it is one.
    fn as_disposable(&self) -> Option<&dyn Disposable> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// The narrow slice of an observable collection the `Index` node (§4.5.4)
/// requires: positional reads plus a single change notification that
/// fires on add/remove/replace/move/reset.
pub trait ObservableList: Any + Send + Sync + fmt::Debug {
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Result<Value, Fault>;
    fn subscribe_items(&self, listener: Listener) -> ListenerId;
    fn unsubscribe_items(&self, id: ListenerId);
}

/// The narrow slice of an observable dictionary the `Index` node requires:
/// keyed reads plus per-key add/remove/replace notification.
pub trait ObservableDictionary: Any + Send + Sync + fmt::Debug {
    fn get(&self, key: &Value) -> Result<Value, Fault>;
    fn subscribe_key(&self, key: Value, listener: Listener) -> ListenerId;
    fn unsubscribe_key(&self, key: &Value, id: ListenerId);
}

/// A reference-counted, identity-compared handle to a source object.
#[derive(Clone)]
pub struct ObjectRef(pub Arc<dyn ObservableObject>);

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state)
    }
}

/// The dynamic runtime value a node caches as its `value`. Primitive
/// variants compare by the ordinary value-equality rule (§4.2); `Object`
/// compares by reference identity, since "equal argument identities" is
/// part of the cache key (§1, §4.4).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(ArcStr),
    DateTime(DateTime<Utc>),
    TimeSpan(ChronoDuration),
    Guid(Uuid),
    Array(Arc<[Value]>),
    Object(ObjectRef),
}

impl Value {
    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::I64(_) => ValueType::I64,
            Value::F64(_) => ValueType::F64,
            Value::String(_) => ValueType::String,
            Value::DateTime(_) => ValueType::DateTime,
            Value::TimeSpan(_) => ValueType::TimeSpan,
            Value::Guid(_) => ValueType::Guid,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (TimeSpan(a), TimeSpan(b)) => a == b,
            (Guid(a), Guid(b)) => a == b,
            (Array(a), Array(b)) => a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y),
            (Object(a), Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::I64(i) => i.hash(state),
            Value::F64(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::TimeSpan(d) => d.num_nanoseconds().unwrap_or(i64::MAX).hash(state),
            Value::Guid(g) => g.hash(state),
            Value::Array(a) => {
                a.len().hash(state);
                for v in a.iter() {
                    v.hash(state)
                }
            }
            Value::Object(o) => o.hash(state),
        }
    }
}

/// The declared result type carried by every expression/runtime node (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Bool,
    I64,
    F64,
    String,
    DateTime,
    TimeSpan,
    Guid,
    Array,
    Object,
    /// The `Any` top type used for expressions whose static result type is
    /// not narrowed further (e.g. the value side of a raw `Member` access).
    Any,
}

impl ValueType {
    /// The type's default value, adopted by a node's `value` while it is
    /// faulted (§3 invariant 1).
    pub fn default_value(self) -> Value {
        match self {
            ValueType::Null | ValueType::Any => Value::Null,
            ValueType::Bool => Value::Bool(false),
            ValueType::I64 => Value::I64(0),
            ValueType::F64 => Value::F64(0.0),
            ValueType::String => Value::String(ArcStr::new()),
            ValueType::DateTime => Value::DateTime(DateTime::<Utc>::UNIX_EPOCH),
            ValueType::TimeSpan => Value::TimeSpan(ChronoDuration::zero()),
            ValueType::Guid => Value::Guid(Uuid::nil()),
            ValueType::Array => Value::Array(Arc::from_iter([])),
            ValueType::Object => Value::Null,
        }
    }
}
