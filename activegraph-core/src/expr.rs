//! C1: the expression model. A closed, tagged-variant description of the
//! accepted node shapes, plus C2: structural equality and hashing over it,
//! used verbatim as the instance-cache key (C6).
//!
//! Parameters are addressed by ordinal rather than by name, so alpha
//! equivalence (renaming a lambda's parameters does not change its meaning)
//! falls out of the representation for free instead of needing a separate
//! renaming pass.

use crate::fault::Fault;
use crate::value::{Value, ValueType};
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use triomphe::Arc as TArc;

macro_rules! atomic_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            pub fn new() -> Self {
                static NEXT: AtomicU64 = AtomicU64::new(0);
                Self(NEXT.fetch_add(1, Ordering::Relaxed))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

atomic_id!(ExprId);

/// A member (field/property) accessor. Since Rust has no reflection, the
/// getter is supplied by the caller when the tree is built; `name` is kept
/// separately so it can be matched against a `property-changed` name
/// without re-entering the closure.
#[derive(Clone)]
pub struct MemberDescriptor {
    pub name: arcstr::ArcStr,
}

impl fmt::Debug for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberDescriptor({})", self.name)
    }
}
impl PartialEq for MemberDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for MemberDescriptor {}
impl Hash for MemberDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

/// An indexer accessor: `name` doubles as the synthetic property-changed
/// name the engine watches for (`"Item"` for the default indexer, §4.5.4).
#[derive(Clone)]
pub struct IndexerDescriptor {
    pub name: arcstr::ArcStr,
}

impl fmt::Debug for IndexerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexerDescriptor({})", self.name)
    }
}
impl PartialEq for IndexerDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for IndexerDescriptor {}
impl Hash for IndexerDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

pub type Invoker = Arc<dyn Fn(Option<&Value>, &[Value]) -> Result<Value, Fault> + Send + Sync>;

/// A method, constructor, or lambda invocation target. Two descriptors are
/// structurally equal only when they name the same member *and* share the
/// same underlying invoker (reference identity) -- the Rust analogue of "the
/// same referenced method/constructor descriptor" (§4.2), since we have no
/// `MethodInfo` to compare.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: arcstr::ArcStr,
    pub invoke: Invoker,
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodDescriptor({})", self.name)
    }
}
impl PartialEq for MethodDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.invoke, &other.invoke)
    }
}
impl Eq for MethodDescriptor {}
impl Hash for MethodDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        (Arc::as_ptr(&self.invoke) as *const () as usize).hash(state)
    }
}

/// A constructor descriptor. `by_value` marks struct-like (non-heap)
/// constructed types, which `MemberInit` must reject (§9 Open Question 2).
#[derive(Clone)]
pub struct CtorDescriptor {
    pub name: arcstr::ArcStr,
    pub by_value: bool,
    pub invoke: Invoker,
}

impl fmt::Debug for CtorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CtorDescriptor({})", self.name)
    }
}
impl PartialEq for CtorDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.invoke, &other.invoke)
    }
}
impl Eq for CtorDescriptor {}
impl Hash for CtorDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        (Arc::as_ptr(&self.invoke) as *const () as usize).hash(state)
    }
}

/// A user-defined `Coalesce` right-to-left conversion, applied to `left`'s
/// value when it is non-null (§4.5.7).
#[derive(Clone)]
pub struct ConversionFn(pub Arc<dyn Fn(&Value) -> Result<Value, Fault> + Send + Sync>);

impl fmt::Debug for ConversionFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversionFn(..)")
    }
}
impl PartialEq for ConversionFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for ConversionFn {}
impl Hash for ConversionFn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    NegateChecked,
    UnaryPlus,
    Not,
    OnesComplement,
    Increment,
    Decrement,
    Convert,
    ConvertChecked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    AddChecked,
    Subtract,
    SubtractChecked,
    Multiply,
    MultiplyChecked,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    And,
    Or,
    ExclusiveOr,
}

/// A single `x.Field = value` assignment inside a `MemberInit` (§4.5.11).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MemberBinding {
    pub member: MemberDescriptor,
    pub value: TArc<ExprNode>,
}

impl fmt::Debug for MemberBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberBinding")
            .field("member", &self.member)
            .field("value", &self.value)
            .finish()
    }
}

/// The closed set of accepted node shapes (C1). Any other shape is
/// rejected before a graph is built (§4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Constant(Value),
    /// Ordinal into the argument vector passed to `compile`/`create`.
    Parameter(usize),
    Member(TArc<ExprNode>, MemberDescriptor),
    Index(TArc<ExprNode>, IndexerDescriptor, Arc<[TArc<ExprNode>]>),
    Unary(UnaryOp, TArc<ExprNode>, ValueType, Option<MethodDescriptor>),
    Binary(BinaryOp, TArc<ExprNode>, TArc<ExprNode>, Option<MethodDescriptor>),
    Conditional(TArc<ExprNode>, TArc<ExprNode>, TArc<ExprNode>),
    Coalesce(TArc<ExprNode>, TArc<ExprNode>, Option<ConversionFn>),
    AndAlso(TArc<ExprNode>, TArc<ExprNode>),
    OrElse(TArc<ExprNode>, TArc<ExprNode>),
    TypeIs(TArc<ExprNode>, ValueType),
    Call(Option<TArc<ExprNode>>, MethodDescriptor, Arc<[TArc<ExprNode>]>),
    Invoke(TArc<ExprNode>, Arc<[TArc<ExprNode>]>),
    New(CtorDescriptor, Arc<[TArc<ExprNode>]>),
    NewArrayInit(ValueType, Arc<[TArc<ExprNode>]>),
    MemberInit(TArc<ExprNode>, Arc<[MemberBinding]>),
    /// A quoted lambda: body plus the ordinals of the parameters it binds
    /// (relative to the same argument vector), used when `Invoke` targets a
    /// value that is itself a compiled-in-place lambda rather than an
    /// external delegate (§4.5.10).
    Lambda(TArc<ExprNode>, Arc<[usize]>),
}

/// A node in the input expression tree, with its declared result type.
/// Equality and hashing are purely structural over `kind`; `typ` does not
/// participate (two trees that compute the same shape always agree on
/// type, but comparing it too would make cache keys needlessly brittle
/// against type-inference representation choices).
#[derive(Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub typ: ValueType,
}

impl fmt::Debug for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.kind, f)
    }
}

impl ExprNode {
    pub fn new(kind: ExprKind, typ: ValueType) -> TArc<Self> {
        TArc::new(Self { kind, typ })
    }
}

impl PartialEq for ExprNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}
impl Eq for ExprNode {}
impl Hash for ExprNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state)
    }
}
