//! C7: the value-disposal registry, plus the C3 optimizer hook. Both live
//! on `Options`, the per-`create()` configuration object that is itself
//! part of the instance-cache key (§4.4): two `Options` are equal when they
//! enumerate identical disposal predicates and an identical optimizer
//! reference.

use crate::expr::{ExprKind, ExprNode, IndexerDescriptor, MemberDescriptor, MethodDescriptor};
use crate::fault::Fault;
use crate::value::{AsyncDispose, Value};
use std::{fmt, future::Future, pin::Pin, sync::Arc};

/// Where disposal errors and async-dispose futures are routed (§4.7, §5
/// "async disposal of replaced values... runs off-thread"). `Options`
/// carries one; the default logs synchronously and drops futures
/// immediately executed to completion inline, which is adequate for
/// synchronous callers and tests -- `activegraph-rt` supplies a
/// `tokio::spawn`-backed implementation for real use.
pub trait DisposalSink: Send + Sync {
    fn spawn(&self, fut: AsyncDispose);
    fn log_error(&self, err: &Fault);
}

#[derive(Debug, Default)]
pub struct LoggingDisposalSink;

impl DisposalSink for LoggingDisposalSink {
    fn spawn(&self, fut: AsyncDispose) {
        // No executor available in this crate; poll-to-completion inline is
        // wrong for a real async object but keeps behavior observable in
        // unit tests that don't pull in a runtime. `activegraph-rt`
        // overrides this with a proper `tokio::spawn`.
        if let Err(e) = futures_lite_block_on(fut) {
            self.log_error(&e);
        }
    }

    fn log_error(&self, err: &Fault) {
        log::error!("disposal failed: {err}");
    }
}

/// A minimal, dependency-free "block on a future" for the fallback sink.
/// Only ever used when a caller disposes synchronously without wiring a
/// real executor; production call paths go through `activegraph-rt`.
fn futures_lite_block_on<F: Future>(mut fut: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
    fn noop(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
    let waker = unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) };
    let mut cx = Context::from_waker(&waker);
    // Safety: `fut` is not moved again after being pinned here.
    let mut fut = unsafe { Pin::new_unchecked(&mut fut) };
    loop {
        if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
            return v;
        }
        std::thread::yield_now();
    }
}

/// A structural pattern over `ExprKind` shapes, derived from an example
/// expression (spec §4.7: "a pattern matching Member/Index/Call/Invoke
/// shape"), used to decide whether a node's produced value should be
/// disposed when replaced.
#[derive(Clone)]
pub enum DisposalPattern {
    Member(MemberDescriptor),
    Index(IndexerDescriptor),
    Call(MethodDescriptor),
    Invoke,
}

impl fmt::Debug for DisposalPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisposalPattern::Member(d) => write!(f, "DisposalPattern::Member({})", d.name),
            DisposalPattern::Index(d) => write!(f, "DisposalPattern::Index({})", d.name),
            DisposalPattern::Call(d) => write!(f, "DisposalPattern::Call({})", d.name),
            DisposalPattern::Invoke => write!(f, "DisposalPattern::Invoke"),
        }
    }
}

impl DisposalPattern {
    /// Derive a pattern from an example expression. Returns `None` if the
    /// example is not one of the shapes this registry can match, matching
    /// the universal rule that only Member/Index/Call/Invoke produce
    /// disposable intermediate values.
    pub fn from_example(example: &ExprNode) -> Option<Self> {
        match &example.kind {
            ExprKind::Member(_, d) => Some(Self::Member(d.clone())),
            ExprKind::Index(_, d, _) => Some(Self::Index(d.clone())),
            ExprKind::Call(_, d, _) => Some(Self::Call(d.clone())),
            ExprKind::Invoke(_, _) => Some(Self::Invoke),
            _ => None,
        }
    }

    pub fn matches(&self, expr: &ExprNode) -> bool {
        match (self, &expr.kind) {
            (Self::Member(d), ExprKind::Member(_, d2)) => d == d2,
            (Self::Index(d), ExprKind::Index(_, d2, _)) => d == d2,
            (Self::Call(d), ExprKind::Call(_, d2, _)) => d == d2,
            (Self::Invoke, ExprKind::Invoke(..)) => true,
            _ => false,
        }
    }
}

/// Rewrites a compiled-in tree before C4 compilation (C3). Kept as a
/// reference-identity-compared slot, matching "process-wide `optimizer`
/// hook slot accepts a tree-rewriter function" (spec §6).
pub type Optimizer = Arc<dyn Fn(triomphe::Arc<ExprNode>) -> triomphe::Arc<ExprNode> + Send + Sync>;

/// Per-`create()` configuration: disposal predicates plus the optional
/// optimizer hook. Part of the instance-cache key (§4.4).
#[derive(Clone)]
pub struct Options {
    value_disposals: Vec<DisposalPattern>,
    constructed_type_disposals: Vec<arcstr::ArcStr>,
    optimizer: Option<Optimizer>,
    sink: Arc<dyn DisposalSink>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("value_disposals", &self.value_disposals)
            .field("constructed_type_disposals", &self.constructed_type_disposals)
            .field("optimizer", &self.optimizer.is_some())
            .finish()
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            value_disposals: Vec::new(),
            constructed_type_disposals: Vec::new(),
            optimizer: None,
            sink: Arc::new(LoggingDisposalSink),
        }
    }
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    pub fn should_dispose_value(&self, expr: &ExprNode) -> bool {
        self.value_disposals.iter().any(|p| p.matches(expr))
    }

    pub fn should_dispose_constructed(&self, type_name: &str) -> bool {
        self.constructed_type_disposals.iter().any(|n| n.as_str() == type_name)
    }

    pub fn optimizer(&self) -> Option<&Optimizer> {
        self.optimizer.as_ref()
    }

    pub fn sink(&self) -> &Arc<dyn DisposalSink> {
        &self.sink
    }

    /// Option equality per §4.4: identical disposal predicates and an
    /// identical optimizer reference (not merely an equivalent one).
    pub fn cache_key_eq(&self, other: &Self) -> bool {
        if self.value_disposals.len() != other.value_disposals.len() {
            return false;
        }
        for (a, b) in self.value_disposals.iter().zip(other.value_disposals.iter()) {
            if !disposal_patterns_eq(a, b) {
                return false;
            }
        }
        if self.constructed_type_disposals != other.constructed_type_disposals {
            return false;
        }
        match (&self.optimizer, &other.optimizer) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn disposal_patterns_eq(a: &DisposalPattern, b: &DisposalPattern) -> bool {
    use DisposalPattern::*;
    match (a, b) {
        (Member(x), Member(y)) => x == y,
        (Index(x), Index(y)) => x == y,
        (Call(x), Call(y)) => x == y,
        (Invoke, Invoke) => true,
        _ => false,
    }
}

/// Dispose `previous` if `opts` has a matching pattern for `spec`'s shape,
/// `previous` differs from `next`, and `previous` is a disposable object.
/// Disposal errors are logged but never re-fault the node (§4.7).
pub fn maybe_dispose_replaced(opts: &Options, spec: &ExprNode, previous: Option<&Value>, next: Option<&Value>) {
    if !opts.should_dispose_value(spec) {
        return;
    }
    if previous == next {
        return;
    }
    if let Some(prev) = previous {
        dispose_value(opts, prev);
    }
}

/// Dispose `value` unconditionally (used for the constructed-type registry
/// and for final teardown, §3 "Lifecycle").
pub fn dispose_value(opts: &Options, value: &Value) {
    let Value::Object(obj) = value else { return };
    let Some(disposable) = obj.0.as_disposable() else { return };
    if let Some(fut) = disposable.dispose_async() {
        opts.sink().spawn(fut);
    } else if let Err(e) = disposable.dispose_sync() {
        opts.sink().log_error(&e);
    }
}


#[derive(Default)]
pub struct OptionsBuilder {
    value_disposals: Vec<DisposalPattern>,
    constructed_type_disposals: Vec<arcstr::ArcStr>,
    optimizer: Option<Optimizer>,
    sink: Option<Arc<dyn DisposalSink>>,
}

impl OptionsBuilder {
    /// Register an expression-value disposal pattern derived from an
    /// example lambda's body.
    pub fn add_expression_value_disposal(mut self, example: &ExprNode) -> Self {
        if let Some(p) = DisposalPattern::from_example(example) {
            self.value_disposals.push(p);
        }
        self
    }

    pub fn add_constructed_type_disposal(mut self, type_name: impl Into<arcstr::ArcStr>) -> Self {
        self.constructed_type_disposals.push(type_name.into());
        self
    }

    pub fn optimizer(mut self, f: Optimizer) -> Self {
        self.optimizer = Some(f);
        self
    }

    pub fn disposal_sink(mut self, sink: Arc<dyn DisposalSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Options {
        Options {
            value_disposals: self.value_disposals,
            constructed_type_disposals: self.constructed_type_disposals,
            optimizer: self.optimizer,
            sink: self.sink.unwrap_or_else(|| Arc::new(LoggingDisposalSink)),
        }
    }
}
