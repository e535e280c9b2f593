//! The public surface: `create`/`create_with_options` compile an
//! expression tree against the process-wide instance cache (C6) and hand
//! back a handle a consumer can read, subscribe to, and render, backed by
//! a `tokio`-spawning disposal sink (§4.7).

pub mod cache;
pub mod condition_async;
pub mod disposal;

use activegraph_core::expr::ExprNode;
use activegraph_core::node::{ActiveNode, NodeRef};
use activegraph_core::options::Options;
use activegraph_core::value::{Listener, ListenerId, Value, ValueType};
use activegraph_core::Fault;
pub use condition_async::{condition_async, ConditionAsync};
pub use disposal::TokioDisposalSink;
use std::sync::Arc;
use triomphe::Arc as TArc;

static CACHE: std::sync::OnceLock<cache::InstanceCache> = std::sync::OnceLock::new();

fn global_cache() -> &'static cache::InstanceCache {
    CACHE.get_or_init(cache::InstanceCache::new)
}

/// Compile (or reuse a cached instance of) `expr` bound to `args`, using
/// default options (no disposal patterns, no optimizer, and a
/// `TokioDisposalSink` bound to the caller's current runtime).
pub fn create(expr: TArc<ExprNode>, args: Vec<Value>) -> anyhow::Result<ActiveExpression> {
    let options = Arc::new(
        Options::builder().disposal_sink(Arc::new(TokioDisposalSink::current())).build(),
    );
    create_with_options(expr, args, options)
}

/// Compile (or reuse a cached instance of) `expr` bound to `args` under
/// caller-supplied `options`. Two calls with structurally-equal `expr`,
/// equal `args` (by value, by reference identity for objects), and
/// `Options` that satisfy `cache_key_eq` resolve to the same live node.
pub fn create_with_options(
    expr: TArc<ExprNode>,
    args: Vec<Value>,
    options: Arc<Options>,
) -> anyhow::Result<ActiveExpression> {
    let node = global_cache().get_or_create(expr, args, options)?;
    Ok(ActiveExpression { node })
}

/// A consumer's strong handle onto a live node. Dropping it (or calling
/// [`ActiveExpression::release`], equivalent to dropping) releases this
/// handle's share of the node; the node itself tears down once every
/// strong referent -- consumer handles and parent nodes alike -- is gone.
#[derive(Clone)]
pub struct ActiveExpression {
    node: NodeRef,
}

impl ActiveExpression {
    pub fn value(&self) -> Option<Value> {
        self.node.current_value()
    }

    pub fn fault(&self) -> Option<Fault> {
        self.node.current_fault()
    }

    pub fn typ(&self) -> ValueType {
        self.node.typ()
    }

    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        self.node.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.node.unsubscribe(id)
    }

    /// Render this expression's compiled shape back to its canonical
    /// textual form (C9): every subexpression reachable from this handle,
    /// not only the root, gets its own trailing `/* = value */` or
    /// `/* [ErrorKind: message] */` comment.
    pub fn render(&self) -> String {
        activegraph_core::render::render_node(&*self.node)
    }

    /// This node's currently-live structural children, each as its own
    /// handle -- lets a caller walk into and `to_string()`/render any
    /// intermediate subexpression, not only the root.
    pub fn children(&self) -> Vec<ActiveExpression> {
        self.node.children().into_iter().map(|node| ActiveExpression { node }).collect()
    }

    /// Await the first settled (value or fault) state of this expression.
    pub fn condition_async(&self) -> ConditionAsync {
        condition_async(self.node.clone())
    }

    /// Release this handle. Identical to dropping it; kept as an explicit
    /// method so callers don't need to shadow-bind to drop early.
    pub fn release(self) {}
}

impl std::fmt::Debug for ActiveExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveExpression").field("value", &self.value()).field("fault", &self.fault()).finish()
    }
}

impl std::fmt::Display for ActiveExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
