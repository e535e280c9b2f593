//! C6: the process-wide instance cache. Keyed on the canonical expression
//! tree (structural equality, C2) plus the bound argument identities;
//! disambiguated within a bucket by `Options::cache_key_eq` (§4.4).
//!
//! Entries are held weakly so a node with no remaining strong referents
//! (no live consumer handle, no parent node) is free to drop; a weak
//! upgrade that loses the race during lookup is simply treated as a miss
//! and the dead entry is pruned.

use activegraph_core::expr::ExprNode;
use activegraph_core::node::{compiler, ActiveNode, NodeRef};
use activegraph_core::options::Options;
use activegraph_core::value::Value;
use activegraph_core::Fault;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use triomphe::Arc as TArc;

#[derive(Clone)]
struct CacheKey {
    expr: TArc<ExprNode>,
    args: Vec<Value>,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        *self.expr == *other.expr && self.args == other.args
    }
}
impl Eq for CacheKey {}
impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (*self.expr).hash(state);
        self.args.hash(state);
    }
}

struct Bucket {
    options: Arc<Options>,
    node: Weak<dyn ActiveNode>,
}

#[derive(Default)]
pub struct InstanceCache {
    buckets: Mutex<FxHashMap<CacheKey, Vec<Bucket>>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached node for `(expr, options, args)` if one is alive,
    /// compiling and inserting a fresh one otherwise.
    pub fn get_or_create(
        &self,
        expr: TArc<ExprNode>,
        args: Vec<Value>,
        options: Arc<Options>,
    ) -> Result<NodeRef, Fault> {
        let key = CacheKey { expr: expr.clone(), args: args.clone() };
        {
            let mut buckets = self.buckets.lock();
            if let Some(entries) = buckets.get_mut(&key) {
                entries.retain(|b| b.node.strong_count() > 0);
                for entry in entries.iter() {
                    if entry.options.cache_key_eq(&options) {
                        if let Some(node) = entry.node.upgrade() {
                            return Ok(node);
                        }
                    }
                }
            }
        }

        let node = compiler::compile_root(expr, &args, options.clone())?;

        let mut buckets = self.buckets.lock();
        let entries = buckets.entry(key).or_default();
        entries.push(Bucket { options, node: Arc::downgrade(&node) });
        Ok(node)
    }

    /// Number of live (upgradeable) entries, for tests and diagnostics.
    pub fn live_count(&self) -> usize {
        self.buckets.lock().values().flatten().filter(|b| b.node.upgrade().is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activegraph_core::expr::ExprKind;
    use activegraph_core::value::Value;

    fn const_expr(n: i64) -> TArc<ExprNode> {
        ExprNode::new(ExprKind::Constant(Value::I64(n)), activegraph_core::value::ValueType::I64)
    }

    #[test]
    fn repeated_lookup_with_equal_key_hits() {
        let cache = InstanceCache::new();
        let expr = const_expr(1);
        let options = Arc::new(Options::default());
        let a = cache.get_or_create(expr.clone(), vec![], options.clone()).unwrap();
        let b = cache.get_or_create(expr, vec![], options).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn distinct_args_miss() {
        let cache = InstanceCache::new();
        let expr = const_expr(1);
        let options = Arc::new(Options::default());
        let a = cache.get_or_create(expr.clone(), vec![Value::I64(1)], options.clone()).unwrap();
        let b = cache.get_or_create(expr, vec![Value::I64(2)], options).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.live_count(), 2);
    }

    #[test]
    fn dropped_node_is_pruned_and_recompiled() {
        let cache = InstanceCache::new();
        let expr = const_expr(7);
        let options = Arc::new(Options::default());
        let a = cache.get_or_create(expr.clone(), vec![], options.clone()).unwrap();
        drop(a);
        assert_eq!(cache.live_count(), 0);
        let b = cache.get_or_create(expr, vec![], options).unwrap();
        assert_eq!(b.current_value(), Some(Value::I64(7)));
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn equivalent_default_options_still_share_an_entry() {
        // Options::default() carries no disposal patterns and no optimizer,
        // so two independently-built instances are `cache_key_eq` and a
        // lookup against one finds the entry created under the other.
        let cache = InstanceCache::new();
        let expr = const_expr(3);
        let a = cache.get_or_create(expr.clone(), vec![], Arc::new(Options::default())).unwrap();
        let b = cache.get_or_create(expr, vec![], Arc::new(Options::default())).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn distinct_disposal_patterns_do_not_share_an_entry() {
        let cache = InstanceCache::new();
        let expr = const_expr(3);
        let a = cache
            .get_or_create(
                expr.clone(),
                vec![],
                Arc::new(Options::builder().add_constructed_type_disposal("Widget").build()),
            )
            .unwrap();
        let b = cache
            .get_or_create(
                expr,
                vec![],
                Arc::new(Options::builder().add_constructed_type_disposal("Gadget").build()),
            )
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.live_count(), 2);
    }
}
