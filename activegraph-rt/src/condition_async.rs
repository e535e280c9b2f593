//! C8: `ConditionAsync`, a one-shot future that resolves with the first
//! value a node settles on (i.e. the first time it stops being `None`),
//! or resolves immediately if the node has already settled. Dropping the
//! returned future before it resolves unsubscribes and cancels cleanly.

use activegraph_core::node::NodeRef;
use activegraph_core::value::{ListenerId, Value};
use activegraph_core::Fault;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Await the first settled (value or fault) state of `node`. The returned
/// future holds a strong reference to `node`, so the underlying graph
/// stays alive for at least as long as the await point.
pub fn condition_async(node: NodeRef) -> ConditionAsync {
    let shared = Arc::new(Shared { waker: Mutex::new(None) });
    let listener_shared = shared.clone();
    let listener = Arc::new(move || {
        if let Some(w) = listener_shared.waker.lock().take() {
            w.wake();
        }
    });
    let listener_id = node.subscribe(listener);
    ConditionAsync { node, listener_id: Some(listener_id), shared }
}

struct Shared {
    waker: Mutex<Option<Waker>>,
}

pub struct ConditionAsync {
    node: NodeRef,
    listener_id: Option<ListenerId>,
    shared: Arc<Shared>,
}

impl ConditionAsync {
    fn settled(&self) -> Option<Result<Value, Fault>> {
        if let Some(f) = self.node.current_fault() {
            return Some(Err(f));
        }
        self.node.current_value().map(Ok)
    }

    fn unsubscribe(&mut self) {
        if let Some(id) = self.listener_id.take() {
            self.node.unsubscribe(id);
        }
    }
}

impl Future for ConditionAsync {
    type Output = Result<Value, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(result) = this.settled() {
            this.unsubscribe();
            return Poll::Ready(result);
        }
        // Register before re-checking: the node's change notification
        // always follows its state update, so a settle that races with
        // this poll is guaranteed to be visible in the second check below.
        *this.shared.waker.lock() = Some(cx.waker().clone());
        if let Some(result) = this.settled() {
            this.unsubscribe();
            return Poll::Ready(result);
        }
        Poll::Pending
    }
}

impl Drop for ConditionAsync {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
