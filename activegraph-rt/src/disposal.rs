//! A `DisposalSink` that hands async disposal futures to a `tokio` runtime
//! instead of `activegraph_core::options::LoggingDisposalSink`'s inline
//! busy-poll fallback (§4.7, §5 "runs off-thread").

use activegraph_core::fault::Fault;
use activegraph_core::options::DisposalSink;
use activegraph_core::value::AsyncDispose;
use tokio::runtime::Handle;

#[derive(Debug)]
pub struct TokioDisposalSink {
    handle: Handle,
}

impl TokioDisposalSink {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bind to the handle of the runtime currently executing this call.
    /// Panics outside a tokio context, matching `Handle::current`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl DisposalSink for TokioDisposalSink {
    fn spawn(&self, fut: AsyncDispose) {
        self.handle.spawn(async move {
            if let Err(e) = fut.await {
                log::error!("disposal failed: {e}");
            }
        });
    }

    fn log_error(&self, err: &Fault) {
        log::error!("disposal failed: {err}");
    }
}
