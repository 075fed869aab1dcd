//! Cancellation signals polled by the streaming worker.
//!
//! Two independent signals stop a worker:
//! - the [`CancelToken`] stop flag, set by [`Session::stop`](crate::session::Session::stop)
//!   for cooperative shutdown;
//! - an injected [`InterruptSignal`], queried from the host environment for
//!   asynchronous abort requests (a Ctrl-C handler, a host runtime's
//!   "interrupt pending" poll, ...).
//!
//! Both are plain atomic reads on the worker side; neither takes a lock.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Capability the worker polls once per iteration for an external abort.
pub trait InterruptSignal: Send + Sync {
    fn is_interrupt_pending(&self) -> bool;
}

impl<F> InterruptSignal for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_interrupt_pending(&self) -> bool {
        self()
    }
}

/// Interrupt signal that never fires.
pub fn never_interrupt() -> Arc<dyn InterruptSignal> {
    Arc::new(|| false)
}

/// Interrupt signal backed by a token, e.g. one flipped by a signal handler.
pub fn token_interrupt(token: CancelToken) -> Arc<dyn InterruptSignal> {
    Arc::new(move || token.is_cancelled())
}
