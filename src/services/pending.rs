use log::debug;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{task::AbortHandle, time::sleep};

/// The one negotiation attempt currently in flight.
///
/// Owns the deferred UI actions of the attempt. Cancelling aborts them and
/// raises the `abort` flag, so no callback of an older attempt fires after a
/// newer one has started.
#[derive(Debug, Default)]
pub(crate) struct PendingRequest {
    abort: Arc<AtomicBool>,
    timers: Vec<AbortHandle>,
}

impl PendingRequest {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Run `action` after `delay` unless the attempt is cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn defer<F>(&mut self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            action();
        });
        self.timers.push(handle.abort_handle());
    }

    /// Mark the attempt terminal and drop its deferred actions.
    pub(crate) fn cancel(&mut self) {
        self.abort.store(true, Ordering::SeqCst);
        if !self.timers.is_empty() {
            debug!("cancel {} deferred action(s)", self.timers.len());
        }
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.cancel();
    }
}
