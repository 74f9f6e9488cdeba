//! One-shot coordination between the reconciler and the watcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Write-once flag raised by the reconciler after the last request has
/// been issued or cancelled. Readers see it without locking; the
/// release store publishes everything written before the raise.
#[derive(Clone, Default)]
pub struct DoneSignal(Arc<AtomicBool>);

impl DoneSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cooperative stop flag with a cancellable sleep.
#[derive(Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.stopped.store(true, Ordering::Release);
        // notify_one stores a permit, so a sleeper that registers
        // after this call still wakes immediately.
        self.notify.notify_one();
    }

    pub fn is_signalled(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Sleep for `duration` or until signalled, whichever comes first.
    pub async fn sleep(&self, duration: Duration) {
        if self.is_signalled() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.notify.notified() => {}
        }
    }
}
