//! Cancellation primitive shared by the agent loop, tool runtime, and adapter
//! calls. Abort is edge-triggered and idempotent: firing it twice has the
//! same effect as once, and every suspension point downstream observes it.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct AbortSignal(watch::Receiver<bool>);

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the signal is fired. Safe to select! against.
    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|aborted| *aborted).await;
    }
}

#[derive(Debug, Clone)]
pub struct AbortHandle(watch::Sender<bool>);

impl AbortHandle {
    pub fn new() -> (AbortHandle, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (AbortHandle(tx), AbortSignal(rx))
    }

    /// Idempotent: later calls after the first are no-ops.
    pub fn abort(&self) {
        let _ = self.0.send_if_modified(|aborted| {
            if *aborted {
                false
            } else {
                *aborted = true;
                true
            }
        });
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal(self.0.subscribe())
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        AbortHandle::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_is_observed_by_existing_signal() {
        let (handle, signal) = AbortHandle::new();
        assert!(!signal.is_aborted());
        handle.abort();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let (handle, signal) = AbortHandle::new();
        handle.abort();
        handle.abort();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_abort() {
        let (handle, mut signal) = AbortHandle::new();
        handle.abort();
        signal.cancelled().await;
        assert!(signal.is_aborted());
    }
}
