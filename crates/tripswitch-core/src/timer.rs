//! One-shot cancellable recovery timer

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A delayed callback running on a tokio task
///
/// Dropping the timer aborts the task. Each timer carries the epoch it was armed with so the
/// owner can ignore a callback that raced with cancellation.
#[derive(Debug)]
pub(crate) struct RecoveryTimer {
    epoch: u64,
    handle: JoinHandle<()>,
}

impl RecoveryTimer {
    /// Run `on_fire` after `delay` on `runtime`
    pub(crate) fn spawn<F>(runtime: &Handle, delay: Duration, epoch: u64, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });
        Self { epoch, handle }
    }

    /// Epoch this timer was armed with
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the task has already run to completion or been aborted
    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RecoveryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
