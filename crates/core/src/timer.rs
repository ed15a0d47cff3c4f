//! Cancellable delayed task.
//!
//! A `DelayedTask` owns at most one pending future that runs after a delay on
//! the tokio runtime. Scheduling again replaces (resets) the pending one;
//! cancelling or dropping the handle discards it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct DelayedTask {
    handle: Option<JoinHandle<()>>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Run `task` after `delay`, replacing any pending task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    /// Discard the pending task, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Forget the pending task without aborting it.
    ///
    /// Used by a task that is currently running to release its own slot.
    pub fn detach(&mut self) {
        self.handle = None;
    }

    /// Whether a task is scheduled and has not finished yet.
    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_delay() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut task = DelayedTask::new();
        task.schedule(Duration::from_millis(100), counting(&counter));
        assert!(task.is_pending());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_resets_timer() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut task = DelayedTask::new();
        task.schedule(Duration::from_millis(100), counting(&counter));

        tokio::time::sleep(Duration::from_millis(80)).await;
        task.schedule(Duration::from_millis(100), counting(&counter));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut task = DelayedTask::new();
        task.schedule(Duration::from_millis(100), counting(&counter));
        task.cancel();
        assert!(!task.is_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let mut task = DelayedTask::new();
            task.schedule(Duration::from_millis(10), counting(&counter));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
