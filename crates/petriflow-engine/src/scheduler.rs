//! Cancellable one-shot retry timers
//!
//! The instance actor owns one [`RetryScheduler`]; every pending retry is a
//! timer keyed by job id that posts a message back into the mailbox when it
//! fires. Cancellation reports whether the task was prevented from running;
//! the block-override path depends on that boolean being exact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::instance::JobId;

struct TimerHandle {
    fired: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// One-shot timers keyed by job id, delivering into a mailbox
///
/// A timer that fires marks itself fired and posts its message in one
/// non-async step, so [`cancel`](RetryScheduler::cancel) can never observe a
/// half-fired timer: it returns `true` iff the message will not be
/// delivered.
///
/// Zero-delay execution is the caller's concern (run the work inline rather
/// than scheduling it); the scheduler always sleeps first.
pub struct RetryScheduler<M> {
    tx: mpsc::UnboundedSender<M>,
    timers: HashMap<JobId, TimerHandle>,
}

impl<M: Send + 'static> RetryScheduler<M> {
    /// Create a scheduler delivering into `tx`
    pub fn new(tx: mpsc::UnboundedSender<M>) -> Self {
        Self {
            tx,
            timers: HashMap::new(),
        }
    }

    /// Arm a one-shot timer for `job_id`, replacing any pending one
    pub fn schedule(&mut self, job_id: JobId, delay: Duration, msg: M) {
        self.cancel(job_id);

        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Flag and send together, with no await between them: an abort
            // landing here either prevents both or neither.
            flag.store(true, Ordering::SeqCst);
            let _ = tx.send(msg);
        });

        debug!(job_id, ?delay, "retry timer armed");
        self.timers.insert(job_id, TimerHandle { fired, task });
    }

    /// Cancel the pending timer for `job_id`
    ///
    /// Returns `true` iff a timer existed and had not fired yet.
    pub fn cancel(&mut self, job_id: JobId) -> bool {
        match self.timers.remove(&job_id) {
            Some(handle) => {
                handle.task.abort();
                let prevented = !handle.fired.load(Ordering::SeqCst);
                debug!(job_id, prevented, "retry timer cancelled");
                prevented
            }
            None => false,
        }
    }

    /// Forget a timer that has delivered its message
    pub fn forget(&mut self, job_id: JobId) {
        self.timers.remove(&job_id);
    }

    /// Whether a timer is registered for `job_id`
    pub fn contains(&self, job_id: JobId) -> bool {
        self.timers.contains_key(&job_id)
    }

    /// Cancel every pending timer
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.task.abort();
        }
    }
}

impl<M> Drop for RetryScheduler<M> {
    fn drop(&mut self) {
        for handle in self.timers.values() {
            handle.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);

        scheduler.schedule(1, Duration::from_millis(50), "due");

        let msg = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timer should fire")
            .expect("channel open");
        assert_eq!(msg, "due");

        // Already fired: cancellation cannot prevent it
        assert!(!scheduler.cancel(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_delivery() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);

        scheduler.schedule(1, Duration::from_millis(50), "due");
        assert!(scheduler.cancel(1));

        sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unknown_timer() {
        let (tx, _rx) = mpsc::unbounded_channel::<&str>();
        let mut scheduler = RetryScheduler::new(tx);
        assert!(!scheduler.cancel(99));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);

        scheduler.schedule(1, Duration::from_secs(60), "first");
        scheduler.schedule(1, Duration::from_millis(10), "second");

        let msg = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("replacement timer should fire")
            .expect("channel open");
        assert_eq!(msg, "second");

        sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);

        scheduler.schedule(1, Duration::from_millis(10), 1);
        scheduler.schedule(2, Duration::from_millis(10), 2);
        scheduler.cancel_all();

        sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(!scheduler.contains(1));
    }
}
