//! Timeout guard
//!
//! Bounds the total wall-clock time of one logical call. Each attempt is
//! raced against the same deadline; when the deadline wins the attempt is
//! dropped, the optional `on_timeout` hook runs once and the call fails with
//! `TimeoutExceeded`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::SchedulerError;

/// Side-effecting hook run before a terminal error is returned
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Deadline shared by every attempt of one logical call
pub(crate) struct TimeoutGuard {
    limit: Duration,
    deadline: Instant,
    on_timeout: Option<Callback>,
}

impl TimeoutGuard {
    /// Start the clock now
    pub(crate) fn start(limit: Duration, on_timeout: Option<Callback>) -> Self {
        debug!(?limit, has_hook = on_timeout.is_some(), "TimeoutGuard::start: called");
        Self {
            limit,
            deadline: Instant::now() + limit,
            on_timeout,
        }
    }

    pub(crate) fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Fail with `TimeoutExceeded` if the budget is already spent
    pub(crate) fn check(&mut self) -> Result<(), SchedulerError> {
        if self.expired() {
            debug!("TimeoutGuard::check: budget already spent");
            return Err(self.fire());
        }
        Ok(())
    }

    /// Race `attempt` against the deadline
    ///
    /// Exactly one outcome is observed: the attempt's own output, or the
    /// timeout. A timed-out attempt is dropped and never completes later.
    pub(crate) async fn run<F>(&mut self, attempt: F) -> Result<F::Output, SchedulerError>
    where
        F: Future,
    {
        match tokio::time::timeout_at(self.deadline, attempt).await {
            Ok(output) => Ok(output),
            Err(_) => Err(self.fire()),
        }
    }

    fn fire(&mut self) -> SchedulerError {
        warn!(limit = ?self.limit, "Call exceeded its time budget");
        if let Some(hook) = self.on_timeout.take() {
            debug!("TimeoutGuard::fire: running on_timeout hook");
            hook();
        }
        SchedulerError::TimeoutExceeded { limit: self.limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook(counter: &Arc<AtomicUsize>) -> Callback {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_attempt_passes_through() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut guard = TimeoutGuard::start(Duration::from_secs(1), Some(counting_hook(&fired)));

        let result = guard
            .run(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                42
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut guard = TimeoutGuard::start(Duration::from_secs(1), Some(counting_hook(&fired)));

        let result = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                42
            })
            .await;
        assert!(result.unwrap_err().is_timeout());

        // Later checks still fail but never re-run the hook
        assert!(guard.expired());
        assert!(guard.check().unwrap_err().is_timeout());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_spans_attempts() {
        let mut guard = TimeoutGuard::start(Duration::from_secs(1), None);

        let first = guard.run(tokio::time::sleep(Duration::from_millis(600))).await;
        assert!(first.is_ok());
        assert!(guard.check().is_ok());

        let second = guard.run(tokio::time::sleep(Duration::from_millis(600))).await;
        assert!(second.unwrap_err().is_timeout());
    }
}
