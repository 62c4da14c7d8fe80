//! Retry governor
//!
//! Runs one logical call as a bounded loop of attempts. The first attempt
//! costs 1 unit against the pacer, every retry costs the configured
//! multiplier since a failure usually means the service is saturated.

use std::future::Future;

use tracing::{debug, warn};

use super::config::SchedulerConfig;
use super::error::{RemoteError, SchedulerError};
use super::pacer::Pacer;
use super::timeout::{Callback, TimeoutGuard};
use super::types::OperationClass;

/// Attempt bookkeeping for one logical call
pub(crate) struct RetryGovernor<'a> {
    config: &'a SchedulerConfig,
    pacer: &'a Pacer,
    class: OperationClass,
    attempts: u32,
}

impl<'a> RetryGovernor<'a> {
    pub(crate) fn new(config: &'a SchedulerConfig, pacer: &'a Pacer, class: OperationClass) -> Self {
        Self {
            config,
            pacer,
            class,
            attempts: 0,
        }
    }

    fn cost(&self) -> u32 {
        if self.attempts == 0 {
            1
        } else {
            self.config.retry_cost_multiplier.max(1)
        }
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// A missing resource is never retried, even with `retry-all-errors`
    fn should_retry(&self, err: &RemoteError) -> bool {
        !err.is_not_found() && (self.config.retry_all_errors || err.is_retryable())
    }

    /// Drive `operation` until it succeeds, fails for good, or the guard expires
    pub(crate) async fn run<T, F, Fut>(
        mut self,
        guard: &mut TimeoutGuard,
        mut operation: F,
        mut on_exhausted: Option<Callback>,
    ) -> Result<T, SchedulerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let class = self.class;
        debug!(%class, "RetryGovernor::run: called");

        loop {
            if self.attempts > 0
                && let Err(err) = guard.check()
            {
                self.pacer.record(class, |s| s.timed_out += 1);
                return Err(err);
            }

            let reservation = self.pacer.reserve(class, self.cost());
            let wait = reservation.wait();
            if !wait.is_zero() {
                verbose!(self.config.verbose, %class, attempt = self.attempts + 1, ?wait, "Forcing delay before remote call");
            }

            let outcome = guard
                .run(async {
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    operation().await
                })
                .await;
            drop(reservation);
            self.attempts += 1;

            let err = match outcome {
                Err(timeout) => {
                    self.pacer.record(class, |s| s.timed_out += 1);
                    return Err(timeout);
                }
                Ok(Ok(value)) => {
                    debug!(%class, attempts = self.attempts, "RetryGovernor::run: succeeded");
                    self.pacer.record(class, |s| s.succeeded += 1);
                    return Ok(value);
                }
                Ok(Err(err)) => err,
            };

            if !self.should_retry(&err) {
                debug!(%class, error = %err, "RetryGovernor::run: not retryable");
                self.pacer.record(class, |s| s.failed += 1);
                return Err(err.into());
            }

            if self.attempts >= self.max_attempts() {
                warn!(%class, attempts = self.attempts, error = %err, "Giving up on remote call");
                self.pacer.record(class, |s| s.exhausted += 1);
                if let Some(hook) = on_exhausted.take() {
                    hook();
                }
                return Err(SchedulerError::PermanentFailure {
                    attempts: self.attempts,
                    source: err,
                });
            }

            warn!(%class, attempt = self.attempts, error = %err, "Remote call failed, retrying");
            self.pacer.record(class, |s| s.retried += 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn config(max_attempts: u32) -> SchedulerConfig {
        SchedulerConfig {
            max_attempts,
            ..Default::default()
        }
    }

    fn counter_hook(counter: &Arc<AtomicUsize>) -> Callback {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Operation that fails transiently `failures` times, then returns its call count
    fn flaky(calls: &AtomicUsize, failures: usize) -> impl FnMut() -> std::future::Ready<Result<usize, RemoteError>> + '_ {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                std::future::ready(Err(RemoteError::Transient(format!("quota #{n}"))))
            } else {
                std::future::ready(Ok(n))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_k_failures() {
        let config = config(60);
        let pacer = Pacer::new(config.delay());
        let calls = AtomicUsize::new(0);
        let mut guard = TimeoutGuard::start(config.timeout(), None);

        let governor = RetryGovernor::new(&config, &pacer, OperationClass::Read);
        let value = governor.run(&mut guard, flaky(&calls, 3), None).await.unwrap();

        assert_eq!(value, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let stats = pacer.stats(OperationClass::Read);
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.retried, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.queued_cost, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_paced_with_amplified_cost() {
        let config = config(60);
        let pacer = Pacer::new(config.delay());
        let calls = AtomicUsize::new(0);
        let mut guard = TimeoutGuard::start(config.timeout(), None);
        let start = Instant::now();

        let governor = RetryGovernor::new(&config, &pacer, OperationClass::Write);
        governor.run(&mut guard, flaky(&calls, 1), None).await.unwrap();

        assert_eq!(start.elapsed(), config.delay() * config.retry_cost_multiplier);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let config = config(5);
        let pacer = Pacer::new(config.delay());
        let calls = AtomicUsize::new(0);
        let exhausted = Arc::new(AtomicUsize::new(0));
        let mut guard = TimeoutGuard::start(config.timeout(), None);

        let governor = RetryGovernor::new(&config, &pacer, OperationClass::Read);
        let err = governor
            .run(&mut guard, flaky(&calls, usize::MAX), Some(counter_hook(&exhausted)))
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::PermanentFailure { attempts: 5, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(exhausted.load(Ordering::SeqCst), 1);
        assert_eq!(pacer.stats(OperationClass::Read).exhausted, 1);
        assert_eq!(pacer.stats(OperationClass::Read).queued_cost, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_error_is_not_retried() {
        let config = config(60);
        let pacer = Pacer::new(config.delay());
        let calls = AtomicUsize::new(0);
        let mut guard = TimeoutGuard::start(config.timeout(), None);

        let governor = RetryGovernor::new(&config, &pacer, OperationClass::Write);
        let err = governor
            .run(
                &mut guard,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Err::<(), _>(RemoteError::Rejected("bad range".to_string())))
                },
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::Remote(RemoteError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pacer.stats(OperationClass::Write).failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_all_errors_retries_rejections() {
        let config = SchedulerConfig {
            max_attempts: 3,
            retry_all_errors: true,
            ..Default::default()
        };
        let pacer = Pacer::new(config.delay());
        let calls = AtomicUsize::new(0);
        let mut guard = TimeoutGuard::start(config.timeout(), None);

        let governor = RetryGovernor::new(&config, &pacer, OperationClass::Write);
        let err = governor
            .run(
                &mut guard,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Err::<(), _>(RemoteError::Rejected("bad range".to_string())))
                },
                None,
            )
            .await
            .unwrap_err();

        assert!(err.is_permanent());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_all_errors_never_retries_not_found() {
        let config = SchedulerConfig {
            max_attempts: 5,
            retry_all_errors: true,
            ..Default::default()
        };
        let pacer = Pacer::new(config.delay());
        let calls = AtomicUsize::new(0);
        let mut guard = TimeoutGuard::start(config.timeout(), None);

        let governor = RetryGovernor::new(&config, &pacer, OperationClass::Read);
        let err = governor
            .run(
                &mut guard,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::future::ready(Err::<(), _>(RemoteError::NotFound("tab".to_string())))
                },
                None,
            )
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!err.is_permanent());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pacer.stats(OperationClass::Read).failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retrying() {
        let config = SchedulerConfig {
            timeout_ms: 1_000,
            ..Default::default()
        };
        let pacer = Pacer::new(config.delay());
        let calls = AtomicUsize::new(0);
        let timed_out = Arc::new(AtomicUsize::new(0));
        let exhausted = Arc::new(AtomicUsize::new(0));
        let mut guard = TimeoutGuard::start(config.timeout(), Some(counter_hook(&timed_out)));

        let governor = RetryGovernor::new(&config, &pacer, OperationClass::Read);
        let err = governor
            .run(&mut guard, flaky(&calls, usize::MAX), Some(counter_hook(&exhausted)))
            .await
            .unwrap_err();

        // The first retry must wait 2s, which is past the 1s budget
        assert!(err.is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(timed_out.load(Ordering::SeqCst), 1);
        assert_eq!(exhausted.load(Ordering::SeqCst), 0);
        assert_eq!(pacer.stats(OperationClass::Read).queued_cost, 0);
        assert_eq!(pacer.stats(OperationClass::Read).timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_is_cut_off() {
        let config = SchedulerConfig {
            timeout_ms: 500,
            ..Default::default()
        };
        let pacer = Pacer::new(config.delay());
        let mut guard = TimeoutGuard::start(config.timeout(), None);
        let start = Instant::now();

        let governor = RetryGovernor::new(&config, &pacer, OperationClass::Write);
        let err = governor
            .run(
                &mut guard,
                || async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, RemoteError>(())
                },
                None,
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }
}
