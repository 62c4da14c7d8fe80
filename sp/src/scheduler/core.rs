//! Scheduler facade

use std::fmt;
use std::future::Future;

use tracing::debug;

use super::cache::{CacheKey, ResourceCache};
use super::config::SchedulerConfig;
use super::error::{RemoteError, SchedulerError};
use super::pacer::Pacer;
use super::retry::RetryGovernor;
use super::timeout::{Callback, TimeoutGuard};
use super::types::{OperationClass, SchedulerStats};

/// Per-call knobs for a scheduled operation
#[derive(Default)]
pub struct CallOptions {
    bypass_cache: bool,
    on_timeout: Option<Callback>,
    on_exhausted: Option<Callback>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the cache lookup; the fresh value is still stored
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    /// Run `hook` once if the call runs out of time
    pub fn on_timeout(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_timeout = Some(Box::new(hook));
        self
    }

    /// Run `hook` once if the call runs out of attempts
    pub fn on_exhausted(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_exhausted = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("bypass_cache", &self.bypass_cache)
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_exhausted", &self.on_exhausted.is_some())
            .finish()
    }
}

/// The Scheduler paces, retries, bounds and caches every call made to the
/// remote service. Reads and writes are paced independently.
pub struct Scheduler {
    config: SchedulerConfig,
    pacer: Pacer,
    cache: ResourceCache,
}

impl Scheduler {
    /// Create a new scheduler with the given configuration
    pub fn new(config: SchedulerConfig) -> Self {
        debug!(?config, "Scheduler::new: called");
        Self {
            pacer: Pacer::new(config.delay()),
            cache: ResourceCache::new(),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run a read, answering from the cache when `key` was fetched before
    pub async fn schedule_read<T, F, Fut>(&self, key: Option<CacheKey>, operation: F) -> Result<T, SchedulerError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.schedule_read_with(key, CallOptions::default(), operation).await
    }

    /// Run a read with explicit call options
    pub async fn schedule_read_with<T, F, Fut>(
        &self,
        key: Option<CacheKey>,
        options: CallOptions,
        operation: F,
    ) -> Result<T, SchedulerError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        debug!(?key, ?options, "Scheduler::schedule_read: called");

        if let Some(key) = &key
            && !options.bypass_cache
            && let Some(value) = self.cache.get::<T>(key)
        {
            verbose!(self.config.verbose, %key, "Using cached read");
            return Ok(value);
        }

        let value = self.execute(OperationClass::Read, options, operation).await?;

        if let Some(key) = key {
            self.cache.put(key, value.clone());
        }
        Ok(value)
    }

    /// Run a write; writes are never cached
    pub async fn schedule_write<T, F, Fut>(&self, operation: F) -> Result<T, SchedulerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.schedule_write_with(CallOptions::default(), operation).await
    }

    /// Run a write with explicit call options
    pub async fn schedule_write_with<T, F, Fut>(&self, options: CallOptions, operation: F) -> Result<T, SchedulerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        debug!(?options, "Scheduler::schedule_write: called");
        self.execute(OperationClass::Write, options, operation).await
    }

    /// Drop every cached read
    pub fn clear_cache(&self) {
        debug!("Scheduler::clear_cache: called");
        self.cache.invalidate_all();
    }

    /// Get the scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            read: self.pacer.stats(OperationClass::Read),
            write: self.pacer.stats(OperationClass::Write),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            cached_entries: self.cache.len(),
        }
    }

    async fn execute<T, F, Fut>(
        &self,
        class: OperationClass,
        options: CallOptions,
        operation: F,
    ) -> Result<T, SchedulerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let CallOptions {
            on_timeout,
            on_exhausted,
            ..
        } = options;

        let mut guard = TimeoutGuard::start(self.config.timeout(), on_timeout);
        RetryGovernor::new(&self.config, &self.pacer, class)
            .run(&mut guard, operation, on_exhausted)
            .await
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
