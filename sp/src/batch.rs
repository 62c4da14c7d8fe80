//! Pending write buffer
//!
//! Accumulates change requests per collection without touching the
//! network, then flushes a whole collection as one combined write through
//! the scheduler.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::scheduler::{CallOptions, RemoteError, Scheduler, SchedulerError};

/// Pending requests of one collection
///
/// `generation` moves on every `clear_all`, so a flush that started before
/// the clear knows its requests are no longer at the front of the queue.
struct Pending<R> {
    requests: Vec<R>,
    generation: u64,
}

impl<R> Default for Pending<R> {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            generation: 0,
        }
    }
}

/// Ordered pending requests keyed by collection id
///
/// Flushes of one collection are serialised; different collections flush
/// independently.
pub struct BatchBuffer<R> {
    pending: Mutex<HashMap<String, Pending<R>>>,
    flushes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<R> Default for BatchBuffer<R> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            flushes: Mutex::new(HashMap::new()),
        }
    }
}

impl<R> BatchBuffer<R>
where
    R: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, Pending<R>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flush_lock(&self, collection: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut flushes = self.flushes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        flushes.entry(collection.to_string()).or_default().clone()
    }

    /// Queue a request for `collection`
    pub fn add(&self, collection: &str, request: R) {
        let mut pending = self.pending();
        let queue = pending.entry(collection.to_string()).or_default();
        queue.requests.push(request);
        debug!(%collection, queued = queue.requests.len(), "BatchBuffer::add: queued");
    }

    /// Number of requests waiting for `collection`
    pub fn len(&self, collection: &str) -> usize {
        self.pending().get(collection).map_or(0, |queue| queue.requests.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Copy of every pending sequence
    pub fn get_all(&self) -> HashMap<String, Vec<R>> {
        self.pending()
            .iter()
            .map(|(collection, queue)| (collection.clone(), queue.requests.clone()))
            .collect()
    }

    /// Empty every pending sequence
    pub fn clear_all(&self) {
        debug!("BatchBuffer::clear_all: called");
        for queue in self.pending().values_mut() {
            queue.requests.clear();
            queue.generation += 1;
        }
    }

    /// Flush `collection` as one scheduled write
    ///
    /// Returns `Ok(None)` without any remote call when nothing is pending.
    /// The flushed requests are removed only once the write succeeds;
    /// requests added while the write was in flight stay queued. If the
    /// buffer was cleared meanwhile, nothing queued since is removed.
    pub async fn run<T, F, Fut>(
        &self,
        scheduler: &Scheduler,
        collection: &str,
        options: CallOptions,
        mut write: F,
    ) -> Result<Option<T>, SchedulerError>
    where
        F: FnMut(Vec<R>) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        debug!(%collection, "BatchBuffer::run: called");
        let lock = self.flush_lock(collection);
        let _flushing = lock.lock().await;

        let (batch, generation) = self
            .pending()
            .get(collection)
            .map(|queue| (queue.requests.clone(), queue.generation))
            .unwrap_or_default();
        if batch.is_empty() {
            debug!(%collection, "BatchBuffer::run: nothing pending");
            return Ok(None);
        }

        let count = batch.len();
        info!(%collection, count, "Flushing batched requests");
        let result = scheduler
            .schedule_write_with(options, || write(batch.clone()))
            .await?;

        if let Some(queue) = self.pending().get_mut(collection) {
            if queue.generation == generation {
                queue.requests.drain(..count.min(queue.requests.len()));
            } else {
                debug!(%collection, "BatchBuffer::run: cleared during flush, keeping newer requests");
            }
        }
        Ok(Some(result))
    }
}
