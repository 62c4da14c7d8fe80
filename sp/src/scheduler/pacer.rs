//! Rate pacer
//!
//! Spaces operations of one class so that a new unit of cost may start no
//! earlier than `last_completed_at + delay * queued_cost`. Every attempt
//! reserves its cost before waiting and gives it back when it settles, so
//! the more work is in flight the further new arrivals are pushed out.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::types::{ClassStats, OperationClass};

/// Pacing state for one operation class
#[derive(Debug, Default)]
struct PacerState {
    last_completed_at: Option<Instant>,
    queued_cost: u64,
    stats: ClassStats,
}

/// Per-class pacing for reads and writes
#[derive(Debug)]
pub(crate) struct Pacer {
    delay: Duration,
    states: [Mutex<PacerState>; 2],
}

impl Pacer {
    pub(crate) fn new(delay: Duration) -> Self {
        debug!(?delay, "Pacer::new: called");
        Self {
            delay,
            states: [Mutex::new(PacerState::default()), Mutex::new(PacerState::default())],
        }
    }

    fn state(&self, class: OperationClass) -> MutexGuard<'_, PacerState> {
        self.states[class.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve `cost` units for an attempt starting now
    pub(crate) fn reserve(&self, class: OperationClass, cost: u32) -> Reservation<'_> {
        self.reserve_at(class, cost, Instant::now())
    }

    /// Reserve `cost` units and compute how long the attempt must wait
    pub(crate) fn reserve_at(&self, class: OperationClass, cost: u32, now: Instant) -> Reservation<'_> {
        let mut state = self.state(class);
        state.queued_cost += u64::from(cost);

        let wait = match state.last_completed_at {
            None => Duration::ZERO,
            Some(last) => {
                let units = u32::try_from(state.queued_cost).unwrap_or(u32::MAX);
                let spacing = self.delay.saturating_mul(units);
                last.checked_add(spacing)
                    .map(|earliest| earliest.saturating_duration_since(now))
                    .unwrap_or(spacing)
            }
        };

        let queued_cost = state.queued_cost;
        state.stats.attempts += 1;
        state.stats.total_wait_ms += wait.as_millis() as u64;
        state.stats.peak_queued_cost = state.stats.peak_queued_cost.max(queued_cost);
        drop(state);

        debug!(%class, cost, queued_cost, ?wait, "Pacer::reserve: reserved");
        Reservation {
            pacer: self,
            class,
            cost,
            wait,
        }
    }

    fn release_at(&self, class: OperationClass, cost: u32, now: Instant) {
        let mut state = self.state(class);
        state.queued_cost = state.queued_cost.saturating_sub(u64::from(cost));
        state.last_completed_at = Some(now);
        debug!(%class, cost, queued_cost = state.queued_cost, "Pacer::release: released");
    }

    /// Update the counters of one class
    pub(crate) fn record(&self, class: OperationClass, update: impl FnOnce(&mut ClassStats)) {
        update(&mut self.state(class).stats);
    }

    /// Copy of the counters of one class
    pub(crate) fn stats(&self, class: OperationClass) -> ClassStats {
        let state = self.state(class);
        ClassStats {
            queued_cost: state.queued_cost,
            ..state.stats.clone()
        }
    }

    #[cfg(test)]
    pub(crate) fn last_completed_at(&self, class: OperationClass) -> Option<Instant> {
        self.state(class).last_completed_at
    }
}

/// Cost held by one attempt; returned to the pacer when dropped
#[derive(Debug)]
pub(crate) struct Reservation<'a> {
    pacer: &'a Pacer,
    class: OperationClass,
    cost: u32,
    wait: Duration,
}

impl Reservation<'_> {
    /// Time to wait before the attempt may start
    pub(crate) fn wait(&self) -> Duration {
        self.wait
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.pacer.release_at(self.class, self.cost, Instant::now());
    }
}
