//! Shared types for the scheduler

use std::fmt;

use serde::Serialize;

/// Kind of remote operation; each class is paced independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClass {
    Read,
    Write,
}

impl OperationClass {
    pub(crate) fn index(self) -> usize {
        match self {
            OperationClass::Read => 0,
            OperationClass::Write => 1,
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationClass::Read => write!(f, "READ"),
            OperationClass::Write => write!(f, "WRITE"),
        }
    }
}

/// Counters for one operation class
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    /// Attempts started, retries included
    pub attempts: u64,
    /// Logical calls that returned a value
    pub succeeded: u64,
    /// Attempts that failed and were retried
    pub retried: u64,
    /// Logical calls that failed without being retried
    pub failed: u64,
    /// Logical calls that hit the attempt ceiling
    pub exhausted: u64,
    /// Logical calls that ran out of time
    pub timed_out: u64,
    /// Sum of pacing delays imposed
    pub total_wait_ms: u64,
    /// Cost currently reserved by waiting or executing attempts
    pub queued_cost: u64,
    pub peak_queued_cost: u64,
}

/// Snapshot of scheduler activity
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub read: ClassStats,
    pub write: ClassStats,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cached_entries: usize,
}

impl SchedulerStats {
    /// Counters for a single class
    pub fn class(&self, class: OperationClass) -> &ClassStats {
        match class {
            OperationClass::Read => &self.read,
            OperationClass::Write => &self.write,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_display() {
        assert_eq!(OperationClass::Read.to_string(), "READ");
        assert_eq!(OperationClass::Write.to_string(), "WRITE");
    }

    #[test]
    fn test_stats_class_lookup() {
        let stats = SchedulerStats {
            write: ClassStats {
                attempts: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(stats.class(OperationClass::Write).attempts, 3);
        assert_eq!(stats.class(OperationClass::Read).attempts, 0);
    }
}
