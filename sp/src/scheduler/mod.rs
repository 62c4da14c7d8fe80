//! Request scheduler for the remote spreadsheet service
//!
//! Paces reads and writes independently, retries transient failures with
//! an amplified pacing cost, bounds every call with a wall-clock budget and
//! caches successful reads by resource identity.

/// Log at info level when the scheduler runs verbose, debug otherwise
macro_rules! verbose {
    ($on:expr, $($arg:tt)+) => {
        if $on {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

mod cache;
mod config;
mod core;
mod error;
mod pacer;
mod retry;
mod timeout;
mod types;

pub use cache::CacheKey;
pub use config::SchedulerConfig;
pub use self::core::{CallOptions, Scheduler};
pub use error::{RemoteError, SchedulerError};
pub use timeout::Callback;
pub use types::{ClassStats, OperationClass, SchedulerStats};
