//! SheetPacer - rate-paced access to a rate-limited spreadsheet service
//!
//! Every remote call is routed through a [`scheduler::Scheduler`] that keeps
//! the caller inside the service's request budget and absorbs its transient
//! failures.
//!
//! # Core Concepts
//!
//! - **Independent Pacing**: Reads and writes each have their own queue
//! - **Amplified Retries**: A retried attempt reserves more pacing cost than a first attempt
//! - **Bounded Calls**: Each logical call has one wall-clock budget covering all its attempts
//! - **Read Cache**: Successful reads are kept until explicitly cleared
//!
//! # Modules
//!
//! - [`scheduler`] - Pacing, retries, timeouts and the read cache
//! - [`batch`] - Per-collection buffering of batched write requests
//! - [`sheets`] - Spreadsheet client trait, API facade and in-memory service
//! - [`simulate`] - Concurrent workload against the in-memory service
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod batch;
pub mod cli;
pub mod config;
pub mod scheduler;
pub mod sheets;
pub mod simulate;

pub use batch::BatchBuffer;
pub use config::Config;
pub use scheduler::{CacheKey, CallOptions, RemoteError, Scheduler, SchedulerConfig, SchedulerError};
pub use sheets::{MemorySheetClient, SheetApi, SheetClient};
