//! Spreadsheet collaborators
//!
//! - [`SheetClient`] - raw calls to the remote service
//! - [`SheetApi`] - the same calls routed through the scheduler
//! - [`MemorySheetClient`] - in-process service for simulation and tests

mod api;
mod client;
mod memory;
mod types;

pub use api::{DEFAULT_HEADER_ROW, SheetApi};
pub use client::SheetClient;
pub use memory::MemorySheetClient;
pub use types::{
    AddProtectedRange, BatchRequest, DataRow, ProtectedRange, RangeUpdate, Row, TabInfo, TabSize, column_letters,
};
