//! SheetClient trait definition

use async_trait::async_trait;

use super::{BatchRequest, DataRow, RangeUpdate, Row, TabInfo, TabSize};
use crate::scheduler::RemoteError;

/// Raw calls against the remote spreadsheet service
///
/// Every call costs one slot of the service's rate budget and may fail
/// transiently. Implementations do no pacing, caching or retrying of their
/// own; `SheetApi` routes every call through the scheduler.
#[async_trait]
pub trait SheetClient: Send + Sync {
    /// List the tabs of a spreadsheet
    async fn tab_list(&self, sheet_id: &str) -> Result<Vec<TabInfo>, RemoteError>;

    /// Read the rows below `header_row` (1-based), keyed by the header values
    async fn tab_rows(&self, sheet_id: &str, tab_id: i64, header_row: usize) -> Result<Vec<DataRow>, RemoteError>;

    async fn tab_size(&self, sheet_id: &str, tab_name: &str) -> Result<TabSize, RemoteError>;

    async fn update_range(&self, sheet_id: &str, update: &RangeUpdate) -> Result<(), RemoteError>;

    /// Append rows after the last used row, matching keys to header names
    async fn append_rows(&self, sheet_id: &str, tab_id: i64, rows: &[Row]) -> Result<(), RemoteError>;

    /// Remove every row below `header_row`
    async fn clear_rows(&self, sheet_id: &str, tab_id: i64, header_row: usize) -> Result<(), RemoteError>;

    async fn protected_range_ids(&self, sheet_id: &str, tab_id: i64) -> Result<Vec<i64>, RemoteError>;

    /// Apply several change requests in one call
    async fn batch_update(&self, sheet_id: &str, requests: &[BatchRequest]) -> Result<(), RemoteError>;
}
