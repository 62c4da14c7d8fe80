//! High-level spreadsheet API
//!
//! Every call goes through the shared `Scheduler`: reads are paced and
//! cached, writes are paced, and protected-range changes can be buffered
//! and flushed as one batch.

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use super::{AddProtectedRange, BatchRequest, DataRow, ProtectedRange, RangeUpdate, Row, SheetClient, TabInfo, TabSize};
use crate::batch::BatchBuffer;
use crate::scheduler::{CacheKey, CallOptions, RemoteError, Scheduler, SchedulerError};

/// Header row used when the caller does not name one
pub const DEFAULT_HEADER_ROW: usize = 1;

/// Spreadsheet access with pacing, retries, timeouts and caching
pub struct SheetApi {
    scheduler: Arc<Scheduler>,
    client: Arc<dyn SheetClient>,
    protected_ranges: BatchBuffer<BatchRequest>,
}

impl SheetApi {
    pub fn new(scheduler: Arc<Scheduler>, client: Arc<dyn SheetClient>) -> Self {
        debug!("SheetApi::new: called");
        Self {
            scheduler,
            client,
            protected_ranges: BatchBuffer::new(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// List the tabs of a spreadsheet
    pub async fn tab_ids(&self, sheet_id: &str) -> Result<Vec<TabInfo>, SchedulerError> {
        debug!(%sheet_id, "SheetApi::tab_ids: called");
        let client = self.client.as_ref();
        self.scheduler
            .schedule_read(Some(CacheKey::new(sheet_id, "tabs")), || client.tab_list(sheet_id))
            .await
    }

    /// Find a tab by name, in `tab_list` when given, otherwise via `tab_ids`
    async fn resolve_tab(
        &self,
        sheet_id: &str,
        tab_name: &str,
        tab_list: Option<&[TabInfo]>,
    ) -> Result<TabInfo, SchedulerError> {
        let not_found = || SchedulerError::ResourceNotFound(format!("tab {tab_name} not found"));
        if let Some(tabs) = tab_list {
            return tabs.iter().find(|tab| tab.tab_name == tab_name).cloned().ok_or_else(not_found);
        }
        self.tab_ids(sheet_id)
            .await?
            .into_iter()
            .find(|tab| tab.tab_name == tab_name)
            .ok_or_else(not_found)
    }

    /// Rows of a tab keyed by header values
    ///
    /// A caller holding a tab list from `tab_ids` can pass it to skip that read.
    pub async fn tab_data(
        &self,
        sheet_id: &str,
        tab_name: &str,
        header_row: Option<usize>,
        tab_list: Option<&[TabInfo]>,
    ) -> Result<Vec<DataRow>, SchedulerError> {
        debug!(%sheet_id, %tab_name, ?header_row, has_tab_list = tab_list.is_some(), "SheetApi::tab_data: called");
        let tab = self.resolve_tab(sheet_id, tab_name, tab_list).await?;
        let header_row = header_row.unwrap_or(DEFAULT_HEADER_ROW);
        let client = self.client.as_ref();
        self.scheduler
            .schedule_read(Some(CacheKey::new(sheet_id, format!("tab:{}", tab.tab_id))), || {
                client.tab_rows(sheet_id, tab.tab_id, header_row)
            })
            .await
    }

    /// Row and column counts of a tab
    pub async fn tab_size(&self, sheet_id: &str, tab_name: &str) -> Result<TabSize, SchedulerError> {
        debug!(%sheet_id, %tab_name, "SheetApi::tab_size: called");
        let client = self.client.as_ref();
        self.scheduler
            .schedule_read(Some(CacheKey::new(sheet_id, format!("size:{tab_name}"))), || {
                client.tab_size(sheet_id, tab_name)
            })
            .await
    }

    /// Drop every cached read
    pub fn clear_cache(&self) {
        self.scheduler.clear_cache();
    }

    /// Write a block of values starting at a 1-based (row, column) cell
    pub async fn update_range(
        &self,
        sheet_id: &str,
        tab_name: &str,
        start: (usize, usize),
        values: Vec<Vec<String>>,
    ) -> Result<(), SchedulerError> {
        let update = RangeUpdate::new(tab_name, start, values);
        if update.is_empty() {
            debug!(%sheet_id, %tab_name, "SheetApi::update_range: empty block, skipping");
            return Ok(());
        }
        debug!(%sheet_id, range = %update.a1_notation(), "SheetApi::update_range: called");
        let client = self.client.as_ref();
        self.scheduler
            .schedule_write(|| client.update_range(sheet_id, &update))
            .await
    }

    /// Append rows to a tab
    pub async fn append_rows(&self, sheet_id: &str, tab_name: &str, rows: Vec<Row>) -> Result<(), SchedulerError> {
        debug!(%sheet_id, %tab_name, count = rows.len(), "SheetApi::append_rows: called");
        let tab = self.resolve_tab(sheet_id, tab_name, None).await?;
        let client = self.client.as_ref();
        self.scheduler
            .schedule_write(|| client.append_rows(sheet_id, tab.tab_id, &rows))
            .await
    }

    /// Remove every value below the header row of a tab
    pub async fn clear_tab_data(
        &self,
        sheet_id: &str,
        tab_name: &str,
        header_row: Option<usize>,
        tab_list: Option<&[TabInfo]>,
    ) -> Result<(), SchedulerError> {
        debug!(%sheet_id, %tab_name, ?header_row, has_tab_list = tab_list.is_some(), "SheetApi::clear_tab_data: called");
        let tab = self.resolve_tab(sheet_id, tab_name, tab_list).await?;
        let header_row = header_row.unwrap_or(DEFAULT_HEADER_ROW);
        let client = self.client.as_ref();
        self.scheduler
            .schedule_write(|| client.clear_rows(sheet_id, tab.tab_id, header_row))
            .await
    }

    /// Ids of the protected ranges set on a tab
    pub async fn protected_range_ids(&self, sheet_id: &str, tab_name: &str) -> Result<Vec<i64>, SchedulerError> {
        debug!(%sheet_id, %tab_name, "SheetApi::protected_range_ids: called");
        let tab = self.resolve_tab(sheet_id, tab_name, None).await?;
        let client = self.client.as_ref();
        self.scheduler
            .schedule_read(None, || client.protected_range_ids(sheet_id, tab.tab_id))
            .await
    }

    /// Delete protected ranges in one combined write
    pub async fn delete_protected_ranges(&self, sheet_id: &str, ids: &[i64]) -> Result<(), SchedulerError> {
        debug!(%sheet_id, count = ids.len(), "SheetApi::delete_protected_ranges: called");
        if ids.is_empty() {
            return Ok(());
        }
        let requests: Vec<_> = ids
            .iter()
            .map(|id| BatchRequest::DeleteProtectedRange { protected_range_id: *id })
            .collect();
        let client = self.client.as_ref();
        self.scheduler
            .schedule_write(|| client.batch_update(sheet_id, &requests))
            .await
    }

    /// Queue a protected range for the next batch run of its spreadsheet
    pub fn add_batch_protected_range(&self, request: AddProtectedRange) {
        let description = request
            .name
            .unwrap_or_else(|| rand::rng().random_range(100_000_000u64..1_000_000_000_000).to_string());
        debug!(sheet_id = %request.sheet_id, %description, "SheetApi::add_batch_protected_range: called");

        let range = ProtectedRange {
            tab_id: request.tab_id,
            description,
            editors: request.editors,
            start_row: request.start_row,
            start_col: request.start_col,
            end_row: request.end_row + 1,
            end_col: request.end_col + 1,
        };
        self.protected_ranges
            .add(&request.sheet_id, BatchRequest::AddProtectedRange(range));
    }

    /// Send every queued protected range of a spreadsheet in one write
    ///
    /// Returns the number of requests sent; zero means no call was made.
    pub async fn run_batch_protected_range(&self, sheet_id: &str) -> Result<usize, SchedulerError> {
        self.run_batch_protected_range_with(sheet_id, CallOptions::default())
            .await
    }

    pub async fn run_batch_protected_range_with(
        &self,
        sheet_id: &str,
        options: CallOptions,
    ) -> Result<usize, SchedulerError> {
        debug!(%sheet_id, ?options, "SheetApi::run_batch_protected_range: called");
        let client = self.client.as_ref();
        let sent = self
            .protected_ranges
            .run(&self.scheduler, sheet_id, options, |requests| async move {
                client.batch_update(sheet_id, &requests).await?;
                Ok::<_, RemoteError>(requests.len())
            })
            .await?;
        Ok(sent.unwrap_or(0))
    }

    /// Protected ranges waiting to be sent, by spreadsheet
    pub fn pending_protected_ranges(&self) -> std::collections::HashMap<String, Vec<BatchRequest>> {
        self.protected_ranges.get_all()
    }

    pub fn clear_pending_protected_ranges(&self) {
        self.protected_ranges.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use crate::sheets::MemorySheetClient;

    fn cells(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    fn setup() -> (SheetApi, Arc<MemorySheetClient>) {
        let client = Arc::new(MemorySheetClient::new());
        client.add_tab("s1", "People", cells(&[&["name", "role"], &["ada", "eng"], &["alan", "math"]]));
        client.add_tab("s1", "Empty", Vec::new());
        let api = SheetApi::new(Arc::new(Scheduler::new(SchedulerConfig::default())), client.clone());
        (api, client)
    }

    fn protect(tab_id: i64, name: Option<&str>) -> AddProtectedRange {
        AddProtectedRange {
            sheet_id: "s1".to_string(),
            tab_id,
            editors: vec!["owner@example.com".to_string()],
            name: name.map(str::to_string),
            start_row: 0,
            start_col: 0,
            end_row: 4,
            end_col: 2,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_data_is_cached() {
        let (api, client) = setup();

        let first = api.tab_data("s1", "People", None, None).await.unwrap();
        let second = api.tab_data("s1", "People", None, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].values["name"], "alan");
        assert_eq!(client.call_count("tab_list"), 1);
        assert_eq!(client.call_count("tab_rows"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_refetches() {
        let (api, client) = setup();
        api.tab_size("s1", "People").await.unwrap();
        api.clear_cache();
        let size = api.tab_size("s1", "People").await.unwrap();

        assert_eq!(size.rows, Some(3));
        assert_eq!(client.call_count("tab_size"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tab_fails_without_retry() {
        let (api, client) = setup();

        let err = api.tab_data("s1", "Missing", None, None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Resource not found: tab Missing not found");
        assert_eq!(client.call_count("tab_rows"), 0);

        let err = api.append_rows("s1", "Missing", vec![Row::new()]).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.call_count("append_rows"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_absorbed() {
        let (api, client) = setup();
        client.fail_next(3);

        let tabs = api.tab_ids("s1").await.unwrap();
        assert_eq!(tabs.len(), 2);
        assert_eq!(client.call_count("tab_list"), 4);
        assert_eq!(api.scheduler().stats().read.retried, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_range_writes_block() {
        let (api, client) = setup();
        api.update_range("s1", "People", (2, 2), cells(&[&["admin"], &["lead"]]))
            .await
            .unwrap();
        api.update_range("s1", "People", (1, 1), Vec::new()).await.unwrap();

        let grid = client.grid("s1", "People").unwrap();
        assert_eq!(grid[1], vec!["ada", "admin"]);
        assert_eq!(grid[2], vec!["alan", "lead"]);
        assert_eq!(client.call_count("update_range"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_then_clear() {
        let (api, client) = setup();
        let row: Row = [("name".to_string(), "grace".to_string())].into_iter().collect();

        api.append_rows("s1", "People", vec![row]).await.unwrap();
        assert_eq!(client.grid("s1", "People").unwrap().len(), 4);

        api.clear_tab_data("s1", "People", None, None).await.unwrap();
        assert_eq!(client.grid("s1", "People").unwrap(), cells(&[&["name", "role"]]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_protected_ranges() {
        let (api, client) = setup();
        api.add_batch_protected_range(protect(0, Some("header")));
        api.add_batch_protected_range(protect(0, None));
        api.add_batch_protected_range(protect(1, None));

        assert_eq!(api.pending_protected_ranges()["s1"].len(), 3);

        assert_eq!(api.run_batch_protected_range("s1").await.unwrap(), 3);
        assert_eq!(api.run_batch_protected_range("s1").await.unwrap(), 0);
        assert_eq!(client.call_count("batch_update"), 1);

        let ranges = client.protected_ranges("s1", 0);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].description, "header");
        assert_eq!((ranges[0].end_row, ranges[0].end_col), (5, 3));
        assert!(ranges[1].description.chars().all(|c| c.is_ascii_digit()));

        let ids = api.protected_range_ids("s1", "People").await.unwrap();
        api.delete_protected_ranges("s1", &ids).await.unwrap();
        assert!(client.protected_ranges("s1", 0).is_empty());
        assert_eq!(client.protected_ranges("s1", 1).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_pending_protected_ranges() {
        let (api, client) = setup();
        api.add_batch_protected_range(protect(0, None));
        api.clear_pending_protected_ranges();

        assert_eq!(api.run_batch_protected_range("s1").await.unwrap(), 0);
        assert_eq!(client.call_count("batch_update"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supplied_tab_list_skips_tab_read() {
        let (api, client) = setup();
        let tabs = vec![TabInfo {
            tab_id: 0,
            tab_name: "People".to_string(),
        }];

        let rows = api.tab_data("s1", "People", None, Some(&tabs)).await.unwrap();
        assert_eq!(rows.len(), 2);

        let err = api.clear_tab_data("s1", "Empty", None, Some(&tabs)).await.unwrap_err();
        assert!(err.is_not_found());

        api.clear_tab_data("s1", "People", None, Some(&tabs)).await.unwrap();
        assert_eq!(client.grid("s1", "People").unwrap().len(), 1);
        assert_eq!(client.call_count("tab_list"), 0);
        assert_eq!(client.call_count("clear_rows"), 1);
    }
}
