//! In-memory spreadsheet service
//!
//! Behaves like the remote service for the scheduler's purposes: calls take
//! time, may fail transiently, and are counted so callers can check how many
//! slots of the rate budget they consumed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use super::{BatchRequest, DataRow, ProtectedRange, RangeUpdate, Row, SheetClient, TabInfo, TabSize, column_letters};
use crate::scheduler::RemoteError;

#[derive(Debug, Clone, Default)]
struct MemoryTab {
    id: i64,
    name: String,
    grid: Vec<Vec<String>>,
    protected: Vec<(i64, ProtectedRange)>,
}

#[derive(Debug, Default)]
struct MemorySheet {
    tabs: Vec<MemoryTab>,
}

impl MemorySheet {
    fn tab_by_id(&mut self, tab_id: i64) -> Result<&mut MemoryTab, RemoteError> {
        self.tabs
            .iter_mut()
            .find(|tab| tab.id == tab_id)
            .ok_or_else(|| RemoteError::NotFound(format!("tab id {tab_id}")))
    }

    fn tab_by_name(&mut self, tab_name: &str) -> Result<&mut MemoryTab, RemoteError> {
        self.tabs
            .iter_mut()
            .find(|tab| tab.name == tab_name)
            .ok_or_else(|| RemoteError::NotFound(format!("tab {tab_name}")))
    }
}

/// Spreadsheet service held in process memory
#[derive(Debug, Default)]
pub struct MemorySheetClient {
    sheets: Mutex<HashMap<String, MemorySheet>>,
    latency: Duration,
    failure_rate: f64,
    fail_next: AtomicU32,
    next_range_id: AtomicI64,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MemorySheetClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail each call transiently with probability `rate`
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fail the next `count` calls transiently
    pub fn fail_next(&self, count: u32) {
        debug!(count, "MemorySheetClient::fail_next: called");
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Create a tab holding `grid`; returns its id
    pub fn add_tab(&self, sheet_id: &str, tab_name: &str, grid: Vec<Vec<String>>) -> i64 {
        let mut sheets = self.sheets();
        let sheet = sheets.entry(sheet_id.to_string()).or_default();
        let id = sheet.tabs.len() as i64;
        sheet.tabs.push(MemoryTab {
            id,
            name: tab_name.to_string(),
            grid,
            protected: Vec::new(),
        });
        id
    }

    /// Current cell grid of a tab
    pub fn grid(&self, sheet_id: &str, tab_name: &str) -> Option<Vec<Vec<String>>> {
        let mut sheets = self.sheets();
        let sheet = sheets.get_mut(sheet_id)?;
        sheet.tab_by_name(tab_name).ok().map(|tab| tab.grid.clone())
    }

    /// Protected ranges currently set on a tab
    pub fn protected_ranges(&self, sheet_id: &str, tab_id: i64) -> Vec<ProtectedRange> {
        let mut sheets = self.sheets();
        sheets
            .get_mut(sheet_id)
            .and_then(|sheet| sheet.tab_by_id(tab_id).ok())
            .map(|tab| tab.protected.iter().map(|(_, range)| range.clone()).collect())
            .unwrap_or_default()
    }

    /// Calls made to one operation, failed ones included
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls().values().sum()
    }

    fn sheets(&self) -> MutexGuard<'_, HashMap<String, MemorySheet>> {
        self.sheets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn calls(&self) -> MutexGuard<'_, HashMap<&'static str, usize>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_sheet<T>(
        &self,
        sheet_id: &str,
        f: impl FnOnce(&mut MemorySheet) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut sheets = self.sheets();
        let sheet = sheets
            .get_mut(sheet_id)
            .ok_or_else(|| RemoteError::NotFound(format!("spreadsheet {sheet_id}")))?;
        f(sheet)
    }

    /// Count the call, simulate latency and injected failures
    async fn enter(&self, operation: &'static str) -> Result<(), RemoteError> {
        *self.calls().entry(operation).or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            debug!(operation, "MemorySheetClient::enter: injected failure");
            return Err(RemoteError::Transient(format!("{operation}: quota exceeded")));
        }

        if self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate) {
            debug!(operation, "MemorySheetClient::enter: random failure");
            return Err(RemoteError::Transient(format!("{operation}: service unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SheetClient for MemorySheetClient {
    async fn tab_list(&self, sheet_id: &str) -> Result<Vec<TabInfo>, RemoteError> {
        self.enter("tab_list").await?;
        self.with_sheet(sheet_id, |sheet| {
            Ok(sheet
                .tabs
                .iter()
                .map(|tab| TabInfo {
                    tab_id: tab.id,
                    tab_name: tab.name.clone(),
                })
                .collect())
        })
    }

    async fn tab_rows(&self, sheet_id: &str, tab_id: i64, header_row: usize) -> Result<Vec<DataRow>, RemoteError> {
        self.enter("tab_rows").await?;
        self.with_sheet(sheet_id, |sheet| {
            let tab = sheet.tab_by_id(tab_id)?;
            let header_row = header_row.max(1);
            let Some(header) = tab.grid.get(header_row - 1) else {
                return Ok(Vec::new());
            };
            let last_col = column_letters(header.len().max(1));

            let rows = tab
                .grid
                .iter()
                .enumerate()
                .skip(header_row)
                .map(|(i, cells)| {
                    let values = header
                        .iter()
                        .enumerate()
                        .filter(|(_, name)| !name.is_empty())
                        .map(|(j, name)| (name.clone(), cells.get(j).cloned().unwrap_or_default()))
                        .collect();
                    DataRow {
                        row_index: i + 1,
                        a1_range: format!("'{}'!A{}:{}{}", tab.name, i + 1, last_col, i + 1),
                        values,
                    }
                })
                .collect();
            Ok(rows)
        })
    }

    async fn tab_size(&self, sheet_id: &str, tab_name: &str) -> Result<TabSize, RemoteError> {
        self.enter("tab_size").await?;
        self.with_sheet(sheet_id, |sheet| {
            let tab = sheet.tab_by_name(tab_name)?;
            let rows = tab.grid.len();
            let columns = tab.grid.iter().map(Vec::len).max().unwrap_or(0);
            Ok(TabSize {
                rows: (rows > 0).then_some(rows),
                columns: (columns > 0).then_some(columns),
            })
        })
    }

    async fn update_range(&self, sheet_id: &str, update: &RangeUpdate) -> Result<(), RemoteError> {
        self.enter("update_range").await?;
        debug!(range = %update.a1_notation(), "MemorySheetClient::update_range: applying");
        self.with_sheet(sheet_id, |sheet| {
            let tab = sheet.tab_by_name(&update.tab_name)?;
            for (i, values) in update.values.iter().enumerate() {
                let r = update.start_row - 1 + i;
                if tab.grid.len() <= r {
                    tab.grid.resize(r + 1, Vec::new());
                }
                let row = &mut tab.grid[r];
                for (j, value) in values.iter().enumerate() {
                    let c = update.start_col - 1 + j;
                    if row.len() <= c {
                        row.resize(c + 1, String::new());
                    }
                    row[c] = value.clone();
                }
            }
            Ok(())
        })
    }

    async fn append_rows(&self, sheet_id: &str, tab_id: i64, rows: &[Row]) -> Result<(), RemoteError> {
        self.enter("append_rows").await?;
        self.with_sheet(sheet_id, |sheet| {
            let tab = sheet.tab_by_id(tab_id)?;
            if tab.grid.is_empty() {
                tab.grid.push(Vec::new());
            }
            for row in rows {
                for key in row.keys() {
                    if !tab.grid[0].contains(key) {
                        tab.grid[0].push(key.clone());
                    }
                }
                let cells = tab.grid[0]
                    .iter()
                    .map(|name| row.get(name).cloned().unwrap_or_default())
                    .collect();
                tab.grid.push(cells);
            }
            Ok(())
        })
    }

    async fn clear_rows(&self, sheet_id: &str, tab_id: i64, header_row: usize) -> Result<(), RemoteError> {
        self.enter("clear_rows").await?;
        self.with_sheet(sheet_id, |sheet| {
            let tab = sheet.tab_by_id(tab_id)?;
            tab.grid.truncate(header_row);
            Ok(())
        })
    }

    async fn protected_range_ids(&self, sheet_id: &str, tab_id: i64) -> Result<Vec<i64>, RemoteError> {
        self.enter("protected_range_ids").await?;
        self.with_sheet(sheet_id, |sheet| {
            let tab = sheet.tab_by_id(tab_id)?;
            Ok(tab.protected.iter().map(|(id, _)| *id).collect())
        })
    }

    async fn batch_update(&self, sheet_id: &str, requests: &[BatchRequest]) -> Result<(), RemoteError> {
        self.enter("batch_update").await?;
        self.with_sheet(sheet_id, |sheet| {
            // Validate everything first so a bad request applies nothing
            for request in requests {
                match request {
                    BatchRequest::AddProtectedRange(range) => {
                        sheet.tab_by_id(range.tab_id)?;
                    }
                    BatchRequest::DeleteProtectedRange { protected_range_id } => {
                        let known = sheet
                            .tabs
                            .iter()
                            .any(|tab| tab.protected.iter().any(|(id, _)| id == protected_range_id));
                        if !known {
                            return Err(RemoteError::Rejected(format!(
                                "no protected range with id {protected_range_id}"
                            )));
                        }
                    }
                }
            }

            for request in requests {
                match request {
                    BatchRequest::AddProtectedRange(range) => {
                        let id = self.next_range_id.fetch_add(1, Ordering::SeqCst) + 1;
                        sheet.tab_by_id(range.tab_id)?.protected.push((id, range.clone()));
                    }
                    BatchRequest::DeleteProtectedRange { protected_range_id } => {
                        for tab in &mut sheet.tabs {
                            tab.protected.retain(|(id, _)| id != protected_range_id);
                        }
                    }
                }
            }
            Ok(())
        })
    }
}
