//! Spreadsheet data types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One tab (worksheet) of a spreadsheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub tab_id: i64,
    pub tab_name: String,
}

/// Row payload keyed by header name
pub type Row = BTreeMap<String, String>;

/// A data row read back from a tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRow {
    /// 1-based row number in the tab
    pub row_index: usize,
    /// A1 range covering the row, e.g. `'Sheet1'!A3:D3`
    pub a1_range: String,
    pub values: Row,
}

/// Grid dimensions of a tab; unknown when the service does not report them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSize {
    pub rows: Option<usize>,
    pub columns: Option<usize>,
}

/// Spreadsheet column letters for a 1-based column index (1 -> A, 27 -> AA)
pub fn column_letters(column: usize) -> String {
    let mut n = column.max(1);
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A block of values written starting at a 1-based (row, column) cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeUpdate {
    pub tab_name: String,
    pub start_row: usize,
    pub start_col: usize,
    pub values: Vec<Vec<String>>,
}

impl RangeUpdate {
    /// Build an update; zero coordinates are treated as 1
    pub fn new(tab_name: impl Into<String>, start: (usize, usize), values: Vec<Vec<String>>) -> Self {
        Self {
            tab_name: tab_name.into(),
            start_row: start.0.max(1),
            start_col: start.1.max(1),
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.first().is_none_or(Vec::is_empty)
    }

    /// Width of the block, taken from its first row
    pub fn width(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    /// A1 notation of the covered range, e.g. `'Sheet1'!B2:D5`
    pub fn a1_notation(&self) -> String {
        let end_col = self.start_col + self.width().max(1) - 1;
        let end_row = self.start_row + self.values.len().max(1) - 1;
        format!(
            "'{}'!{}{}:{}{}",
            self.tab_name,
            column_letters(self.start_col),
            self.start_row,
            column_letters(end_col),
            end_row
        )
    }
}

/// A protected range as sent to the service; end indices are exclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRange {
    pub tab_id: i64,
    pub description: String,
    pub editors: Vec<String>,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

/// Caller input for a protected range; end indices are inclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddProtectedRange {
    pub sheet_id: String,
    pub tab_id: i64,
    pub editors: Vec<String>,
    pub name: Option<String>,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

/// One change request inside a combined batch update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchRequest {
    AddProtectedRange(ProtectedRange),
    DeleteProtectedRange { protected_range_id: i64 },
}

impl fmt::Display for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchRequest::AddProtectedRange(range) => {
                write!(f, "addProtectedRange({} on tab {})", range.description, range.tab_id)
            }
            BatchRequest::DeleteProtectedRange { protected_range_id } => {
                write!(f, "deleteProtectedRange({protected_range_id})")
            }
        }
    }
}
