//! Spreadsheet sink: where forecast rows and (by default) the ledger live.

pub mod client;
pub mod memory;

pub use client::SheetsClient;
pub use memory::MemorySheet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::extract::{ForecastRecord, HEADERS};

/// Minimal worksheet operations the pipeline needs. Rows are 1-based, the
/// way spreadsheets number them.
#[async_trait]
pub trait SheetSink: Send + Sync {
    /// Every non-empty row of `tab`, top to bottom.
    async fn read_all(&self, tab: &str) -> Result<Vec<Vec<String>>>;

    /// Write `rows` into `tab` starting at `start_row`, growing the grid
    /// when the tab is too short to hold them.
    async fn write_rows(&self, tab: &str, rows: &[Vec<String>], start_row: usize) -> Result<()>;

    /// Append `rows` after the last non-empty row of `tab`.
    async fn append_rows(&self, tab: &str, rows: &[Vec<String>]) -> Result<()>;

    /// Make sure `name` exists; a newly created tab gets `header` as row 1.
    async fn open_or_create_tab(&self, name: &str, header: &[&str]) -> Result<()>;
}

/// Where an append landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendSummary {
    pub start_row: usize,
    pub rows_written: usize,
    pub wrote_header: bool,
}

/// Append forecast records below whatever `tab` already holds.
///
/// An empty tab gets the header row first; a non-empty one is written from
/// the row right after its last existing row, with no header.
#[instrument(level = "info", skip(sink, records), fields(records = records.len()))]
pub async fn append_records<S: SheetSink + ?Sized>(
    sink: &S,
    tab: &str,
    records: &[ForecastRecord],
) -> Result<AppendSummary> {
    let existing = sink
        .read_all(tab)
        .await
        .with_context(|| format!("reading existing rows of `{}`", tab))?;

    let wrote_header = existing.is_empty();
    let mut rows = Vec::with_capacity(records.len() + 1);
    if wrote_header {
        rows.push(HEADERS.iter().map(|h| h.to_string()).collect());
    }
    rows.extend(records.iter().map(ForecastRecord::to_row));

    let start_row = existing.len() + 1;
    sink.write_rows(tab, &rows, start_row)
        .await
        .with_context(|| format!("writing {} rows to `{}` at row {}", rows.len(), tab, start_row))?;

    info!(tab, start_row, rows = rows.len(), wrote_header, "appended forecast rows");
    Ok(AppendSummary {
        start_row,
        rows_written: rows.len(),
        wrote_header,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_records;

    const TEXT: &str = "\
Monday, January 5, 2024 150 25 100 75 175 3500 0.05 10 20 5 15 8 12 20
Tuesday, January 6, 2024 160 30 110 80 190 3600 0.05 11 21 6 16 9 13 21
";

    #[tokio::test]
    async fn empty_tab_gets_header_first() {
        let sheet = MemorySheet::new();
        let records = extract_records(TEXT).records;

        let summary = append_records(&sheet, "Sheet1", &records).await.unwrap();
        assert_eq!(
            summary,
            AppendSummary {
                start_row: 1,
                rows_written: 3,
                wrote_header: true
            }
        );

        let rows = sheet.rows("Sheet1");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], HEADERS.to_vec());
        assert_eq!(rows[1][0], "Monday");
        assert_eq!(rows[2][0], "Tuesday");
    }

    #[tokio::test]
    async fn non_empty_tab_continues_after_last_row() {
        let sheet = MemorySheet::new();
        let records = extract_records(TEXT).records;

        append_records(&sheet, "Sheet1", &records[..1]).await.unwrap();
        let summary = append_records(&sheet, "Sheet1", &records[1..]).await.unwrap();
        assert_eq!(summary.start_row, 3);
        assert!(!summary.wrote_header);

        let rows = sheet.rows("Sheet1");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().filter(|r| r[0] == "Day").count(), 1);
        assert_eq!(rows[2][0], "Tuesday");
    }
}
