use anyhow::Result;
use arrow::{
    array::{ArrayRef, StringArray, TimestampMicrosecondArray},
    datatypes::{DataType as ArrowDataType, Field, Schema as ArrowSchema, TimeUnit},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::{path::PathBuf, sync::Arc};

use super::table_history::{HistoryRow, TableHistory};
use super::{Ledger, LedgerEntry};

impl HistoryRow for LedgerEntry {
    const KEY_COLUMN: usize = 0;

    fn partition_date(&self) -> NaiveDate {
        self.processed_at.date_naive()
    }

    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("filename", ArrowDataType::Utf8, false),
            Field::new(
                "processed_at",
                ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
        ])
    }

    fn to_arrays(&self) -> Vec<ArrayRef> {
        vec![
            Arc::new(StringArray::from(vec![self.filename.clone()])),
            Arc::new(TimestampMicrosecondArray::from(vec![self
                .processed_at
                .timestamp_micros()])),
        ]
    }

    fn unique_key(&self) -> String {
        self.filename.clone()
    }
}

/// Ledger persisted as a local hive-partitioned Parquet table under
/// `<history_dir>/processed/`.
pub type ParquetLedger = TableHistory<LedgerEntry>;

impl TableHistory<LedgerEntry> {
    pub fn new_processed(base: impl Into<PathBuf>) -> Result<Self> {
        TableHistory::new(base, "processed")
    }
}

#[async_trait]
impl Ledger for TableHistory<LedgerEntry> {
    async fn contains(&self, filename: &str) -> Result<bool> {
        Ok(TableHistory::contains(self, filename))
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        self.add(entry)?;
        Ok(())
    }
}

// ----- Tests -----
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use glob::glob;
    use tempfile::tempdir;

    fn entry(name: &str) -> LedgerEntry {
        LedgerEntry::new(name, Utc::now())
    }

    #[tokio::test]
    async fn test_record_and_contains() {
        let tmp = tempdir().unwrap();
        let ledger = ParquetLedger::new_processed(tmp.path()).unwrap();

        let e = entry("forecast_0105.png");
        assert!(!Ledger::contains(&ledger, &e.filename).await.unwrap());
        ledger.record(&e).await.unwrap();
        assert!(Ledger::contains(&ledger, &e.filename).await.unwrap());

        let date_str = e.processed_at.date_naive().format("%Y%m%d").to_string();
        let part_dir = tmp
            .path()
            .join("processed")
            .join(format!("date={}", date_str));
        let files: Vec<_> = glob(&format!("{}/*.parquet", part_dir.display()))
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_deduplication() {
        let tmp = tempdir().unwrap();
        let ledger = ParquetLedger::new_processed(tmp.path()).unwrap();

        let e = entry("forecast_0106.png");
        ledger.record(&e).await.unwrap();
        ledger.record(&entry("forecast_0106.png")).await.unwrap();

        let pattern = format!("{}/processed/**/*.parquet", tmp.path().display());
        let n = glob(&pattern).unwrap().filter_map(Result::ok).count();
        assert_eq!(n, 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_vacuum_consolidates() {
        let tmp = tempdir().unwrap();
        let ledger = ParquetLedger::new_processed(tmp.path()).unwrap();

        let now = Utc::now();
        ledger.add(&LedgerEntry::new("a.png", now)).unwrap();
        ledger.add(&LedgerEntry::new("b.png", now)).unwrap();

        let date_str = now.date_naive().format("%Y%m%d").to_string();
        let glob_pattern = format!(
            "{}/processed/date={}/*.parquet",
            tmp.path().display(),
            date_str
        );
        let before = glob(&glob_pattern).unwrap().filter_map(Result::ok).count();
        assert_eq!(before, 2);

        ledger.vacuum().unwrap();

        let after: Vec<_> = glob(&glob_pattern)
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(after.len(), 1);
        assert_eq!(
            after[0].file_name().unwrap().to_string_lossy(),
            "consolidated.parquet"
        );

        // keys survive consolidation
        let reopened = ParquetLedger::new_processed(tmp.path()).unwrap();
        assert!(reopened.contains("a.png"));
        assert!(reopened.contains("b.png"));
    }

    #[test]
    fn test_persistence_across_restarts() {
        let tmp = tempdir().unwrap();
        {
            let ledger = ParquetLedger::new_processed(tmp.path()).unwrap();
            ledger.add(&entry("forecast_0107.png")).unwrap();
        }

        let ledger = ParquetLedger::new_processed(tmp.path()).unwrap();
        assert!(ledger.contains("forecast_0107.png"));
        assert!(!ledger.contains("forecast_0108.png"));
    }
}
