//! Ingestion ledger: which source files have already been ingested.
//!
//! The pipeline reads the ledger before doing any work and records an entry
//! only after the sheet append succeeded. There is no locking: two runs
//! against the same ledger can both see a file as new and ingest it twice.

pub mod memory;
pub mod processed;
pub mod sheet;
pub mod table_history;

pub use memory::MemoryLedger;
pub use processed::ParquetLedger;
pub use sheet::SheetLedger;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};

/// One ingested source file. Never mutated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub filename: String,
    pub processed_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(filename: impl Into<String>, processed_at: DateTime<Utc>) -> Self {
        Self {
            filename: filename.into(),
            processed_at,
        }
    }

    /// Local wall-clock time with microseconds, e.g. `2024-01-05 11:40:02.123456`.
    pub fn processed_at_display(&self) -> String {
        self.processed_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.6f")
            .to_string()
    }
}

/// Key-existence store of processed filenames.
///
/// An `Err` from either method means the store is unavailable; callers must
/// treat that as fatal rather than carry on without dedup.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn contains(&self, filename: &str) -> Result<bool>;
    async fn record(&self, entry: &LedgerEntry) -> Result<()>;
}
