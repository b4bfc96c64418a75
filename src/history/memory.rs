use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

use super::{Ledger, LedgerEntry};

/// Process-local ledger, used by tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().expect("ledger lock poisoned").clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn contains(&self, filename: &str) -> Result<bool> {
        let entries = self.entries.lock().expect("ledger lock poisoned");
        Ok(entries.iter().any(|e| e.filename == filename))
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let mut entries = self.entries.lock().expect("ledger lock poisoned");
        if !entries.iter().any(|e| e.filename == entry.filename) {
            entries.push(entry.clone());
        }
        Ok(())
    }
}
