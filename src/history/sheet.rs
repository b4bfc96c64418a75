use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{collections::HashSet, sync::Arc, sync::Mutex};
use tracing::info;

use super::{Ledger, LedgerEntry};
use crate::sheets::SheetSink;

pub const LOG_HEADER: [&str; 2] = ["Filename", "Processed At"];

/// Ledger kept as a two-column tab (`Filename`, `Processed At`) inside the
/// target spreadsheet.
///
/// The tab is read once on open; `contains` answers from that snapshot plus
/// anything recorded through this instance.
pub struct SheetLedger<S: SheetSink + ?Sized> {
    sink: Arc<S>,
    tab: String,
    seen: Mutex<HashSet<String>>,
}

impl<S: SheetSink + ?Sized> SheetLedger<S> {
    pub async fn open(sink: Arc<S>, tab: &str) -> Result<Self> {
        sink.open_or_create_tab(tab, &LOG_HEADER)
            .await
            .with_context(|| format!("opening log tab `{}`", tab))?;
        let rows = sink
            .read_all(tab)
            .await
            .with_context(|| format!("reading log tab `{}`", tab))?;

        let seen: HashSet<String> = rows
            .into_iter()
            .skip(1)
            .filter_map(|row| row.into_iter().next())
            .filter(|name| !name.is_empty())
            .collect();
        info!(tab, processed = seen.len(), "loaded sheet ledger");

        Ok(Self {
            sink,
            tab: tab.to_string(),
            seen: Mutex::new(seen),
        })
    }
}

#[async_trait]
impl<S: SheetSink + ?Sized> Ledger for SheetLedger<S> {
    async fn contains(&self, filename: &str) -> Result<bool> {
        Ok(self
            .seen
            .lock()
            .expect("ledger lock poisoned")
            .contains(filename))
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let row = vec![entry.filename.clone(), entry.processed_at_display()];
        self.sink
            .append_rows(&self.tab, &[row])
            .await
            .with_context(|| format!("appending `{}` to log tab `{}`", entry.filename, self.tab))?;
        self.seen
            .lock()
            .expect("ledger lock poisoned")
            .insert(entry.filename.clone());
        Ok(())
    }
}
