use anyhow::{bail, Result};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Mutex};

use super::SheetSink;

/// In-memory workbook: tab name → rows.
#[derive(Debug, Default)]
pub struct MemorySheet {
    tabs: Mutex<HashMap<String, Vec<Vec<String>>>>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a tab; empty when the tab does not exist.
    pub fn rows(&self, tab: &str) -> Vec<Vec<String>> {
        self.tabs
            .lock()
            .expect("sheet lock poisoned")
            .get(tab)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_tab(&self, tab: &str) -> bool {
        self.tabs.lock().expect("sheet lock poisoned").contains_key(tab)
    }
}

#[async_trait]
impl SheetSink for MemorySheet {
    async fn read_all(&self, tab: &str) -> Result<Vec<Vec<String>>> {
        Ok(self.rows(tab))
    }

    async fn write_rows(&self, tab: &str, rows: &[Vec<String>], start_row: usize) -> Result<()> {
        if start_row == 0 {
            bail!("rows are 1-based; got start row 0");
        }
        let mut tabs = self.tabs.lock().expect("sheet lock poisoned");
        let data = tabs.entry(tab.to_string()).or_default();
        let first = start_row - 1;
        if data.len() < first + rows.len() {
            data.resize(first + rows.len(), Vec::new());
        }
        for (i, row) in rows.iter().enumerate() {
            data[first + i] = row.clone();
        }
        Ok(())
    }

    async fn append_rows(&self, tab: &str, rows: &[Vec<String>]) -> Result<()> {
        let mut tabs = self.tabs.lock().expect("sheet lock poisoned");
        tabs.entry(tab.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn open_or_create_tab(&self, name: &str, header: &[&str]) -> Result<()> {
        let mut tabs = self.tabs.lock().expect("sheet lock poisoned");
        tabs.entry(name.to_string())
            .or_insert_with(|| vec![header.iter().map(|h| h.to_string()).collect()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_rows_grows_the_tab() {
        let sheet = MemorySheet::new();
        sheet
            .write_rows("t", &[vec!["x".to_string()]], 3)
            .await
            .unwrap();
        let rows = sheet.rows("t");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["x"]);
    }

    #[tokio::test]
    async fn existing_tab_keeps_its_rows() {
        let sheet = MemorySheet::new();
        sheet.open_or_create_tab("Log", &["Filename", "Processed At"]).await.unwrap();
        sheet
            .append_rows("Log", &[vec!["a.png".into(), "now".into()]])
            .await
            .unwrap();
        sheet.open_or_create_tab("Log", &["Filename", "Processed At"]).await.unwrap();
        assert_eq!(sheet.rows("Log").len(), 2);
    }
}
