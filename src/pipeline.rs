//! One ingestion run: newest report image → OCR → rows → sheet → ledger.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use tracing::{info, instrument, warn};

use crate::{
    config::Config,
    extract::{extract_records, ExtractError},
    fetch::{download_to, select_newest, SourceFile, SourceStore},
    history::{Ledger, LedgerEntry},
    ocr::OcrEngine,
    sheets::{append_records, AppendSummary, SheetSink},
};

/// States of a run, in order. `SourceSelected` and `Idle` can jump straight
/// to `Done` when there is nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    SourceSelected,
    Downloaded,
    Recognized,
    Extracted,
    /// Reached together with `Extracted`: `extract_records` normalizes each
    /// row as it is extracted.
    Normalized,
    Appended,
    Logged,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where to look for reports and where their rows go.
#[derive(Debug, Clone)]
pub struct Target {
    pub folder_id: String,
    pub mime_type: String,
    pub list_limit: usize,
    pub data_tab: String,
}

impl Target {
    pub fn from_config(cfg: &Config, data_tab: impl Into<String>) -> Self {
        Self {
            folder_id: cfg.folder_id.clone(),
            mime_type: cfg.mime_type.clone(),
            list_limit: 1,
            data_tab: data_tab.into(),
        }
    }
}

#[derive(Debug)]
pub struct IngestReport {
    pub filename: String,
    pub submission_date: Option<String>,
    pub records: usize,
    pub rejected: Vec<ExtractError>,
    /// `None` when the file produced no records and nothing was written.
    pub append: Option<AppendSummary>,
}

#[derive(Debug)]
pub enum RunOutcome {
    NoCandidate,
    AlreadyProcessed { filename: String },
    Ingested(IngestReport),
}

pub struct Pipeline<'a> {
    target: Target,
    store: &'a dyn SourceStore,
    ocr: &'a dyn OcrEngine,
    sink: &'a dyn SheetSink,
    ledger: &'a dyn Ledger,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        target: Target,
        store: &'a dyn SourceStore,
        ocr: &'a dyn OcrEngine,
        sink: &'a dyn SheetSink,
        ledger: &'a dyn Ledger,
    ) -> Self {
        Self {
            target,
            store,
            ocr,
            sink,
            ledger,
        }
    }

    /// Process at most one file, the most recently modified candidate.
    ///
    /// Any collaborator failure aborts the run before the ledger is touched,
    /// so the next run retries the same file from scratch.
    #[instrument(level = "info", skip(self), fields(folder = %self.target.folder_id))]
    pub async fn run(&self) -> Result<RunOutcome> {
        let candidates = self
            .store
            .list(
                &self.target.folder_id,
                &self.target.mime_type,
                self.target.list_limit,
            )
            .await
            .context("listing candidate files")?;

        let Some(file) = select_newest(candidates) else {
            warn!("no {} files found", self.target.mime_type);
            advance(Stage::Done, None);
            return Ok(RunOutcome::NoCandidate);
        };
        advance(Stage::SourceSelected, Some(&file.name));

        if self
            .ledger
            .contains(&file.name)
            .await
            .context("checking ingestion ledger")?
        {
            info!(file = %file.name, "skipping already processed file");
            advance(Stage::Done, Some(&file.name));
            return Ok(RunOutcome::AlreadyProcessed {
                filename: file.name,
            });
        }

        let report = self.ingest(&file).await?;
        advance(Stage::Done, Some(&file.name));
        Ok(RunOutcome::Ingested(report))
    }

    async fn ingest(&self, file: &SourceFile) -> Result<IngestReport> {
        info!(file = %file.name, modified = %file.modified_time, "processing");

        // Scratch space lives only for this run.
        let scratch = tempfile::Builder::new()
            .prefix("paxforecast-")
            .tempdir()
            .context("creating scratch directory")?;
        let image = download_to(self.store, file, scratch.path()).await?;
        advance(Stage::Downloaded, Some(&file.name));

        let text = self
            .ocr
            .recognize(&image)
            .await
            .with_context(|| format!("running OCR on {}", file.name))?;
        advance(Stage::Recognized, Some(&file.name));

        let extraction = extract_records(&text);
        info!(
            file = %file.name,
            rows = extraction.records.len() + extraction.rejected.len(),
            submission_date = extraction.submission_date.as_deref().unwrap_or(""),
            "extracted"
        );
        advance(Stage::Extracted, Some(&file.name));
        advance(Stage::Normalized, Some(&file.name));
        if !extraction.rejected.is_empty() {
            warn!(
                file = %file.name,
                rejected = extraction.rejected.len(),
                "some rows were malformed and skipped"
            );
        }

        let append = if extraction.records.is_empty() {
            warn!(file = %file.name, "no forecast rows recognized; nothing to append");
            None
        } else {
            let summary = append_records(self.sink, &self.target.data_tab, &extraction.records)
                .await
                .with_context(|| format!("appending rows from {}", file.name))?;
            advance(Stage::Appended, Some(&file.name));
            Some(summary)
        };

        // Only after the append has landed.
        self.ledger
            .record(&LedgerEntry::new(file.name.clone(), Utc::now()))
            .await
            .with_context(|| format!("recording {} in ledger", file.name))?;
        advance(Stage::Logged, Some(&file.name));
        info!(file = %file.name, records = extraction.records.len(), "✅ done");

        Ok(IngestReport {
            filename: file.name.clone(),
            submission_date: extraction.submission_date,
            records: extraction.records.len(),
            rejected: extraction.rejected,
            append,
        })
    }
}

fn advance(stage: Stage, file: Option<&str>) {
    tracing::debug!(stage = %stage, file = file.unwrap_or("-"), "stage");
}
