use anyhow::Result;
use paxforecast::{
    config::{Config, LedgerBackend},
    fetch::{DriveClient, GoogleAuth},
    history::{Ledger, ParquetLedger, SheetLedger},
    ocr::TesseractCli,
    pipeline::{Pipeline, RunOutcome, Target},
    sheets::SheetsClient,
};
use reqwest::Client;
use std::{env, sync::Arc};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

async fn run_once(
    target: Target,
    drive: &DriveClient,
    ocr: &TesseractCli,
    sheets: &SheetsClient,
    ledger: &dyn Ledger,
) -> Result<()> {
    let pipeline = Pipeline::new(target, drive, ocr, sheets, ledger);
    match pipeline.run().await? {
        RunOutcome::NoCandidate => info!("no new report; exit"),
        RunOutcome::AlreadyProcessed { filename } => {
            info!(file = %filename, "already processed; exit")
        }
        RunOutcome::Ingested(report) => {
            if !report.rejected.is_empty() {
                warn!(
                    file = %report.filename,
                    rejected = report.rejected.len(),
                    "ingested with skipped rows"
                );
            }
            info!(
                file = %report.filename,
                records = report.records,
                start_row = report.append.map(|a| a.start_row),
                "ingested"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("").add_directive(log_level.parse().unwrap_or(Level::INFO.into()))
    });
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration & clients ──────────────────────────────────
    let cfg = Config::from_env()?;
    let http = Client::new();
    let auth = Arc::new(GoogleAuth::new(&cfg.credentials)?);
    let drive = DriveClient::new(http.clone(), auth.clone());
    let sheets = Arc::new(SheetsClient::open(http, auth, &drive, &cfg.sheet_name).await?);
    let target = Target::from_config(&cfg, sheets.first_tab()?);
    let ocr = TesseractCli::from_config(&cfg);

    // ─── 3) one run against the configured ledger ────────────────────
    let result = match cfg.ledger {
        LedgerBackend::Sheet => {
            let ledger = SheetLedger::open(sheets.clone(), &cfg.log_tab).await?;
            run_once(target, &drive, &ocr, &sheets, &ledger).await
        }
        LedgerBackend::Parquet => {
            let ledger = ParquetLedger::new_processed(&cfg.history_dir)?;
            let result = run_once(target, &drive, &ocr, &sheets, &ledger).await;
            if result.is_ok() {
                ledger.vacuum()?;
            }
            result
        }
    };

    if let Err(e) = &result {
        error!("run failed: {:?}", e);
    }
    result
}
