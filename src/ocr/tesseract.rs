use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::OcrEngine;
use crate::config::Config;

/// Write a single-channel grayscale copy of `src` next to it and return
/// the new path. This is the only pre-processing applied before OCR.
///
/// The format is sniffed from the file contents; Drive names carry no
/// reliable extension.
pub fn to_grayscale(src: &Path) -> Result<PathBuf> {
    let img = image::ImageReader::open(src)
        .with_context(|| format!("opening image {}", src.display()))?
        .with_guessed_format()
        .with_context(|| format!("reading image header {}", src.display()))?
        .decode()
        .with_context(|| format!("decoding image {}", src.display()))?;
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "scan".to_string());
    let dest = src.with_file_name(format!("{}.gray.png", stem));
    img.grayscale()
        .save(&dest)
        .with_context(|| format!("writing grayscale image {}", dest.display()))?;
    Ok(dest)
}

/// Runs the `tesseract` binary and reads the recognized text from stdout.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    cmd: PathBuf,
    args: Vec<String>,
}

impl TesseractCli {
    pub fn new(cmd: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.tesseract_cmd, cfg.tesseract_args.clone())
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    #[instrument(level = "info", skip(self, image), fields(image = %image.display()))]
    async fn recognize(&self, image: &Path) -> Result<String> {
        let src = image.to_path_buf();
        let gray = tokio::task::spawn_blocking(move || to_grayscale(&src)).await??;
        debug!(gray = %gray.display(), "grayscale copy written");

        let output = Command::new(&self.cmd)
            .arg(&gray)
            .arg("stdout")
            .args(&self.args)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.cmd.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tesseract exited with {}: {}", output.status, stderr.trim());
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        info!(chars = text.len(), lines = text.lines().count(), "ocr finished");
        Ok(text)
    }
}
