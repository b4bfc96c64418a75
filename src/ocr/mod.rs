//! OCR collaborator.

pub mod tesseract;

pub use tesseract::{to_grayscale, TesseractCli};

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Turns an image on disk into text, one report line per text line.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String>;
}
