//! Storage collaborator: listing candidate report images and pulling their
//! bytes down to scratch space.

pub mod auth;
pub mod drive;

pub use auth::GoogleAuth;
pub use drive::DriveClient;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

/// A file in the remote store. Only referenced, never owned, by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub id: String,
    pub name: String,
    pub modified_time: DateTime<Utc>,
}

#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Files directly inside `folder_id` whose MIME type contains
    /// `mime_type`, newest first, at most `limit` of them.
    async fn list(&self, folder_id: &str, mime_type: &str, limit: usize)
        -> Result<Vec<SourceFile>>;

    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// Pick the most recently modified file.
pub fn select_newest(files: Vec<SourceFile>) -> Option<SourceFile> {
    files.into_iter().max_by_key(|f| f.modified_time)
}

/// Download `file` and save it under `dest_dir` using its remote name.
/// Returns the full path of the saved file.
pub async fn download_to<S: SourceStore + ?Sized>(
    store: &S,
    file: &SourceFile,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    let name = Path::new(&file.name)
        .file_name()
        .map(|n| n.to_os_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download.png".into());
    let dest_path = dest_dir.join(name);

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let bytes = store
        .download(&file.id)
        .await
        .with_context(|| format!("downloading {} ({})", file.name, file.id))?;
    fs::write(&dest_path, &bytes)
        .await
        .with_context(|| format!("writing {}", dest_path.display()))?;

    Ok(dest_path)
}
