use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

use super::{auth::GoogleAuth, SourceFile, SourceStore};

const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    modified_time: Option<DateTime<Utc>>,
}

/// Drive v3 over plain REST.
pub struct DriveClient {
    http: Client,
    auth: Arc<GoogleAuth>,
}

/// Drive query strings quote with `'`; escape it and backslashes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn folder_query(folder_id: &str, mime_type: &str) -> String {
    format!(
        "{} in parents and trashed=false and mimeType contains {}",
        quote(folder_id),
        quote(mime_type)
    )
}

impl DriveClient {
    pub fn new(http: Client, auth: Arc<GoogleAuth>) -> Self {
        Self { http, auth }
    }

    async fn list_query(&self, q: &str, limit: usize) -> Result<Vec<DriveFile>> {
        let token = self.auth.bearer().await?;
        let page_size = limit.to_string();
        let list: FileList = self
            .http
            .get(FILES_ENDPOINT)
            .bearer_auth(token)
            .query(&[
                ("q", q),
                ("orderBy", "modifiedTime desc"),
                ("pageSize", page_size.as_str()),
                ("fields", "files(id, name, modifiedTime)"),
            ])
            .send()
            .await
            .context("GET drive files")?
            .error_for_status()?
            .json()
            .await
            .context("decoding drive file list")?;
        Ok(list.files)
    }

    /// Resolve a spreadsheet's id from its title. The most recently
    /// modified one wins when titles collide.
    #[instrument(level = "debug", skip(self))]
    pub async fn find_spreadsheet(&self, title: &str) -> Result<String> {
        let q = format!(
            "name = {} and mimeType = {} and trashed=false",
            quote(title),
            quote(SPREADSHEET_MIME)
        );
        self.list_query(&q, 1)
            .await?
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| anyhow!("spreadsheet `{}` not found", title))
    }
}

#[async_trait]
impl SourceStore for DriveClient {
    #[instrument(level = "info", skip(self))]
    async fn list(
        &self,
        folder_id: &str,
        mime_type: &str,
        limit: usize,
    ) -> Result<Vec<SourceFile>> {
        let files = self
            .list_query(&folder_query(folder_id, mime_type), limit)
            .await
            .with_context(|| format!("listing drive folder {}", folder_id))?;
        debug!(found = files.len(), "drive listing");

        files
            .into_iter()
            .map(|f| {
                let modified_time = f
                    .modified_time
                    .ok_or_else(|| anyhow!("drive file {} has no modifiedTime", f.id))?;
                Ok(SourceFile {
                    id: f.id,
                    name: f.name,
                    modified_time,
                })
            })
            .collect()
    }

    #[instrument(level = "info", skip(self))]
    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let mut url = Url::parse(FILES_ENDPOINT)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("drive endpoint cannot be a base"))?
            .push(file_id);
        url.query_pairs_mut().append_pair("alt", "media");

        let token = self.auth.bearer().await?;
        let bytes = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("GET drive media {}", file_id))?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_query_matches_drive_syntax() {
        assert_eq!(
            folder_query("abc123", "image/png"),
            "'abc123' in parents and trashed=false and mimeType contains 'image/png'"
        );
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(quote("Ops' sheet"), r"'Ops\' sheet'");
    }

    #[test]
    fn decodes_file_listing() {
        let body = r#"{"files": [{"id": "1", "name": "f.png", "modifiedTime": "2024-01-05T11:32:10.000Z"}]}"#;
        let list: FileList = serde_json::from_str(body).unwrap();
        assert_eq!(list.files.len(), 1);
        assert_eq!(list.files[0].name, "f.png");
        assert!(list.files[0].modified_time.is_some());

        let empty: FileList = serde_json::from_str("{}").unwrap();
        assert!(empty.files.is_empty());
    }
}
