use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};
use url::Url;

use super::SheetSink;
use crate::fetch::{DriveClient, GoogleAuth};

const SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";
/// Grid size for a freshly created tab; the sheet grows on append.
const NEW_TAB_ROWS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tab {
    sheet_id: i64,
    title: String,
    row_count: usize,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: Option<GridProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
}

impl From<SheetProperties> for Tab {
    fn from(p: SheetProperties) -> Self {
        Tab {
            sheet_id: p.sheet_id,
            title: p.title,
            row_count: p.grid_properties.map(|g| g.row_count).unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// A1 reference to a whole tab or to a cell in it; tab titles are quoted
/// with embedded quotes doubled.
fn a1(tab: &str, cell: Option<&str>) -> String {
    let quoted = format!("'{}'", tab.replace('\'', "''"));
    match cell {
        Some(c) => format!("{}!{}", quoted, c),
        None => quoted,
    }
}

fn cell_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Google Sheets v4 over plain REST, bound to one spreadsheet.
pub struct SheetsClient {
    http: Client,
    auth: Arc<GoogleAuth>,
    spreadsheet_id: String,
    tabs: Mutex<Vec<Tab>>,
}

impl SheetsClient {
    /// Find the spreadsheet titled `title` through Drive and load its tabs.
    #[instrument(level = "info", skip(http, auth, drive))]
    pub async fn open(
        http: Client,
        auth: Arc<GoogleAuth>,
        drive: &DriveClient,
        title: &str,
    ) -> Result<Self> {
        let spreadsheet_id = drive
            .find_spreadsheet(title)
            .await
            .with_context(|| format!("opening spreadsheet `{}`", title))?;
        let client = Self {
            http,
            auth,
            spreadsheet_id,
            tabs: Mutex::new(Vec::new()),
        };
        client.refresh_tabs().await?;
        info!(id = %client.spreadsheet_id, tabs = client.tab_titles().len(), "spreadsheet opened");
        Ok(client)
    }

    /// Title of the first worksheet, which receives the forecast rows.
    pub fn first_tab(&self) -> Result<String> {
        self.tabs
            .lock()
            .expect("tab lock poisoned")
            .first()
            .map(|t| t.title.clone())
            .ok_or_else(|| anyhow!("spreadsheet {} has no worksheets", self.spreadsheet_id))
    }

    fn tab_titles(&self) -> Vec<String> {
        self.tabs
            .lock()
            .expect("tab lock poisoned")
            .iter()
            .map(|t| t.title.clone())
            .collect()
    }

    fn find_tab(&self, title: &str) -> Option<Tab> {
        self.tabs
            .lock()
            .expect("tab lock poisoned")
            .iter()
            .find(|t| t.title == title)
            .cloned()
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(SHEETS_ENDPOINT)?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow!("sheets endpoint cannot be a base"))?;
            path.push(&self.spreadsheet_id);
            for s in segments {
                path.push(s);
            }
        }
        Ok(url)
    }

    async fn refresh_tabs(&self) -> Result<()> {
        let mut url = self.url(&[])?;
        url.query_pairs_mut().append_pair(
            "fields",
            "sheets.properties(sheetId,title,gridProperties.rowCount)",
        );
        let token = self.auth.bearer().await?;
        let meta: Spreadsheet = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("GET spreadsheet metadata")?
            .error_for_status()?
            .json()
            .await
            .context("decoding spreadsheet metadata")?;

        *self.tabs.lock().expect("tab lock poisoned") =
            meta.sheets.into_iter().map(|s| Tab::from(s.properties)).collect();
        Ok(())
    }

    async fn batch_update(&self, requests: Value) -> Result<Value> {
        let url = self.url(&[])?;
        let url = Url::parse(&format!("{}:batchUpdate", url))?;
        let token = self.auth.bearer().await?;
        let reply: Value = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .context("POST spreadsheet batchUpdate")?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply)
    }
}

#[async_trait]
impl SheetSink for SheetsClient {
    #[instrument(level = "debug", skip(self))]
    async fn read_all(&self, tab: &str) -> Result<Vec<Vec<String>>> {
        let range = a1(tab, None);
        let url = self.url(&["values", range.as_str()])?;
        let token = self.auth.bearer().await?;
        let range: ValueRange = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("GET values of `{}`", tab))?
            .error_for_status()?
            .json()
            .await
            .context("decoding value range")?;

        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    #[instrument(level = "debug", skip(self, rows), fields(rows = rows.len()))]
    async fn write_rows(&self, tab: &str, rows: &[Vec<String>], start_row: usize) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.refresh_tabs().await?;
        let current = self
            .find_tab(tab)
            .ok_or_else(|| anyhow!("worksheet `{}` not found", tab))?;

        let needed = start_row.saturating_sub(1) + rows.len();
        if needed > current.row_count {
            let extra = needed - current.row_count;
            debug!(tab, extra, "growing worksheet");
            self.batch_update(json!([{
                "appendDimension": {
                    "sheetId": current.sheet_id,
                    "dimension": "ROWS",
                    "length": extra,
                }
            }]))
            .await
            .with_context(|| format!("adding {} rows to `{}`", extra, tab))?;
        }

        let range = a1(tab, Some(&format!("A{}", start_row)));
        let mut url = self.url(&["values", range.as_str()])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let token = self.auth.bearer().await?;
        self.http
            .put(url)
            .bearer_auth(token)
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows }))
            .send()
            .await
            .with_context(|| format!("PUT values into `{}`", range))?
            .error_for_status()?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, rows), fields(rows = rows.len()))]
    async fn append_rows(&self, tab: &str, rows: &[Vec<String>]) -> Result<()> {
        let target = format!("{}:append", a1(tab, Some("A1")));
        let mut url = self.url(&["values", target.as_str()])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let token = self.auth.bearer().await?;
        self.http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "majorDimension": "ROWS", "values": rows }))
            .send()
            .await
            .with_context(|| format!("appending to `{}`", tab))?
            .error_for_status()?;
        Ok(())
    }

    #[instrument(level = "info", skip(self, header))]
    async fn open_or_create_tab(&self, name: &str, header: &[&str]) -> Result<()> {
        if self.find_tab(name).is_some() {
            return Ok(());
        }

        let reply = self
            .batch_update(json!([{
                "addSheet": {
                    "properties": {
                        "title": name,
                        "gridProperties": {
                            "rowCount": NEW_TAB_ROWS,
                            "columnCount": header.len().max(1),
                        }
                    }
                }
            }]))
            .await
            .with_context(|| format!("creating worksheet `{}`", name))?;

        let props: SheetProperties =
            serde_json::from_value(reply["replies"][0]["addSheet"]["properties"].clone())
                .context("decoding addSheet reply")?;
        self.tabs
            .lock()
            .expect("tab lock poisoned")
            .push(Tab::from(props));
        info!(tab = name, "created worksheet");

        let header_row: Vec<String> = header.iter().map(|h| h.to_string()).collect();
        self.append_rows(name, &[header_row]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1_quotes_tab_titles() {
        assert_eq!(a1("Log", None), "'Log'");
        assert_eq!(a1("Sheet1", Some("A12")), "'Sheet1'!A12");
        assert_eq!(a1("Ops' log", None), "'Ops'' log'");
    }

    #[test]
    fn value_range_cells_become_text() {
        let body = r#"{"range": "'Log'!A1:B2", "values": [["Filename", "Processed At"], ["a.png", 3]]}"#;
        let range: ValueRange = serde_json::from_str(body).unwrap();
        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|r| r.into_iter().map(cell_text).collect())
            .collect();
        assert_eq!(rows[1], vec!["a.png", "3"]);

        let empty: ValueRange = serde_json::from_str(r#"{"range": "'Log'!A1:Z1000"}"#).unwrap();
        assert!(empty.values.is_empty());
    }

    #[test]
    fn sheet_properties_map_to_tabs() {
        let body = r#"{"sheets": [
            {"properties": {"sheetId": 0, "title": "Sheet1", "gridProperties": {"rowCount": 1000}}},
            {"properties": {"sheetId": 7, "title": "Log"}}
        ]}"#;
        let meta: Spreadsheet = serde_json::from_str(body).unwrap();
        let tabs: Vec<Tab> = meta.sheets.into_iter().map(|s| Tab::from(s.properties)).collect();
        assert_eq!(
            tabs[0],
            Tab {
                sheet_id: 0,
                title: "Sheet1".into(),
                row_count: 1000
            }
        );
        assert_eq!(tabs[1].row_count, 0);
    }
}
