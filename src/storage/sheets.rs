//! Google Sheets v4 transport
//!
//! One spreadsheet holds one sheet per collection. Values are written with
//! `valueInputOption=RAW` so the backend never reinterprets cell text. Every
//! request carries the configured timeout; nothing is retried here.
//!
//! Sheet ids (needed for row deletion) are cached by title after the first
//! metadata read. Titles are assumed not to be renamed while the process runs.

use crate::core::{Error, Result, TransportError};
use crate::storage::auth::{StaticToken, TokenProvider};
use crate::storage::transport::{Transport, TransportResult};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Transport backed by the Google Sheets REST API
#[derive(Debug, Clone)]
pub struct SheetsTransport {
    client: Client,
    base_url: Url,
    spreadsheet_id: String,
    auth: Arc<dyn TokenProvider>,
    sheet_ids: Arc<DashMap<String, i64>>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
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
}

impl SheetsTransport {
    /// Create a transport for one spreadsheet using a fixed bearer token
    pub fn new(
        base_url: &str,
        spreadsheet_id: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Self::with_auth(
            base_url,
            spreadsheet_id,
            Arc::new(StaticToken::new(access_token)),
            timeout,
        )
    }

    /// Create a transport whose requests are authorized by `auth`
    pub fn with_auth(
        base_url: &str,
        spreadsheet_id: impl Into<String>,
        auth: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid Sheets API URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config("Sheets API URL cannot be a base URL"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.into(),
            auth,
            sheet_ids: Arc::new(DashMap::new()),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("spreadsheets").extend(segments);
        }
        url
    }

    fn values_url(&self, range: &str) -> Url {
        self.url(&[&self.spreadsheet_id, "values", range])
    }

    async fn send(&self, request: RequestBuilder) -> TransportResult<reqwest::Response> {
        let token = self.auth.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, body))
    }

    async fn read_range(&self, range: &str) -> TransportResult<Vec<Vec<String>>> {
        debug!(range, "sheets values.get");
        let response = self.send(self.client.get(self.values_url(range))).await?;
        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn write_range(&self, range: &str, row: &[String]) -> TransportResult<()> {
        debug!(range, cells = row.len(), "sheets values.update");
        let request = self
            .client
            .put(self.values_url(range))
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": [row] }));
        self.send(request).await.map(|_| ())
    }

    async fn sheets(&self) -> TransportResult<Vec<SheetProperties>> {
        let request = self
            .client
            .get(self.url(&[&self.spreadsheet_id]))
            .query(&[("fields", "sheets.properties")]);
        let meta: SpreadsheetMeta = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        let sheets: Vec<SheetProperties> = meta.sheets.into_iter().map(|s| s.properties).collect();
        self.sheet_ids.clear();
        for sheet in &sheets {
            self.sheet_ids.insert(sheet.title.clone(), sheet.sheet_id);
        }
        Ok(sheets)
    }

    async fn batch_update(&self, request: JsonValue) -> TransportResult<()> {
        let batch = format!("{}:batchUpdate", self.spreadsheet_id);
        let request = self
            .client
            .post(self.url(&[&batch]))
            .json(&json!({ "requests": [request] }));
        self.send(request).await.map(|_| ())
    }
}

/// Quote a sheet name for A1 notation: `'Name'`, with inner quotes doubled
pub fn quote_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn cell_text(cell: JsonValue) -> String {
    match cell {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Unavailable(err.to_string())
    }
}

fn map_status(status: StatusCode, body: String) -> TransportError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => TransportError::Quota(body),
        _ => TransportError::Http {
            status: status.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl Transport for SheetsTransport {
    async fn read_all_rows(&self, collection: &str) -> TransportResult<Vec<Vec<String>>> {
        self.read_range(&quote_sheet(collection)).await
    }

    async fn read_header_row(&self, collection: &str) -> TransportResult<Vec<String>> {
        let rows = self
            .read_range(&format!("{}!1:1", quote_sheet(collection)))
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn write_header_row(&self, collection: &str, headers: &[String]) -> TransportResult<()> {
        self.write_range(&format!("{}!A1", quote_sheet(collection)), headers)
            .await
    }

    async fn append_row(&self, collection: &str, row: &[String]) -> TransportResult<()> {
        debug!(collection, cells = row.len(), "sheets values.append");
        let range = format!("{}!A1:append", quote_sheet(collection));
        let request = self
            .client
            .post(self.values_url(&range))
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [row] }));
        self.send(request).await.map(|_| ())
    }

    async fn overwrite_row(
        &self,
        collection: &str,
        row_index: usize,
        row: &[String],
    ) -> TransportResult<()> {
        self.write_range(&format!("{}!A{}", quote_sheet(collection), row_index), row)
            .await
    }

    async fn delete_row(&self, collection: &str, row_index: usize) -> TransportResult<()> {
        if row_index == 0 {
            return Err(TransportError::RowOutOfRange { row: 0, rows: 0 });
        }
        let sheet_id = self
            .collection_physical_id(collection)
            .await?
            .ok_or_else(|| TransportError::UnknownCollection(collection.to_string()))?;
        debug!(collection, sheet_id, row_index, "sheets deleteDimension");
        self.batch_update(json!({
            "deleteDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": row_index - 1,
                    "endIndex": row_index
                }
            }
        }))
        .await
    }

    async fn collection_physical_id(&self, collection: &str) -> TransportResult<Option<i64>> {
        if let Some(id) = self.sheet_ids.get(collection) {
            return Ok(Some(*id));
        }
        Ok(self
            .sheets()
            .await?
            .into_iter()
            .find(|s| s.title == collection)
            .map(|s| s.sheet_id))
    }

    async fn list_collections(&self) -> TransportResult<Vec<String>> {
        Ok(self.sheets().await?.into_iter().map(|s| s.title).collect())
    }

    async fn create_collection(&self, name: &str) -> TransportResult<()> {
        debug!(name, "sheets addSheet");
        self.batch_update(json!({ "addSheet": { "properties": { "title": name } } }))
            .await
    }
}
