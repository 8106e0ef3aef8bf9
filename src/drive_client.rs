//! Remote storage provider seam and its Google Drive implementation.
//!
//! [`DriveApi`] is everything the walker and extractor need from the
//! provider: paginated folder listing, ranged media/export downloads, and a
//! values read for native spreadsheets. [`GoogleDriveClient`] implements it
//! over the Drive v3 and Sheets v4 REST APIs with a bearer access token;
//! [`MemoryDrive`](crate::drive_memory::MemoryDrive) implements it in memory.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list | `GET {drive}/files?q='<id>' in parents and trashed = false&pageSize=N&fields=…` |
//! | raw download | `GET {drive}/files/<id>?alt=media` + `Range` |
//! | export | `GET {drive}/files/<id>/export?mimeType=text/plain` + `Range` |
//! | sheet values | `GET {sheets}/spreadsheets/<id>/values/<range>` |
//!
//! The client never refreshes tokens: a rejected access token surfaces as
//! [`DriveError::Unauthorized`].

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::DriveConfig;
use crate::error::DriveError;
use crate::models::RemoteFile;

/// Fields requested from the listing endpoint.
const LIST_FIELDS: &str = "nextPageToken, files(id, name, webViewLink, mimeType)";

/// Access/refresh token pair handed in by the session layer.
#[derive(Clone)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// What to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// The file's stored bytes.
    Raw { file_id: String },
    /// A native document converted by the provider.
    Export { file_id: String, mime_type: String },
}

impl MediaSource {
    pub fn file_id(&self) -> &str {
        match self {
            MediaSource::Raw { file_id } | MediaSource::Export { file_id, .. } => file_id,
        }
    }
}

/// Bytes returned for one ranged request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaChunk {
    pub data: Vec<u8>,
    /// Total size of the transfer, when the provider reported it.
    pub total_size: Option<u64>,
    /// True when the provider honoured the range (HTTP 206); false means
    /// `data` is the whole body.
    pub partial: bool,
}

#[async_trait]
pub trait DriveApi: Send + Sync {
    /// List the direct children of `folder_id`.
    async fn list_children(
        &self,
        folder_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, DriveError>;

    /// Fetch up to `len` bytes of `source` starting at `offset`.
    async fn fetch_chunk(
        &self,
        source: &MediaSource,
        offset: u64,
        len: u64,
    ) -> Result<MediaChunk, DriveError>;

    /// Read a cell range of a native spreadsheet as rows of strings.
    async fn sheet_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, DriveError>;
}

/// Opens a [`DriveApi`] for one request's credentials.
pub trait DriveProvider: Send + Sync {
    fn open(&self, credentials: &Credentials) -> Result<Arc<dyn DriveApi>, DriveError>;
}

/// Opens [`GoogleDriveClient`]s.
pub struct GoogleDriveProvider {
    config: DriveConfig,
}

impl GoogleDriveProvider {
    pub fn new(config: DriveConfig) -> Self {
        Self { config }
    }
}

impl DriveProvider for GoogleDriveProvider {
    fn open(&self, credentials: &Credentials) -> Result<Arc<dyn DriveApi>, DriveError> {
        Ok(Arc::new(GoogleDriveClient::new(&self.config, credentials)?))
    }
}

/// Drive v3 / Sheets v4 client bound to one access token.
pub struct GoogleDriveClient {
    client: reqwest::Client,
    api_base: String,
    sheets_base: String,
    access_token: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl GoogleDriveClient {
    pub fn new(config: &DriveConfig, credentials: &Credentials) -> Result<Self, DriveError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            sheets_base: config.sheets_api_base.trim_end_matches('/').to_string(),
            access_token: credentials.access_token.clone(),
            timeout,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> DriveError {
        if e.is_timeout() {
            DriveError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            DriveError::Http(e)
        }
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        range: Option<String>,
    ) -> Result<reqwest::Response, DriveError> {
        let mut req = self
            .client
            .get(url)
            .query(query)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token));
        if let Some(range) = range {
            req = req.header(RANGE, range);
        }
        let resp = req.send().await.map_err(|e| self.map_send_error(e))?;
        check_status(resp).await
    }
}

#[async_trait]
impl DriveApi for GoogleDriveClient {
    async fn list_children(
        &self,
        folder_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, DriveError> {
        let url = format!("{}/files", self.api_base);
        let q = format!("'{}' in parents and trashed = false", folder_id.replace('\'', "\\'"));
        let page_size = page_size.to_string();
        let mut query = vec![
            ("q", q.as_str()),
            ("pageSize", page_size.as_str()),
            ("fields", LIST_FIELDS),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let resp = self.get(&url, &query, None).await?;
        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        serde_json::from_str(&body).map_err(|e| DriveError::Decode(e.to_string()))
    }

    async fn fetch_chunk(
        &self,
        source: &MediaSource,
        offset: u64,
        len: u64,
    ) -> Result<MediaChunk, DriveError> {
        let range = format!("bytes={}-{}", offset, offset + len.saturating_sub(1));
        let resp = match source {
            MediaSource::Raw { file_id } => {
                let url = format!("{}/files/{}", self.api_base, file_id);
                self.get(&url, &[("alt", "media"), ("supportsAllDrives", "true")], Some(range))
                    .await
            }
            MediaSource::Export { file_id, mime_type } => {
                let url = format!("{}/files/{}/export", self.api_base, file_id);
                self.get(&url, &[("mimeType", mime_type.as_str())], Some(range))
                    .await
            }
        };

        let resp = match resp {
            // asked past the end of the object: nothing left to read
            Err(DriveError::Status { status: 416, .. }) => {
                return Ok(MediaChunk {
                    data: Vec::new(),
                    total_size: Some(offset),
                    partial: true,
                })
            }
            other => other?,
        };

        let partial = resp.status() == StatusCode::PARTIAL_CONTENT;
        let total_size = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let data = resp
            .bytes()
            .await
            .map_err(|e| self.map_send_error(e))?
            .to_vec();
        debug!(
            file_id = source.file_id(),
            offset,
            received = data.len(),
            "fetched media chunk"
        );

        Ok(MediaChunk {
            total_size: total_size.or((!partial).then_some(data.len() as u64)),
            data,
            partial,
        })
    }

    async fn sheet_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, DriveError> {
        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            self.sheets_base, spreadsheet_id, range
        );
        let resp = self.get(&url, &[], None).await?;
        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        let parsed: ValueRange =
            serde_json::from_str(&body).map_err(|e| DriveError::Decode(e.to_string()))?;
        Ok(parsed
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, DriveError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DriveError::Unauthorized {
            status: status.as_u16(),
        });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DriveError::Status {
        status: status.as_u16(),
        message: body.chars().take(500).collect(),
    })
}

/// Total size from a `Content-Range: bytes 0-99/1234` header.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
