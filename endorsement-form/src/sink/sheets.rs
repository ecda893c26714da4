use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{
    config::SheetsWriteMode, credentials::TokenSource, error::SinkError, record::Record,
};

use super::RecordSink;

/// Base URLs of the two Google APIs the sink talks to.
#[derive(Debug, Clone)]
pub struct SheetsEndpoints {
    pub sheets: String,
    pub drive_files: String,
}

impl Default for SheetsEndpoints {
    fn default() -> Self {
        Self {
            sheets: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            drive_files: "https://www.googleapis.com/drive/v3/files".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetTarget {
    spreadsheet_id: String,
    sheet_title: String,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
    #[serde(default)]
    index: i64,
}

/// Appends records to the first sheet of a spreadsheet addressed by name.
///
/// The spreadsheet is resolved once and reused. Zero or several spreadsheets
/// sharing the name is a configuration problem reported as
/// [`SinkError::ConnectionFailed`].
pub struct GoogleSheetsSink {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    spreadsheet_name: String,
    write_mode: SheetsWriteMode,
    endpoints: SheetsEndpoints,
    target: OnceCell<SheetTarget>,
}

impl GoogleSheetsSink {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        spreadsheet_name: impl Into<String>,
        write_mode: SheetsWriteMode,
        endpoints: SheetsEndpoints,
    ) -> Self {
        Self {
            client,
            tokens,
            spreadsheet_name: spreadsheet_name.into(),
            write_mode,
            endpoints,
            target: OnceCell::new(),
        }
    }

    async fn target(&self, token: &str) -> Result<&SheetTarget, SinkError> {
        self.target.get_or_try_init(|| self.resolve(token)).await
    }

    async fn resolve(&self, token: &str) -> Result<SheetTarget, SinkError> {
        let query = format!(
            "name = '{}' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false",
            escape_query_literal(&self.spreadsheet_name)
        );
        let response = self
            .client
            .get(&self.endpoints.drive_files)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await
            .map_err(connection_failed)?;
        let listing: DriveFileList = lookup_response(response).await?.json().await.map_err(connection_failed)?;

        let spreadsheet_id = match listing.files.as_slice() {
            [only] => only.id.clone(),
            [] => {
                return Err(SinkError::ConnectionFailed(format!(
                    "no spreadsheet named {:?}",
                    self.spreadsheet_name
                )));
            }
            several => {
                return Err(SinkError::ConnectionFailed(format!(
                    "{} spreadsheets are named {:?}",
                    several.len(),
                    self.spreadsheet_name
                )));
            }
        };

        let response = self
            .client
            .get(format!("{}/{}", self.endpoints.sheets, spreadsheet_id))
            .bearer_auth(token)
            .query(&[("fields", "sheets.properties(title,index)")])
            .send()
            .await
            .map_err(connection_failed)?;
        let meta: SpreadsheetMeta = lookup_response(response).await?.json().await.map_err(connection_failed)?;

        let sheet_title = meta
            .sheets
            .into_iter()
            .min_by_key(|s| s.properties.index)
            .map(|s| s.properties.title)
            .ok_or_else(|| {
                SinkError::ConnectionFailed(format!(
                    "spreadsheet {:?} has no sheets",
                    self.spreadsheet_name
                ))
            })?;

        info!(
            spreadsheet = %self.spreadsheet_name,
            spreadsheet_id = %spreadsheet_id,
            sheet = %sheet_title,
            "Resolved spreadsheet"
        );
        Ok(SheetTarget {
            spreadsheet_id,
            sheet_title,
        })
    }

    fn append_url(&self, target: &SheetTarget) -> Result<Url, SinkError> {
        let mut url = Url::parse(&self.endpoints.sheets)
            .map_err(|e| SinkError::ConnectionFailed(format!("invalid sheets endpoint: {e}")))?;
        let range = format!("'{}'!A1", target.sheet_title.replace('\'', "''"));
        url.path_segments_mut()
            .map_err(|_| SinkError::ConnectionFailed("sheets endpoint cannot be a base".to_string()))?
            .push(&target.spreadsheet_id)
            .push("values")
            .push(&format!("{range}:append"));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }

    async fn append_rows(
        &self,
        token: &str,
        target: &SheetTarget,
        rows: &[Record],
    ) -> Result<(), SinkError> {
        let values: Vec<[String; 9]> = rows.iter().map(Record::answer_fields).collect();
        let response = self
            .client
            .post(self.append_url(target)?)
            .bearer_auth(token)
            .json(&json!({ "values": values }))
            .send()
            .await
            .map_err(connection_failed)?;

        let status = response.status();
        if status.is_success() {
            debug!(rows = rows.len(), "Appended rows to sheet");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SinkError::AuthenticationFailed(format!("sheets returned {status}: {body}"))
            }
            _ => SinkError::WriteFailed(format!("sheets returned {status}: {body}")),
        })
    }
}

#[async_trait]
impl RecordSink for GoogleSheetsSink {
    fn name(&self) -> &str {
        "google_sheets"
    }

    async fn prepare(&self) -> Result<(), SinkError> {
        let token = self.tokens.access_token().await?;
        self.target(&token).await.map(|_| ())
    }

    async fn append(&self, records: &[Record]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        let token = self.tokens.access_token().await?;
        let target = self.target(&token).await?;

        match self.write_mode {
            SheetsWriteMode::Batched => self.append_rows(&token, target, records).await?,
            SheetsWriteMode::PerRow => {
                for record in records {
                    self.append_rows(&token, target, std::slice::from_ref(record))
                        .await?;
                }
            }
        }

        info!(
            spreadsheet = %self.spreadsheet_name,
            records = records.len(),
            mode = ?self.write_mode,
            "Appended records to spreadsheet"
        );
        Ok(())
    }
}

fn connection_failed(e: reqwest::Error) -> SinkError {
    SinkError::ConnectionFailed(e.to_string())
}

/// Lookup failures mean the store cannot be reached as configured.
async fn lookup_response(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SinkError::AuthenticationFailed(format!("lookup returned {status}: {body}"))
        }
        _ => SinkError::ConnectionFailed(format!("lookup returned {status}: {body}")),
    })
}

fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
