//! Remote tabular-service collaborator: wire types for columns, rows and
//! cells, the `SheetService` operation seam, a REST client implementation,
//! and the snapshot adapter that shapes a sheet for diffing.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "acta-sheets";

/// Hard per-call ceiling the service imposes on row deletion. Callers chunk
/// their id lists to stay under it.
pub const MAX_DELETE_IDS_PER_CALL: usize = 200;

/// Opaque remote row identifier. Kept textual because the service
/// round-trips ids through loosely-typed cells, which can attach a trailing
/// `.0` that delete calls must not see.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RowId(pub String);

impl RowId {
    /// Form accepted by delete calls. The decimal suffix, when present, is
    /// always `.0`; everything from the separator on is not significant.
    pub fn delete_key(&self) -> &str {
        match self.0.find('.') {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match JsonValue::deserialize(deserializer)? {
            JsonValue::String(s) => Ok(RowId(s)),
            JsonValue::Number(n) => Ok(RowId(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "unsupported row id value: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub id: i64,
    pub title: String,
}

/// A cell as returned by the service. Sparse cells have no `value` key at
/// all; that is data, not an error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetCell {
    pub column_id: i64,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub id: RowId,
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cells: Vec<SheetCell>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sheet {
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub rows: Vec<SheetRow>,
}

#[derive(Debug, Clone, Deserialize)]
struct ColumnListing {
    #[serde(default)]
    data: Vec<ColumnDef>,
}

/// Mutation cell payload. Date cells carry the typed DATE wrapper next to
/// the plain value; everything else sends the plain value only. The tagged
/// variant makes a wrapper around a non-date unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Plain(String),
    Date(String),
}

impl CellValue {
    pub fn plain(value: Option<&str>) -> Self {
        CellValue::Plain(value.unwrap_or_default().to_string())
    }

    /// DATE wrapper only when there is a date to wrap; an absent date falls
    /// back to a plain empty cell.
    pub fn date_or_blank(value: Option<&str>) -> Self {
        match value {
            Some(d) if !d.is_empty() => CellValue::Date(d.to_string()),
            _ => CellValue::Plain(String::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateObjectValue {
    pub object_type: &'static str,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellWrite {
    pub column_id: i64,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_value: Option<DateObjectValue>,
    pub strict: bool,
}

impl CellWrite {
    pub fn new(column_id: i64, value: CellValue) -> Self {
        match value {
            CellValue::Plain(v) => Self {
                column_id,
                value: v,
                object_value: None,
                strict: false,
            },
            CellValue::Date(d) => Self {
                column_id,
                value: d.clone(),
                object_value: Some(DateObjectValue {
                    object_type: "DATE",
                    values: vec![d],
                }),
                strict: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowUpdate {
    pub id: RowId,
    pub cells: Vec<CellWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowInsert {
    pub to_bottom: bool,
    pub cells: Vec<CellWrite>,
}

impl RowInsert {
    /// Inserted rows are always appended at the end of the sheet.
    pub fn at_bottom(cells: Vec<CellWrite>) -> Self {
        Self {
            to_bottom: true,
            cells,
        }
    }
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("sheet request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sheet service returned {status} for {url}")]
    Status { status: u16, url: String },
    #[error("decoding sheet response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// The five remote operations the reconciliation pipeline needs. The REST
/// client implements this; tests substitute an in-memory double.
#[async_trait]
pub trait SheetService: Send + Sync {
    async fn columns(&self, sheet_id: u64) -> Result<Vec<ColumnDef>, SheetError>;
    async fn sheet(&self, sheet_id: u64) -> Result<Sheet, SheetError>;
    async fn update_rows(&self, sheet_id: u64, rows: Vec<RowUpdate>) -> Result<(), SheetError>;
    async fn insert_rows(&self, sheet_id: u64, rows: Vec<RowInsert>) -> Result<(), SheetError>;
    async fn delete_rows(&self, sheet_id: u64, ids: &[String]) -> Result<(), SheetError>;
}

#[derive(Debug, Clone)]
pub struct SheetClientConfig {
    pub base_url: String,
    pub access_token: String,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

/// REST implementation of [`SheetService`]. Single attempt per call: the
/// dispatcher's contract is no-retry, with transient and permanent failures
/// treated identically.
#[derive(Debug, Clone)]
pub struct RestSheetClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl RestSheetClient {
    pub fn new(config: SheetClientConfig) -> Result<Self, SheetError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SheetError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        Err(SheetError::Status {
            status: status.as_u16(),
            url: resp.url().to_string(),
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, SheetError> {
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(SheetError::Decode)
    }
}

#[async_trait]
impl SheetService for RestSheetClient {
    async fn columns(&self, sheet_id: u64) -> Result<Vec<ColumnDef>, SheetError> {
        let url = self.url(&format!("sheets/{sheet_id}/columns"));
        debug!(sheet_id, "fetching sheet columns");
        let resp = self
            .http
            .get(&url)
            .query(&[("includeAll", "true")])
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let listing: ColumnListing = Self::decode(Self::check(resp).await?).await?;
        Ok(listing.data)
    }

    async fn sheet(&self, sheet_id: u64) -> Result<Sheet, SheetError> {
        let url = self.url(&format!("sheets/{sheet_id}"));
        debug!(sheet_id, "fetching sheet");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::decode(Self::check(resp).await?).await
    }

    async fn update_rows(&self, sheet_id: u64, rows: Vec<RowUpdate>) -> Result<(), SheetError> {
        let url = self.url(&format!("sheets/{sheet_id}/rows"));
        debug!(sheet_id, rows = rows.len(), "updating sheet rows");
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&rows)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn insert_rows(&self, sheet_id: u64, rows: Vec<RowInsert>) -> Result<(), SheetError> {
        let url = self.url(&format!("sheets/{sheet_id}/rows"));
        debug!(sheet_id, rows = rows.len(), "inserting sheet rows");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&rows)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn delete_rows(&self, sheet_id: u64, ids: &[String]) -> Result<(), SheetError> {
        debug_assert!(ids.len() <= MAX_DELETE_IDS_PER_CALL);
        let url = self.url(&format!("sheets/{sheet_id}/rows"));
        debug!(sheet_id, ids = ids.len(), "deleting sheet rows");
        let resp = self
            .http
            .delete(&url)
            .query(&[("ids", ids.join(","))])
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

/// Canonical field name → remote column id, sourced from the sheet's column
/// metadata at comparison time. Required for building mutation payloads.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    ids: HashMap<String, i64>,
}

impl ColumnMap {
    pub fn from_columns(columns: &[ColumnDef]) -> Self {
        Self {
            ids: columns.iter().map(|c| (c.title.clone(), c.id)).collect(),
        }
    }

    pub fn id(&self, title: &str) -> Option<i64> {
        self.ids.get(title).copied()
    }
}

/// One sheet row shaped for comparison: remote id, modification stamp, and
/// stringified values keyed by column title.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub row_id: RowId,
    pub modified_at: Option<DateTime<Utc>>,
    values: HashMap<String, Option<String>>,
}

impl SnapshotRow {
    pub fn value(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }
}

/// Tabular shape of one remote sheet at snapshot time: column titles in
/// metadata order plus one [`SnapshotRow`] per sheet row.
#[derive(Debug, Clone)]
pub struct SheetSnapshot {
    pub column_titles: Vec<String>,
    pub rows: Vec<SnapshotRow>,
}

impl SheetSnapshot {
    pub fn from_sheet(sheet: &Sheet) -> Self {
        let column_titles: Vec<String> =
            sheet.columns.iter().map(|c| c.title.clone()).collect();
        let title_by_id: HashMap<i64, &str> = sheet
            .columns
            .iter()
            .map(|c| (c.id, c.title.as_str()))
            .collect();

        let rows = sheet
            .rows
            .iter()
            .map(|row| {
                let mut values: HashMap<String, Option<String>> = column_titles
                    .iter()
                    .map(|title| (title.clone(), None))
                    .collect();
                for cell in &row.cells {
                    if let Some(title) = title_by_id.get(&cell.column_id) {
                        values.insert(
                            (*title).to_string(),
                            cell.value.as_ref().map(display_value),
                        );
                    }
                }
                SnapshotRow {
                    row_id: row.id.clone(),
                    modified_at: row.modified_at,
                    values,
                }
            })
            .collect();

        Self {
            column_titles,
            rows,
        }
    }

    pub fn has_column(&self, title: &str) -> bool {
        self.column_titles.iter().any(|t| t == title)
    }
}

/// Pull a sheet and shape it for the differ in one step.
pub async fn snapshot_sheet(
    service: &dyn SheetService,
    sheet_id: u64,
) -> Result<SheetSnapshot, SheetError> {
    let sheet = service.sheet(sheet_id).await?;
    Ok(SheetSnapshot::from_sheet(&sheet))
}

/// Cell values arrive as loosely-typed JSON. Render them the way the sheet
/// UI shows them, with integral numbers kept whole.
pub fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                acta_core::format_number(f)
            } else {
                n.to_string()
            }
        }
        JsonValue::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
