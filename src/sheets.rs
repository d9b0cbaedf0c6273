//! Google Sheets REST client.
//!
//! Thin, stateless wrapper over the `values.get` / `values.append` /
//! `values.update` / `spreadsheets.batchUpdate` endpoints. One logical sheet
//! per entity; all addressing is positional A1 ranges computed from a prior
//! full-sheet read. Row numbers can shift between that read and the write if
//! another client deletes a row in the meantime; the store offers nothing
//! stronger, so callers treat every write as best-effort.

use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::session::Session;

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Default timeout for Sheets API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Logical sheets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sheet {
    Orders,
    Products,
    Expenses,
    Stock,
    FailTrackings,
    BranchNumbers,
}

impl Sheet {
    pub fn name(&self) -> &'static str {
        match self {
            Sheet::Orders => "Orders",
            Sheet::Products => "Products",
            Sheet::Expenses => "Expenses",
            Sheet::Stock => "Stock",
            Sheet::FailTrackings => "FailTrackings",
            Sheet::BranchNumbers => "BranchNumbers",
        }
    }

    /// Last column of the sheet's fixed layout.
    pub fn last_column(&self) -> char {
        match self {
            Sheet::Orders => 'R',
            Sheet::Products => 'E',
            Sheet::Expenses => 'E',
            Sheet::Stock => 'H',
            Sheet::FailTrackings => 'H',
            Sheet::BranchNumbers => 'F',
        }
    }

    /// Unbounded full range, e.g. `Orders!A:R`.
    pub fn full_range(&self) -> String {
        format!("{}!A:{}", self.name(), self.last_column())
    }

    /// Bounded single-row range, e.g. `Orders!A5:Q5`.
    pub fn row_range(&self, row_number: usize, last_column: char) -> String {
        format!("{0}!A{1}:{2}{1}", self.name(), row_number, last_column)
    }

    /// Single-cell range, e.g. `Orders!I5`.
    pub fn cell_range(&self, row_number: usize, col_index: usize) -> String {
        format!("{}!{}{}", self.name(), column_letter(col_index), row_number)
    }
}

/// 0-based column index to its A1 letter(s).
pub fn column_letter(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct SheetsClient {
    http: Client,
    session: Session,
}

impl SheetsClient {
    pub fn new(session: Session) -> Result<Self, String> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(SheetsClient { http, session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn values_url(&self, range: &str) -> String {
        format!("{SHEETS_BASE}/{}/values/{range}", self.session.spreadsheet_id)
    }

    /// Reads may run on the bearer token or fall back to the public API key;
    /// having neither is an auth failure.
    fn authorize_read(&self, req: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        if let Some(token) = self.session.bearer_token.as_deref() {
            return Ok(req.bearer_auth(token));
        }
        if let Some(key) = self.session.api_key.as_deref() {
            return Ok(req.query(&[("key", key)]));
        }
        Err(ServiceError::Auth)
    }

    /// Writes always require the bearer token.
    fn authorize_write(&self, req: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        let token = self.session.require_token()?;
        Ok(req.bearer_auth(token))
    }

    async fn check(&self, url: &str, resp: reqwest::Response) -> Result<Value, ServiceError> {
        let status = resp.status();
        if !status.is_success() {
            // Prefer Google's own error message when the body carries one.
            let body_text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body_text)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(Value::as_str)
                        .map(|s| s.to_string())
                })
                .unwrap_or_else(|| match ServiceError::from_status(status) {
                    ServiceError::Network { message, .. } => message,
                    other => other.to_string(),
                });
            debug!(url, status = status.as_u16(), "sheets request failed");
            return Err(ServiceError::Network {
                status: status.as_u16(),
                message,
            });
        }

        let body_text = resp.text().await.unwrap_or_default();
        if body_text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .map_err(|e| ServiceError::Transport(format!("Invalid JSON from Sheets API: {e}")))
    }

    /// Full sheet contents including the header row. `[]` on an empty sheet.
    pub async fn values(&self, sheet: Sheet) -> Result<Vec<Vec<String>>, ServiceError> {
        let url = self.values_url(&sheet.full_range());
        let req = self.authorize_read(self.http.get(&url))?;
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(&url, &e))?;
        let body = self.check(&url, resp).await?;

        let rows = body
            .get("values")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| match c {
                                        Value::String(s) => s.clone(),
                                        other => other.to_string(),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    /// Data rows only: the header row is stripped, so a header-only or empty
    /// sheet yields `[]`. Row `i` of the result sits at spreadsheet row
    /// `i + 2`.
    pub async fn list(&self, sheet: Sheet) -> Result<Vec<Vec<String>>, ServiceError> {
        let mut rows = self.values(sheet).await?;
        if rows.is_empty() {
            return Ok(rows);
        }
        rows.remove(0);
        Ok(rows)
    }

    /// Append one row at the bottom of the sheet (`valueInputOption=RAW`).
    pub async fn append(&self, sheet: Sheet, row: &[String]) -> Result<(), ServiceError> {
        let url = format!("{}:append", self.values_url(&sheet.full_range()));
        let req = self
            .authorize_write(self.http.post(&url))?
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": [row] }));
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(&url, &e))?;
        self.check(&url, resp).await?;
        debug!(sheet = sheet.name(), "appended row");
        Ok(())
    }

    /// Overwrite a bounded single-row range. `row_number` is 1-based and was
    /// computed by the caller from a prior `list` scan.
    pub async fn update_row(
        &self,
        sheet: Sheet,
        row_number: usize,
        last_column: char,
        row: &[String],
    ) -> Result<(), ServiceError> {
        let range = sheet.row_range(row_number, last_column);
        self.put_values(&range, &json!({ "values": [row] })).await
    }

    /// Overwrite a single cell.
    pub async fn update_cell(
        &self,
        sheet: Sheet,
        row_number: usize,
        col_index: usize,
        value: &str,
    ) -> Result<(), ServiceError> {
        let range = sheet.cell_range(row_number, col_index);
        self.put_values(&range, &json!({ "values": [[value]] })).await
    }

    async fn put_values(&self, range: &str, body: &Value) -> Result<(), ServiceError> {
        let url = self.values_url(range);
        let req = self
            .authorize_write(self.http.put(&url))?
            .query(&[("valueInputOption", "RAW")])
            .json(body);
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(&url, &e))?;
        self.check(&url, resp).await?;
        debug!(range, "updated range");
        Ok(())
    }

    /// Spreadsheet metadata (sheet titles and numeric ids).
    async fn sheet_properties(&self) -> Result<Vec<(String, i64)>, ServiceError> {
        let url = format!(
            "{SHEETS_BASE}/{}?fields=sheets.properties",
            self.session.spreadsheet_id
        );
        let req = self.authorize_read(self.http.get(&url))?;
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(&url, &e))?;
        let body = self.check(&url, resp).await?;

        let props = body
            .get("sheets")
            .and_then(Value::as_array)
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| {
                        let p = s.get("properties")?;
                        Some((
                            p.get("title")?.as_str()?.to_string(),
                            p.get("sheetId")?.as_i64()?,
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(props)
    }

    /// Resolve the sheet tab's internal numeric id (needed by batchUpdate).
    pub async fn sheet_gid(&self, sheet: Sheet) -> Result<i64, ServiceError> {
        let props = self.sheet_properties().await?;
        props
            .into_iter()
            .find(|(title, _)| title == sheet.name())
            .map(|(_, gid)| gid)
            .ok_or_else(|| ServiceError::NotFound(format!("Sheet tab '{}'", sheet.name())))
    }

    async fn batch_update(&self, body: &Value) -> Result<(), ServiceError> {
        let url = format!(
            "{SHEETS_BASE}/{}:batchUpdate",
            self.session.spreadsheet_id
        );
        let req = self.authorize_write(self.http.post(&url))?.json(body);
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(&url, &e))?;
        self.check(&url, resp).await?;
        Ok(())
    }

    /// Delete one row by 0-based index (the header row is index 0).
    pub async fn delete_row(&self, sheet: Sheet, row_index0: usize) -> Result<(), ServiceError> {
        let gid = self.sheet_gid(sheet).await?;
        self.batch_update(&json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": gid,
                        "dimension": "ROWS",
                        "startIndex": row_index0,
                        "endIndex": row_index0 + 1,
                    }
                }
            }]
        }))
        .await?;
        info!(sheet = sheet.name(), row_index0, "deleted row");
        Ok(())
    }

    /// Create the sheet tab if it does not exist yet (first write to the
    /// FailTrackings ledger on a fresh spreadsheet).
    pub async fn ensure_sheet(&self, sheet: Sheet, header: &[String]) -> Result<(), ServiceError> {
        let props = self.sheet_properties().await?;
        if props.iter().any(|(title, _)| title == sheet.name()) {
            return Ok(());
        }
        info!(sheet = sheet.name(), "creating missing sheet tab");
        self.batch_update(&json!({
            "requests": [{
                "addSheet": { "properties": { "title": sheet.name() } }
            }]
        }))
        .await?;
        self.append(sheet, header).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_cover_both_alphabets() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(8), "I");
        assert_eq!(column_letter(17), "R");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn ranges_are_a1_formatted() {
        assert_eq!(Sheet::Orders.full_range(), "Orders!A:R");
        assert_eq!(Sheet::FailTrackings.full_range(), "FailTrackings!A:H");
        assert_eq!(Sheet::Orders.row_range(5, 'Q'), "Orders!A5:Q5");
        assert_eq!(Sheet::Orders.cell_range(5, 8), "Orders!I5");
        assert_eq!(Sheet::Orders.cell_range(12, 17), "Orders!R12");
    }

    #[test]
    fn write_paths_require_a_token() {
        let client = SheetsClient::new(Session::new("sheet-1", None, Some("AIza".into())))
            .expect("client");
        assert!(client
            .authorize_write(client.http.post("https://example.invalid"))
            .is_err());
        // Reads are still possible via the API key.
        assert!(client
            .authorize_read(client.http.get("https://example.invalid"))
            .is_ok());
    }
}
