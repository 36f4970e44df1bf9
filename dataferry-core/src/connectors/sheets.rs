//! Google Sheets connector over the Sheets and Drive REST APIs.
//!
//! Authentication uses a service-account JSON key: a short-lived RS256
//! JWT is exchanged for a bearer token. Workbooks are addressed by title
//! and resolved to a spreadsheet id through the Drive file listing. The
//! key file's contents are never logged.

use crate::connectors::Connector;
use crate::credentials::CredentialReference;
use crate::dataset::{Cell, Dataset};
use crate::endpoint::{EndpointDescriptor, EndpointKind};
use crate::error::{EtlError, Result};
use crate::query::QueryTemplate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Hard ceiling on cells written to one Google Sheets workbook.
pub const MAX_CELLS: usize = 10_000_000;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const OAUTH_SCOPE: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
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
struct SheetProperties {
    title: String,
}

fn check_capacity(cell_count: usize) -> Result<()> {
    if cell_count > MAX_CELLS {
        return Err(EtlError::capacity(format!(
            "dataset of {cell_count} cells exceeds the {MAX_CELLS} cell limit \
             of a google sheets workbook"
        )));
    }
    Ok(())
}

fn value_to_cell(value: &serde_json::Value) -> Cell {
    match value {
        serde_json::Value::Null => Cell::Null,
        serde_json::Value::Bool(b) => Cell::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Cell::Int)
            .unwrap_or_else(|| Cell::Float(n.as_f64().unwrap_or(f64::NAN))),
        serde_json::Value::String(s) if s.is_empty() => Cell::Null,
        other => Cell::Text(match other {
            serde_json::Value::String(s) => s.clone(),
            v => v.to_string(),
        }),
    }
}

/// Connector for Google Sheets workbooks addressed by title.
pub struct SheetsConnector {
    descriptor: EndpointDescriptor,
    credential: CredentialReference,
}

impl SheetsConnector {
    /// Wraps a parsed spreadsheet endpoint and its located key file.
    pub fn new(descriptor: EndpointDescriptor, credential: CredentialReference) -> Self {
        Self {
            descriptor,
            credential,
        }
    }

    fn workbook_title(&self) -> &str {
        &self.descriptor.location
    }

    async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let raw = std::fs::read_to_string(&self.credential.path).map_err(|e| {
            EtlError::io(
                format!("failed to read <{}>", self.credential.path.display()),
                e,
            )
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            EtlError::serialization(
                format!(
                    "invalid service-account key <{}>",
                    self.credential.path.display()
                ),
                e,
            )
        })?;

        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &key.client_email,
            scope: OAUTH_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| EtlError::connector("invalid service-account private key", e))?;
        let assertion = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &encoding_key,
        )
        .map_err(|e| EtlError::connector("failed to sign token request", e))?;

        let response: TokenResponse = client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| EtlError::connector("google token request failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("google token request rejected", e))?
            .json()
            .await
            .map_err(|e| EtlError::connector("malformed google token response", e))?;
        Ok(response.access_token)
    }

    async fn spreadsheet_id(&self, client: &reqwest::Client, token: &str) -> Result<String> {
        let title = self.workbook_title();
        let query = format!(
            "name = '{}' and mimeType = 'application/vnd.google-apps.spreadsheet' \
             and trashed = false",
            title.replace('\'', "\\'")
        );
        let listing: DriveFileList = client
            .get(DRIVE_API)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await
            .map_err(|e| EtlError::connector("drive lookup failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("drive lookup rejected", e))?
            .json()
            .await
            .map_err(|e| EtlError::connector("malformed drive response", e))?;

        listing
            .files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| EtlError::endpoint(format!("spreadsheet not found <{title}>")))
    }

    async fn ensure_sheet(
        &self,
        client: &reqwest::Client,
        token: &str,
        spreadsheet_id: &str,
        sheet: &str,
    ) -> Result<()> {
        let meta: SpreadsheetMeta = client
            .get(format!("{SHEETS_API}/{spreadsheet_id}"))
            .bearer_auth(token)
            .query(&[("fields", "sheets(properties(title))")])
            .send()
            .await
            .map_err(|e| EtlError::connector("workbook metadata request failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("workbook metadata request rejected", e))?
            .json()
            .await
            .map_err(|e| EtlError::connector("malformed workbook metadata", e))?;

        if meta.sheets.iter().any(|s| s.properties.title == sheet) {
            return Ok(());
        }
        debug!("creating missing sheet <{}>", sheet);
        client
            .post(format!("{SHEETS_API}/{spreadsheet_id}:batchUpdate"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "requests": [{ "addSheet": { "properties": { "title": sheet } } }]
            }))
            .send()
            .await
            .map_err(|e| EtlError::connector("sheet creation failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("sheet creation rejected", e))?;
        Ok(())
    }
}

#[async_trait]
impl Connector for SheetsConnector {
    async fn extract(&self, _query: Option<&QueryTemplate>) -> Result<Dataset> {
        let sheet = self.descriptor.auxiliary.as_deref().ok_or_else(|| {
            EtlError::validation("spreadsheet sources must name an exact sheet")
        })?;
        info!(
            "extracting data from workbook <{}> sheet <{}>",
            self.workbook_title(),
            sheet
        );

        let client = reqwest::Client::new();
        let token = self.access_token(&client).await?;
        let spreadsheet_id = self.spreadsheet_id(&client, &token).await?;

        let range: ValueRange = client
            .get(format!("{SHEETS_API}/{spreadsheet_id}/values/{sheet}"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| EtlError::connector("sheet read failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("sheet read rejected", e))?
            .json()
            .await
            .map_err(|e| EtlError::connector("malformed sheet values", e))?;

        let mut rows = range.values.into_iter();
        let Some(header) = rows.next() else {
            return Ok(Dataset::empty());
        };
        let columns: Vec<String> = header
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let width = columns.len();

        let mut dataset = Dataset::new(columns)?;
        for row in rows {
            // Trailing empty cells are omitted by the API; pad to width.
            let mut cells: Vec<Cell> = row.iter().map(value_to_cell).collect();
            cells.resize(width, Cell::Null);
            dataset.push_row(cells)?;
        }
        Ok(dataset)
    }

    async fn load(&self, dataset: Dataset, default_name: &str) -> Result<()> {
        let sheet = self
            .descriptor
            .auxiliary
            .clone()
            .unwrap_or_else(|| default_name.to_string());
        check_capacity(dataset.cell_count())?;
        let dataset = dataset.stringify();

        let client = reqwest::Client::new();
        let token = self.access_token(&client).await?;
        let spreadsheet_id = self.spreadsheet_id(&client, &token).await?;
        self.ensure_sheet(&client, &token, &spreadsheet_id, &sheet)
            .await?;

        client
            .post(format!(
                "{SHEETS_API}/{spreadsheet_id}/values/{sheet}:clear"
            ))
            .bearer_auth(&token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| EtlError::connector("sheet clear failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("sheet clear rejected", e))?;

        let mut values: Vec<Vec<String>> = Vec::with_capacity(dataset.row_count() + 1);
        values.push(dataset.columns().to_vec());
        for row in dataset.rows() {
            values.push(row.iter().map(Cell::to_display).collect());
        }

        client
            .put(format!(
                "{SHEETS_API}/{spreadsheet_id}/values/{sheet}!A1"
            ))
            .bearer_auth(&token)
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({ "values": values }))
            .send()
            .await
            .map_err(|e| EtlError::connector("sheet write failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("sheet write rejected", e))?;

        info!(
            "data saved to workbook <{}> on sheet <{}>",
            self.workbook_title(),
            sheet
        );
        Ok(())
    }

    fn kind(&self) -> EndpointKind {
        self.descriptor.kind
    }
}
