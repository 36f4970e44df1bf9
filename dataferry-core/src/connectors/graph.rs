//! Microsoft Graph workbook connector.
//!
//! Authentication is the OAuth2 client-credentials flow against the
//! tenant authority named in the credential file. Workbooks are
//! addressed by their drive-item API URL; requests go through the
//! item's `/workbook` sub-path. Loading builds a worksheet, a covering
//! table, and streams rows in fixed-size chunks because the tables
//! endpoint rejects very large single requests.

use crate::connectors::Connector;
use crate::credentials::CredentialReference;
use crate::dataset::{Cell, Dataset};
use crate::endpoint::{EndpointDescriptor, EndpointKind};
use crate::error::{EtlError, Result};
use crate::query::QueryTemplate;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// Hard ceiling on cells written to one Graph workbook.
pub const MAX_CELLS: usize = 5_000_000;

/// Rows posted per table-rows request.
pub const ROW_CHUNK: usize = 1000;

#[derive(Debug, Deserialize)]
struct GraphCredentials {
    client_id: String,
    #[serde(alias = "client_credential")]
    client_secret: String,
    authority: String,
    #[serde(default = "Scopes::default", alias = "scopes")]
    scope: Scopes,
}

/// Requested scopes, written either as one string or as a YAML list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scopes {
    One(String),
    Many(Vec<String>),
}

impl Scopes {
    fn joined(&self) -> String {
        match self {
            Self::One(scope) => scope.clone(),
            Self::Many(scopes) => scopes.join(" "),
        }
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::One("https://graph.microsoft.com/.default".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TableInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UsedRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Converts a 1-based column number to its spreadsheet letter form.
///
/// `1` is `A`, `26` is `Z`, `27` is `AA`, `28` is `AB`.
pub fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
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
        serde_json::Value::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}

fn check_capacity(cell_count: usize) -> Result<()> {
    if cell_count > MAX_CELLS {
        return Err(EtlError::capacity(format!(
            "dataset of {cell_count} cells exceeds the {MAX_CELLS} cell limit \
             of a graph workbook"
        )));
    }
    Ok(())
}

/// Connector for Excel workbooks reached through the Graph API.
pub struct GraphConnector {
    descriptor: EndpointDescriptor,
    credential: CredentialReference,
}

impl GraphConnector {
    /// Wraps a parsed graph endpoint and its located credential file.
    pub fn new(descriptor: EndpointDescriptor, credential: CredentialReference) -> Self {
        Self {
            descriptor,
            credential,
        }
    }

    // The workbook functions hang off the drive item's /workbook sub-path.
    fn workbook_url(&self) -> String {
        format!("{}/workbook", self.descriptor.location.trim_end_matches('/'))
    }

    async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let raw = std::fs::read_to_string(&self.credential.path).map_err(|e| {
            EtlError::io(
                format!("failed to read <{}>", self.credential.path.display()),
                e,
            )
        })?;
        let credentials: GraphCredentials = serde_yaml::from_str(&raw).map_err(|e| {
            EtlError::serialization(
                format!(
                    "invalid graph credential file <{}>",
                    self.credential.path.display()
                ),
                e,
            )
        })?;

        let token_url = format!(
            "{}/oauth2/v2.0/token",
            credentials.authority.trim_end_matches('/')
        );
        let scope = credentials.scope.joined();
        let response: TokenResponse = client
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| EtlError::connector("graph token request failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("graph token request rejected", e))?
            .json()
            .await
            .map_err(|e| EtlError::connector("malformed graph token response", e))?;
        Ok(response.access_token)
    }
}

#[async_trait]
impl Connector for GraphConnector {
    async fn extract(&self, _query: Option<&QueryTemplate>) -> Result<Dataset> {
        let sheet = self.descriptor.auxiliary.as_deref().ok_or_else(|| {
            EtlError::validation("graph workbook sources require a sheet_name parameter")
        })?;
        info!("extracting data from graph worksheet <{}>", sheet);

        let client = reqwest::Client::new();
        let token = self.access_token(&client).await?;
        let base = self.workbook_url();

        let range: UsedRange = client
            .get(format!("{base}/worksheets/{sheet}/usedRange"))
            .bearer_auth(&token)
            .query(&[("$select", "values")])
            .send()
            .await
            .map_err(|e| EtlError::connector("worksheet read failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("worksheet read rejected", e))?
            .json()
            .await
            .map_err(|e| EtlError::connector("malformed worksheet values", e))?;

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

        let mut dataset = Dataset::new(columns)?;
        for row in rows {
            dataset.push_row(row.iter().map(value_to_cell).collect())?;
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
        let base = self.workbook_url();

        // Worksheet creation fails when the sheet already exists; that is
        // the common case on repeated runs.
        let created = client
            .post(format!("{base}/worksheets/add"))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "name": sheet }))
            .send()
            .await
            .map_err(|e| EtlError::connector("worksheet creation failed", e))?;
        if !created.status().is_success() {
            debug!("worksheet <{}> already exists, reusing it", sheet);
        }

        client
            .post(format!(
                "{base}/worksheets/{sheet}/range(address='A:XFD')/clear"
            ))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "applyTo": "All" }))
            .send()
            .await
            .map_err(|e| EtlError::connector("worksheet clear failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("worksheet clear rejected", e))?;

        let header_range = format!("A1:{}1", column_letter(dataset.column_count()));
        let table: TableInfo = client
            .post(format!("{base}/worksheets/{sheet}/tables/add"))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "address": format!("{sheet}!{header_range}"),
                "hasHeaders": true,
            }))
            .send()
            .await
            .map_err(|e| EtlError::connector("table creation failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("table creation rejected", e))?
            .json()
            .await
            .map_err(|e| EtlError::connector("malformed table response", e))?;

        client
            .patch(format!(
                "{base}/worksheets/{sheet}/range(address='{header_range}')"
            ))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "values": [dataset.columns()] }))
            .send()
            .await
            .map_err(|e| EtlError::connector("header write failed", e))?
            .error_for_status()
            .map_err(|e| EtlError::connector("header write rejected", e))?;

        for chunk in dataset.rows().chunks(ROW_CHUNK) {
            let values: Vec<Vec<String>> = chunk
                .iter()
                .map(|row| row.iter().map(Cell::to_display).collect())
                .collect();
            client
                .post(format!("{base}/tables/{}/rows", table.id))
                .bearer_auth(&token)
                .json(&serde_json::json!({ "values": values }))
                .send()
                .await
                .map_err(|e| EtlError::connector("row append failed", e))?
                .error_for_status()
                .map_err(|e| EtlError::connector("row append rejected", e))?;
        }

        info!("data saved to graph worksheet <{}>", sheet);
        Ok(())
    }

    fn kind(&self) -> EndpointKind {
        self.descriptor.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter_boundaries() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(28), "AB");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(702), "ZZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_capacity_gate() {
        assert!(check_capacity(MAX_CELLS).is_ok());
        let err = check_capacity(MAX_CELLS + 1).expect_err("over capacity");
        assert!(matches!(err, EtlError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_requests_target_the_workbook_sub_path() {
        let descriptor = EndpointDescriptor {
            kind: EndpointKind::GraphWorkbook,
            role: crate::endpoint::Role::Target,
            location: "https://graph.microsoft.com/v1.0/drives/d/items/i/".to_string(),
            auxiliary: None,
            params: std::collections::BTreeMap::new(),
        };
        let credential = CredentialReference {
            kind: crate::credentials::CredentialKind::Graph,
            path: std::path::PathBuf::from("/g.yml"),
        };
        let connector = GraphConnector::new(descriptor, credential);
        assert_eq!(
            connector.workbook_url(),
            "https://graph.microsoft.com/v1.0/drives/d/items/i/workbook"
        );
    }

    #[test]
    fn test_credential_file_accepts_alias_field_names() {
        let yaml = "
client_id: app-id
client_credential: app-secret
authority: https://login.microsoftonline.com/tenant
scopes:
  - https://graph.microsoft.com/.default
";
        let parsed: GraphCredentials = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(parsed.client_secret, "app-secret");
        assert_eq!(parsed.scope.joined(), "https://graph.microsoft.com/.default");
    }

    #[test]
    fn test_credential_scope_defaults_when_absent() {
        let yaml = "
client_id: app-id
client_secret: app-secret
authority: https://login.microsoftonline.com/tenant
";
        let parsed: GraphCredentials = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(parsed.scope.joined(), "https://graph.microsoft.com/.default");
    }

    #[test]
    fn test_value_to_cell_empty_string_is_null() {
        assert_eq!(value_to_cell(&serde_json::json!("")), Cell::Null);
        assert_eq!(
            value_to_cell(&serde_json::json!("x")),
            Cell::Text("x".to_string())
        );
        assert_eq!(value_to_cell(&serde_json::json!(7)), Cell::Int(7));
    }
}
