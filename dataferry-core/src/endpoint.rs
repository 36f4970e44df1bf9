//! Endpoint classification and the `??` parameter mini-grammar.
//!
//! A raw source/target string is interpreted exactly once into an
//! [`EndpointDescriptor`]; connectors match on the resulting
//! [`EndpointKind`] and never re-parse the string.
//!
//! Grammar, two levels:
//!
//! ```text
//! endpoint   := base [ "??" params ]
//! params     := pair ( "&" pair )*
//! pair       := key "=" value
//! ```
//!
//! A pair without `=` is a hard parse error. The base is then classified
//! in priority order: known tabular file extension (local path), special
//! source marker (`google+sheets`, `microsoft+graph`, web URL scheme),
//! otherwise a generic SQL connection string. Strings containing `://`
//! are taken literally and never consult the configuration map; anything
//! else without a file extension is looked up as a database alias.

use crate::config::ConfigurationMap;
use crate::error::{EtlError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Marker substring selecting the Google Sheets connector.
pub const GOOGLE_SHEETS_MARKER: &str = "google+sheets";

/// Marker substring selecting the Microsoft Graph workbook connector.
pub const MS_GRAPH_MARKER: &str = "microsoft+graph";

/// Whether the endpoint is read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Data is extracted from this endpoint
    Source,
    /// Data is loaded into this endpoint
    Target,
}

/// Tabular file format, selected purely by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `;`-separated values with a header row
    Csv,
    /// `.xlsx` / `.xls` workbook
    Excel,
    /// Apache Parquet
    Parquet,
    /// Row-oriented XML
    Xml,
    /// JSON records
    Json,
    /// HTML table (write-only)
    Html,
}

impl FileFormat {
    /// Detects a format from a path's extension; `None` for unknown ones.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_lowercase();
        if lower.ends_with(".csv") {
            Some(Self::Csv)
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Some(Self::Excel)
        } else if lower.ends_with(".parquet") {
            Some(Self::Parquet)
        } else if lower.ends_with(".xml") {
            Some(Self::Xml)
        } else if lower.ends_with(".json") {
            Some(Self::Json)
        } else if lower.ends_with(".html") {
            Some(Self::Html)
        } else {
            None
        }
    }
}

/// Closed set of endpoint kinds produced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Local tabular file
    File(FileFormat),
    /// Generic SQL database reached through a connection string
    Database,
    /// Google Sheets workbook
    Spreadsheet,
    /// Microsoft Graph drive-item workbook
    GraphWorkbook,
    /// CSV fetched over HTTP(S)
    RemoteCsv,
}

/// A fully resolved source or target endpoint, immutable after parse.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    /// Classified endpoint kind
    pub kind: EndpointKind,
    /// Role this descriptor was parsed for
    pub role: Role,
    /// Path, connection string, workbook title, or drive-item URL
    pub location: String,
    /// Sheet name, or the `--load` table specifier for database targets
    pub auxiliary: Option<String>,
    /// `??`-suffix parameters, merged from the raw string and any alias
    pub params: BTreeMap<String, String>,
}

/// Splits `base??k=v&k=v` into the base endpoint and its parameter map.
///
/// # Errors
/// A parameter pair without `=` is a hard parse error.
pub fn split_extension_params(raw: &str) -> Result<(&str, BTreeMap<String, String>)> {
    match raw.split_once("??") {
        None => Ok((raw, BTreeMap::new())),
        Some((base, block)) => {
            let mut params = BTreeMap::new();
            for pair in block.split('&') {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    EtlError::endpoint(format!("malformed endpoint parameter <{}>", pair))
                })?;
                params.insert(key.to_string(), value.to_string());
            }
            Ok((base, params))
        }
    }
}

/// Splits a workbook specifier into workbook and optional sheet name.
///
/// Accepted forms: `workbook!sheet`, `workbook!` (target only, sheet
/// derived later), and `workbook.xlsx:sheet`.
pub fn split_workbook_spec(spec: &str) -> (String, Option<String>) {
    if let Some((workbook, sheet)) = spec.split_once('!') {
        let sheet = if sheet.is_empty() {
            None
        } else {
            Some(sheet.to_string())
        };
        return (workbook.to_string(), sheet);
    }
    if let Some(idx) = spec.rfind(':') {
        let (left, right) = spec.split_at(idx);
        let lower = left.to_lowercase();
        if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            let sheet = right[1..].to_string();
            let sheet = if sheet.is_empty() { None } else { Some(sheet) };
            return (left.to_string(), sheet);
        }
    }
    (spec.to_string(), None)
}

/// Parses one source or target string into an [`EndpointDescriptor`].
///
/// `companion` is the role's sibling option: `--extract` for sources and
/// `--load` for targets. Cloud workbook endpoints take their
/// workbook/sheet specifier from it; database targets take their
/// `schema.table` specifier from it.
///
/// # Errors
/// - `EndpointResolution` for unknown aliases, missing local files,
///   malformed parameters, and unrecognized endpoint shapes
/// - `MissingSheetName` (as an `EndpointResolution` error) when a
///   spreadsheet source does not name an exact sheet
pub fn parse_endpoint(
    raw: &str,
    role: Role,
    companion: Option<&str>,
    config: &ConfigurationMap,
) -> Result<EndpointDescriptor> {
    let (base, mut params) = split_extension_params(raw)?;

    // Local tabular files are recognized by extension alone; connection
    // strings can also end in a known extension (sqlite://x.db is not a
    // local CSV), so anything with a scheme skips this branch.
    if !base.contains("://") {
        if let Some(format) = FileFormat::from_path(base) {
            if role == Role::Source && !Path::new(base).is_file() {
                return Err(EtlError::endpoint(format!("file name not found <{}>", base)));
            }
            // For targets the explicit --load name wins over a sheet_name
            // parameter; sources pick their sheet from the parameter only.
            let sheet_param = params.remove("sheet_name");
            let auxiliary = match role {
                Role::Target => companion.map(str::to_string).or(sheet_param),
                Role::Source => sheet_param,
            };
            return Ok(EndpointDescriptor {
                kind: EndpointKind::File(format),
                role,
                location: base.to_string(),
                auxiliary,
                params,
            });
        }
    }

    // Literal connection strings never consult the configuration map.
    let resolved = if base.contains("://")
        || base.contains(GOOGLE_SHEETS_MARKER)
        || base.contains(MS_GRAPH_MARKER)
    {
        debug!("endpoint defined like a connection string <{}>", base);
        base.to_string()
    } else {
        config.resolve_database(base)?
    };

    // An alias may carry its own parameter block; explicit parameters on
    // the raw string win over alias-supplied ones.
    let (resolved, alias_params) = split_extension_params(&resolved)?;
    for (key, value) in alias_params {
        params.entry(key).or_insert(value);
    }
    let resolved = resolved.to_string();

    if resolved.contains(GOOGLE_SHEETS_MARKER) {
        let spec = companion.ok_or_else(|| {
            EtlError::endpoint("spreadsheet endpoint requires a workbook!sheet specifier")
        })?;
        let (workbook, sheet) = split_workbook_spec(spec);
        if role == Role::Source && sheet.is_none() {
            return Err(EtlError::endpoint(format!(
                "missing sheet name: source workbook <{}> must name an exact sheet",
                workbook
            )));
        }
        return Ok(EndpointDescriptor {
            kind: EndpointKind::Spreadsheet,
            role,
            location: workbook,
            auxiliary: sheet,
            params,
        });
    }

    if resolved.contains(MS_GRAPH_MARKER) {
        let spec = companion.ok_or_else(|| {
            EtlError::endpoint("graph workbook endpoint requires a drive-item URL specifier")
        })?;
        let (item_url, mut spec_params) = split_extension_params(spec)?;
        let sheet = spec_params.remove("sheet_name");
        for (key, value) in spec_params {
            params.entry(key).or_insert(value);
        }
        return Ok(EndpointDescriptor {
            kind: EndpointKind::GraphWorkbook,
            role,
            location: item_url.to_string(),
            auxiliary: sheet,
            params,
        });
    }

    let is_web = resolved.starts_with("http://")
        || resolved.starts_with("https://")
        || resolved.starts_with("ftp://");
    if is_web && resolved.to_lowercase().ends_with(".csv") {
        return Ok(EndpointDescriptor {
            kind: EndpointKind::RemoteCsv,
            role,
            location: resolved,
            auxiliary: None,
            params,
        });
    }

    if resolved.contains("://") {
        let auxiliary = match role {
            Role::Target => companion.map(str::to_string),
            Role::Source => None,
        };
        return Ok(EndpointDescriptor {
            kind: EndpointKind::Database,
            role,
            location: resolved,
            auxiliary,
            params,
        });
    }

    Err(EtlError::endpoint(format!(
        "endpoint not recognized <{}>",
        raw
    )))
}
