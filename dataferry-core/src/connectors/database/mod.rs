//! Relational database connector built on sqlx.
//!
//! One module per driver keeps driver-specific decode and DDL quirks in
//! one place; this module holds what they share: driver detection, load
//! options, identifier handling, and the column type inference used for
//! generated `CREATE TABLE` statements.
//!
//! Driver support is feature-gated; a URL for a driver compiled out
//! fails with a clear message instead of a link error.

use crate::connectors::Connector;
use crate::dataset::{Cell, Dataset};
use crate::endpoint::{EndpointDescriptor, EndpointKind};
use crate::error::{redact_database_url, EtlError, Result};
use crate::query::QueryTemplate;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgresql")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Default number of rows bound per INSERT statement.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default upper bound on generated identifier length.
pub const DEFAULT_MAX_IDENTIFIER_LENGTH: usize = 128;

/// Text values at or above this length count as large objects.
pub const LARGE_OBJECT_THRESHOLD: usize = 4096;

/// Decides whether one bound value contributes to the input-size hint
/// logged before each insert chunk.
///
/// MySQL counts large-object parameters against its packet size limit
/// in a way that degrades badly, so its filter drops long text values
/// from the hint; the other drivers keep every value.
pub type BindParamFilter = fn(&Cell) -> bool;

/// Filter keeping every bound value in the size hint.
pub fn keep_all_params(_cell: &Cell) -> bool {
    true
}

/// Filter excluding large text values from the size hint.
pub fn skip_large_objects(cell: &Cell) -> bool {
    !matches!(cell, Cell::Text(s) if s.len() >= LARGE_OBJECT_THRESHOLD)
}

/// Estimated byte size of the bind parameters in one insert chunk,
/// after applying the driver's filter.
pub fn chunk_size_hint(chunk: &[Vec<Cell>], filter: BindParamFilter) -> usize {
    chunk
        .iter()
        .flat_map(|row| row.iter())
        .filter(|cell| filter(cell))
        .map(|cell| match cell {
            Cell::Null | Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Float(_) => 8,
            Cell::Text(s) => s.len(),
        })
        .sum()
}

/// Supported database drivers, detected from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Postgres,
    MySql,
    Sqlite,
}

impl Driver {
    /// Detects the driver from a connection URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split("://").next().unwrap_or_default();
        match scheme {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(EtlError::endpoint(format!(
                "unsupported database scheme <{scheme}>"
            ))),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Self::MySql => '`',
            Self::Postgres | Self::Sqlite => '"',
        }
    }
}

/// Behavior when the destination table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfExists {
    /// Keep the table and append rows (table is created when missing).
    #[default]
    Append,
    /// Drop and recreate the table before loading.
    Replace,
}

/// Load-time options parsed from endpoint parameters.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub if_exists: IfExists,
    pub chunk_size: usize,
    pub write_index: bool,
    pub max_identifier_length: usize,
}

impl LoadOptions {
    /// Parses `if_exists`, `chunksize`, `index`, and
    /// `max_identifier_length` endpoint parameters.
    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self> {
        let if_exists = match params.get("if_exists").map(String::as_str) {
            None | Some("append") => IfExists::Append,
            Some("replace") => IfExists::Replace,
            Some(other) => {
                return Err(EtlError::validation(format!(
                    "if_exists must be <append> or <replace>, got <{other}>"
                )))
            }
        };
        let chunk_size = match params.get("chunksize") {
            None => DEFAULT_CHUNK_SIZE,
            Some(raw) => raw.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                EtlError::validation(format!("chunksize must be a positive integer, got <{raw}>"))
            })?,
        };
        let write_index = params
            .get("index")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let max_identifier_length = match params.get("max_identifier_length") {
            None => DEFAULT_MAX_IDENTIFIER_LENGTH,
            Some(raw) => raw.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                EtlError::validation(format!(
                    "max_identifier_length must be a positive integer, got <{raw}>"
                ))
            })?,
        };
        Ok(Self {
            if_exists,
            chunk_size,
            write_index,
            max_identifier_length,
        })
    }
}

/// SQL column affinity assigned to a dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    Double,
    Boolean,
    Text,
}

/// Infers one SQL type per column for generated DDL.
///
/// Uniform integer columns map to BigInt, numeric columns with any float
/// map to Double, uniform boolean columns to Boolean, everything else
/// (including all-null columns) to Text.
pub fn infer_sql_types(dataset: &Dataset) -> Vec<SqlType> {
    (0..dataset.column_count())
        .map(|index| {
            let mut saw_int = false;
            let mut saw_float = false;
            let mut saw_bool = false;
            let mut saw_text = false;
            let mut saw_value = false;
            for row in dataset.rows() {
                match &row[index] {
                    Cell::Null => {}
                    Cell::Int(_) => {
                        saw_int = true;
                        saw_value = true;
                    }
                    Cell::Float(_) => {
                        saw_float = true;
                        saw_value = true;
                    }
                    Cell::Bool(_) => {
                        saw_bool = true;
                        saw_value = true;
                    }
                    Cell::Text(_) => {
                        saw_text = true;
                        saw_value = true;
                    }
                }
            }
            if !saw_value || saw_text || (saw_bool && (saw_int || saw_float)) {
                SqlType::Text
            } else if saw_bool {
                SqlType::Boolean
            } else if saw_float {
                SqlType::Double
            } else if saw_int {
                SqlType::BigInt
            } else {
                SqlType::Text
            }
        })
        .collect()
}

/// Validates and quotes a possibly schema-qualified identifier.
///
/// Each dot-separated segment must be non-empty, contain only word
/// characters, and respect the configured length cap.
pub fn quote_identifier(raw: &str, driver: Driver, max_length: usize) -> Result<String> {
    let quote = driver.quote_char();
    let segments: Vec<&str> = raw.split('.').collect();
    let mut quoted = Vec::with_capacity(segments.len());
    for segment in segments {
        if segment.is_empty() {
            return Err(EtlError::validation(format!(
                "invalid identifier <{raw}>: empty segment"
            )));
        }
        if segment.len() > max_length {
            return Err(EtlError::validation(format!(
                "identifier segment <{segment}> exceeds {max_length} characters"
            )));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            return Err(EtlError::validation(format!(
                "identifier segment <{segment}> contains unsupported characters"
            )));
        }
        quoted.push(format!("{quote}{segment}{quote}"));
    }
    Ok(quoted.join("."))
}

/// Resolves the destination table name.
///
/// A spec ending in `.` names a schema only; the derived default name is
/// appended. No spec at all uses the default name bare.
pub fn resolve_table_name(spec: Option<&str>, default_name: &str) -> String {
    match spec {
        None => default_name.to_string(),
        Some(spec) if spec.ends_with('.') => format!("{spec}{default_name}"),
        Some(spec) => spec.to_string(),
    }
}

/// Prepends an ordinal `index` column when requested.
pub fn with_index_column(dataset: Dataset, options: &LoadOptions) -> Result<Dataset> {
    if !options.write_index {
        return Ok(dataset);
    }
    let mut columns = vec!["index".to_string()];
    columns.extend(dataset.columns().iter().cloned());
    let mut indexed = Dataset::new(columns)?;
    for (i, row) in dataset.rows().iter().enumerate() {
        let mut cells = Vec::with_capacity(row.len() + 1);
        cells.push(Cell::Int(i as i64));
        cells.extend(row.iter().cloned());
        indexed.push_row(cells)?;
    }
    Ok(indexed)
}

/// Connector for relational databases addressed by connection URL.
pub struct DatabaseConnector {
    descriptor: EndpointDescriptor,
    driver: Driver,
}

impl DatabaseConnector {
    /// Detects the driver from the descriptor's connection URL.
    pub fn new(descriptor: EndpointDescriptor) -> Result<Self> {
        let driver = Driver::from_url(&descriptor.location)?;
        Ok(Self { descriptor, driver })
    }

    fn url(&self) -> &str {
        &self.descriptor.location
    }

    fn unsupported(&self) -> EtlError {
        EtlError::validation(format!(
            "support for {:?} databases is not compiled into this build",
            self.driver
        ))
    }
}

#[async_trait]
impl Connector for DatabaseConnector {
    async fn extract(&self, query: Option<&QueryTemplate>) -> Result<Dataset> {
        let query = query.ok_or_else(|| {
            EtlError::validation("database sources require --extract with a query")
        })?;
        info!(
            "extracting data from <{}>",
            redact_database_url(self.url())
        );
        #[allow(unreachable_patterns)]
        match self.driver {
            #[cfg(feature = "postgresql")]
            Driver::Postgres => postgres::extract(self.url(), query.sql()).await,
            #[cfg(feature = "mysql")]
            Driver::MySql => mysql::extract(self.url(), query.sql()).await,
            #[cfg(feature = "sqlite")]
            Driver::Sqlite => sqlite::extract(self.url(), query.sql()).await,
            _ => Err(self.unsupported()),
        }
    }

    async fn execute(&self, statement: &QueryTemplate) -> Result<()> {
        info!(
            "executing statement on <{}>",
            redact_database_url(self.url())
        );
        #[allow(unreachable_patterns)]
        match self.driver {
            #[cfg(feature = "postgresql")]
            Driver::Postgres => postgres::execute(self.url(), statement.sql()).await,
            #[cfg(feature = "mysql")]
            Driver::MySql => mysql::execute(self.url(), statement.sql()).await,
            #[cfg(feature = "sqlite")]
            Driver::Sqlite => sqlite::execute(self.url(), statement.sql()).await,
            _ => Err(self.unsupported()),
        }
    }

    async fn load(&self, dataset: Dataset, default_name: &str) -> Result<()> {
        let options = LoadOptions::from_params(&self.descriptor.params)?;
        let table = resolve_table_name(self.descriptor.auxiliary.as_deref(), default_name);
        let dataset = with_index_column(dataset, &options)?;
        info!(
            "loading {} rows into table <{}> on <{}>",
            dataset.row_count(),
            table,
            redact_database_url(self.url())
        );
        #[allow(unreachable_patterns)]
        match self.driver {
            #[cfg(feature = "postgresql")]
            Driver::Postgres => postgres::load(self.url(), &table, &dataset, &options).await,
            #[cfg(feature = "mysql")]
            Driver::MySql => mysql::load(self.url(), &table, &dataset, &options).await,
            #[cfg(feature = "sqlite")]
            Driver::Sqlite => sqlite::load(self.url(), &table, &dataset, &options).await,
            _ => Err(self.unsupported()),
        }
    }

    fn kind(&self) -> EndpointKind {
        self.descriptor.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_detection() {
        assert_eq!(
            Driver::from_url("postgres://u@h/db").expect("pg"),
            Driver::Postgres
        );
        assert_eq!(
            Driver::from_url("postgresql://u@h/db").expect("pg"),
            Driver::Postgres
        );
        assert_eq!(
            Driver::from_url("mysql://u@h/db").expect("mysql"),
            Driver::MySql
        );
        assert_eq!(
            Driver::from_url("sqlite://db.sqlite").expect("sqlite"),
            Driver::Sqlite
        );
        assert!(Driver::from_url("oracle://u@h/db").is_err());
    }

    #[test]
    fn test_load_options_defaults() {
        let options = LoadOptions::from_params(&BTreeMap::new()).expect("defaults");
        assert_eq!(options.if_exists, IfExists::Append);
        assert_eq!(options.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(!options.write_index);
        assert_eq!(options.max_identifier_length, DEFAULT_MAX_IDENTIFIER_LENGTH);
    }

    #[test]
    fn test_load_options_rejects_bad_values() {
        let params = BTreeMap::from([("if_exists".to_string(), "upsert".to_string())]);
        assert!(LoadOptions::from_params(&params).is_err());

        let params = BTreeMap::from([("chunksize".to_string(), "0".to_string())]);
        assert!(LoadOptions::from_params(&params).is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(
            quote_identifier("sales", Driver::Postgres, 128).expect("plain"),
            "\"sales\""
        );
        assert_eq!(
            quote_identifier("stats.sales", Driver::MySql, 128).expect("qualified"),
            "`stats`.`sales`"
        );
        assert!(quote_identifier("bad name", Driver::Postgres, 128).is_err());
        assert!(quote_identifier("x".repeat(40).as_str(), Driver::Postgres, 30).is_err());
    }

    #[test]
    fn test_resolve_table_name() {
        assert_eq!(resolve_table_name(None, "sales"), "sales");
        assert_eq!(resolve_table_name(Some("monthly"), "sales"), "monthly");
        assert_eq!(resolve_table_name(Some("stats."), "sales"), "stats.sales");
    }

    #[test]
    fn test_infer_sql_types() {
        let mut ds = Dataset::new(vec![
            "i".to_string(),
            "f".to_string(),
            "b".to_string(),
            "t".to_string(),
        ])
        .expect("columns");
        ds.push_row(vec![
            Cell::Int(1),
            Cell::Int(2),
            Cell::Bool(true),
            Cell::Null,
        ])
        .expect("row");
        ds.push_row(vec![
            Cell::Null,
            Cell::Float(0.5),
            Cell::Bool(false),
            Cell::Text("x".into()),
        ])
        .expect("row");

        assert_eq!(
            infer_sql_types(&ds),
            vec![SqlType::BigInt, SqlType::Double, SqlType::Boolean, SqlType::Text]
        );
    }

    #[test]
    fn test_chunk_size_hint_respects_filter() {
        let chunk = vec![vec![
            Cell::Int(1),
            Cell::Text("short".to_string()),
            Cell::Text("x".repeat(LARGE_OBJECT_THRESHOLD)),
        ]];

        let full = chunk_size_hint(&chunk, keep_all_params);
        assert_eq!(full, 8 + 5 + LARGE_OBJECT_THRESHOLD);

        let filtered = chunk_size_hint(&chunk, skip_large_objects);
        assert_eq!(filtered, 8 + 5);
    }

    #[test]
    fn test_with_index_column() {
        let mut ds = Dataset::new(vec!["v".to_string()]).expect("columns");
        ds.push_row(vec![Cell::Text("a".into())]).expect("row");
        let options = LoadOptions {
            if_exists: IfExists::Append,
            chunk_size: DEFAULT_CHUNK_SIZE,
            write_index: true,
            max_identifier_length: DEFAULT_MAX_IDENTIFIER_LENGTH,
        };
        let indexed = with_index_column(ds, &options).expect("indexed");
        assert_eq!(indexed.columns(), &["index".to_string(), "v".to_string()]);
        assert_eq!(indexed.rows()[0][0], Cell::Int(0));
    }
}
