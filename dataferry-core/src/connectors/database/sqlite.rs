//! SQLite driver: extract, execute, and chunked table loading.
//!
//! SQLite is dynamically typed, so value decoding tries the likely
//! storage classes in order and falls back to text.

use super::{
    chunk_size_hint, infer_sql_types, keep_all_params, quote_identifier, BindParamFilter, Driver,
    IfExists, LoadOptions, SqlType,
};
use crate::dataset::{Cell, Dataset};
use crate::error::{redact_database_url, EtlError, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool};
use tracing::debug;

const PARAM_FILTER: BindParamFilter = keep_all_params;

async fn connect(url: &str) -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .map_err(|e| {
            EtlError::connector(
                format!("failed to connect to <{}>", redact_database_url(url)),
                e,
            )
        })
}

fn decode_cell(row: &SqliteRow, index: usize) -> Cell {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(Cell::Null, Cell::Int);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(Cell::Null, Cell::Float);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(Cell::Null, Cell::Bool);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(Cell::Null, Cell::Text);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(Cell::Null, |bytes| {
            Cell::Text(String::from_utf8_lossy(&bytes).into_owned())
        });
    }
    Cell::Null
}

/// Runs the query and collects the full result set.
pub async fn extract(url: &str, sql: &str) -> Result<Dataset> {
    let pool = connect(url).await?;
    let rows = sqlx::query(sql)
        .fetch_all(&pool)
        .await
        .map_err(|e| EtlError::connector("query failed", e))?;
    pool.close().await;

    let Some(first) = rows.first() else {
        return Ok(Dataset::empty());
    };
    let columns = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let mut dataset = Dataset::new(columns)?;
    for row in &rows {
        dataset.push_row((0..row.columns().len()).map(|i| decode_cell(row, i)).collect())?;
    }
    Ok(dataset)
}

/// Runs a statement or script with no result capture.
pub async fn execute(url: &str, sql: &str) -> Result<()> {
    let pool = connect(url).await?;
    sqlx::raw_sql(sql)
        .execute(&pool)
        .await
        .map_err(|e| EtlError::connector("statement failed", e))?;
    pool.close().await;
    Ok(())
}

fn type_name(sql_type: SqlType) -> &'static str {
    match sql_type {
        SqlType::BigInt => "INTEGER",
        SqlType::Double => "REAL",
        SqlType::Boolean => "BOOLEAN",
        SqlType::Text => "TEXT",
    }
}

/// Creates the table when needed and inserts rows in chunks.
pub async fn load(
    url: &str,
    table: &str,
    dataset: &Dataset,
    options: &LoadOptions,
) -> Result<()> {
    let pool = connect(url).await?;
    let table_sql = quote_identifier(table, Driver::Sqlite, options.max_identifier_length)?;
    let types = infer_sql_types(dataset);

    if options.if_exists == IfExists::Replace {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table_sql}"))
            .execute(&pool)
            .await
            .map_err(|e| EtlError::connector(format!("failed to drop table <{table}>"), e))?;
    }

    let mut column_defs = Vec::with_capacity(dataset.column_count());
    let mut column_names = Vec::with_capacity(dataset.column_count());
    for (name, sql_type) in dataset.columns().iter().zip(&types) {
        let quoted = quote_identifier(name, Driver::Sqlite, options.max_identifier_length)?;
        column_defs.push(format!("{quoted} {}", type_name(*sql_type)));
        column_names.push(quoted);
    }
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {table_sql} ({})",
        column_defs.join(", ")
    ))
    .execute(&pool)
    .await
    .map_err(|e| EtlError::connector(format!("failed to create table <{table}>"), e))?;

    for chunk in dataset.rows().chunks(options.chunk_size) {
        debug!(
            "binding {} rows ({} bytes of parameters)",
            chunk.len(),
            chunk_size_hint(chunk, PARAM_FILTER)
        );
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "INSERT INTO {table_sql} ({}) ",
            column_names.join(", ")
        ));
        builder.push_values(chunk, |mut b, row| {
            for (cell, sql_type) in row.iter().zip(&types) {
                match (sql_type, cell) {
                    (SqlType::BigInt, Cell::Int(i)) => b.push_bind(*i),
                    (SqlType::BigInt, _) => b.push_bind(None::<i64>),
                    (SqlType::Double, Cell::Int(i)) => b.push_bind(*i as f64),
                    (SqlType::Double, Cell::Float(f)) => b.push_bind(*f),
                    (SqlType::Double, _) => b.push_bind(None::<f64>),
                    (SqlType::Boolean, Cell::Bool(v)) => b.push_bind(*v),
                    (SqlType::Boolean, _) => b.push_bind(None::<bool>),
                    (SqlType::Text, Cell::Null) => b.push_bind(None::<String>),
                    (SqlType::Text, cell) => b.push_bind(cell.to_display()),
                };
            }
        });
        builder
            .build()
            .execute(&pool)
            .await
            .map_err(|e| EtlError::connector(format!("failed to insert into <{table}>"), e))?;
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_IDENTIFIER_LENGTH};

    const MEMORY_URL: &str = "sqlite::memory:";

    fn options() -> LoadOptions {
        LoadOptions {
            if_exists: IfExists::Append,
            chunk_size: DEFAULT_CHUNK_SIZE,
            write_index: false,
            max_identifier_length: DEFAULT_MAX_IDENTIFIER_LENGTH,
        }
    }

    fn sample() -> Dataset {
        let mut ds = Dataset::new(vec![
            "id".to_string(),
            "score".to_string(),
            "name".to_string(),
        ])
        .expect("columns");
        ds.push_row(vec![Cell::Int(1), Cell::Float(0.5), Cell::Text("a".into())])
            .expect("row");
        ds.push_row(vec![Cell::Int(2), Cell::Null, Cell::Null]).expect("row");
        ds
    }

    #[tokio::test]
    async fn test_extract_decodes_types() {
        let ds = extract(
            MEMORY_URL,
            "SELECT 1 AS n, 2.5 AS f, 'x' AS t, NULL AS missing",
        )
        .await
        .expect("extract");

        assert_eq!(ds.columns(), &["n", "f", "t", "missing"]);
        assert_eq!(ds.rows()[0][0], Cell::Int(1));
        assert_eq!(ds.rows()[0][1], Cell::Float(2.5));
        assert_eq!(ds.rows()[0][2], Cell::Text("x".to_string()));
        assert_eq!(ds.rows()[0][3], Cell::Null);
    }

    #[tokio::test]
    async fn test_extract_empty_result() {
        let ds = extract(MEMORY_URL, "SELECT 1 AS n WHERE 1 = 0")
            .await
            .expect("extract");
        assert!(ds.is_empty());
    }

    #[tokio::test]
    async fn test_load_then_extract_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("t.sqlite").display()
        );

        load(&url, "sales", &sample(), &options()).await.expect("load");
        let round = extract(&url, "SELECT * FROM sales ORDER BY id")
            .await
            .expect("extract");

        assert_eq!(round.row_count(), 2);
        assert_eq!(round.rows()[0][2], Cell::Text("a".to_string()));
        assert_eq!(round.rows()[1][1], Cell::Null);
    }

    #[tokio::test]
    async fn test_replace_drops_previous_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("t.sqlite").display()
        );

        load(&url, "sales", &sample(), &options()).await.expect("first load");
        let mut replace = options();
        replace.if_exists = IfExists::Replace;
        load(&url, "sales", &sample(), &replace).await.expect("replace load");

        let round = extract(&url, "SELECT * FROM sales").await.expect("extract");
        assert_eq!(round.row_count(), 2);
    }

    #[tokio::test]
    async fn test_append_keeps_previous_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("t.sqlite").display()
        );

        load(&url, "sales", &sample(), &options()).await.expect("first load");
        load(&url, "sales", &sample(), &options()).await.expect("second load");

        let round = extract(&url, "SELECT * FROM sales").await.expect("extract");
        assert_eq!(round.row_count(), 4);
    }

    #[tokio::test]
    async fn test_execute_runs_script() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("t.sqlite").display()
        );

        execute(&url, "CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (7);")
            .await
            .expect("execute");
        let round = extract(&url, "SELECT a FROM t").await.expect("extract");
        assert_eq!(round.rows()[0][0], Cell::Int(7));
    }
}
