//! MySQL and MariaDB driver: extract, execute, and chunked table loading.

use super::{
    chunk_size_hint, infer_sql_types, quote_identifier, skip_large_objects, BindParamFilter,
    Driver, IfExists, LoadOptions, SqlType,
};
use crate::dataset::{Cell, Dataset};
use crate::error::{redact_database_url, EtlError, Result};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row};
use tracing::debug;

// Large objects are streamed by the server and would dwarf the hint.
const PARAM_FILTER: BindParamFilter = skip_large_objects;

async fn connect(url: &str) -> Result<MySqlPool> {
    MySqlPoolOptions::new()
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

fn decode_cell(row: &MySqlRow, index: usize) -> Cell {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(Cell::Null, Cell::Int);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return v.map_or(Cell::Null, |n| {
            i64::try_from(n).map_or_else(|_| Cell::Text(n.to_string()), Cell::Int)
        });
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(Cell::Null, Cell::Float);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return v.map_or(Cell::Null, |n| Cell::Float(f64::from(n)));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map_or(Cell::Null, Cell::Bool);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
        return v.map_or(Cell::Null, |ts| Cell::Text(ts.to_rfc3339()));
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v.map_or(Cell::Null, |ts| Cell::Text(ts.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v.map_or(Cell::Null, |d| Cell::Text(d.to_string()));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(Cell::Null, Cell::Text);
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
        SqlType::BigInt => "BIGINT",
        SqlType::Double => "DOUBLE",
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
    let table_sql = quote_identifier(table, Driver::MySql, options.max_identifier_length)?;
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
        let quoted = quote_identifier(name, Driver::MySql, options.max_identifier_length)?;
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
        let mut builder = sqlx::QueryBuilder::<sqlx::MySql>::new(format!(
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
