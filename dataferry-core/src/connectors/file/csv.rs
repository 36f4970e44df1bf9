//! CSV reading and writing.
//!
//! Defaults: `;` separator, header row present, UTF-8, no index column.
//! Overridable through endpoint parameters `sep` and `header`.

use crate::dataset::{Cell, Dataset};
use crate::error::{EtlError, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Default field separator, matching the tool's CSV convention.
pub const DEFAULT_SEPARATOR: u8 = b';';

fn separator(params: &BTreeMap<String, String>) -> Result<u8> {
    match params.get("sep") {
        None => Ok(DEFAULT_SEPARATOR),
        Some(sep) if sep.len() == 1 => Ok(sep.as_bytes()[0]),
        Some(sep) => Err(EtlError::validation(format!(
            "csv separator must be a single character, got <{}>",
            sep
        ))),
    }
}

fn has_header(params: &BTreeMap<String, String>) -> bool {
    params
        .get("header")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "0")
        .unwrap_or(true)
}

/// Infers a typed cell from CSV text.
pub fn infer_cell(raw: &str) -> Cell {
    if raw.is_empty() {
        return Cell::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Cell::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Cell::Float(f);
    }
    match raw {
        "true" | "True" => Cell::Bool(true),
        "false" | "False" => Cell::Bool(false),
        _ => Cell::Text(raw.to_string()),
    }
}

/// Reads CSV from any reader; shared by the local-file and HTTP paths.
pub fn read_from_reader<R: Read>(
    reader: R,
    params: &BTreeMap<String, String>,
) -> Result<Dataset> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(separator(params)?)
        .has_headers(has_header(params))
        .flexible(false)
        .from_reader(reader);

    let columns: Vec<String> = if has_header(params) {
        reader
            .headers()
            .map_err(|e| EtlError::connector("failed to read csv header", e))?
            .iter()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let mut dataset: Option<Dataset> = if columns.is_empty() {
        None
    } else {
        Some(Dataset::new(columns)?)
    };

    for record in reader.records() {
        let record = record.map_err(|e| EtlError::connector("failed to read csv record", e))?;
        if dataset.is_none() {
            // Headerless input: synthesize positional column names.
            let columns = (0..record.len()).map(|i| i.to_string()).collect();
            dataset = Some(Dataset::new(columns)?);
        }
        if let Some(ds) = dataset.as_mut() {
            ds.push_row(record.iter().map(infer_cell).collect())?;
        }
    }

    Ok(dataset.unwrap_or_else(Dataset::empty))
}

/// Reads a local CSV file.
pub fn read(path: &Path, params: &BTreeMap<String, String>) -> Result<Dataset> {
    let file = std::fs::File::open(path)
        .map_err(|e| EtlError::io(format!("failed to open <{}>", path.display()), e))?;
    read_from_reader(file, params)
}

/// Writes a CSV file; `header=false` suppresses the header row.
pub fn write(path: &Path, dataset: &Dataset, params: &BTreeMap<String, String>) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| EtlError::io(format!("failed to create <{}>", path.display()), e))?;
    let mut writer = ::csv::WriterBuilder::new()
        .delimiter(separator(params)?)
        .from_writer(file);

    if has_header(params) {
        writer
            .write_record(dataset.columns())
            .map_err(|e| EtlError::connector("failed to write csv header", e))?;
    }
    for row in dataset.rows() {
        let record: Vec<String> = row.iter().map(Cell::to_display).collect();
        writer
            .write_record(&record)
            .map_err(|e| EtlError::connector("failed to write csv row", e))?;
    }
    writer
        .flush()
        .map_err(|e| EtlError::io("failed to flush csv writer".to_string(), e))?;
    Ok(())
}
