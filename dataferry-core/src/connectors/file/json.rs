//! JSON reading and writing in record orientation.
//!
//! The document is one array of objects, one object per row. Object key
//! order is preserved on both paths so the column order survives a
//! round trip. Keys absent from a given record become nulls; keys first
//! seen in a later record are appended as new columns.

use crate::dataset::{Cell, Dataset};
use crate::error::{EtlError, Result};
use serde_json::{Map, Number, Value};
use std::io::{BufReader, BufWriter};
use std::path::Path;

fn value_to_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Bool(b) => Cell::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Cell::Int(i)
            } else {
                Cell::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Cell::Text(s.clone()),
        // Nested structures are flattened to their JSON text.
        other => Cell::Text(other.to_string()),
    }
}

fn cell_to_value(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Int(i) => Value::Number(Number::from(*i)),
        Cell::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Cell::Text(s) => Value::String(s.clone()),
    }
}

/// Reads a JSON array of objects into a dataset.
pub fn read(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path)
        .map_err(|e| EtlError::io(format!("failed to open <{}>", path.display()), e))?;
    let document: Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| EtlError::serialization(format!("failed to parse <{}>", path.display()), e))?;

    let records = document.as_array().ok_or_else(|| {
        EtlError::validation(format!(
            "<{}> must contain a top-level array of objects",
            path.display()
        ))
    })?;

    let mut columns: Vec<String> = Vec::new();
    for record in records {
        let object = record.as_object().ok_or_else(|| {
            EtlError::validation(format!(
                "<{}> must contain only objects in its array",
                path.display()
            ))
        })?;
        for key in object.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    if columns.is_empty() {
        return Ok(Dataset::empty());
    }

    let mut dataset = Dataset::new(columns)?;
    for record in records {
        let object = record.as_object().map(Map::clone).unwrap_or_default();
        let cells = dataset
            .columns()
            .iter()
            .map(|column| object.get(column).map(value_to_cell).unwrap_or(Cell::Null))
            .collect();
        dataset.push_row(cells)?;
    }
    Ok(dataset)
}

/// Writes the dataset as a JSON array of objects.
pub fn write(path: &Path, dataset: &Dataset) -> Result<()> {
    let records: Vec<Value> = dataset
        .rows()
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (column, cell) in dataset.columns().iter().zip(row) {
                object.insert(column.clone(), cell_to_value(cell));
            }
            Value::Object(object)
        })
        .collect();

    let file = std::fs::File::create(path)
        .map_err(|e| EtlError::io(format!("failed to create <{}>", path.display()), e))?;
    serde_json::to_writer(BufWriter::new(file), &Value::Array(records))
        .map_err(|e| EtlError::serialization(format!("failed to write <{}>", path.display()), e))?;
    Ok(())
}
