//! Parquet reading and writing through the arrow column format.
//!
//! Writing infers one arrow type per column: all-integer columns become
//! Int64, numeric columns with any float become Float64, all-boolean
//! columns become Boolean, everything else falls back to Utf8. Nulls are
//! allowed in every column.

use crate::dataset::{Cell, Dataset};
use crate::error::{EtlError, Result};
use arrow_array::builder::{BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow_array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::path::Path;
use std::sync::Arc;

fn infer_column_type(dataset: &Dataset, index: usize) -> DataType {
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

    if !saw_value || saw_text {
        return DataType::Utf8;
    }
    if saw_bool {
        if saw_int || saw_float {
            return DataType::Utf8;
        }
        return DataType::Boolean;
    }
    if saw_float {
        return DataType::Float64;
    }
    if saw_int {
        return DataType::Int64;
    }
    DataType::Utf8
}

fn build_column(dataset: &Dataset, index: usize, data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::new();
            for row in dataset.rows() {
                match &row[index] {
                    Cell::Int(i) => builder.append_value(*i),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::new();
            for row in dataset.rows() {
                match &row[index] {
                    Cell::Int(i) => builder.append_value(*i as f64),
                    Cell::Float(f) => builder.append_value(*f),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::new();
            for row in dataset.rows() {
                match &row[index] {
                    Cell::Bool(b) => builder.append_value(*b),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::new();
            for row in dataset.rows() {
                match &row[index] {
                    Cell::Null => builder.append_null(),
                    cell => builder.append_value(cell.to_display()),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

/// Writes the dataset as one parquet record batch.
pub fn write(path: &Path, dataset: &Dataset) -> Result<()> {
    let fields: Vec<Field> = dataset
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| Field::new(name.as_str(), infer_column_type(dataset, i), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let arrays: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| build_column(dataset, i, field.data_type()))
        .collect();

    let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)
        .map_err(|e| EtlError::connector("failed to assemble parquet batch", e))?;

    let file = std::fs::File::create(path)
        .map_err(|e| EtlError::io(format!("failed to create <{}>", path.display()), e))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)
        .map_err(|e| EtlError::connector("failed to open parquet writer", e))?;
    writer
        .write(&batch)
        .map_err(|e| EtlError::connector("failed to write parquet batch", e))?;
    writer
        .close()
        .map_err(|e| EtlError::connector("failed to finalize parquet file", e))?;
    Ok(())
}

fn column_to_cells(array: &ArrayRef) -> Result<Vec<Cell>> {
    let mut cells = Vec::with_capacity(array.len());
    match array.data_type() {
        DataType::Int64 => {
            let typed = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| EtlError::validation("parquet column type mismatch"))?;
            for i in 0..typed.len() {
                cells.push(if typed.is_null(i) {
                    Cell::Null
                } else {
                    Cell::Int(typed.value(i))
                });
            }
        }
        DataType::Float64 => {
            let typed = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| EtlError::validation("parquet column type mismatch"))?;
            for i in 0..typed.len() {
                cells.push(if typed.is_null(i) {
                    Cell::Null
                } else {
                    Cell::Float(typed.value(i))
                });
            }
        }
        DataType::Boolean => {
            let typed = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| EtlError::validation("parquet column type mismatch"))?;
            for i in 0..typed.len() {
                cells.push(if typed.is_null(i) {
                    Cell::Null
                } else {
                    Cell::Bool(typed.value(i))
                });
            }
        }
        DataType::Utf8 => {
            let typed = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| EtlError::validation("parquet column type mismatch"))?;
            for i in 0..typed.len() {
                cells.push(if typed.is_null(i) {
                    Cell::Null
                } else {
                    Cell::Text(typed.value(i).to_string())
                });
            }
        }
        // Timestamps, decimals and other exotic types are read as text.
        _ => {
            let casted = arrow_cast::cast(array, &DataType::Utf8)
                .map_err(|e| EtlError::connector("failed to cast parquet column", e))?;
            return column_to_cells(&casted);
        }
    }
    Ok(cells)
}

/// Reads a parquet file into a dataset.
pub fn read(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path)
        .map_err(|e| EtlError::io(format!("failed to open <{}>", path.display()), e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| EtlError::connector("failed to open parquet reader", e))?
        .build()
        .map_err(|e| EtlError::connector("failed to build parquet reader", e))?;

    let mut dataset: Option<Dataset> = None;
    for batch in reader {
        let batch = batch.map_err(|e| EtlError::connector("failed to read parquet batch", e))?;
        if dataset.is_none() {
            let columns = batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect();
            dataset = Some(Dataset::new(columns)?);
        }
        let converted: Vec<Vec<Cell>> = batch
            .columns()
            .iter()
            .map(column_to_cells)
            .collect::<Result<_>>()?;
        if let Some(ds) = dataset.as_mut() {
            for r in 0..batch.num_rows() {
                ds.push_row(converted.iter().map(|col| col[r].clone()).collect())?;
            }
        }
    }
    Ok(dataset.unwrap_or_else(Dataset::empty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_column_types() {
        let mut ds = Dataset::new(vec![
            "ints".to_string(),
            "mixed".to_string(),
            "flags".to_string(),
            "words".to_string(),
        ])
        .expect("columns");
        ds.push_row(vec![
            Cell::Int(1),
            Cell::Int(1),
            Cell::Bool(true),
            Cell::Text("a".into()),
        ])
        .expect("row");
        ds.push_row(vec![
            Cell::Null,
            Cell::Float(2.5),
            Cell::Null,
            Cell::Int(9),
        ])
        .expect("row");

        assert_eq!(infer_column_type(&ds, 0), DataType::Int64);
        assert_eq!(infer_column_type(&ds, 1), DataType::Float64);
        assert_eq!(infer_column_type(&ds, 2), DataType::Boolean);
        assert_eq!(infer_column_type(&ds, 3), DataType::Utf8);
    }

    #[test]
    fn test_round_trip_preserves_types_and_nulls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.parquet");

        let mut ds = Dataset::new(vec!["id".to_string(), "score".to_string()])
            .expect("columns");
        ds.push_row(vec![Cell::Int(1), Cell::Float(0.5)]).expect("row");
        ds.push_row(vec![Cell::Int(2), Cell::Null]).expect("row");

        write(&path, &ds).expect("write");
        let round = read(&path).expect("read");

        assert_eq!(round.columns(), ds.columns());
        assert_eq!(round.rows()[0][0], Cell::Int(1));
        assert_eq!(round.rows()[0][1], Cell::Float(0.5));
        assert_eq!(round.rows()[1][1], Cell::Null);
    }

    #[test]
    fn test_all_null_column_written_as_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nulls.parquet");

        let mut ds = Dataset::new(vec!["empty".to_string()]).expect("columns");
        ds.push_row(vec![Cell::Null]).expect("row");

        write(&path, &ds).expect("write");
        let round = read(&path).expect("read");
        assert_eq!(round.rows()[0][0], Cell::Null);
    }
}
