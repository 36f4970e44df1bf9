//! Excel workbook reading (calamine) and writing (rust_xlsxwriter).
//!
//! Loading appends a sheet to an existing workbook file, replacing a
//! same-named sheet when present. Because the XLSX writer cannot modify
//! a file in place, appending re-reads the existing sheets and rewrites
//! the whole workbook.

use crate::dataset::{Cell, Dataset};
use crate::error::{EtlError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use std::path::Path;

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Float(*f),
        Data::Int(i) => Cell::Int(*i),
        Data::Bool(b) => Cell::Bool(*b),
        other => Cell::Text(other.to_string()),
    }
}

/// Reads one sheet (by name, or the first sheet) into a dataset.
///
/// The first row is taken as the header.
pub fn read(path: &Path, sheet: Option<&str>) -> Result<Dataset> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| EtlError::connector(format!("failed to open <{}>", path.display()), e))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| {
                EtlError::validation(format!("workbook <{}> has no sheets", path.display()))
            })?,
    };

    let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
        EtlError::connector(
            format!("failed to read sheet <{}> from <{}>", sheet_name, path.display()),
            e,
        )
    })?;

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(std::string::ToString::to_string).collect(),
        None => return Ok(Dataset::empty()),
    };

    let mut dataset = Dataset::new(columns)?;
    for row in rows {
        dataset.push_row(row.iter().map(data_to_cell).collect())?;
    }
    Ok(dataset)
}

fn write_cell(
    worksheet: &mut rust_xlsxwriter::Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
) -> Result<()> {
    let outcome = match cell {
        Cell::Null => Ok(worksheet),
        Cell::Bool(b) => worksheet.write_boolean(row, col, *b),
        Cell::Int(i) => worksheet.write_number(row, col, *i as f64),
        Cell::Float(f) => worksheet.write_number(row, col, *f),
        Cell::Text(s) => worksheet.write_string(row, col, s),
    };
    outcome
        .map(|_| ())
        .map_err(|e| EtlError::connector("failed to write excel cell", e))
}

fn copy_existing_sheets(
    workbook: &mut Workbook,
    path: &Path,
    skip_sheet: &str,
) -> Result<()> {
    let mut existing = open_workbook_auto(path)
        .map_err(|e| EtlError::connector(format!("failed to open <{}>", path.display()), e))?;

    for name in existing.sheet_names().to_owned() {
        if name == skip_sheet {
            continue;
        }
        let range = existing.worksheet_range(&name).map_err(|e| {
            EtlError::connector(format!("failed to re-read sheet <{}>", name), e)
        })?;
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&name)
            .map_err(|e| EtlError::connector("invalid sheet name", e))?;
        for (r, row) in range.rows().enumerate() {
            for (c, data) in row.iter().enumerate() {
                let cell = data_to_cell(data);
                write_cell(worksheet, r as u32, c as u16, &cell)?;
            }
        }
    }
    Ok(())
}

/// Writes the dataset to `sheet`, appending to an existing workbook file
/// and replacing a same-named sheet when one exists.
pub fn write(path: &Path, dataset: &Dataset, sheet: &str) -> Result<()> {
    let mut workbook = Workbook::new();

    if path.exists() {
        copy_existing_sheets(&mut workbook, path, sheet)?;
    }

    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet)
        .map_err(|e| EtlError::connector("invalid sheet name", e))?;

    for (c, column) in dataset.columns().iter().enumerate() {
        worksheet
            .write_string(0, c as u16, column)
            .map_err(|e| EtlError::connector("failed to write excel header", e))?;
    }
    for (r, row) in dataset.rows().iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            write_cell(worksheet, (r + 1) as u32, c as u16, cell)?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| EtlError::connector(format!("failed to save <{}>", path.display()), e))?;
    Ok(())
}
