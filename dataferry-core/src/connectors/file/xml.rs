//! XML reading and writing.
//!
//! The document shape is `<data>` holding one `<row>` per record, with
//! one child element per column. Null cells are written as empty
//! elements. The first row read defines the column order; later rows
//! map their elements by name and missing elements become nulls.

use crate::connectors::file::csv::infer_cell;
use crate::dataset::{Cell, Dataset};
use crate::error::{EtlError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::BufWriter;
use std::path::Path;

const ROOT_ELEMENT: &str = "data";
const ROW_ELEMENT: &str = "row";

/// Writes the dataset as a `<data><row>...</row></data>` document.
pub fn write(path: &Path, dataset: &Dataset) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| EtlError::io(format!("failed to create <{}>", path.display()), e))?;
    let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);

    let emit = |w: &mut Writer<BufWriter<std::fs::File>>, event: Event| {
        w.write_event(event)
            .map_err(|e| EtlError::serialization("failed to write xml event", e))
    };

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
    )?;
    emit(&mut writer, Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
    for row in dataset.rows() {
        emit(&mut writer, Event::Start(BytesStart::new(ROW_ELEMENT)))?;
        for (column, cell) in dataset.columns().iter().zip(row) {
            match cell {
                Cell::Null => {
                    emit(&mut writer, Event::Empty(BytesStart::new(column.as_str())))?;
                }
                cell => {
                    emit(&mut writer, Event::Start(BytesStart::new(column.as_str())))?;
                    emit(
                        &mut writer,
                        Event::Text(BytesText::new(&cell.to_display())),
                    )?;
                    emit(&mut writer, Event::End(BytesEnd::new(column.as_str())))?;
                }
            }
        }
        emit(&mut writer, Event::End(BytesEnd::new(ROW_ELEMENT)))?;
    }
    emit(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;
    Ok(())
}

/// Reads a `<data><row>...</row></data>` document into a dataset.
pub fn read(path: &Path) -> Result<Dataset> {
    let mut reader = Reader::from_file(path)
        .map_err(|e| EtlError::connector(format!("failed to open <{}>", path.display()), e))?;
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut columns: Vec<String> = Vec::new();
    let mut parsed_rows: Vec<Vec<(String, Cell)>> = Vec::new();
    let mut current_row: Option<Vec<(String, Cell)>> = None;
    let mut current_column: Option<String> = None;
    let mut current_text = String::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| EtlError::serialization("failed to parse xml", e))?;
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == ROW_ELEMENT {
                    current_row = Some(Vec::new());
                } else if current_row.is_some() && name != ROOT_ELEMENT {
                    current_column = Some(name);
                    current_text.clear();
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if let Some(row) = current_row.as_mut() {
                    if name != ROOT_ELEMENT && name != ROW_ELEMENT {
                        row.push((name, Cell::Null));
                    }
                }
            }
            Event::Text(t) => {
                if current_column.is_some() {
                    let text = t
                        .unescape()
                        .map_err(|e| EtlError::serialization("failed to decode xml text", e))?;
                    current_text.push_str(&text);
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if Some(name.as_str()) == current_column.as_deref() {
                    if let (Some(column), Some(row)) =
                        (current_column.take(), current_row.as_mut())
                    {
                        row.push((column, infer_cell(&current_text)));
                    }
                } else if name == ROW_ELEMENT {
                    if let Some(row) = current_row.take() {
                        if columns.is_empty() {
                            columns = row.iter().map(|(c, _)| c.clone()).collect();
                        }
                        parsed_rows.push(row);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if columns.is_empty() {
        return Ok(Dataset::empty());
    }
    let mut dataset = Dataset::new(columns)?;
    for row in parsed_rows {
        let cells = dataset
            .columns()
            .iter()
            .map(|column| {
                row.iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, cell)| cell.clone())
                    .unwrap_or(Cell::Null)
            })
            .collect();
        dataset.push_row(cells)?;
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.xml");

        let mut ds = Dataset::new(vec!["id".to_string(), "name".to_string()])
            .expect("columns");
        ds.push_row(vec![Cell::Int(1), Cell::Text("a & b".into())]).expect("row");
        ds.push_row(vec![Cell::Int(2), Cell::Null]).expect("row");

        write(&path, &ds).expect("write");
        let round = read(&path).expect("read");

        assert_eq!(round.columns(), ds.columns());
        assert_eq!(round.rows()[0][1], Cell::Text("a & b".to_string()));
        assert_eq!(round.rows()[1][1], Cell::Null);
    }

    #[test]
    fn test_empty_document_reads_empty_dataset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.xml");
        std::fs::write(&path, "<?xml version=\"1.0\"?><data></data>").expect("write");

        let ds = read(&path).expect("read");
        assert!(ds.is_empty());
    }
}
