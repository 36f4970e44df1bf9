//! HTML table writing. Write-only: the extract path rejects HTML before
//! it reaches this module.

use crate::dataset::{Cell, Dataset};
use crate::error::{EtlError, Result};
use std::io::Write as _;
use std::path::Path;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Writes the dataset as a single `<table>` document.
pub fn write(path: &Path, dataset: &Dataset) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| EtlError::io(format!("failed to create <{}>", path.display()), e))?;
    let mut out = std::io::BufWriter::new(file);

    let mut emit = |line: &str| {
        writeln!(out, "{line}")
            .map_err(|e| EtlError::io(format!("failed to write <{}>", path.display()), e))
    };

    emit("<table>")?;
    emit("  <thead>")?;
    emit("    <tr>")?;
    for column in dataset.columns() {
        emit(&format!("      <th>{}</th>", escape(column)))?;
    }
    emit("    </tr>")?;
    emit("  </thead>")?;
    emit("  <tbody>")?;
    for row in dataset.rows() {
        emit("    <tr>")?;
        for cell in row {
            let text = match cell {
                Cell::Null => String::new(),
                cell => escape(&cell.to_display()),
            };
            emit(&format!("      <td>{text}</td>"))?;
        }
        emit("    </tr>")?;
    }
    emit("  </tbody>")?;
    emit("</table>")?;
    Ok(())
}
