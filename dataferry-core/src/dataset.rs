//! In-memory tabular dataset moved between connectors.
//!
//! A [`Dataset`] is created by exactly one connector's `extract`, consumed
//! by exactly one connector's `load`, then discarded. The only in-place
//! mutation is the stringify/normalize step applied immediately before a
//! cloud-spreadsheet load.

use crate::error::{EtlError, Result};

/// A single cell value.
///
/// Cells may be heterogeneous-typed during extraction; cloud spreadsheet
/// connectors receive only `Text` cells after [`Dataset::stringify`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// SQL NULL / missing value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 text
    Text(String),
}

impl Cell {
    /// Renders the cell for spreadsheet output; NULL becomes the empty string.
    pub fn to_display(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }

    /// Approximate in-memory footprint in bytes.
    fn approx_bytes(&self) -> usize {
        match self {
            Cell::Null => 1,
            Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Float(_) => 8,
            Cell::Text(s) => s.len(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

/// An ordered, named, row-major table held fully in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Creates an empty dataset with the given column names.
    ///
    /// # Errors
    /// Returns a validation error if column names are not unique.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(EtlError::validation(format!(
                    "duplicate column name <{}>",
                    column
                )));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Creates a dataset with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Appends one row.
    ///
    /// # Errors
    /// Returns a validation error if the row arity does not match the
    /// column count.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::validation(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows, in extraction order.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of data rows (header excluded).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Total data cell count (`rows × columns`), used by capacity gates.
    pub fn cell_count(&self) -> usize {
        self.row_count() * self.column_count()
    }

    /// True when the dataset holds no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Approximate memory footprint of the held data.
    pub fn approx_bytes(&self) -> usize {
        let header: usize = self.columns.iter().map(String::len).sum();
        let body: usize = self
            .rows
            .iter()
            .flat_map(|row| row.iter().map(Cell::approx_bytes))
            .sum();
        header + body
    }

    /// Human-readable size summary logged after every extraction.
    ///
    /// Example: `24 B of data received in amount of 3 rows, 2 columns, 6 cells`
    pub fn size_summary(&self) -> String {
        format!(
            "{} of data received in amount of {} rows, {} columns, {} cells",
            human_bytes(self.approx_bytes()),
            self.row_count(),
            self.column_count(),
            self.cell_count()
        )
    }

    /// Normalizes every cell to text, replacing NULL with the empty string.
    ///
    /// Applied exactly once, immediately before a cloud-spreadsheet load;
    /// database and file connectors receive the dataset untouched.
    pub fn stringify(self) -> Self {
        let rows = self
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(|c| Cell::Text(c.to_display())).collect())
            .collect();
        Self {
            columns: self.columns,
            rows,
        }
    }
}

/// Formats a byte count with binary units.
pub fn human_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new(vec!["id".to_string(), "amount".to_string()])
            .expect("unique columns");
        ds.push_row(vec![Cell::Int(1), Cell::Float(9.5)]).expect("arity");
        ds.push_row(vec![Cell::Int(2), Cell::Null]).expect("arity");
        ds.push_row(vec![Cell::Int(3), Cell::Text("12".into())]).expect("arity");
        ds
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = Dataset::new(vec!["a".to_string(), "a".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_row_arity_enforced() {
        let mut ds = Dataset::new(vec!["a".to_string()]).expect("unique columns");
        assert!(ds.push_row(vec![Cell::Int(1), Cell::Int(2)]).is_err());
    }

    #[test]
    fn test_counts() {
        let ds = sample();
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column_count(), 2);
        assert_eq!(ds.cell_count(), 6);
        assert!(!ds.is_empty());
        assert!(Dataset::empty().is_empty());
    }

    #[test]
    fn test_size_summary_mentions_shape() {
        let summary = sample().size_summary();
        assert!(summary.contains("3 rows, 2 columns, 6 cells"), "{summary}");
    }

    #[test]
    fn test_stringify_replaces_null_with_empty() {
        let ds = sample().stringify();
        assert_eq!(ds.rows()[1][1], Cell::Text(String::new()));
        assert_eq!(ds.rows()[0][0], Cell::Text("1".to_string()));
        // Shape is preserved
        assert_eq!(ds.cell_count(), 6);
    }

    #[test]
    fn test_human_bytes_units() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
