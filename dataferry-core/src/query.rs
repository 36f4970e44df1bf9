//! SQL query templates with named-placeholder substitution.
//!
//! `--extract`/`--execute` accept either inline SQL or a path to a `.sql`
//! file. Placeholders of the form `{name}` are substituted exactly once
//! from the unrecognized command-line arguments, after file loading and
//! before the text reaches the database driver.

use crate::error::{EtlError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// A resolved SQL statement ready for the database connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    sql: String,
}

impl QueryTemplate {
    /// Resolves inline SQL or a `.sql` file path, then substitutes
    /// `{name}` placeholders from `substitutions`.
    ///
    /// # Errors
    /// - `Io` when a named `.sql` file cannot be read
    /// - `Validation` when the file path does not exist or a placeholder
    ///   has no substitution value
    pub fn resolve(raw: &str, substitutions: &BTreeMap<String, String>) -> Result<Self> {
        let text = if raw.to_lowercase().ends_with(".sql") {
            let path = Path::new(raw.trim_end_matches('\r'));
            if !path.is_file() {
                return Err(EtlError::validation(format!(
                    "query file not found <{}>",
                    raw
                )));
            }
            std::fs::read_to_string(path)
                .map_err(|e| EtlError::io(format!("failed to read query <{}>", raw), e))?
        } else {
            raw.to_string()
        };

        let sql = substitute(&text, substitutions)?;
        debug!("sql:\n{}", sql);
        Ok(Self { sql })
    }

    /// The final SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Substitutes `{name}` placeholders; `{{` and `}}` escape literal braces.
fn substitute(text: &str, values: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(EtlError::validation(format!(
                                "unterminated placeholder <{{{}>",
                                name
                            )))
                        }
                    }
                }
                let value = values.get(&name).ok_or_else(|| {
                    EtlError::validation(format!(
                        "no value given for query placeholder <{}>",
                        name
                    ))
                })?;
                out.push_str(value);
            }
            c => out.push(c),
        }
    }

    Ok(out)
}
