//! Flat-file connector: dispatch by extension to one module per format.
//!
//! Each format keeps its own default parameter set; endpoint parameters
//! (`??key=value`) override them. Before any write the destination's
//! parent directories are created.

use crate::connectors::Connector;
use crate::dataset::Dataset;
use crate::endpoint::{EndpointDescriptor, EndpointKind, FileFormat};
use crate::error::{EtlError, Result};
use crate::query::QueryTemplate;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

pub mod csv;
pub mod excel;
pub mod html;
pub mod json;
pub mod parquet;
pub mod xml;

/// Connector for local tabular files.
pub struct FileConnector {
    descriptor: EndpointDescriptor,
}

impl FileConnector {
    /// Wraps a parsed file endpoint.
    pub fn new(descriptor: EndpointDescriptor) -> Self {
        Self { descriptor }
    }

    fn format(&self) -> FileFormat {
        match self.descriptor.kind {
            EndpointKind::File(format) => format,
            // The factory only constructs FileConnector for file kinds.
            _ => FileFormat::Csv,
        }
    }
}

#[async_trait]
impl Connector for FileConnector {
    async fn extract(&self, _query: Option<&QueryTemplate>) -> Result<Dataset> {
        let path = &self.descriptor.location;
        info!("extracting data from <{}>", path);
        let dataset = match self.format() {
            FileFormat::Csv => csv::read(Path::new(path), &self.descriptor.params)?,
            FileFormat::Excel => excel::read(
                Path::new(path),
                self.descriptor.auxiliary.as_deref(),
            )?,
            FileFormat::Parquet => parquet::read(Path::new(path))?,
            FileFormat::Xml => xml::read(Path::new(path))?,
            FileFormat::Json => json::read(Path::new(path))?,
            FileFormat::Html => {
                return Err(EtlError::validation(
                    "html endpoints are write-only and cannot be used as a source",
                ))
            }
        };
        Ok(dataset)
    }

    async fn load(&self, dataset: Dataset, default_name: &str) -> Result<()> {
        let path = Path::new(&self.descriptor.location);
        create_parent_dirs(path)?;

        match self.format() {
            FileFormat::Csv => csv::write(path, &dataset, &self.descriptor.params)?,
            FileFormat::Excel => {
                let sheet = self
                    .descriptor
                    .auxiliary
                    .clone()
                    .unwrap_or_else(|| default_name.to_string());
                excel::write(path, &dataset, &sheet)?;
                info!(
                    "data saved to file <{}> on sheet <{}>",
                    path.display(),
                    sheet
                );
                return Ok(());
            }
            FileFormat::Parquet => parquet::write(path, &dataset)?,
            FileFormat::Xml => xml::write(path, &dataset)?,
            FileFormat::Json => json::write(path, &dataset)?,
            FileFormat::Html => html::write(path, &dataset)?,
        }
        info!("data saved to file <{}>", path.display());
        Ok(())
    }

    fn kind(&self) -> EndpointKind {
        self.descriptor.kind
    }
}

/// Creates intermediate directories for a destination path.
pub fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EtlError::io(format!("failed to create folder <{}>", parent.display()), e)
            })?;
            info!("folder created <{}>", parent.display());
        }
    }
    Ok(())
}
