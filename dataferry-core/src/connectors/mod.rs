//! Connector traits and the factory keyed on [`EndpointKind`].
//!
//! One connector exists per endpoint kind. Each is constructed from a
//! parsed [`EndpointDescriptor`] and exposes `extract`, `execute`, and
//! `load`; the orchestrator never inspects endpoint strings itself.

use crate::config::ConfigurationMap;
use crate::credentials::{self, CredentialKind};
use crate::dataset::Dataset;
use crate::endpoint::{EndpointDescriptor, EndpointKind};
use crate::error::{EtlError, Result};
use crate::query::QueryTemplate;
use async_trait::async_trait;

pub mod database;
pub mod file;
pub mod graph;
pub mod remote;
pub mod sheets;

/// Unified interface over every endpoint kind.
///
/// Object-safe so the orchestrator can hold `Box<dyn Connector>` without
/// caring which backend it talks to.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Extracts the endpoint's data into one in-memory [`Dataset`].
    ///
    /// `query` is the resolved `--extract` template; only database
    /// connectors consume it, file and workbook connectors read their
    /// whole addressed range.
    async fn extract(&self, query: Option<&QueryTemplate>) -> Result<Dataset>;

    /// Runs a statement with no result capture.
    ///
    /// Only meaningful for database endpoints; every other connector
    /// rejects it.
    async fn execute(&self, statement: &QueryTemplate) -> Result<()> {
        let _ = statement;
        Err(EtlError::validation(format!(
            "--execute is only supported for database endpoints, not {:?}",
            self.kind()
        )))
    }

    /// Loads the dataset into the endpoint.
    ///
    /// `default_name` is the derived artifact name used when the endpoint
    /// does not name its own sheet/table.
    async fn load(&self, dataset: Dataset, default_name: &str) -> Result<()>;

    /// The endpoint kind this connector serves.
    fn kind(&self) -> EndpointKind;
}

/// Builds the connector matching the descriptor's kind.
///
/// Cloud connectors locate their credential file here, so a missing
/// credential fails before any extraction begins.
///
/// # Errors
/// Returns `Credentials` when a cloud connector's key file cannot be
/// located, or propagates descriptor-level validation failures.
pub fn create_connector(
    descriptor: EndpointDescriptor,
    config: &ConfigurationMap,
) -> Result<Box<dyn Connector>> {
    match descriptor.kind {
        EndpointKind::File(_) => Ok(Box::new(file::FileConnector::new(descriptor))),
        EndpointKind::RemoteCsv => Ok(Box::new(remote::RemoteCsvConnector::new(descriptor))),
        EndpointKind::Database => Ok(Box::new(database::DatabaseConnector::new(descriptor)?)),
        EndpointKind::Spreadsheet => {
            let explicit = descriptor.params.get("credentials").map(String::as_str);
            let credential = credentials::locate(CredentialKind::Google, explicit, config)?;
            Ok(Box::new(sheets::SheetsConnector::new(descriptor, credential)))
        }
        EndpointKind::GraphWorkbook => {
            let explicit = descriptor.params.get("credentials").map(String::as_str);
            let credential = credentials::locate(CredentialKind::Graph, explicit, config)?;
            Ok(Box::new(graph::GraphConnector::new(descriptor, credential)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{FileFormat, Role};
    use std::collections::BTreeMap;

    fn file_descriptor() -> EndpointDescriptor {
        EndpointDescriptor {
            kind: EndpointKind::File(FileFormat::Csv),
            role: Role::Target,
            location: "out.csv".to_string(),
            auxiliary: None,
            params: BTreeMap::new(),
        }
    }

    #[test]
    fn test_factory_builds_file_connector() {
        let config = ConfigurationMap::default();
        let connector = create_connector(file_descriptor(), &config).expect("factory");
        assert_eq!(connector.kind(), EndpointKind::File(FileFormat::Csv));
    }

    #[tokio::test]
    async fn test_execute_rejected_for_non_database() {
        let config = ConfigurationMap::default();
        let connector = create_connector(file_descriptor(), &config).expect("factory");
        let statement =
            QueryTemplate::resolve("DELETE FROM t", &BTreeMap::new()).expect("template");
        assert!(connector.execute(&statement).await.is_err());
    }

    #[test]
    fn test_factory_fails_without_cloud_credentials() {
        let config = ConfigurationMap::default();
        let descriptor = EndpointDescriptor {
            kind: EndpointKind::Spreadsheet,
            role: Role::Target,
            location: "Report".to_string(),
            auxiliary: None,
            params: BTreeMap::from([(
                "credentials".to_string(),
                "/absent/key.json".to_string(),
            )]),
        };
        temp_env::with_var(crate::credentials::GOOGLE_KEY_ENV_VAR, None::<&str>, || {
            assert!(create_connector(descriptor.clone(), &config).is_err());
        });
    }
}
