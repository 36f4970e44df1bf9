//! Remote CSV connector: downloads a `http(s)://...csv` resource and
//! parses it with the same reader as local CSV files.
//!
//! Read-only. FTP locations are recognized by the endpoint parser but
//! not supported by this build.

use crate::connectors::file::csv;
use crate::connectors::Connector;
use crate::dataset::Dataset;
use crate::endpoint::{EndpointDescriptor, EndpointKind};
use crate::error::{EtlError, Result};
use crate::query::QueryTemplate;
use async_trait::async_trait;
use std::io::Cursor;
use tracing::info;

/// Connector for CSV resources addressed by URL.
pub struct RemoteCsvConnector {
    descriptor: EndpointDescriptor,
}

impl RemoteCsvConnector {
    /// Wraps a parsed remote CSV endpoint.
    pub fn new(descriptor: EndpointDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Connector for RemoteCsvConnector {
    async fn extract(&self, _query: Option<&QueryTemplate>) -> Result<Dataset> {
        let url = &self.descriptor.location;
        if url.starts_with("ftp://") {
            return Err(EtlError::validation(
                "ftp sources are not supported, use an http(s) location",
            ));
        }
        info!("downloading csv from <{}>", url);

        let response = reqwest::get(url)
            .await
            .map_err(|e| EtlError::connector(format!("failed to fetch <{url}>"), e))?
            .error_for_status()
            .map_err(|e| EtlError::connector(format!("request to <{url}> failed"), e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| EtlError::connector(format!("failed to read body of <{url}>"), e))?;

        csv::read_from_reader(Cursor::new(body), &self.descriptor.params)
    }

    async fn load(&self, _dataset: Dataset, _default_name: &str) -> Result<()> {
        Err(EtlError::validation(
            "remote csv endpoints are read-only and cannot be used as a target",
        ))
    }

    fn kind(&self) -> EndpointKind {
        self.descriptor.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Role;
    use std::collections::BTreeMap;

    fn descriptor(location: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            kind: EndpointKind::RemoteCsv,
            role: Role::Source,
            location: location.to_string(),
            auxiliary: None,
            params: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_ftp_rejected() {
        let connector = RemoteCsvConnector::new(descriptor("ftp://host/data.csv"));
        let err = connector.extract(None).await.expect_err("ftp must fail");
        assert!(err.to_string().contains("ftp"));
    }

    #[tokio::test]
    async fn test_load_rejected() {
        let connector = RemoteCsvConnector::new(descriptor("https://host/data.csv"));
        assert!(connector.load(Dataset::empty(), "data").await.is_err());
    }
}
