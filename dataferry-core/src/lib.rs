//! Core library for dataferry.
//!
//! This crate provides everything behind the `dataferry` command line:
//! endpoint classification, configuration and credential discovery, the
//! connector set, and the transfer orchestrator.
//!
//! # Security Guarantees
//! - Connection strings are sanitized before reaching logs or errors
//! - Credential file contents are never logged, only their locations
//!
//! # Architecture
//! - A raw source/target string is parsed exactly once into an
//!   [`endpoint::EndpointDescriptor`]
//! - A factory builds one [`connectors::Connector`] per endpoint kind
//! - The orchestrator runs extract, size logging, and load per pair

pub mod config;
pub mod connectors;
pub mod credentials;
pub mod dataset;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod query;

// Re-export commonly used types
pub use config::ConfigurationMap;
pub use connectors::{create_connector, Connector};
pub use dataset::{Cell, Dataset};
pub use endpoint::{parse_endpoint, EndpointDescriptor, EndpointKind, FileFormat, Role};
pub use error::{redact_database_url, EtlError, Result};
pub use orchestrator::{run, RunOptions};
pub use query::QueryTemplate;
