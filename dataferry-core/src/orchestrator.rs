//! One-shot transfer orchestration.
//!
//! A run moves one dataset per source/target pair: parse both endpoints,
//! extract, log the received size, then load. Multiple comma-separated
//! sources fan out into independent pairs against the same target;
//! connector failures in one pair are logged and skipped while parse and
//! validation failures stay fatal.

use crate::config::ConfigurationMap;
use crate::connectors::create_connector;
use crate::endpoint::{parse_endpoint, EndpointDescriptor, EndpointKind, Role};
use crate::error::{EtlError, Result};
use crate::query::QueryTemplate;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info, warn};

/// All inputs of one invocation, validated before any endpoint work.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Raw source string, possibly comma-separated
    pub source: String,
    /// SQL text, `.sql` path, or workbook specifier for the source
    pub extract: Option<String>,
    /// SQL text or `.sql` path executed with no result capture
    pub execute: Option<String>,
    /// Raw target string
    pub target: Option<String>,
    /// Table or workbook specifier for the target
    pub load: Option<String>,
    /// Unrecognized `--key value` pairs, used as query substitutions
    pub extra_params: BTreeMap<String, String>,
}

impl RunOptions {
    fn validate(&self) -> Result<()> {
        if self.extract.is_some() && self.execute.is_some() {
            return Err(EtlError::validation(
                "options --extract and --execute are mutually exclusive",
            ));
        }
        if self.execute.is_some() && self.target.is_some() {
            return Err(EtlError::validation(
                "--execute runs on the source only and cannot load into a target",
            ));
        }
        if self.execute.is_none() && self.target.is_none() {
            return Err(EtlError::validation(
                "a target is required unless --execute is used",
            ));
        }
        Ok(())
    }
}

/// Runs one invocation end to end.
///
/// # Errors
/// Validation, endpoint resolution, and credential failures are always
/// fatal. Connector failures are fatal for a single source and logged
/// and skipped when several sources were given.
pub async fn run(options: &RunOptions, config: &ConfigurationMap) -> Result<()> {
    options.validate()?;

    let sources: Vec<&str> = options
        .source
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sources.is_empty() {
        return Err(EtlError::validation("no source given"));
    }
    let multi = sources.len() > 1;

    if let Some(statement) = &options.execute {
        let template = QueryTemplate::resolve(statement, &options.extra_params)?;
        for raw in &sources {
            let descriptor = parse_endpoint(raw, Role::Source, None, config)?;
            let connector = create_connector(descriptor, config)?;
            match connector.execute(&template).await {
                Ok(()) => info!("statement executed on <{}>", raw),
                Err(e) if multi && e.is_per_pair() => {
                    error!("skipping source <{}>: {}", raw, e);
                }
                Err(e) => return Err(e),
            }
        }
        return Ok(());
    }

    // Presence checked in validate().
    let target_raw = options.target.as_deref().unwrap_or_default();

    // All sources are parsed before the first transfer: parse failures
    // stay fatal, and the suffix rule needs the full set of kinds.
    let mut parsed = Vec::with_capacity(sources.len());
    for raw in &sources {
        parsed.push((
            *raw,
            parse_endpoint(raw, Role::Source, options.extract.as_deref(), config)?,
        ));
    }
    let suffix_names = needs_source_suffix(parsed.iter().map(|(_, d)| d));

    for (raw, descriptor) in parsed {
        match transfer(raw, descriptor, target_raw, options, config, suffix_names).await {
            Ok(()) => {}
            Err(e) if multi && e.is_per_pair() => {
                error!("skipping source <{}>: {}", raw, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Artifact names are suffixed only when several database sources write
/// into the same target and would otherwise collide.
fn needs_source_suffix<'a, I>(descriptors: I) -> bool
where
    I: IntoIterator<Item = &'a EndpointDescriptor>,
{
    descriptors
        .into_iter()
        .filter(|d| d.kind == EndpointKind::Database)
        .count()
        > 1
}

async fn transfer(
    source_raw: &str,
    source: EndpointDescriptor,
    target_raw: &str,
    options: &RunOptions,
    config: &ConfigurationMap,
    suffix_names: bool,
) -> Result<()> {
    let query = match (&source.kind, &options.extract) {
        (EndpointKind::Database, Some(extract)) => {
            Some(QueryTemplate::resolve(extract, &options.extra_params)?)
        }
        (EndpointKind::Database, None) => {
            return Err(EtlError::validation(
                "database sources require --extract with a query",
            ))
        }
        _ => None,
    };

    let connector = create_connector(source.clone(), config)?;
    let dataset = connector.extract(query.as_ref()).await?;
    info!("{}", dataset.size_summary());

    // An empty result from an explicit extraction is a legitimate "no
    // data today" outcome; a sourced file with no rows still produces
    // its (header-only) target.
    if dataset.is_empty() && options.extract.is_some() {
        warn!("no data extracted from <{}>, nothing to load", source_raw);
        return Ok(());
    }

    let target = parse_endpoint(target_raw, Role::Target, options.load.as_deref(), config)?;
    let mut default_name = derive_default_name(&source, &target, options.extract.as_deref());
    if suffix_names {
        default_name = format!("{default_name}-{}", suffix_for(source_raw));
    }

    let target_connector = create_connector(target, config)?;
    target_connector.load(dataset, &default_name).await
}

/// Derives the artifact name used when the target does not name its own
/// sheet or table.
///
/// Precedence: the target's explicit or embedded sheet/table name, then
/// the stem of a file target, then the stem of a `.sql` query file, then
/// the source's sheet name, then the stem of a source file, then `data`.
pub fn derive_default_name(
    source: &EndpointDescriptor,
    target: &EndpointDescriptor,
    extract: Option<&str>,
) -> String {
    if let Some(name) = &target.auxiliary {
        // A trailing dot names a schema only, not the artifact.
        if !name.ends_with('.') {
            return name.clone();
        }
    }
    if matches!(target.kind, EndpointKind::File(_)) {
        if let Some(stem) = file_stem(&target.location) {
            return stem;
        }
    }
    if let Some(extract) = extract {
        if extract.to_lowercase().ends_with(".sql") {
            if let Some(stem) = file_stem(extract) {
                return stem;
            }
        }
    }
    if let Some(sheet) = &source.auxiliary {
        return sheet.clone();
    }
    if matches!(source.kind, EndpointKind::File(_)) {
        if let Some(stem) = file_stem(&source.location) {
            return stem;
        }
    }
    "data".to_string()
}

fn file_stem(path: &str) -> Option<String> {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

/// Reduces a raw source string to an identifier-safe suffix for
/// multi-source runs.
fn suffix_for(source_raw: &str) -> String {
    let cleaned: String = source_raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    cleaned.trim_matches('_').to_string()
}
