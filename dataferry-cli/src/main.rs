//! Command-line entry point for dataferry.
//!
//! One invocation moves one tabular dataset from a named source to a
//! named target: relational databases, flat files, CSV resources on the
//! web, Google Sheets workbooks, and Excel workbooks behind the
//! Microsoft Graph API.
//!
//! # Security Guarantees
//! - Connection strings are sanitized in logs and error output
//! - Credential file contents are never printed, only their locations

use clap::Parser;
use dataferry_core::error::EtlError;
use dataferry_core::logging::init_logging;
use dataferry_core::orchestrator::RunOptions;
use dataferry_core::{ConfigurationMap, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dataferry")]
#[command(about = "Move one tabular dataset from a named source to a named target")]
#[command(version)]
#[command(long_about = "
dataferry - one-shot tabular data transfer

Sources and targets are classified from their shape: a known file
extension is a local file, a string with :// is a connection string or
web resource, anything else is an alias resolved through the
configuration file (~/.etl.yml by default).

Endpoint parameters are appended after a double question mark:
  out.csv??sep=,&header=false

EXAMPLES:
  dataferry --source dwh --extract 'SELECT * FROM sales' --target out/sales.csv
  dataferry --source sales.csv --target warehouse --load stats.sales
  dataferry --source sheets --extract 'Report!June' --target june.parquet
  dataferry --source dwh --extract daily.sql --target out.json -- --day 2026-08-28
")]
struct Cli {
    /// Source endpoint: alias, connection string, file path, or URL
    #[arg(short, long)]
    source: String,

    /// SQL text, a .sql file path, or a workbook!sheet specifier
    #[arg(short = 'e', long, conflicts_with = "execute")]
    extract: Option<String>,

    /// SQL text or a .sql file path to run with no result capture
    #[arg(short = 'x', long)]
    execute: Option<String>,

    /// Target endpoint: alias, connection string, or file path
    #[arg(short, long)]
    target: Option<String>,

    /// Table, sheet, or drive-item specifier for the target
    #[arg(short, long)]
    load: Option<String>,

    /// Configuration file location
    #[arg(short = 'c', long)]
    config_path: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,

    /// Log errors only
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Extra `--key value` pairs substituted into query placeholders
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    extra: Vec<String>,
}

/// Parses trailing `--key value` pairs into a substitution map.
fn parse_extra_params(extra: &[String]) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    let mut iter = extra.iter();
    while let Some(key) = iter.next() {
        let name = key.strip_prefix("--").ok_or_else(|| {
            EtlError::validation(format!("unexpected argument <{key}>, expected --name value"))
        })?;
        let value = iter.next().ok_or_else(|| {
            EtlError::validation(format!("missing value for extra parameter <{key}>"))
        })?;
        params.insert(name.to_string(), value.clone());
    }
    Ok(params)
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigurationMap::discover(cli.config_path.as_deref())?;
    let options = RunOptions {
        source: cli.source,
        extract: cli.extract,
        execute: cli.execute,
        target: cli.target,
        load: cli.load,
        extra_params: parse_extra_params(&cli.extra)?,
    };
    dataferry_core::run(&options, &config).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug = cli.debug;

    if let Err(e) = init_logging(cli.debug, cli.quiet) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        // One human-readable line per fatal error; the underlying cause
        // chain is shown only under --debug.
        eprintln!("Error: {e}");
        if debug {
            let mut cause = std::error::Error::source(&e);
            while let Some(err) = cause {
                eprintln!("  caused by: {err}");
                cause = err.source();
            }
        }
        std::process::exit(1);
    }
}
