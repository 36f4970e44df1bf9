//! End-to-end file-to-file transfer tests.
//!
//! This test suite covers:
//! - CSV to JSON, Parquet, XML, HTML, and Excel transfers
//! - Endpoint parameter handling (`??sep=,`)
//! - Target folder creation
//! - Sheet naming from the explicit load name and the target file stem
//! - Empty file sources (header-only target still written)

use dataferry_core::orchestrator::RunOptions;
use dataferry_core::{run, Cell, ConfigurationMap};
use std::io::Write;
use std::path::Path;

fn write_file(path: &Path, body: &[u8]) {
    std::fs::File::create(path)
        .and_then(|mut f| f.write_all(body))
        .expect("write fixture");
}

fn transfer(source: &str, target: &str) -> RunOptions {
    RunOptions {
        source: source.to_string(),
        target: Some(target.to_string()),
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn test_csv_to_json_creates_target_folders() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("sales.csv");
    write_file(&source, b"id;amount;note\n1;10.5;first\n2;;second\n");
    let target = dir.path().join("nested/out/sales.json");

    let config = ConfigurationMap::default();
    run(
        &transfer(
            source.to_str().expect("utf8"),
            target.to_str().expect("utf8"),
        ),
        &config,
    )
    .await
    .expect("run");

    let loaded = dataferry_core::connectors::file::json::read(&target).expect("target");
    assert_eq!(
        loaded.columns(),
        &["id".to_string(), "amount".to_string(), "note".to_string()]
    );
    assert_eq!(loaded.rows()[0][1], Cell::Float(10.5));
    assert_eq!(loaded.rows()[1][1], Cell::Null);
}

#[tokio::test]
async fn test_comma_separated_csv_to_parquet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("in.csv");
    write_file(&source, b"id,score\n1,0.25\n2,0.75\n");
    let target = dir.path().join("out.parquet");

    let config = ConfigurationMap::default();
    let source_endpoint = format!("{}??sep=,", source.to_str().expect("utf8"));
    run(
        &transfer(&source_endpoint, target.to_str().expect("utf8")),
        &config,
    )
    .await
    .expect("run");

    let loaded = dataferry_core::connectors::file::parquet::read(&target).expect("target");
    assert_eq!(loaded.row_count(), 2);
    assert_eq!(loaded.rows()[1][1], Cell::Float(0.75));
}

#[tokio::test]
async fn test_csv_to_excel_names_sheet_after_target_stem() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("monthly.csv");
    write_file(&source, b"a;b\n1;2\n");
    let target = dir.path().join("report.xlsx");

    let config = ConfigurationMap::default();
    run(
        &transfer(
            source.to_str().expect("utf8"),
            target.to_str().expect("utf8"),
        ),
        &config,
    )
    .await
    .expect("run");

    // Without an explicit name the sheet is named after the target file
    // stem, not the source.
    let loaded =
        dataferry_core::connectors::file::excel::read(&target, Some("report")).expect("target");
    assert_eq!(loaded.row_count(), 1);
}

#[tokio::test]
async fn test_csv_to_excel_honors_explicit_load_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("monthly.csv");
    write_file(&source, b"a;b\n1;2\n");
    let target = dir.path().join("report.xlsx");

    let config = ConfigurationMap::default();
    let options = RunOptions {
        source: source.to_str().expect("utf8").to_string(),
        target: Some(target.to_str().expect("utf8").to_string()),
        load: Some("june".to_string()),
        ..RunOptions::default()
    };
    run(&options, &config).await.expect("run");

    let loaded =
        dataferry_core::connectors::file::excel::read(&target, Some("june")).expect("target");
    assert_eq!(loaded.row_count(), 1);
}

#[tokio::test]
async fn test_xml_round_trip_through_transfer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("in.csv");
    write_file(&source, b"name;qty\nwidget;3\n");
    let middle = dir.path().join("data.xml");
    let target = dir.path().join("back.csv");

    let config = ConfigurationMap::default();
    run(
        &transfer(
            source.to_str().expect("utf8"),
            middle.to_str().expect("utf8"),
        ),
        &config,
    )
    .await
    .expect("first hop");
    run(
        &transfer(
            middle.to_str().expect("utf8"),
            target.to_str().expect("utf8"),
        ),
        &config,
    )
    .await
    .expect("second hop");

    let text = std::fs::read_to_string(&target).expect("read back");
    assert!(text.starts_with("name;qty"));
    assert!(text.contains("widget;3"));
}

#[tokio::test]
async fn test_html_target_is_write_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("in.csv");
    write_file(&source, b"a\n1\n");
    let html = dir.path().join("report.html");

    let config = ConfigurationMap::default();
    run(
        &transfer(source.to_str().expect("utf8"), html.to_str().expect("utf8")),
        &config,
    )
    .await
    .expect("write html");
    assert!(std::fs::read_to_string(&html)
        .expect("read back")
        .contains("<table>"));

    // Reading the same file back as a source must fail.
    let target = dir.path().join("out.csv");
    let err = run(
        &transfer(html.to_str().expect("utf8"), target.to_str().expect("utf8")),
        &config,
    )
    .await
    .expect_err("html source");
    assert!(err.to_string().contains("write-only"));
}

#[tokio::test]
async fn test_empty_source_writes_header_only_target() {
    // Without an explicit extraction there is no empty short-circuit:
    // an empty file source still produces its target.
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("empty.csv");
    write_file(&source, b"id;amount\n");
    let target = dir.path().join("out.csv");

    let config = ConfigurationMap::default();
    run(
        &transfer(
            source.to_str().expect("utf8"),
            target.to_str().expect("utf8"),
        ),
        &config,
    )
    .await
    .expect("empty source is a successful run");
    let text = std::fs::read_to_string(&target).expect("read target");
    assert!(text.starts_with("id;amount"));
}
