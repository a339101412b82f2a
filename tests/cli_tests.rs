//! Command line behavior of the nitfinder binary.
//!
//! Every test runs the binary from an empty temp dir, so without `--config`
//! the built-in configuration is used.

mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use calamine::{open_workbook_auto, Data, Reader};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use common::fixtures::{complete_page, dane_reference_path, registry_template};
use common::wiremock_helpers::{mock_registry, mount_registry_status};

fn nitfinder() -> assert_cmd::Command {
    cargo_bin_cmd!("nitfinder")
}

fn write_input(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_init_creates_config_file() {
    let tmp = TempDir::new().expect("create temp dir");
    let config_path = tmp.path().join("config").join("nitfinder.toml");

    nitfinder()
        .current_dir(tmp.path())
        .arg("--init")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Created default configuration file"));

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[registry]"), "config should have [registry] section");
    assert!(content.contains("[[extraction.fields]]"), "config should have extraction rules");
}

#[test]
fn test_help_lists_options() {
    nitfinder()
        .arg("--help")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("--geo-codes").and(predicate::str::contains("--invalid-policy")));
}

#[test]
fn test_input_is_required() {
    let tmp = TempDir::new().expect("create temp dir");

    nitfinder()
        .current_dir(tmp.path())
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input"));
}

#[test]
fn test_missing_identifier_column_is_fatal() {
    let tmp = TempDir::new().expect("create temp dir");
    let input = write_input(tmp.path(), "nits.csv", "nit\n900123456\n");

    nitfinder()
        .current_dir(tmp.path())
        .arg("--input")
        .arg(&input)
        .arg("--url-template")
        .arg("http://127.0.0.1:9/detalle?documento={nit}")
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("documento"));

    assert!(!tmp.path().join("resultado_consultas.xlsx").exists());
}

#[test]
fn test_missing_config_file_is_reported() {
    let tmp = TempDir::new().expect("create temp dir");
    let input = write_input(tmp.path(), "nits.csv", "documento\n900123456\n");

    nitfinder()
        .current_dir(tmp.path())
        .arg("--input")
        .arg(&input)
        .arg("--config")
        .arg("missing.toml")
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_csv_run_writes_results_and_summary() {
    let server = mock_registry(&[("900123456", complete_page().as_str())]).await;
    mount_registry_status(&server, "800197268", 500).await;

    let tmp = TempDir::new().expect("create temp dir");
    let input = write_input(tmp.path(), "nits.csv", "razon_social,documento\nAcme,900.123.456\nOtra,800197268\nSin nit,\n");
    let output = tmp.path().join("resultado.csv");
    let summary = tmp.path().join("summary.json");

    let assert = nitfinder()
        .current_dir(tmp.path())
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--summary")
        .arg(&summary)
        .arg("--url-template")
        .arg(registry_template(&server.uri()))
        .arg("--delay-ms")
        .arg("0")
        .timeout(Duration::from_secs(30))
        .assert()
        .success();

    // Each failed row is reported once
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert_eq!(stderr.matches("800197268").count(), 1, "stderr: {}", stderr);
    assert!(stderr.contains("[2/3] 800197268: not found in registry"), "stderr: {}", stderr);

    let content = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "documento,dirección,ciudad,departamento");
    assert_eq!(lines[1], "900123456,CL 10 # 43 - 12 OF 301,MEDELLÍN,ANTIOQUIA");
    assert_eq!(lines[2], "800197268,No encontrado,No encontrado,No encontrado");
    assert_eq!(lines[3], ",Sin información,Sin información,Sin información");

    let summary: serde_json::Value = serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(summary["total_rows"], 3);
    assert_eq!(summary["found"], 1);
    assert_eq!(summary["not_found"], 1);
    assert_eq!(summary["invalid"], 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_xlsx_output_with_geo_codes() {
    let server = mock_registry(&[("900123456", complete_page().as_str())]).await;

    let tmp = TempDir::new().expect("create temp dir");
    let input = write_input(tmp.path(), "nits.json", r#"{"documentos": [900123456]}"#);
    let output = tmp.path().join("resultado_consultas.xlsx");

    nitfinder()
        .current_dir(tmp.path())
        .arg("--input")
        .arg(&input)
        .arg("--geo-codes")
        .arg(dane_reference_path())
        .arg("--url-template")
        .arg(registry_template(&server.uri()))
        .arg("--delay-ms")
        .arg("0")
        .timeout(Duration::from_secs(30))
        .assert()
        .success();

    let mut workbook = open_workbook_auto(&output).unwrap();
    let range = workbook.worksheet_range_at(0).unwrap().unwrap();
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(|c| match c {
            Data::String(s) => s.clone(),
            other => other.to_string(),
        }).collect())
        .collect();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][4], "código departamento");
    assert_eq!(rows[1], vec!["900123456", "CL 10 # 43 - 12 OF 301", "MEDELLÍN", "ANTIOQUIA", "05", "05001"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abort_policy_reports_invalid_rows() {
    let server = mock_registry(&[("900123456", complete_page().as_str())]).await;

    let tmp = TempDir::new().expect("create temp dir");
    let input = write_input(tmp.path(), "nits.csv", "documento\n900123456\nabc\n");

    nitfinder()
        .current_dir(tmp.path())
        .arg("--input")
        .arg(&input)
        .arg("--invalid-policy")
        .arg("abort")
        .arg("--url-template")
        .arg(registry_template(&server.uri()))
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("row 2: 'abc'"));

    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!tmp.path().join("resultado_consultas.xlsx").exists());
}
