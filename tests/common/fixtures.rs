use std::path::PathBuf;
use std::time::Duration;

use nitfinder::config::{AppConfig, PacingStrategy, DEFAULT_CONFIG};

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// Registry page with address, city and department
pub fn complete_page() -> String {
    load_fixture("registry/detalle_completo.html")
}

/// Registry page without the department heading
pub fn page_without_department() -> String {
    load_fixture("registry/detalle_sin_departamento.html")
}

/// Registry page with none of the fields
pub fn empty_page() -> String {
    load_fixture("registry/detalle_vacio.html")
}

pub fn dane_reference_path() -> PathBuf {
    fixture_path("dane/codigos_dane.csv")
}

/// Default configuration pointed at a mock registry, with short pacing
pub fn test_config(server_uri: &str, delay: Duration, timeout_secs: u64) -> AppConfig {
    let mut config = AppConfig::from_toml_str(DEFAULT_CONFIG).expect("default config should load");
    config.registry.url_template = registry_template(server_uri);
    config.registry.request_timeout_secs = timeout_secs;
    config.rate_limit.strategy = PacingStrategy::FixedDelay;
    config.rate_limit.delay_ms = delay.as_millis() as u64;
    config
}

pub fn registry_template(server_uri: &str) -> String {
    format!("{}/RM/Consultas/DetallePersona?documento={{nit}}", server_uri)
}

pub fn identifiers(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
