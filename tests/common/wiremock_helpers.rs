use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REGISTRY_PATH: &str = "/RM/Consultas/DetallePersona";

fn html_response(html: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(html.to_string())
        .insert_header("content-type", "text/html; charset=utf-8")
}

/// Mounts a registry detail page for one identifier on an existing server.
pub async fn mount_registry_page(server: &MockServer, nit: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(REGISTRY_PATH))
        .and(query_param("documento", nit))
        .respond_with(html_response(html))
        .mount(server)
        .await;
}

/// Mounts a registry page that answers only after `delay_ms` milliseconds.
pub async fn mount_slow_registry_page(server: &MockServer, nit: &str, html: &str, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path(REGISTRY_PATH))
        .and(query_param("documento", nit))
        .respond_with(html_response(html).set_delay(Duration::from_millis(delay_ms)))
        .mount(server)
        .await;
}

/// Mounts an HTTP error status for one identifier.
pub async fn mount_registry_status(server: &MockServer, nit: &str, status_code: u16) {
    Mock::given(method("GET"))
        .and(path(REGISTRY_PATH))
        .and(query_param("documento", nit))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(server)
        .await;
}

/// Creates a mock registry serving the given detail page for each identifier.
pub async fn mock_registry(pages: &[(&str, &str)]) -> MockServer {
    let server = MockServer::start().await;
    for (nit, html) in pages {
        mount_registry_page(&server, nit, html).await;
    }
    server
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_registry_serves_page_per_identifier() {
        let server = mock_registry(&[("900123456", "<h2>¿Cuál es su dirección?</h2>")]).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("{}{}?documento=900123456", server.uri(), REGISTRY_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("dirección"));

        let missing = client
            .get(format!("{}{}?documento=1", server.uri(), REGISTRY_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }
}
