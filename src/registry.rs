//! Registry page fetching
//!
//! One GET per identifier against the configured URL template. Every
//! transport problem comes back as a [`FetchFailure`] value so a single bad
//! lookup never takes the batch down with it.

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::{RegistryConfig, NIT_PLACEHOLDER};
use crate::identifier::Nit;
use crate::lookup::{RowStatus, Sentinel};

/// Why a registry page could not be retrieved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("registry answered with HTTP {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl FetchFailure {
    /// Sentinel written to every field of the failed row
    pub fn sentinel(&self) -> Sentinel {
        match self {
            FetchFailure::Status(_) => Sentinel::NotFound,
            _ => Sentinel::Error,
        }
    }

    pub fn row_status(&self) -> RowStatus {
        match self {
            FetchFailure::Status(_) => RowStatus::NotFound,
            _ => RowStatus::Error,
        }
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchFailure::Timeout
        } else if error.is_connect() {
            FetchFailure::Connect(error.to_string())
        } else if error.is_body() || error.is_decode() {
            FetchFailure::Body(error.to_string())
        } else {
            FetchFailure::Request(error.to_string())
        }
    }
}

/// A successfully retrieved registry page
#[derive(Debug, Clone)]
pub struct RegistryPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// HTTP client bound to one registry URL template
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    url_template: String,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            url_template: config.url_template.clone(),
        })
    }

    pub fn url_for(&self, nit: &Nit) -> String {
        self.url_template.replace(NIT_PLACEHOLDER, nit.as_str())
    }

    /// Fetch the registry page for one identifier
    pub async fn fetch(&self, nit: &Nit) -> Result<RegistryPage, FetchFailure> {
        let url = self.url_for(nit);
        debug!("Fetching registry page: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FetchFailure::from_reqwest)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            debug!("Registry returned {} for {}", status, url);
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(FetchFailure::from_reqwest)?;
        Ok(RegistryPage {
            url,
            status: status.as_u16(),
            body,
        })
    }
}
