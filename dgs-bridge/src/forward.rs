use async_trait::async_trait;
use dgs_core::Reading;
use reqwest::StatusCode;
use tracing::error;

use crate::config::BackendConfig;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Backend returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Cannot connect to backend at {url}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to backend timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("Failed to send data to backend: {0}")]
    Request(#[source] reqwest::Error),
}

/// Delivers readings to the collection backend.
///
/// One call is one delivery attempt. Implementations never retry.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, reading: &Reading) -> Result<(), ForwardError>;
}

/// Posts readings as JSON to the collection endpoint.
pub struct HttpForwarder {
    http: reqwest::Client,
    url: String,
}

impl HttpForwarder {
    pub fn new(config: &BackendConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    async fn post(&self, reading: &Reading) -> Result<(), ForwardError> {
        let response = self
            .http
            .post(&self.url)
            .json(reading)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ForwardError::Status { status, body })
    }

    fn classify(&self, e: reqwest::Error) -> ForwardError {
        if e.is_connect() {
            ForwardError::Connect {
                url: self.url.clone(),
                source: e,
            }
        } else if e.is_timeout() {
            ForwardError::Timeout(e)
        } else {
            ForwardError::Request(e)
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, reading: &Reading) -> Result<(), ForwardError> {
        let result = self.post(reading).await;

        if let Err(e) = &result {
            match e {
                ForwardError::Status { status, body } => {
                    error!(%status, %body, "Backend rejected reading");
                }
                ForwardError::Connect { url, source } => {
                    error!(
                        %url,
                        error = %source,
                        "Cannot connect to backend. Is the server running?"
                    );
                }
                ForwardError::Timeout(_) => {
                    error!(url = %self.url, "Request to backend timed out");
                }
                ForwardError::Request(source) => {
                    error!(error = %source, "Failed to send data to backend");
                }
            }
        }

        result
    }
}
