//! HTTP binding of the update service.
//!
//! Talks JSON to the backend's update endpoints:
//! - `GET  {prefix}/check`
//! - `POST {prefix}/download`
//! - `POST {prefix}/install` with `{"extract_dir": ...}`
//! - `GET  {prefix}/status`
//!
//! Any body carrying a non-empty `error` field is a [`ServiceError::Remote`],
//! whatever the HTTP status. Everything else that is not a 2xx response with
//! a well-formed body is a [`ServiceError::Transport`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::UpdateConfig;
use crate::error::{Result, ServiceError};
use crate::service::UpdateService;
use crate::types::{CheckResponse, DownloadResponse, InstallRequest, UpdateStatus};

/// Update service reached over HTTP.
pub struct HttpUpdateService {
    check_url: String,
    download_url: String,
    install_url: String,
    status_url: String,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpUpdateService {
    /// Create a client for the endpoints described by `config`.
    ///
    /// Only connection establishment is bounded; a request that hangs stays
    /// outstanding until the transport gives up.
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("upkeep/{}", env!("CARGO_PKG_VERSION")));

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout_duration())
            .user_agent(user_agent)
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(config, client))
    }

    /// Use an existing client (shared connection pool, custom TLS).
    pub fn with_client(config: &UpdateConfig, client: reqwest::Client) -> Self {
        Self {
            check_url: config.endpoint("check"),
            download_url: config.endpoint("download"),
            install_url: config.endpoint("install"),
            status_url: config.endpoint("status"),
            client,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }
}

#[async_trait]
impl UpdateService for HttpUpdateService {
    #[instrument(skip(self))]
    async fn check(&self) -> Result<CheckResponse> {
        let response = self.send(self.client.get(&self.check_url)).await?;
        let check: CheckResponse = read_json(response).await?;
        debug!(
            has_update = check.has_update,
            current = %check.current_version,
            latest = %check.latest_version,
            "Check response received"
        );
        Ok(check)
    }

    #[instrument(skip(self))]
    async fn download(&self) -> Result<DownloadResponse> {
        let response = self.send(self.client.post(&self.download_url)).await?;
        read_json(response).await
    }

    #[instrument(skip(self))]
    async fn install(&self, extract_dir: &str) -> Result<()> {
        let body = InstallRequest {
            extract_dir: extract_dir.to_string(),
        };
        let response = self.send(self.client.post(&self.install_url).json(&body)).await?;
        let _ack: Value = read_json(response).await?;
        Ok(())
    }

    async fn status(&self) -> Result<UpdateStatus> {
        let response = self.send(self.client.get(&self.status_url)).await?;
        let status: UpdateStatus = read_json(response).await?;
        Ok(status.normalized())
    }
}

/// Decode a response body, classifying failures.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ServiceError::Transport(format!("Failed to read response body: {}", e)))?;

    let value: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) if status.is_success() => {
            return Err(ServiceError::Transport(format!("Malformed response body: {}", e)));
        }
        Err(_) => {
            warn!(status = %status, "Update service returned a non-JSON error response");
            return Err(ServiceError::Transport(format!("Update server returned {}", status)));
        }
    };

    if let Some(message) = remote_error(&value) {
        return Err(ServiceError::Remote(message));
    }

    if !status.is_success() {
        return Err(ServiceError::Transport(format!("Update server returned {}", status)));
    }

    serde_json::from_value(value)
        .map_err(|e| ServiceError::Transport(format!("Malformed response body: {}", e)))
}

/// The `error` field of a body, if it holds anything meaningful.
fn remote_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}
