//! Transport seam and the HTTP implementation used in production.

use crate::{BatchPayload, OutboxError, OutboxResult};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

/// Default request timeout for a batch POST.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can carry one batch to the telemetry endpoint.
///
/// Implementations make a single attempt. The worker treats any error as
/// terminal for the batch.
pub trait Transport: Send + Sync {
    fn send(&self, payload: &BatchPayload) -> OutboxResult<()>;
}

/// HTTP sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Endpoint base URL, e.g. `https://telemetry.example.com`.
    pub base_url: String,
    /// Database the points are written to.
    pub database: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl SenderConfig {
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/databases/{}/points", base, self.database)
    }
}

/// Blocking HTTP transport. Runs on the worker thread only.
pub struct HttpTransport {
    config: SenderConfig,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: SenderConfig) -> OutboxResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }
}

impl Transport for HttpTransport {
    fn send(&self, payload: &BatchPayload) -> OutboxResult<()> {
        let url = self.config.endpoint();
        debug!(url = %url, points = payload.point_count(), "Sending batch");

        let response = self
            .client
            .post(&url)
            .query(&[("api_key", self.config.api_key.as_str())])
            .json(payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(OutboxError::Endpoint {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
