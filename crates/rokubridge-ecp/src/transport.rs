//! HTTP transport for the External Control Protocol

use rokubridge_core::DeviceAddress;
use std::time::Duration;
use tracing::trace;

use crate::query::ProbeError;

/// Async HTTP transport for ECP queries
#[derive(Debug, Clone)]
pub struct EcpTransport {
    http: reqwest::Client,
    port: u16,
}

impl EcpTransport {
    /// Create a new transport with a per-request timeout
    pub fn new(port: u16, timeout: Duration) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        Ok(Self { http, port })
    }

    /// URL for an ECP path on a device
    pub fn url(&self, address: &DeviceAddress, path: &str) -> String {
        format!("http://{}{}", address.authority(self.port), path)
    }

    /// GET an ECP resource and return the response body
    pub async fn get(&self, address: &DeviceAddress, path: &str) -> Result<String, ProbeError> {
        let url = self.url(address, path);
        trace!(url = %url, "ECP request");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| classify(address, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::HttpStatus {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify(address, e))
    }
}

fn classify(address: &DeviceAddress, error: reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout(address.clone())
    } else if error.is_connect() {
        ProbeError::NotReachable(address.clone(), error.to_string())
    } else {
        ProbeError::Transport(error.to_string())
    }
}
