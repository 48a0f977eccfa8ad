//! Device query functions using the External Control Protocol

use async_trait::async_trait;
use rokubridge_core::{AppDescriptor, DeviceAddress, ProbedDevice};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::transport::EcpTransport;

/// ECP port
pub const ECP_PORT: u16 = 8060;

/// Default timeout for queries
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

const APPS_PATH: &str = "/query/apps";
const DEVICE_INFO_PATH: &str = "/query/device-info";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("device not reachable at {0}: {1}")]
    NotReachable(DeviceAddress, String),
    #[error("query to {0} timed out")]
    Timeout(DeviceAddress),
    #[error("{path} returned HTTP {status}")]
    HttpStatus { path: String, status: u16 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("device info is missing {0}")]
    MissingField(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Identity and naming fields from `/query/device-info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub user_device_name: Option<String>,
    pub friendly_device_name: Option<String>,
    pub model_name: Option<String>,
}

impl DeviceInfo {
    /// Name to expose: the user-assigned name, then `fallback`, then the
    /// friendly or model name, then the serial number
    pub fn display_name(&self, fallback: Option<&str>) -> String {
        self.user_device_name
            .as_deref()
            .or(fallback.filter(|name| !name.trim().is_empty()))
            .or(self.friendly_device_name.as_deref())
            .or(self.model_name.as_deref())
            .unwrap_or(&self.serial_number)
            .to_string()
    }
}

/// The device wire-protocol boundary. Both calls are fallible and
/// independently callable per address.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn list_apps(&self, address: &DeviceAddress) -> Result<Vec<AppDescriptor>, ProbeError>;

    async fn get_info(&self, address: &DeviceAddress) -> Result<DeviceInfo, ProbeError>;
}

// ECP response structures

#[derive(Deserialize)]
struct AppsRsp {
    #[serde(rename = "app", default)]
    apps: Vec<AppEntry>,
}

#[derive(Deserialize)]
struct AppEntry {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "$text", default)]
    name: String,
}

#[derive(Deserialize)]
struct DeviceInfoRsp {
    #[serde(rename = "serial-number", default)]
    serial_number: Option<String>,
    #[serde(rename = "user-device-name", default)]
    user_device_name: Option<String>,
    #[serde(rename = "friendly-device-name", default)]
    friendly_device_name: Option<String>,
    #[serde(rename = "model-name", default)]
    model_name: Option<String>,
}

/// Parse a `/query/apps` response
pub fn parse_apps(xml: &str) -> Result<Vec<AppDescriptor>, ProbeError> {
    let rsp: AppsRsp =
        quick_xml::de::from_str(xml).map_err(|e| ProbeError::InvalidResponse(e.to_string()))?;

    Ok(rsp
        .apps
        .into_iter()
        .map(|app| AppDescriptor {
            id: app.id,
            name: app.name.trim().to_string(),
            kind: app.kind,
            version: app.version,
        })
        .collect())
}

/// Parse a `/query/device-info` response
pub fn parse_device_info(xml: &str) -> Result<DeviceInfo, ProbeError> {
    let rsp: DeviceInfoRsp =
        quick_xml::de::from_str(xml).map_err(|e| ProbeError::InvalidResponse(e.to_string()))?;

    let serial_number =
        non_empty(rsp.serial_number).ok_or(ProbeError::MissingField("serial-number"))?;

    Ok(DeviceInfo {
        serial_number,
        user_device_name: non_empty(rsp.user_device_name),
        friendly_device_name: non_empty(rsp.friendly_device_name),
        model_name: non_empty(rsp.model_name),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// ECP client over HTTP
#[derive(Debug, Clone)]
pub struct EcpClient {
    transport: EcpTransport,
}

impl EcpClient {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, ProbeError> {
        Ok(Self {
            transport: EcpTransport::new(port, timeout)?,
        })
    }
}

#[async_trait]
impl DeviceClient for EcpClient {
    async fn list_apps(&self, address: &DeviceAddress) -> Result<Vec<AppDescriptor>, ProbeError> {
        let body = self.transport.get(address, APPS_PATH).await?;
        parse_apps(&body)
    }

    async fn get_info(&self, address: &DeviceAddress) -> Result<DeviceInfo, ProbeError> {
        let body = self.transport.get(address, DEVICE_INFO_PATH).await?;
        parse_device_info(&body)
    }
}

/// Probe a device: list its apps, then read its identity.
///
/// Fails as a whole if either query fails; a partially probed device is never
/// returned. `fallback_name` is the configured name for static devices.
pub async fn probe_device(
    client: &dyn DeviceClient,
    address: &DeviceAddress,
    fallback_name: Option<&str>,
) -> Result<ProbedDevice, ProbeError> {
    debug!(address = %address, "Probing device");

    let installed_apps = client.list_apps(address).await?;
    let info = client.get_info(address).await?;

    debug!(
        address = %address,
        serial = %info.serial_number,
        apps = installed_apps.len(),
        "Probe succeeded"
    );

    Ok(ProbedDevice {
        address: address.clone(),
        display_name: info.display_name(fallback_name),
        serial_number: info.serial_number,
        model_name: info.model_name,
        installed_apps,
    })
}
