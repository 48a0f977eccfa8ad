//! rokubridge ECP - External Control Protocol client for device probing
//!
//! Queries media players over their HTTP/XML control API (port 8060) for the
//! installed app list and device identity.

pub mod query;
pub mod transport;

pub use query::{
    parse_apps, parse_device_info, probe_device, DeviceClient, DeviceInfo, EcpClient, ProbeError,
    DEFAULT_TIMEOUT_MS, ECP_PORT,
};
pub use transport::EcpTransport;
