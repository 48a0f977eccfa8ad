//! Device types for tracking probed media players

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

use crate::identity::DeviceIdentity;

/// Maximum length of a DNS host name (RFC 1123)
const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single DNS label
const MAX_LABEL_LEN: usize = 63;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("invalid device address: {0:?}")]
    Invalid(String),
}

/// Network locator of a device: an IP literal or a DNS host name.
///
/// Addresses are normalized on parse (surrounding whitespace is trimmed, IP
/// literals are printed in canonical form, host names are lower-cased), so two
/// spellings of the same locator compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Parse and normalize a device address
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Ok(Self(ip.to_string()));
        }

        if is_valid_hostname(trimmed) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(AddressError::Invalid(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host and port in URL authority form (IPv6 literals are bracketed)
    pub fn authority(&self, port: u16) -> String {
        if self.0.contains(':') {
            format!("[{}]:{}", self.0, port)
        } else {
            format!("{}:{}", self.0, port)
        }
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.0
    }
}

impl From<IpAddr> for DeviceAddress {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

fn is_valid_hostname(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    let labels_ok = name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    // An all-numeric final label means a mistyped IPv4 literal, not a host name
    let tld_numeric = name
        .rsplit('.')
        .next()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()));

    labels_ok && !tld_numeric
}

/// An application installed on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// Channel/app identifier (e.g., "12" or "tvinput.hdmi1")
    pub id: String,
    /// Display name (e.g., "Netflix")
    pub name: String,
    /// App type as reported by the device (e.g., "appl", "tvin")
    #[serde(rename = "type")]
    pub kind: String,
    /// Version string
    pub version: String,
}

impl AppDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            version: version.into(),
        }
    }
}

/// A device that answered both probe queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbedDevice {
    /// Address the device was probed at
    pub address: DeviceAddress,
    /// Serial number reported by the device
    pub serial_number: String,
    /// Human-readable name
    pub display_name: String,
    /// Model name (if reported)
    pub model_name: Option<String>,
    /// Installed apps, in the order the device reported them
    pub installed_apps: Vec<AppDescriptor>,
}

impl ProbedDevice {
    /// Stable identity of this device
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::derive(&self.address, &self.serial_number)
    }
}
