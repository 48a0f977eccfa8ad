//! Stable device identity derivation
//!
//! An identity is the join key between the devices reachable right now and the
//! accessories already registered. It is a UUIDv5 computed over a versioned,
//! length-prefixed composition of the device address and serial number:
//!
//! ```text
//! v1:<byte length of address>:<address><serial number>
//! ```
//!
//! The length prefix keeps `("10.0.0.1", "2SN")` and `("10.0.0.12", "SN")` from
//! colliding. The namespace and scheme tag are fixed forever; changing either
//! would orphan every persisted accessory.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceAddress;

/// Namespace for identity UUIDs
pub const IDENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c2d1e_8a5b_4c3f_9e0d_7a6b5c4d3e2f);

/// Composition scheme tag
pub const IDENTITY_SCHEME: &str = "v1";

/// Deterministic identity token for a device at an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(Uuid);

impl DeviceIdentity {
    /// Derive the identity for `(address, serial_number)`
    pub fn derive(address: &DeviceAddress, serial_number: &str) -> Self {
        let key = compose(address.as_str(), serial_number);
        Self(Uuid::new_v5(&IDENTITY_NAMESPACE, key.as_bytes()))
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceIdentity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

fn compose(address: &str, serial_number: &str) -> String {
    format!(
        "{}:{}:{}{}",
        IDENTITY_SCHEME,
        address.len(),
        address,
        serial_number
    )
}
