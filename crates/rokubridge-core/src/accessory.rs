//! Accessory records exposed to the home-automation host

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::device::{AppDescriptor, DeviceAddress, ProbedDevice};
use crate::identity::DeviceIdentity;

/// Host category an accessory is exposed as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryCategory {
    Television,
    Other,
}

impl Default for AccessoryCategory {
    fn default() -> Self {
        Self::Television
    }
}

/// Apps that must never be exposed, matched against app id or app name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppFilter {
    excluded: HashSet<String>,
}

impl AppFilter {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether an app may appear in an accessory
    pub fn allows(&self, app: &AppDescriptor) -> bool {
        !self.excluded.contains(&app.id) && !self.excluded.contains(&app.name)
    }

    /// Keep allowed apps, preserving device order
    pub fn apply(&self, apps: &[AppDescriptor]) -> Vec<AppDescriptor> {
        apps.iter().filter(|app| self.allows(app)).cloned().collect()
    }
}

/// Persisted representation of one exposed device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessoryRecord {
    /// Join key derived from address + serial number
    pub identity: DeviceIdentity,
    /// Name shown by the host
    pub display_name: String,
    /// Host category
    #[serde(default)]
    pub category: AccessoryCategory,
    /// Address the device was last probed at
    pub address: DeviceAddress,
    /// Serial number reported by the device
    pub serial_number: String,
    /// Model name (if reported)
    #[serde(default)]
    pub model_name: Option<String>,
    /// Exposed apps (excluded apps already removed)
    #[serde(default)]
    pub apps: Vec<AppDescriptor>,
    /// When the accessory was first registered
    pub first_registered: DateTime<Utc>,
    /// When the device last answered a probe
    pub last_seen: DateTime<Utc>,
}

impl AccessoryRecord {
    /// Build a new television accessory from a probed device
    pub fn from_probe(device: &ProbedDevice, filter: &AppFilter) -> Self {
        let now = Utc::now();
        Self {
            identity: device.identity(),
            display_name: device.display_name.clone(),
            category: AccessoryCategory::Television,
            address: device.address.clone(),
            serial_number: device.serial_number.clone(),
            model_name: device.model_name.clone(),
            apps: filter.apply(&device.installed_apps),
            first_registered: now,
            last_seen: now,
        }
    }

    /// Refresh state from a new probe of the same device. The identity and
    /// registration time never change.
    pub fn refresh(&mut self, device: &ProbedDevice, filter: &AppFilter) {
        debug_assert_eq!(self.identity, device.identity());
        self.display_name = device.display_name.clone();
        self.model_name = device.model_name.clone();
        self.apps = filter.apply(&device.installed_apps);
        self.category = AccessoryCategory::Television;
        self.last_seen = Utc::now();
    }

    pub fn has_app(&self, id: &str) -> bool {
        self.apps.iter().any(|app| app.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probed(serial: &str, apps: Vec<AppDescriptor>) -> ProbedDevice {
        ProbedDevice {
            address: DeviceAddress::parse("10.0.0.5").unwrap(),
            serial_number: serial.to_string(),
            display_name: "Living Room".to_string(),
            model_name: Some("Roku Ultra".to_string()),
            installed_apps: apps,
        }
    }

    #[test]
    fn test_filter_matches_id_or_name() {
        let filter = AppFilter::new(["12", "Hulu"]);
        assert!(!filter.allows(&AppDescriptor::new("12", "Netflix", "appl", "1")));
        assert!(!filter.allows(&AppDescriptor::new("2285", "Hulu", "appl", "1")));
        assert!(filter.allows(&AppDescriptor::new("13", "Prime Video", "appl", "1")));
    }

    #[test]
    fn test_from_probe_filters_apps_and_sets_category() {
        let device = probed(
            "SN1",
            vec![
                AppDescriptor::new("12", "Netflix", "appl", "1"),
                AppDescriptor::new("837", "YouTube", "appl", "1"),
            ],
        );
        let record = AccessoryRecord::from_probe(&device, &AppFilter::new(["837"]));

        assert_eq!(record.identity, device.identity());
        assert_eq!(record.category, AccessoryCategory::Television);
        assert!(record.has_app("12"));
        assert!(!record.has_app("837"));
    }

    #[test]
    fn test_refresh_keeps_identity_and_registration_time() {
        let mut record =
            AccessoryRecord::from_probe(&probed("SN1", Vec::new()), &AppFilter::default());
        let registered = record.first_registered;

        let mut update = probed("SN1", vec![AppDescriptor::new("12", "Netflix", "appl", "2")]);
        update.display_name = "Bedroom".to_string();
        record.refresh(&update, &AppFilter::default());

        assert_eq!(record.identity, update.identity());
        assert_eq!(record.first_registered, registered);
        assert_eq!(record.display_name, "Bedroom");
        assert!(record.has_app("12"));
    }
}
