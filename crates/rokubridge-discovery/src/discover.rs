//! Discovery aggregation: sweep + static devices -> probed devices

use rokubridge_core::{DeviceAddress, ProbedDevice};
use rokubridge_ecp::DeviceClient;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::probe::{probe_hosts, Candidate, ProbeFailure, ProbeOptions};
use crate::scanner::ScannerConfig;
use crate::ssdp::Sweep;

/// Everything one discovery pass learned
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Addresses that were probed
    pub candidates: Vec<DeviceAddress>,
    /// Devices that answered both queries
    pub devices: Vec<ProbedDevice>,
    /// Addresses that failed to probe
    pub failures: Vec<ProbeFailure>,
    /// Whether auto-discovery ran and failed
    pub sweep_failed: bool,
}

/// Merge static and swept addresses into the deduplicated candidate set.
///
/// Static devices take precedence over swept duplicates, so a device listed
/// in the config is probed once and keeps its configured name. Excluded
/// addresses are dropped from both sources. Malformed static entries are
/// logged and skipped.
pub fn collect_candidates(config: &ScannerConfig, swept: Vec<DeviceAddress>) -> Vec<Candidate> {
    let excluded: HashSet<DeviceAddress> = config
        .excluded_devices
        .iter()
        .filter_map(|raw| match DeviceAddress::parse(raw) {
            Ok(address) => Some(address),
            Err(e) => {
                warn!(entry = %raw, error = %e, "Ignoring invalid excluded device address");
                None
            }
        })
        .collect();

    let mut candidates: BTreeMap<DeviceAddress, Option<String>> = BTreeMap::new();

    for device in &config.devices {
        let address = match DeviceAddress::parse(&device.ip) {
            Ok(address) => address,
            Err(e) => {
                warn!(name = %device.name, ip = %device.ip, error = %e, "Invalid IP in config");
                continue;
            }
        };
        // Exclusion wins over static configuration too
        if excluded.contains(&address) {
            debug!(address = %address, "Configured device is excluded");
            continue;
        }
        let name = Some(device.name.trim().to_string()).filter(|n| !n.is_empty());
        candidates.entry(address).or_insert(name);
    }

    for address in swept {
        if excluded.contains(&address) {
            debug!(address = %address, "Skipping excluded device");
            continue;
        }
        candidates.entry(address).or_insert(None);
    }

    candidates
        .into_iter()
        .map(|(address, name)| Candidate { address, name })
        .collect()
}

/// Run one discovery pass.
///
/// A failed sweep degrades to zero swept addresses; static devices are still
/// probed. Probe failures are isolated per address.
pub async fn discover(
    client: Arc<dyn DeviceClient>,
    sweep: Option<Arc<dyn Sweep>>,
    config: &ScannerConfig,
) -> DiscoveryReport {
    let mut sweep_failed = false;

    let swept = match (config.auto_discover, sweep) {
        (false, _) => Vec::new(),
        (true, Some(sweep)) => match sweep.sweep().await {
            Ok(addresses) => addresses,
            Err(e) => {
                warn!(error = %e, "Auto-discovery sweep failed, continuing with configured devices");
                sweep_failed = true;
                Vec::new()
            }
        },
        (true, None) => {
            warn!("Auto-discovery enabled but no sweep is available");
            Vec::new()
        }
    };

    let candidates = collect_candidates(config, swept);
    debug!(
        "Discovered addresses: {}",
        candidates
            .iter()
            .map(|c| c.address.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let addresses: Vec<DeviceAddress> = candidates.iter().map(|c| c.address.clone()).collect();
    let options = ProbeOptions {
        timeout: Duration::from_millis(config.probe_timeout_ms),
        max_concurrent: config.max_concurrent_probes,
    };
    let (devices, failures) = probe_hosts(client, candidates, options).await;

    DiscoveryReport {
        candidates: addresses,
        devices,
        failures,
        sweep_failed,
    }
}
