//! End-to-end discovery cycles against in-memory devices

use async_trait::async_trait;
use rokubridge_core::{AccessoryRecord, AppDescriptor, DeviceAddress, DeviceIdentity};
use rokubridge_discovery::{
    AccessorySink, CycleError, DiscoveryScanner, MemorySink, ScannerConfig, SinkError,
    StaticDevice, Sweep, SweepError,
};
use rokubridge_ecp::{DeviceClient, DeviceInfo, ProbeError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn addr(s: &str) -> DeviceAddress {
    DeviceAddress::parse(s).unwrap()
}

fn app(id: &str, name: &str) -> AppDescriptor {
    AppDescriptor::new(id, name, "appl", "1.0")
}

struct FakeDevice {
    serial: String,
    name: Option<String>,
    apps: Vec<AppDescriptor>,
}

/// Devices reachable by address; anything else is unreachable
#[derive(Default)]
struct FakeNetwork {
    devices: Mutex<HashMap<DeviceAddress, FakeDevice>>,
    delay: Option<Duration>,
    probes: AtomicUsize,
}

impl FakeNetwork {
    fn with(self, address: &str, serial: &str, apps: Vec<AppDescriptor>) -> Self {
        self.devices.lock().unwrap().insert(
            addr(address),
            FakeDevice {
                serial: serial.to_string(),
                name: None,
                apps,
            },
        );
        self
    }

    fn named(self, address: &str, name: &str) -> Self {
        if let Some(device) = self.devices.lock().unwrap().get_mut(&addr(address)) {
            device.name = Some(name.to_string());
        }
        self
    }

    fn unplug(&self, address: &str) {
        self.devices.lock().unwrap().remove(&addr(address));
    }

    fn unreachable(address: &DeviceAddress) -> ProbeError {
        ProbeError::NotReachable(address.clone(), "connection refused".to_string())
    }
}

#[async_trait]
impl DeviceClient for FakeNetwork {
    async fn list_apps(&self, address: &DeviceAddress) -> Result<Vec<AppDescriptor>, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let devices = self.devices.lock().unwrap();
        devices
            .get(address)
            .map(|d| d.apps.clone())
            .ok_or_else(|| Self::unreachable(address))
    }

    async fn get_info(&self, address: &DeviceAddress) -> Result<DeviceInfo, ProbeError> {
        let devices = self.devices.lock().unwrap();
        let device = devices.get(address).ok_or_else(|| Self::unreachable(address))?;
        Ok(DeviceInfo {
            serial_number: device.serial.clone(),
            user_device_name: device.name.clone(),
            friendly_device_name: None,
            model_name: Some("Roku Ultra".to_string()),
        })
    }
}

struct FixedSweep(Vec<&'static str>);

#[async_trait]
impl Sweep for FixedSweep {
    async fn sweep(&self) -> Result<Vec<DeviceAddress>, SweepError> {
        Ok(self.0.iter().map(|a| addr(a)).collect())
    }
}

struct BrokenSweep;

#[async_trait]
impl Sweep for BrokenSweep {
    async fn sweep(&self) -> Result<Vec<DeviceAddress>, SweepError> {
        Err(SweepError::Socket(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "port in use",
        )))
    }
}

/// Counts register calls and can be told to refuse them
#[derive(Default)]
struct CountingSink {
    inner: MemorySink,
    register_calls: AtomicUsize,
    refuse: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl AccessorySink for CountingSink {
    async fn load_cached(&self) -> Result<Vec<AccessoryRecord>, SinkError> {
        self.inner.load_cached().await
    }

    async fn register(&self, records: &[AccessoryRecord]) -> Result<(), SinkError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected("bridge offline".to_string()));
        }
        self.inner.register(records).await
    }

    async fn unregister(&self, records: &[AccessoryRecord]) -> Result<(), SinkError> {
        self.inner.unregister(records).await
    }
}

fn statics(devices: &[(&str, &str)]) -> ScannerConfig {
    ScannerConfig {
        devices: devices
            .iter()
            .map(|(name, ip)| StaticDevice {
                name: name.to_string(),
                ip: ip.to_string(),
            })
            .collect(),
        probe_timeout_ms: 1000,
        ..ScannerConfig::default()
    }
}

fn identities(records: &[AccessoryRecord]) -> Vec<DeviceIdentity> {
    let mut ids: Vec<_> = records.iter().map(|r| r.identity).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_static_device_becomes_television_accessory() {
    let network = FakeNetwork::default().with("10.0.0.5", "SN1", vec![app("12", "Netflix")]);
    let sink = Arc::new(MemorySink::new());
    let scanner = DiscoveryScanner::new(
        statics(&[("Living Room", "10.0.0.5")]),
        Arc::new(network),
        None,
        sink.clone(),
    );

    let summary = scanner.scan_once().await.unwrap();
    assert_eq!(summary.added, 1);

    let registered = sink.registered().await;
    assert_eq!(registered.len(), 1);
    let record = &registered[0];
    assert_eq!(record.identity, DeviceIdentity::derive(&addr("10.0.0.5"), "SN1"));
    assert_eq!(record.display_name, "Living Room");
    assert!(record.has_app("12"));
    assert_eq!(record.category, rokubridge_core::AccessoryCategory::Television);
}

#[tokio::test]
async fn test_unreachable_device_is_removed_next_cycle() {
    let network = Arc::new(
        FakeNetwork::default()
            .with("10.0.0.5", "SN1", Vec::new())
            .with("10.0.0.6", "SN2", Vec::new()),
    );
    let sink = Arc::new(MemorySink::new());
    let scanner = DiscoveryScanner::new(
        statics(&[("A", "10.0.0.5"), ("B", "10.0.0.6")]),
        network.clone(),
        None,
        sink.clone(),
    );

    scanner.scan_once().await.unwrap();
    assert_eq!(sink.registered().await.len(), 2);

    network.unplug("10.0.0.6");
    let summary = scanner.scan_once().await.unwrap();

    assert_eq!(summary.removed, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.failed_probes, 1);
    let remaining = sink.registered().await;
    assert_eq!(
        identities(&remaining),
        vec![DeviceIdentity::derive(&addr("10.0.0.5"), "SN1")]
    );
}

#[tokio::test]
async fn test_one_failing_probe_does_not_affect_others() {
    let network = FakeNetwork::default()
        .with("10.0.0.1", "SN1", Vec::new())
        .with("10.0.0.3", "SN3", Vec::new());
    let sink = Arc::new(MemorySink::new());
    let scanner = DiscoveryScanner::new(
        statics(&[("A", "10.0.0.1"), ("B", "10.0.0.2"), ("C", "10.0.0.3")]),
        Arc::new(network),
        None,
        sink.clone(),
    );

    let summary = scanner.scan_once().await.unwrap();

    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.added, 2);
    assert_eq!(summary.failed_probes, 1);
    assert_eq!(sink.registered().await.len(), 2);
}

#[tokio::test]
async fn test_swept_and_static_duplicate_is_probed_once() {
    let network = Arc::new(
        FakeNetwork::default()
            .with("10.0.0.5", "SN1", Vec::new())
            .with("10.0.0.6", "SN2", Vec::new())
            .named("10.0.0.6", "Bedroom"),
    );
    let config = ScannerConfig {
        auto_discover: true,
        ..statics(&[("Den", "10.0.0.5")])
    };
    let scanner = DiscoveryScanner::new(
        config,
        network.clone(),
        Some(Arc::new(FixedSweep(vec!["10.0.0.5", "10.0.0.6"]))),
        Arc::new(MemorySink::new()),
    );

    let summary = scanner.scan_once().await.unwrap();

    assert_eq!(summary.candidates, 2);
    assert_eq!(network.probes.load(Ordering::SeqCst), 2);
    let mut names: Vec<_> = scanner
        .accessories()
        .await
        .into_iter()
        .map(|r| r.display_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Bedroom", "Den"]);
}

#[tokio::test]
async fn test_exclusions_apply_to_devices_and_apps() {
    let network = FakeNetwork::default()
        .with("10.0.0.5", "SN1", vec![app("12", "Netflix"), app("13", "Hulu")])
        .with("10.0.0.6", "SN2", Vec::new());
    let config = ScannerConfig {
        auto_discover: true,
        excluded_devices: vec!["10.0.0.6".to_string()],
        excluded_apps: vec!["Netflix".to_string()],
        ..ScannerConfig::default()
    };
    let scanner = DiscoveryScanner::new(
        config,
        Arc::new(network),
        Some(Arc::new(FixedSweep(vec!["10.0.0.5", "10.0.0.6"]))),
        Arc::new(MemorySink::new()),
    );

    scanner.scan_once().await.unwrap();

    let accessories = scanner.accessories().await;
    assert_eq!(accessories.len(), 1);
    assert!(!accessories[0].has_app("12"));
    assert!(accessories[0].has_app("13"));
}

#[tokio::test]
async fn test_failed_sweep_still_probes_configured_devices() {
    let network = FakeNetwork::default().with("10.0.0.5", "SN1", Vec::new());
    let config = ScannerConfig {
        auto_discover: true,
        ..statics(&[("Den", "10.0.0.5")])
    };
    let scanner = DiscoveryScanner::new(
        config,
        Arc::new(network),
        Some(Arc::new(BrokenSweep)),
        Arc::new(MemorySink::new()),
    );

    let summary = scanner.scan_once().await.unwrap();

    assert!(summary.sweep_failed);
    assert_eq!(summary.added, 1);
}

#[tokio::test]
async fn test_refused_registration_is_retried() {
    let network = FakeNetwork::default().with("10.0.0.5", "SN1", Vec::new());
    let sink = Arc::new(CountingSink::default());
    sink.refuse.store(true, Ordering::SeqCst);
    let scanner = DiscoveryScanner::new(
        statics(&[("Den", "10.0.0.5")]),
        Arc::new(network),
        None,
        sink.clone(),
    );

    let err = scanner.scan_once().await.unwrap_err();
    assert!(matches!(err, CycleError::Register { .. }));
    assert!(scanner.accessories().await.is_empty());

    sink.refuse.store(false, Ordering::SeqCst);
    let summary = scanner.scan_once().await.unwrap();

    assert_eq!(summary.added, 1);
    assert_eq!(sink.register_calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.inner.registered().await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_cycles_register_once() {
    let network = FakeNetwork {
        delay: Some(Duration::from_millis(50)),
        ..FakeNetwork::default()
    }
    .with("10.0.0.5", "SN1", Vec::new());
    let sink = Arc::new(CountingSink::default());
    let scanner = Arc::new(DiscoveryScanner::new(
        statics(&[("Den", "10.0.0.5")]),
        Arc::new(network),
        None,
        sink.clone(),
    ));

    let (first, second) = tokio::join!(scanner.scan_once(), scanner.scan_once());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.added + second.added, 1);
    assert_eq!(first.updated + second.updated, 1);
    assert_eq!(sink.register_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cached_accessories_are_updated_not_re_added() {
    let network = FakeNetwork::default().with("10.0.0.5", "SN1", Vec::new());
    let sink = Arc::new(CountingSink::default());

    // First run registers the device
    let first = DiscoveryScanner::new(
        statics(&[("Den", "10.0.0.5")]),
        Arc::new(network),
        None,
        sink.clone(),
    );
    first.scan_once().await.unwrap();
    assert_eq!(sink.register_calls.load(Ordering::SeqCst), 1);

    // Restart with the same sink, seeded from its cache
    let network = FakeNetwork::default().with("10.0.0.5", "SN1", Vec::new());
    let restarted = DiscoveryScanner::new(
        statics(&[("Den", "10.0.0.5")]),
        Arc::new(network),
        None,
        sink.clone(),
    );
    assert_eq!(restarted.load_cached().await.unwrap(), 1);

    let summary = restarted.scan_once().await.unwrap();

    assert_eq!(summary.added, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(sink.register_calls.load(Ordering::SeqCst), 1);
}
