//! Discovery scanner that runs discovery-reconcile-publish cycles

use rokubridge_core::{AccessoryRecord, AppFilter, DeviceIdentity};
use rokubridge_ecp::{DeviceClient, DEFAULT_TIMEOUT_MS, ECP_PORT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::discover::discover;
use crate::reconcile::{reconcile, KnownSet, ReconcileOutcome};
use crate::sink::{AccessorySink, SinkError};
use crate::ssdp::Sweep;

/// Scanner configuration, read once per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Run an SSDP sweep each cycle
    pub auto_discover: bool,
    /// Addresses never probed, whatever their source
    pub excluded_devices: Vec<String>,
    /// App ids or names never exposed
    pub excluded_apps: Vec<String>,
    /// Statically configured devices
    pub devices: Vec<StaticDevice>,
    /// ECP port
    pub ecp_port: u16,
    /// Cycle interval in seconds
    pub interval_secs: u64,
    /// Upper bound for probing one address
    pub probe_timeout_ms: u64,
    /// How long the sweep listens for responses
    pub sweep_timeout_ms: u64,
    /// Cap on probes in flight (unbounded when unset)
    pub max_concurrent_probes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDevice {
    pub name: String,
    pub ip: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            auto_discover: false,
            excluded_devices: Vec::new(),
            excluded_apps: Vec::new(),
            devices: Vec::new(),
            ecp_port: ECP_PORT,
            interval_secs: 60,
            probe_timeout_ms: DEFAULT_TIMEOUT_MS,
            sweep_timeout_ms: 3000,
            max_concurrent_probes: None,
        }
    }
}

/// Counts for one finished cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub candidates: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed_probes: usize,
    pub sweep_failed: bool,
    pub total: usize,
}

/// Lifecycle event for real-time updates
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Cycle started
    CycleStarted,
    /// New accessory registered with the host
    AccessoryRegistered(AccessoryRecord),
    /// Known accessory refreshed in place
    AccessoryUpdated(AccessoryRecord),
    /// Stale accessory unregistered
    AccessoryRemoved(DeviceIdentity),
    /// Cycle completed
    CycleCompleted(CycleSummary),
}

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("failed to load cached accessories: {0}")]
    LoadCached(SinkError),
    #[error("failed to register {count} accessories: {source}")]
    Register { count: usize, source: SinkError },
    #[error("failed to unregister {count} accessories: {source}")]
    Unregister { count: usize, source: SinkError },
}

/// Discovery scanner service.
///
/// Owns the known accessory set. Cycles are serialized: a cycle triggered
/// while another is running waits for it to finish, so one cycle's changes
/// are fully applied before the next reconciles.
pub struct DiscoveryScanner {
    config: ScannerConfig,
    client: Arc<dyn DeviceClient>,
    sweep: Option<Arc<dyn Sweep>>,
    sink: Arc<dyn AccessorySink>,
    known: RwLock<KnownSet>,
    cycle: Mutex<()>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl DiscoveryScanner {
    /// Create a new scanner with the given configuration and collaborators
    pub fn new(
        config: ScannerConfig,
        client: Arc<dyn DeviceClient>,
        sweep: Option<Arc<dyn Sweep>>,
        sink: Arc<dyn AccessorySink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            config,
            client,
            sweep,
            sink,
            known: RwLock::new(KnownSet::new()),
            cycle: Mutex::new(()),
            event_tx,
        }
    }

    /// Seed the known set from the sink's cached accessories. Call once,
    /// before the first cycle.
    pub async fn load_cached(&self) -> Result<usize, CycleError> {
        let records = self
            .sink
            .load_cached()
            .await
            .map_err(CycleError::LoadCached)?;

        for record in &records {
            info!(name = %record.display_name, identity = %record.identity, "Loading accessory from cache");
        }

        let _cycle = self.cycle.lock().await;
        let mut known = self.known.write().await;
        *known = KnownSet::seeded(records);
        Ok(known.len())
    }

    /// Configuration every cycle runs with
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Current accessories
    pub async fn accessories(&self) -> Vec<AccessoryRecord> {
        self.known.read().await.records().cloned().collect()
    }

    /// Get a specific accessory
    pub async fn get_accessory(&self, identity: &DeviceIdentity) -> Option<AccessoryRecord> {
        self.known.read().await.get(identity).cloned()
    }

    /// Run a single discovery cycle
    pub async fn scan_once(&self) -> Result<CycleSummary, CycleError> {
        let _cycle = self.cycle.lock().await;
        let _ = self.event_tx.send(DiscoveryEvent::CycleStarted);

        let config = &self.config;
        info!(
            auto_discover = config.auto_discover,
            configured = config.devices.len(),
            "Starting discovery cycle"
        );

        let report = discover(self.client.clone(), self.sweep.clone(), config).await;
        let failed_probes = report.failures.len();
        let candidates = report.candidates.len();

        let filter = AppFilter::new(config.excluded_apps.iter().cloned());
        let outcome = {
            let mut known = self.known.write().await;
            reconcile(&mut known, report.devices, &filter)
        };

        self.publish(&outcome).await?;

        let total = self.known.read().await.len();
        let summary = CycleSummary {
            candidates,
            added: outcome.to_add.len(),
            updated: outcome.to_update.len(),
            removed: outcome.to_remove.len(),
            failed_probes,
            sweep_failed: report.sweep_failed,
            total,
        };
        let _ = self
            .event_tx
            .send(DiscoveryEvent::CycleCompleted(summary.clone()));

        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            failed = summary.failed_probes,
            "Cycle complete: {} accessories",
            total
        );
        Ok(summary)
    }

    /// Hand lifecycle instructions to the sink.
    ///
    /// Registrations go first. When the sink refuses a batch, the known set is
    /// put back so the next cycle retries: refused additions are dropped (and
    /// come back as new), refused removals are restored (and go stale again).
    async fn publish(&self, outcome: &ReconcileOutcome) -> Result<(), CycleError> {
        if !outcome.to_add.is_empty() {
            if let Err(source) = self.sink.register(&outcome.to_add).await {
                let mut known = self.known.write().await;
                for record in &outcome.to_add {
                    known.remove(&record.identity);
                }
                for record in &outcome.to_remove {
                    known.insert(record.clone());
                }
                return Err(CycleError::Register {
                    count: outcome.to_add.len(),
                    source,
                });
            }
            for record in &outcome.to_add {
                info!(name = %record.display_name, address = %record.address, "Registered new accessory");
                let _ = self
                    .event_tx
                    .send(DiscoveryEvent::AccessoryRegistered(record.clone()));
            }
        }

        for record in &outcome.to_update {
            debug!(name = %record.display_name, "Refreshed accessory");
            let _ = self
                .event_tx
                .send(DiscoveryEvent::AccessoryUpdated(record.clone()));
        }

        if !outcome.to_remove.is_empty() {
            info!(count = outcome.to_remove.len(), "Removing stale accessories");
            if let Err(source) = self.sink.unregister(&outcome.to_remove).await {
                let mut known = self.known.write().await;
                for record in &outcome.to_remove {
                    known.insert(record.clone());
                }
                return Err(CycleError::Unregister {
                    count: outcome.to_remove.len(),
                    source,
                });
            }
            for record in &outcome.to_remove {
                let _ = self
                    .event_tx
                    .send(DiscoveryEvent::AccessoryRemoved(record.identity));
            }
        }

        Ok(())
    }

    /// Run cycles forever: one right away, then every `interval_secs`.
    /// A failed cycle is logged and the next one starts from scratch.
    pub async fn run(&self) {
        let period = self.config.interval_secs.max(1);
        let mut ticker = interval(Duration::from_secs(period));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period, "Discovery scheduler started");

        loop {
            ticker.tick().await;
            if let Err(e) = self.scan_once().await {
                error!(error = %e, "Discovery cycle failed");
            }
        }
    }
}

/// Seed from the sink, logging instead of failing; used at startup where a
/// broken cache must not keep the daemon from discovering devices
pub async fn load_cached_or_warn(scanner: &DiscoveryScanner) {
    match scanner.load_cached().await {
        Ok(count) => info!(count = count, "Loaded cached accessories"),
        Err(e) => warn!(error = %e, "Starting with no cached accessories"),
    }
}
