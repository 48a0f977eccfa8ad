//! Application state management

use anyhow::{Context, Result};
use async_trait::async_trait;
use rokubridge_core::{AccessoryRecord, AccessoryStore, DeviceIdentity, StoreError};
use rokubridge_discovery::{
    load_cached_or_warn, AccessorySink, DiscoveryEvent, DiscoveryScanner, SinkError, SsdpSweep,
    Sweep,
};
use rokubridge_ecp::EcpClient;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Sink that persists accessories in the on-disk store
pub struct FileSink {
    store: Mutex<AccessoryStore>,
}

impl FileSink {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = AccessoryStore::open(path)?;
        info!(path = %path.display(), count = store.len(), "Opened accessory cache");
        Ok(Self {
            store: Mutex::new(store),
        })
    }
}

fn storage(e: StoreError) -> SinkError {
    SinkError::Storage(e.to_string())
}

#[async_trait]
impl AccessorySink for FileSink {
    async fn load_cached(&self) -> Result<Vec<AccessoryRecord>, SinkError> {
        Ok(self.store.lock().await.load_cached())
    }

    async fn register(&self, records: &[AccessoryRecord]) -> Result<(), SinkError> {
        self.store.lock().await.insert(records).map_err(storage)
    }

    async fn unregister(&self, records: &[AccessoryRecord]) -> Result<(), SinkError> {
        let identities: Vec<DeviceIdentity> = records.iter().map(|r| r.identity).collect();
        let removed = self
            .store
            .lock()
            .await
            .remove(&identities)
            .map_err(storage)?;
        debug!(removed = removed, "Unregistered accessories from cache");
        Ok(())
    }
}

/// Shared application state
pub struct AppState {
    /// Discovery scanner
    pub scanner: Arc<DiscoveryScanner>,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create new application state, seeded from the accessory cache
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let scanner_config = config.to_scanner_config();

        let client = EcpClient::new(
            scanner_config.ecp_port,
            Duration::from_millis(scanner_config.probe_timeout_ms),
        )
        .context("building ECP client")?;
        let sweep: Arc<dyn Sweep> = Arc::new(SsdpSweep::new(Duration::from_millis(
            scanner_config.sweep_timeout_ms,
        )));
        let sink = FileSink::open(Path::new(&config.daemon.cache_path))
            .with_context(|| format!("opening accessory cache {}", config.daemon.cache_path))?;

        let scanner = Arc::new(DiscoveryScanner::new(
            scanner_config,
            Arc::new(client),
            Some(sweep),
            Arc::new(sink),
        ));
        load_cached_or_warn(&scanner).await;

        // Mirror lifecycle events into the log
        let mut rx = scanner.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Event log fell behind");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Arc::new(Self { scanner, config }))
    }

    /// Get all accessories
    pub async fn accessories(&self) -> Vec<AccessoryRecord> {
        self.scanner.accessories().await
    }

    /// Get accessory by identity string
    pub async fn get_accessory(&self, id: &str) -> Option<AccessoryRecord> {
        let identity: DeviceIdentity = id.parse().ok()?;
        self.scanner.get_accessory(&identity).await
    }
}

fn log_event(event: &DiscoveryEvent) {
    match event {
        DiscoveryEvent::CycleStarted => debug!("Cycle started"),
        DiscoveryEvent::AccessoryRegistered(record) => {
            info!(identity = %record.identity, name = %record.display_name, "Accessory registered")
        }
        DiscoveryEvent::AccessoryUpdated(record) => {
            debug!(identity = %record.identity, apps = record.apps.len(), "Accessory updated")
        }
        DiscoveryEvent::AccessoryRemoved(identity) => {
            info!(identity = %identity, "Accessory removed")
        }
        DiscoveryEvent::CycleCompleted(summary) => debug!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            failed = summary.failed_probes,
            "Cycle completed"
        ),
    }
}
