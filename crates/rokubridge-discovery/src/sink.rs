//! Accessory lifecycle sink: the boundary to the home-automation host

use async_trait::async_trait;
use rokubridge_core::{AccessoryRecord, DeviceIdentity};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("accessory storage failed: {0}")]
    Storage(String),
    #[error("host rejected accessories: {0}")]
    Rejected(String),
}

/// Receives lifecycle instructions and owns accessory persistence.
///
/// `load_cached` runs once before the first cycle. New accessories are passed
/// to `register`, stale ones to `unregister`. Updates happen in place on the
/// scanner's known set and produce no sink call.
#[async_trait]
pub trait AccessorySink: Send + Sync {
    async fn load_cached(&self) -> Result<Vec<AccessoryRecord>, SinkError>;

    async fn register(&self, records: &[AccessoryRecord]) -> Result<(), SinkError>;

    async fn unregister(&self, records: &[AccessoryRecord]) -> Result<(), SinkError>;
}

/// Sink that keeps registrations in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    registered: Mutex<BTreeMap<DeviceIdentity, AccessoryRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with records already registered, as if loaded from a previous run
    pub fn with_cached(records: impl IntoIterator<Item = AccessoryRecord>) -> Self {
        Self {
            registered: Mutex::new(records.into_iter().map(|r| (r.identity, r)).collect()),
        }
    }

    pub async fn registered(&self) -> Vec<AccessoryRecord> {
        self.registered.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl AccessorySink for MemorySink {
    async fn load_cached(&self) -> Result<Vec<AccessoryRecord>, SinkError> {
        Ok(self.registered().await)
    }

    async fn register(&self, records: &[AccessoryRecord]) -> Result<(), SinkError> {
        let mut registered = self.registered.lock().await;
        for record in records {
            registered.insert(record.identity, record.clone());
        }
        Ok(())
    }

    async fn unregister(&self, records: &[AccessoryRecord]) -> Result<(), SinkError> {
        let mut registered = self.registered.lock().await;
        for record in records {
            registered.remove(&record.identity);
        }
        Ok(())
    }
}
