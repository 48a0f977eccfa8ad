//! JSON-backed accessory store
//!
//! Registered accessories survive restarts in a single manifest file. The
//! manifest is rewritten whole on every change; it holds one entry per
//! identity and is small enough that this never matters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::accessory::{AccessoryCategory, AccessoryRecord};
use crate::identity::DeviceIdentity;

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("unsupported manifest version {found} (expected {MANIFEST_VERSION})")]
    UnsupportedVersion { found: u32 },
}

/// On-disk manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessoryManifest {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Records keyed by identity
    #[serde(default)]
    pub accessories: BTreeMap<DeviceIdentity, AccessoryRecord>,
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

impl Default for AccessoryManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            accessories: BTreeMap::new(),
        }
    }
}

impl AccessoryManifest {
    /// Load manifest from a file
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let manifest: AccessoryManifest = serde_json::from_str(&content)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: manifest.version,
            });
        }
        Ok(manifest)
    }

    /// Save manifest to a file
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Write-then-rename so a crash never leaves a truncated manifest
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Accessory store backed by a manifest file
#[derive(Debug)]
pub struct AccessoryStore {
    path: PathBuf,
    manifest: AccessoryManifest,
}

impl AccessoryStore {
    /// Open the store at `path`, starting empty if the file doesn't exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let manifest = if path.exists() {
            AccessoryManifest::from_file(&path)?
        } else {
            AccessoryManifest::default()
        };
        debug!(
            path = %path.display(),
            count = manifest.accessories.len(),
            "Opened accessory store"
        );
        Ok(Self { path, manifest })
    }

    /// All cached records, each forced to the television category
    pub fn load_cached(&self) -> Vec<AccessoryRecord> {
        self.manifest
            .accessories
            .values()
            .cloned()
            .map(|mut record| {
                record.category = AccessoryCategory::Television;
                record
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.manifest.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.accessories.is_empty()
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.manifest.accessories.contains_key(identity)
    }

    /// Insert or replace records and persist. On error the store is left
    /// unchanged.
    pub fn insert(&mut self, records: &[AccessoryRecord]) -> Result<(), StoreError> {
        let mut next = self.manifest.clone();
        for record in records {
            next.accessories.insert(record.identity, record.clone());
        }
        self.commit(next)
    }

    /// Remove records by identity and persist; returns how many were present.
    /// On error the store is left unchanged.
    pub fn remove(&mut self, identities: &[DeviceIdentity]) -> Result<usize, StoreError> {
        let mut next = self.manifest.clone();
        let removed = identities
            .iter()
            .filter(|id| next.accessories.remove(id).is_some())
            .count();
        self.commit(next)?;
        Ok(removed)
    }

    /// Write `next` to disk, then make it current
    fn commit(&mut self, next: AccessoryManifest) -> Result<(), StoreError> {
        next.save(&self.path)?;
        self.manifest = next;
        Ok(())
    }
}
