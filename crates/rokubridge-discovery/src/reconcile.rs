//! Reconciliation of probed devices against known accessories
//!
//! Reachability is the only source of truth: every probed identity is either
//! new or an update, and every known identity that was not probed this cycle
//! is stale. An empty probe set therefore retracts every accessory.

use rokubridge_core::{AccessoryRecord, AppFilter, DeviceIdentity, ProbedDevice};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Accessories currently registered, keyed by identity
#[derive(Debug, Clone, Default)]
pub struct KnownSet {
    records: BTreeMap<DeviceIdentity, AccessoryRecord>,
}

impl KnownSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from previously persisted records
    pub fn seeded(records: impl IntoIterator<Item = AccessoryRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.identity, r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.records.contains_key(identity)
    }

    pub fn get(&self, identity: &DeviceIdentity) -> Option<&AccessoryRecord> {
        self.records.get(identity)
    }

    pub fn identities(&self) -> impl Iterator<Item = &DeviceIdentity> {
        self.records.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = &AccessoryRecord> {
        self.records.values()
    }

    pub(crate) fn insert(&mut self, record: AccessoryRecord) {
        self.records.insert(record.identity, record);
    }

    pub(crate) fn remove(&mut self, identity: &DeviceIdentity) -> Option<AccessoryRecord> {
        self.records.remove(identity)
    }
}

/// Lifecycle instructions produced by one reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Newly reachable devices, to be registered
    pub to_add: Vec<AccessoryRecord>,
    /// Known devices refreshed in place
    pub to_update: Vec<AccessoryRecord>,
    /// Known devices not probed this cycle, to be unregistered
    pub to_remove: Vec<AccessoryRecord>,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Classify probed devices into new / updated / stale and bring `known` to
/// the new steady state.
///
/// Excluded apps are stripped before a record is built or refreshed. When two
/// probed devices share an identity the later one wins. Completion order of
/// the probes does not matter: classification is keyed by identity only.
pub fn reconcile(
    known: &mut KnownSet,
    devices: Vec<ProbedDevice>,
    filter: &AppFilter,
) -> ReconcileOutcome {
    let mut order: Vec<DeviceIdentity> = Vec::with_capacity(devices.len());
    let mut latest: HashMap<DeviceIdentity, ProbedDevice> = HashMap::with_capacity(devices.len());
    for device in devices {
        let identity = device.identity();
        if let Some(superseded) = latest.insert(identity, device) {
            debug!(
                identity = %identity,
                address = %superseded.address,
                "Superseding duplicate probe result"
            );
        } else {
            order.push(identity);
        }
    }

    let mut outcome = ReconcileOutcome::default();
    for identity in &order {
        let Some(device) = latest.remove(identity) else {
            continue;
        };

        match known.records.get_mut(identity) {
            Some(record) => {
                debug!(identity = %identity, name = %device.display_name, "Device already exists");
                record.refresh(&device, filter);
                outcome.to_update.push(record.clone());
            }
            None => {
                debug!(identity = %identity, name = %device.display_name, "Discovered new device");
                let record = AccessoryRecord::from_probe(&device, filter);
                known.insert(record.clone());
                outcome.to_add.push(record);
            }
        }
    }

    let seen: HashSet<DeviceIdentity> = order.into_iter().collect();
    let stale: Vec<DeviceIdentity> = known
        .identities()
        .filter(|identity| !seen.contains(identity))
        .copied()
        .collect();
    for identity in stale {
        if let Some(record) = known.remove(&identity) {
            outcome.to_remove.push(record);
        }
    }

    outcome
}
