//! rokubridge Core - Device model, identity, and accessory persistence
//!
//! This crate provides the foundational types for rokubridge:
//! - Device addresses, app descriptors, and probed device snapshots
//! - Stable identity derivation from address + serial number
//! - Accessory records and app exclusion
//! - JSON manifest store for accessories that survive restarts

pub mod accessory;
pub mod device;
pub mod identity;
pub mod store;

pub use accessory::{AccessoryCategory, AccessoryRecord, AppFilter};
pub use device::{AddressError, AppDescriptor, DeviceAddress, ProbedDevice};
pub use identity::DeviceIdentity;
pub use store::{AccessoryStore, StoreError};
