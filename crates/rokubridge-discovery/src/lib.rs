//! rokubridge discovery - finding media players and keeping accessories in step
//!
//! This crate provides:
//! - SSDP sweep for ECP devices on the local network
//! - Concurrent ECP probing of candidate addresses
//! - Reconciliation of probed devices against known accessories
//! - A scanner that runs discovery cycles and publishes lifecycle changes

pub mod discover;
pub mod probe;
pub mod reconcile;
pub mod scanner;
pub mod sink;
pub mod ssdp;

pub use discover::{collect_candidates, discover, DiscoveryReport};
pub use probe::{probe_hosts, Candidate, ProbeFailure, ProbeOptions};
pub use reconcile::{reconcile, KnownSet, ReconcileOutcome};
pub use scanner::{
    load_cached_or_warn, CycleError, CycleSummary, DiscoveryEvent, DiscoveryScanner,
    ScannerConfig, StaticDevice,
};
pub use sink::{AccessorySink, MemorySink, SinkError};
pub use ssdp::{SsdpSweep, Sweep, SweepError, ECP_SEARCH_TARGET, SSDP_MULTICAST};
