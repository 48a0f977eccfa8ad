//! Concurrent ECP probing of candidate addresses

use rokubridge_core::{DeviceAddress, ProbedDevice};
use rokubridge_ecp::{probe_device, DeviceClient, ProbeError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// An address to probe, with the configured name for static devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: DeviceAddress,
    pub name: Option<String>,
}

/// Why an address produced no device this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub address: DeviceAddress,
    pub error: ProbeError,
}

/// Probe limits
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    /// Upper bound for one address (both queries together)
    pub timeout: Duration,
    /// Maximum probes in flight; unbounded when `None`
    pub max_concurrent: Option<usize>,
}

/// Probe every candidate concurrently.
///
/// Each probe runs in its own task under its own timeout, so a dead or slow
/// device never holds up the others. Failures are logged and returned
/// separately; they never abort sibling probes. Successful results are
/// sorted by address.
pub async fn probe_hosts(
    client: Arc<dyn DeviceClient>,
    candidates: Vec<Candidate>,
    options: ProbeOptions,
) -> (Vec<ProbedDevice>, Vec<ProbeFailure>) {
    let total = candidates.len();
    let limiter = options
        .max_concurrent
        .map(|n| Arc::new(Semaphore::new(n.max(1))));

    let mut tasks = JoinSet::new();
    for candidate in candidates {
        let client = client.clone();
        let limiter = limiter.clone();
        let probe_timeout = options.timeout;

        tasks.spawn(async move {
            let _permit = match limiter {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };

            let address = candidate.address;
            let result = match timeout(
                probe_timeout,
                probe_device(client.as_ref(), &address, candidate.name.as_deref()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout(address.clone())),
            };
            (address, result)
        });
    }

    let mut devices = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((address, Ok(device))) => {
                info!(address = %address, name = %device.display_name, "Found device");
                devices.push(device);
            }
            Ok((address, Err(error))) => {
                warn!(address = %address, error = %error, "Error probing device");
                failures.push(ProbeFailure { address, error });
            }
            Err(e) => {
                warn!(error = %e, "Probe task failed");
            }
        }
    }

    devices.sort_by(|a, b| a.address.cmp(&b.address));
    failures.sort_by(|a, b| a.address.cmp(&b.address));

    debug!(
        "Probed {} addresses, {} devices, {} failures",
        total,
        devices.len(),
        failures.len()
    );
    (devices, failures)
}
