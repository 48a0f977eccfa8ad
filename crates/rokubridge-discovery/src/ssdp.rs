//! SSDP sweep for ECP devices on the local network

use async_trait::async_trait;
use rokubridge_core::DeviceAddress;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

/// SSDP multicast group
pub const SSDP_MULTICAST: &str = "239.255.255.250:1900";

/// Search target answered by ECP devices
pub const ECP_SEARCH_TARGET: &str = "roku:ecp";

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
}

/// Auto-discovery boundary. A failed sweep fails as a whole.
#[async_trait]
pub trait Sweep: Send + Sync {
    async fn sweep(&self) -> Result<Vec<DeviceAddress>, SweepError>;
}

/// SSDP response headers we care about
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SsdpResponse {
    pub location: String,
    pub st: String,
    pub usn: Option<String>,
}

/// M-SEARCH sweep that collects responders until the timeout elapses
#[derive(Debug, Clone)]
pub struct SsdpSweep {
    timeout: Duration,
    search_target: String,
}

impl SsdpSweep {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            search_target: ECP_SEARCH_TARGET.to_string(),
        }
    }

    fn request(&self) -> String {
        let mx = self.timeout.as_secs().clamp(1, 5);
        format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             \r\n",
            mx, self.search_target
        )
    }

    /// Gather responders until the deadline. A receive error ends the sweep
    /// early but keeps what was already heard.
    async fn collect(&self, socket: &UdpSocket) -> Vec<DeviceAddress> {
        let deadline = Instant::now() + self.timeout;
        let mut buffer = [0u8; 2048];
        let mut found = BTreeSet::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let (size, from) = match timeout(remaining, socket.recv_from(&mut buffer)).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    warn!(error = %e, collected = found.len(), "SSDP receive failed, ending sweep");
                    break;
                }
                Ok(Ok(received)) => received,
            };

            let Ok(text) = std::str::from_utf8(&buffer[..size]) else {
                continue;
            };
            if let Some(address) = self.accept(text, from) {
                found.insert(address);
            }
        }

        found.into_iter().collect()
    }

    /// Address of a matching ECP responder, if `text` is one
    fn accept(&self, text: &str, from: SocketAddr) -> Option<DeviceAddress> {
        let Some(response) = parse_ssdp_response(text) else {
            trace!(from = %from, "Ignoring malformed SSDP response");
            return None;
        };
        if !response.st.eq_ignore_ascii_case(&self.search_target) {
            return None;
        }
        let address = response_address(&response, from)?;
        debug!(address = %address, usn = ?response.usn, "SSDP responder");
        Some(address)
    }
}

#[async_trait]
impl Sweep for SsdpSweep {
    async fn sweep(&self) -> Result<Vec<DeviceAddress>, SweepError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_multicast_loop_v4(true)?;
        socket
            .send_to(self.request().as_bytes(), SSDP_MULTICAST)
            .await?;

        let found = self.collect(&socket).await;
        debug!("SSDP sweep found {} devices", found.len());
        Ok(found)
    }
}

/// Device address from the LOCATION header, falling back to the sender
fn response_address(response: &SsdpResponse, from: SocketAddr) -> Option<DeviceAddress> {
    location_host(&response.location)
        .and_then(|host| DeviceAddress::parse(host).ok())
        .or_else(|| Some(DeviceAddress::from(from.ip())))
}

/// Host part of an `http://host:port/...` URL
fn location_host(location: &str) -> Option<&str> {
    let rest = location
        .strip_prefix("http://")
        .or_else(|| location.strip_prefix("https://"))?;
    let authority = rest.split('/').next()?;

    if let Some(bracketed) = authority.strip_prefix('[') {
        return bracketed.split(']').next();
    }
    match authority.rsplit_once(':') {
        Some((host, _port)) => Some(host),
        None => Some(authority),
    }
}

/// Parse an SSDP response from HTTP text
fn parse_ssdp_response(response: &str) -> Option<SsdpResponse> {
    let mut location = None;
    let mut st = None;
    let mut usn = None;

    for line in response.lines() {
        let line = line.trim();

        if let Some(value) = extract_header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = extract_header_value(line, "ST:") {
            st = Some(value);
        } else if let Some(value) = extract_header_value(line, "USN:") {
            usn = Some(value);
        }
    }

    Some(SsdpResponse {
        location: location?,
        st: st?,
        usn,
    })
}

/// Extract header value from a line like "HEADER: value"
fn extract_header_value(line: &str, header: &str) -> Option<String> {
    let name = line.get(..header.len())?;
    let value = line.get(header.len()..)?;
    if !value.is_empty() && name.eq_ignore_ascii_case(header) {
        Some(value.trim().to_string())
    } else {
        None
    }
}
