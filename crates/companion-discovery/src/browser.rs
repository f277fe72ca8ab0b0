//! mDNS service browser for Companion-link devices.

use crate::parser::TxtRecordParser;
use crate::COMPANION_SERVICE_TYPE;
use companion_core::error::DiscoveryError;
use companion_core::{CompanionDevice, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

/// Browser over the local network's `_companion-link._tcp` services.
pub struct ServiceBrowser {
    daemon: ServiceDaemon,
}

impl ServiceBrowser {
    /// Create a new service browser.
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::Daemon(format!("failed to create mDNS daemon: {e}")))?;
        Ok(Self { daemon })
    }

    /// Browse for `duration`, returning every device resolved in that window.
    pub async fn browse_for(&self, duration: Duration) -> Result<Vec<CompanionDevice>> {
        let receiver = self
            .daemon
            .browse(COMPANION_SERVICE_TYPE)
            .map_err(|e| DiscoveryError::Daemon(format!("browse failed: {e}")))?;

        let deadline = tokio::time::Instant::now() + duration;
        let mut devices: HashMap<String, CompanionDevice> = HashMap::new();

        loop {
            let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                Ok(Ok(event)) => event,
                Ok(Err(_)) => break, // daemon channel closed
                Err(_) => break,     // window elapsed
            };

            match event {
                ServiceEvent::ServiceResolved(info) => {
                    if let Some(device) = Self::parse_service(&info) {
                        debug!(name = %device.name, port = device.port, "device resolved");
                        devices.insert(info.get_fullname().to_string(), device);
                    }
                }
                ServiceEvent::ServiceRemoved(_, fullname) => {
                    debug!(%fullname, "device removed");
                    devices.remove(&fullname);
                }
                _ => {}
            }
        }

        let _ = self.daemon.stop_browse(COMPANION_SERVICE_TYPE);
        Ok(devices.into_values().collect())
    }

    /// Parse a resolved mDNS service into a device.
    fn parse_service(info: &mdns_sd::ServiceInfo) -> Option<CompanionDevice> {
        let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
        if addresses.is_empty() {
            debug!("service {} has no addresses, skipping", info.get_fullname());
            return None;
        }

        let txt: HashMap<String, String> = info
            .get_properties()
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
            .collect();

        // Instance name without the service-type suffix.
        let name = info
            .get_fullname()
            .split('.')
            .next()
            .unwrap_or(info.get_fullname());

        match TxtRecordParser::parse_companion_txt(name, &txt, addresses, info.get_port()) {
            Ok(device) => Some(device),
            Err(e) => {
                warn!("failed to parse service {}: {e}", info.get_fullname());
                None
            }
        }
    }

    /// Shut the daemon down.
    pub fn shutdown(self) {
        let _ = self.daemon.shutdown();
    }
}
