// ── LAN service events ──
//
// What the mDNS browser hands to the rest of the crate: a resolved service
// record (address, port, TXT metadata) or a removal. Both the orchestrator
// and each device client consume these through `ServiceListener`.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;

/// A resolved LAN service announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Full service instance name, e.g. `eWeLink_1000abcdef._ewelink._tcp.local.`
    pub name: String,
    pub addresses: Vec<IpAddr>,
    pub port: u16,
    /// Raw TXT properties, keyed by lower-case name.
    pub properties: HashMap<String, Vec<u8>>,
}

impl ServiceRecord {
    /// The first IPv4 address, falling back to any address.
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| self.addresses.first())
            .copied()
    }

    /// `primary_address():port`, when an address was resolved.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.primary_address()
            .map(|ip| SocketAddr::new(ip, self.port))
    }

    pub fn property(&self, key: &str) -> Option<&[u8]> {
        self.properties.get(key).map(Vec::as_slice)
    }
}

/// Raw event forwarded from the browser thread to the async consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanEvent {
    Resolved(ServiceRecord),
    Removed { name: String },
}

/// Receiver of LAN service lifecycle events.
///
/// Implemented by `Discovery` (address resolution) and by each
/// `DeviceClient` (push-message handling).
#[async_trait]
pub trait ServiceListener: Send + Sync {
    async fn on_service_added(&self, record: &ServiceRecord);

    async fn on_service_updated(&self, record: &ServiceRecord);

    async fn on_service_removed(&self, name: &str);
}
