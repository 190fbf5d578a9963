// ── mDNS browser bridge ──
//
// `mdns-sd` delivers events on a blocking channel. A dedicated thread drains
// it and forwards resolved/removed services into a bounded tokio channel,
// where a single async consumer does all decoding and state updates.

use std::collections::HashMap;
use std::net::IpAddr;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::service::{LanEvent, ServiceRecord};

/// A running mDNS browse for one service type.
pub struct LanBrowser {
    daemon: ServiceDaemon,
    service_type: String,
    stopped: bool,
}

impl LanBrowser {
    /// Start browsing `service_type`, forwarding events into `tx`.
    pub fn start(service_type: &str, tx: mpsc::Sender<LanEvent>) -> Result<Self, CoreError> {
        let daemon = ServiceDaemon::new().map_err(|e| CoreError::Mdns {
            message: format!("failed to start mDNS daemon: {e}"),
        })?;
        let receiver = daemon.browse(service_type).map_err(|e| CoreError::Mdns {
            message: format!("failed to browse {service_type}: {e}"),
        })?;

        let browsed = service_type.to_owned();
        std::thread::Builder::new()
            .name("ewelink-mdns".into())
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    let Some(event) = translate(&browsed, event) else {
                        continue;
                    };
                    if tx.blocking_send(event).is_err() {
                        debug!("LAN event consumer gone, stopping browser thread");
                        break;
                    }
                }
                trace!("mDNS browser thread exiting");
            })
            .map_err(|e| CoreError::Mdns {
                message: format!("failed to spawn browser thread: {e}"),
            })?;

        debug!(service_type, "mDNS browse started");
        Ok(Self {
            daemon,
            service_type: service_type.to_owned(),
            stopped: false,
        })
    }

    /// Stop browsing and shut the daemon down. The forwarding thread exits
    /// once the daemon closes its channel.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            debug!(error = %e, "stop_browse failed");
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!(error = %e, "mDNS daemon shutdown failed");
        }
    }
}

impl Drop for LanBrowser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn translate(service_type: &str, event: ServiceEvent) -> Option<LanEvent> {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            let properties: HashMap<String, Vec<u8>> = info
                .get_properties()
                .iter()
                .map(|prop| {
                    (
                        prop.key().to_ascii_lowercase(),
                        prop.val().map(<[u8]>::to_vec).unwrap_or_default(),
                    )
                })
                .collect();
            let mut addresses: Vec<IpAddr> = info
                .get_addresses_v4()
                .into_iter()
                .map(|addr| IpAddr::V4(*addr))
                .collect();
            addresses.sort();

            trace!(service = %info.get_fullname(), port = info.get_port(), "service resolved");
            Some(LanEvent::Resolved(ServiceRecord {
                name: info.get_fullname().to_owned(),
                addresses,
                port: info.get_port(),
                properties,
            }))
        }
        ServiceEvent::ServiceRemoved(ty, fullname) if ty == service_type => {
            trace!(service = %fullname, "service removed");
            Some(LanEvent::Removed { name: fullname })
        }
        _ => None,
    }
}
