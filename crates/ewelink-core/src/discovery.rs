// ── Discovery orchestrator ──
//
// Populates the device registry from the cloud directory and the
// hand-configured known devices, then follows LAN service announcements to
// give each device an address and feed it state pushes. A background task
// re-merges the cloud listing periodically.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ewelink_api::transport::TransportConfig;
use ewelink_api::{CloudClient, CloudSession, LanClient};

use crate::config::{DiscoveryConfig, KnownDevice};
use crate::device::Device;
use crate::error::CoreError;
use crate::mdns::LanBrowser;
use crate::registry::DeviceRegistry;
use crate::service::{LanEvent, ServiceListener, ServiceRecord};

/// Service instance names look like `eWeLink_<device id>.<type>`.
const SERVICE_NAME_PATTERN: &str = r"(?i)^ewelink_(\w+)";

// ── Discovery ────────────────────────────────────────────────────────

/// Entry point for hosts: owns the registry and every background task.
///
/// Cheaply cloneable via `Arc<DiscoveryInner>`.
#[derive(Clone)]
pub struct Discovery {
    inner: Arc<DiscoveryInner>,
}

struct DiscoveryInner {
    config: DiscoveryConfig,
    registry: Arc<DeviceRegistry>,
    cloud: Option<CloudClient>,
    lan: LanClient,
    service_name: Regex,
    /// Serializes cloud and known-device merges.
    merge_lock: Mutex<()>,
    /// Service name → device, for services seen since startup.
    attached: DashMap<String, Arc<Device>>,
    /// Bumped whenever a device's LAN location changes.
    lan_changes: watch::Sender<u64>,
    browser: std::sync::Mutex<Option<LanBrowser>>,
    /// Set once the periodic cloud resync has been spawned.
    resync_started: AtomicBool,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Discovery {
    /// Build the orchestrator. Nothing is contacted until
    /// [`start()`](Self::start) or [`discover()`](Self::discover).
    ///
    /// Fails with `Configuration` when the cloud credentials are unusable.
    pub fn new(config: DiscoveryConfig) -> Result<Self, CoreError> {
        let lan = LanClient::new(&TransportConfig::lan(config.command_timeout))?;
        let cloud = config
            .cloud
            .as_ref()
            .map(|cloud| {
                let session = CloudSession::new(cloud.api_base.clone(), cloud.access_token.clone());
                CloudClient::new(session, &TransportConfig::default())
            })
            .transpose()?;
        let service_name = Regex::new(SERVICE_NAME_PATTERN)
            .map_err(|e| CoreError::Internal(format!("service name pattern: {e}")))?;
        let (lan_changes, _) = watch::channel(0);

        Ok(Self {
            inner: Arc::new(DiscoveryInner {
                config,
                registry: Arc::new(DeviceRegistry::new()),
                cloud,
                lan,
                service_name,
                merge_lock: Mutex::new(()),
                attached: DashMap::new(),
                lan_changes,
                browser: std::sync::Mutex::new(None),
                resync_started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    /// All registered devices, ordered by id.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.registry.devices()
    }

    pub fn get_device(&self, device_id: &str) -> Option<Arc<Device>> {
        self.inner.registry.get_device(device_id)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run discovery with the configured known devices and spawn the
    /// periodic cloud resync.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.discover(&self.inner.config.known_devices).await?;

        let interval = self.inner.config.resync_interval;
        if self.inner.cloud.is_some()
            && !interval.is_zero()
            && !self.inner.resync_started.swap(true, Ordering::AcqRel)
        {
            let discovery = self.clone();
            let cancel = self.inner.cancel.clone();
            self.inner
                .task_handles
                .lock()
                .await
                .push(tokio::spawn(resync_task(discovery, interval, cancel)));
        }

        info!(devices = self.inner.registry.len(), "discovery started");
        Ok(())
    }

    /// Stop background tasks and the mDNS browser.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let browser = self.inner.browser.lock().expect("browser lock poisoned").take();
        if let Some(mut browser) = browser {
            browser.shutdown();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("discovery stopped");
    }

    // ── Discovery passes ─────────────────────────────────────────────

    /// Merge the cloud listing (failures are logged, not returned), merge
    /// `known_devices`, then make sure LAN browsing is running.
    pub async fn discover(&self, known_devices: &HashMap<String, KnownDevice>) -> Result<(), CoreError> {
        {
            let _guard = self.inner.merge_lock.lock().await;
            if let Err(e) = self.sync_cloud_locked().await {
                warn!(error = %e, "error while trying to retrieve devices list");
            }
            self.merge_known_devices_locked(known_devices);
        }

        if self.inner.config.lan_discovery {
            self.start_lan().await?;
        }
        Ok(())
    }

    /// Merge the cloud listing into the registry. Returns how many devices
    /// were new.
    pub async fn sync_cloud(&self) -> Result<usize, CoreError> {
        let _guard = self.inner.merge_lock.lock().await;
        self.sync_cloud_locked().await
    }

    /// Register every known device whose id is not present yet. Returns how
    /// many were added.
    pub async fn merge_known_devices(&self, known_devices: &HashMap<String, KnownDevice>) -> usize {
        let _guard = self.inner.merge_lock.lock().await;
        self.merge_known_devices_locked(known_devices)
    }

    async fn sync_cloud_locked(&self) -> Result<usize, CoreError> {
        let Some(cloud) = &self.inner.cloud else {
            return Ok(0);
        };

        let payloads = cloud
            .list_devices()
            .await
            .map_err(|e| CoreError::discovery(&e))?;

        let mut added = 0;
        for payload in payloads {
            let device_id = payload.device_id.clone();
            let lan = self.inner.lan.clone();
            let (device, is_new) = self
                .inner
                .registry
                .get_or_insert_with(&device_id, || Device::new(payload, lan));
            if is_new {
                added += 1;
                info!(device_id = %device_id, "found cloud device: {device}");
            }
        }
        Ok(added)
    }

    fn merge_known_devices_locked(&self, known_devices: &HashMap<String, KnownDevice>) -> usize {
        let mut added = 0;
        for (device_id, known) in known_devices {
            let (device, is_new) = self.inner.registry.get_or_insert_with(device_id, || {
                Device::new(known.to_payload(device_id), self.inner.lan.clone())
            });
            if is_new {
                added += 1;
                info!(device_id = %device_id, "added local device: {device}");
            }
        }
        added
    }

    // ── LAN ──────────────────────────────────────────────────────────

    /// Start the mDNS browser and its consumer task, once.
    async fn start_lan(&self) -> Result<(), CoreError> {
        let mut handles = self.inner.task_handles.lock().await;

        let rx = {
            let mut browser = self.inner.browser.lock().expect("browser lock poisoned");
            if browser.is_some() {
                return Ok(());
            }
            let (tx, rx) = mpsc::channel(self.inner.config.event_buffer.max(1));
            *browser = Some(LanBrowser::start(&self.inner.config.service_type, tx)?);
            rx
        };

        let discovery = self.clone();
        let cancel = self.inner.cancel.clone();
        handles.push(tokio::spawn(lan_event_task(discovery, rx, cancel)));
        Ok(())
    }

    /// Apply one LAN event. The first resolve of a service name is an
    /// "added" event, later ones are "updated".
    pub async fn handle_lan_event(&self, event: LanEvent) {
        match event {
            LanEvent::Resolved(record) => {
                if self.inner.attached.contains_key(&record.name) {
                    self.on_service_updated(&record).await;
                } else {
                    self.on_service_added(&record).await;
                }
            }
            LanEvent::Removed { name } => self.on_service_removed(&name).await,
        }
    }

    /// Extract the device id from a service instance name.
    pub fn device_id_from_service_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.inner
            .service_name
            .captures(name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    fn device_for_service(&self, name: &str) -> Option<Arc<Device>> {
        let device_id = self.device_id_from_service_name(name)?;
        self.inner.registry.get_device(device_id)
    }

    /// Point `device` at the address in `record`. Returns whether it moved.
    fn relocate(device: &Device, record: &ServiceRecord) -> bool {
        let location = record.socket_addr();
        if device.location() == location {
            return false;
        }
        device.set_location(location);
        true
    }

    /// Wake `wait_for_device` callers.
    fn notify_lan_change(&self) {
        self.inner.lan_changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Resolve once `device_id` has a LAN address, or fail after `timeout`.
    pub async fn wait_for_device(
        &self,
        device_id: &str,
        timeout: Duration,
    ) -> Result<Arc<Device>, CoreError> {
        let mut changes = self.inner.lan_changes.subscribe();
        let registry = &self.inner.registry;

        let resolved = tokio::time::timeout(timeout, async {
            loop {
                if let Some(device) = registry.get_device(device_id) {
                    if device.control_url().is_some() {
                        return Some(device);
                    }
                }
                if changes.changed().await.is_err() {
                    return None;
                }
            }
        })
        .await;

        match resolved {
            Ok(Some(device)) => Ok(device),
            _ if registry.has_device(device_id) => Err(CoreError::DeviceUnavailable {
                device_id: device_id.to_owned(),
            }),
            _ => Err(CoreError::DeviceNotFound {
                device_id: device_id.to_owned(),
            }),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Switch outlet `outlet` of `device_id` on or off.
    pub async fn set_switch(&self, device_id: &str, outlet: usize, on: bool) -> Result<(), CoreError> {
        let device = self
            .get_device(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: device_id.to_owned(),
            })?;
        let switch = device.switch(outlet).ok_or_else(|| CoreError::SwitchNotFound {
            device_id: device_id.to_owned(),
            index: outlet,
        })?;
        switch.set_state(on).await
    }
}

#[async_trait]
impl ServiceListener for Discovery {
    async fn on_service_added(&self, record: &ServiceRecord) {
        let Some(device) = self.device_for_service(&record.name) else {
            debug!(service = %record.name, "ignoring service for unknown device");
            return;
        };

        let moved = Self::relocate(&device, record);
        match device.location() {
            Some(addr) => info!(device_id = %device.device_id(), "found LAN device {device} -> {addr}"),
            None => warn!(device_id = %device.device_id(), "LAN device {device} resolved without an address"),
        }

        self.inner
            .attached
            .insert(record.name.clone(), Arc::clone(&device));
        // The initial push settles the encryption mode before anyone waiting
        // on this device gets to send.
        device.client().on_service_added(record).await;
        if moved {
            self.notify_lan_change();
        }
    }

    async fn on_service_updated(&self, record: &ServiceRecord) {
        let device = match self.inner.attached.get(&record.name) {
            Some(entry) => Arc::clone(entry.value()),
            None => return,
        };
        let moved = Self::relocate(&device, record);
        device.client().on_service_updated(record).await;
        if moved {
            self.notify_lan_change();
        }
    }

    async fn on_service_removed(&self, name: &str) {
        self.inner.attached.remove(name);
        let Some(device) = self.device_for_service(name) else {
            return;
        };

        info!(device_id = %device.device_id(), "removed LAN device {device}");
        if device.location().is_some() {
            device.set_location(None);
            self.notify_lan_change();
        }
        device.client().on_service_removed(name).await;
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Drain LAN events from the browser thread, one at a time.
async fn lan_event_task(
    discovery: Discovery,
    mut rx: mpsc::Receiver<LanEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                discovery.handle_lan_event(event).await;
            }
        }
    }
}

/// Periodically re-merge the cloud listing.
async fn resync_task(discovery: Discovery, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match discovery.sync_cloud().await {
                    Ok(added) => debug!(added, "cloud resync complete"),
                    Err(e) => warn!(error = %e, "periodic cloud resync failed"),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn offline_config(known: &[(&str, usize)]) -> DiscoveryConfig {
        DiscoveryConfig {
            lan_discovery: false,
            known_devices: known
                .iter()
                .map(|(id, switches)| {
                    (
                        (*id).to_owned(),
                        KnownDevice {
                            api_key: SecretString::from("key".to_string()),
                            brand_name: "SONOFF".into(),
                            name: (*id).to_owned(),
                            product_model: "BASIC".into(),
                            device_model: None,
                            switches: *switches,
                        },
                    )
                })
                .collect(),
            ..DiscoveryConfig::default()
        }
    }

    fn resolved(name: &str, port: u16) -> LanEvent {
        LanEvent::Resolved(ServiceRecord {
            name: name.into(),
            addresses: vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 77))],
            port,
            properties: HashMap::new(),
        })
    }

    #[test]
    fn service_name_extraction() {
        let discovery = Discovery::new(offline_config(&[])).unwrap();
        assert_eq!(
            discovery.device_id_from_service_name("eWeLink_1000abcdef._ewelink._tcp.local."),
            Some("1000abcdef")
        );
        assert_eq!(
            discovery.device_id_from_service_name("EWELINK_10009f._ewelink._tcp.local."),
            Some("10009f")
        );
        assert_eq!(discovery.device_id_from_service_name("shelly_1000abcdef"), None);
    }

    #[tokio::test]
    async fn resolve_and_remove_track_location() {
        let discovery = Discovery::new(offline_config(&[("1000aaaaaa", 1)])).unwrap();
        discovery.start().await.unwrap();

        discovery
            .handle_lan_event(resolved("eWeLink_1000aaaaaa._ewelink._tcp.local.", 8081))
            .await;
        let device = discovery.get_device("1000aaaaaa").unwrap();
        assert_eq!(
            device.location(),
            Some(SocketAddr::from(([192, 168, 1, 77], 8081)))
        );

        discovery
            .handle_lan_event(resolved("eWeLink_1000aaaaaa._ewelink._tcp.local.", 9090))
            .await;
        assert_eq!(device.location().map(|a| a.port()), Some(9090));

        discovery
            .handle_lan_event(LanEvent::Removed {
                name: "eWeLink_1000aaaaaa._ewelink._tcp.local.".into(),
            })
            .await;
        assert!(device.control_url().is_none());
        assert_eq!(discovery.registry().len(), 1);

        discovery.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_service_is_ignored() {
        let discovery = Discovery::new(offline_config(&[("1000aaaaaa", 1)])).unwrap();
        discovery.start().await.unwrap();

        discovery
            .handle_lan_event(resolved("eWeLink_1000ffffff._ewelink._tcp.local.", 8081))
            .await;
        discovery
            .handle_lan_event(resolved("printer._ewelink._tcp.local.", 8081))
            .await;

        assert_eq!(discovery.registry().len(), 1);
        assert!(discovery.get_device("1000aaaaaa").unwrap().location().is_none());
    }

    #[tokio::test]
    async fn wait_for_device_resolves_after_announcement() {
        let discovery = Discovery::new(offline_config(&[("1000aaaaaa", 2)])).unwrap();
        discovery.start().await.unwrap();

        let waiter = {
            let discovery = discovery.clone();
            tokio::spawn(async move {
                discovery
                    .wait_for_device("1000aaaaaa", Duration::from_secs(5))
                    .await
            })
        };
        tokio::task::yield_now().await;
        discovery
            .handle_lan_event(resolved("eWeLink_1000aaaaaa._ewelink._tcp.local.", 8081))
            .await;

        let device = waiter.await.unwrap().unwrap();
        assert_eq!(device.switches().len(), 2);
    }

    #[tokio::test]
    async fn wait_for_device_reports_missing_and_unreachable() {
        let discovery = Discovery::new(offline_config(&[("1000aaaaaa", 1)])).unwrap();
        discovery.start().await.unwrap();

        let missing = discovery
            .wait_for_device("1000ffffff", Duration::from_millis(20))
            .await;
        assert!(matches!(missing, Err(CoreError::DeviceNotFound { .. })));

        let unreachable = discovery
            .wait_for_device("1000aaaaaa", Duration::from_millis(20))
            .await;
        assert!(matches!(unreachable, Err(CoreError::DeviceUnavailable { .. })));
    }

    #[tokio::test]
    async fn set_switch_validates_target() {
        let discovery = Discovery::new(offline_config(&[("1000aaaaaa", 1)])).unwrap();
        discovery.start().await.unwrap();

        assert!(matches!(
            discovery.set_switch("nope", 0, true).await,
            Err(CoreError::DeviceNotFound { .. })
        ));
        assert!(matches!(
            discovery.set_switch("1000aaaaaa", 3, true).await,
            Err(CoreError::SwitchNotFound { index: 3, .. })
        ));
    }

    #[tokio::test]
    async fn second_start_does_not_spawn_another_resync() {
        let config = DiscoveryConfig {
            cloud: Some(crate::config::CloudConfig {
                api_base: url::Url::parse("http://127.0.0.1:9").unwrap(),
                access_token: SecretString::from("token".to_string()),
            }),
            ..offline_config(&[])
        };
        let discovery = Discovery::new(config).unwrap();

        discovery.start().await.unwrap();
        discovery.start().await.unwrap();

        assert_eq!(discovery.inner.task_handles.lock().await.len(), 1);
        discovery.shutdown().await;
    }
}
