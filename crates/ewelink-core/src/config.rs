// ── Runtime discovery configuration ──
//
// These types describe *what* to discover and how to reach it. They carry
// credential data and timing, but never touch disk: the CLI (or any other
// host) builds a `DiscoveryConfig` and hands it in.

use std::collections::HashMap;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use url::Url;

use ewelink_api::DevicePayload;
use ewelink_api::models::{DeviceExtra, DeviceExtraInner};

/// mDNS service type advertised by eWeLink devices in LAN mode.
pub const DEFAULT_SERVICE_TYPE: &str = "_ewelink._tcp.local.";

/// Cloud directory endpoint and bearer token.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub api_base: Url,
    pub access_token: SecretString,
}

/// A device configured by hand because the cloud never lists it.
#[derive(Debug, Clone)]
pub struct KnownDevice {
    pub api_key: SecretString,
    pub brand_name: String,
    pub name: String,
    pub product_model: String,
    pub device_model: Option<String>,
    /// Number of outlets. `0` registers a device with no switches.
    pub switches: usize,
}

impl KnownDevice {
    /// Synthesize the payload the cloud would have returned for this device:
    /// online, with every outlet initialised off.
    pub fn to_payload(&self, device_id: &str) -> DevicePayload {
        let mut params = Map::new();
        match self.switches {
            0 => {}
            1 => {
                params.insert("switch".into(), json!("off"));
            }
            n => {
                let outlets: Vec<Value> = (0..n)
                    .map(|outlet| json!({ "outlet": outlet, "switch": "off" }))
                    .collect();
                params.insert("switches".into(), Value::Array(outlets));
            }
        }

        DevicePayload {
            device_id: device_id.to_owned(),
            api_key: self.api_key.expose_secret().to_owned(),
            brand_name: self.brand_name.clone(),
            name: self.name.clone(),
            product_model: self.product_model.clone(),
            online: true,
            extra: Some(DeviceExtra {
                extra: Some(DeviceExtraInner {
                    model: self.device_model.clone(),
                }),
            }),
            params,
        }
    }
}

/// Everything `Discovery` needs to run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Cloud directory to enumerate. `None` runs LAN + known devices only.
    pub cloud: Option<CloudConfig>,
    /// Devices to register even when the cloud does not list them.
    pub known_devices: HashMap<String, KnownDevice>,
    /// Upper bound on a single LAN command round trip.
    pub command_timeout: Duration,
    /// How often the cloud directory is re-merged. Zero disables resync.
    pub resync_interval: Duration,
    /// Browse the LAN for devices. Off gives a cloud/known-devices listing
    /// with no addresses.
    pub lan_discovery: bool,
    /// mDNS service type to browse.
    pub service_type: String,
    /// Capacity of the listener → consumer event channel.
    pub event_buffer: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cloud: None,
            known_devices: HashMap::new(),
            command_timeout: Duration::from_secs(5),
            resync_interval: Duration::from_secs(60),
            lan_discovery: true,
            service_type: DEFAULT_SERVICE_TYPE.into(),
            event_buffer: 256,
        }
    }
}
