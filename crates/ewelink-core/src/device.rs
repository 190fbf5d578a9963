// ── Device entity ──
//
// Identity, LAN location, raw parameter payload and the ordered switch list
// of one physical device. Switches and the device client hold weak back
// references, so a `Device` is always handed out as `Arc<Device>`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use secrecy::SecretString;
use serde::Serialize;
use serde_json::{Map, Value, json};
use url::Url;

use ewelink_api::{DevicePayload, LanClient, PowerState};

use crate::client::DeviceClient;
use crate::switch::Switch;

/// One eWeLink device, shared between the registry, its switches and its
/// LAN client.
pub struct Device {
    device_id: String,
    api_key: SecretString,
    name: String,
    brand: String,
    product_model: String,
    device_model: Option<String>,
    online: bool,
    params: RwLock<Map<String, Value>>,
    location: RwLock<Option<SocketAddr>>,
    switches: Vec<Switch>,
    client: DeviceClient,
}

impl Device {
    /// Build a device from a cloud (or synthesized) payload.
    ///
    /// The switch list is fixed here: a `switch` key yields one switch, a
    /// `switches` array one per entry. Initial states are seeded from the
    /// payload without firing callbacks.
    pub fn new(payload: DevicePayload, lan: LanClient) -> Arc<Self> {
        let device_model = payload.device_model().map(str::to_owned);
        let initial = initial_states(&payload.params);

        Arc::new_cyclic(|this| Self {
            device_id: payload.device_id,
            api_key: SecretString::from(payload.api_key),
            name: payload.name,
            brand: payload.brand_name,
            product_model: payload.product_model,
            device_model,
            online: payload.online,
            params: RwLock::new(payload.params),
            location: RwLock::new(None),
            switches: initial
                .into_iter()
                .enumerate()
                .map(|(index, on)| Switch::new(this.clone(), index, on))
                .collect(),
            client: DeviceClient::new(this.clone(), lan),
        })
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn product_model(&self) -> &str {
        &self.product_model
    }

    pub fn device_model(&self) -> Option<&str> {
        self.device_model.as_deref()
    }

    /// Online flag as reported by the cloud at registration time.
    pub fn is_online(&self) -> bool {
        self.online
    }

    // ── Switches ─────────────────────────────────────────────────────

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn switch(&self, index: usize) -> Option<&Switch> {
        self.switches.get(index)
    }

    pub fn is_multi_switch_device(&self) -> bool {
        self.switches.len() > 1
    }

    pub fn client(&self) -> &DeviceClient {
        &self.client
    }

    // ── Parameters ───────────────────────────────────────────────────

    /// Copy of the last parameter payload.
    pub fn params(&self) -> Map<String, Value> {
        self.params.read().expect("params lock poisoned").clone()
    }

    /// Replace the parameter payload wholesale.
    pub(crate) fn set_params(&self, params: Map<String, Value>) {
        *self.params.write().expect("params lock poisoned") = params;
    }

    /// The full `switches` array with outlet `index` set to `on`.
    ///
    /// Entries are matched on their `outlet` field, then by position. If
    /// the payload has no usable array, one is built from the switch states.
    pub(crate) fn outlets_with(&self, index: usize, on: bool) -> Vec<Value> {
        let state = json!(PowerState::from(on).as_str());
        let mut outlets = match self.params.read().expect("params lock poisoned").get("switches") {
            Some(Value::Array(entries)) => entries.clone(),
            _ => self
                .switches
                .iter()
                .map(|s| json!({ "outlet": s.index(), "switch": PowerState::from(s.get_state()).as_str() }))
                .collect(),
        };

        let position = outlets
            .iter()
            .position(|entry| outlet_of(entry) == Some(index))
            .or_else(|| (index < outlets.len()).then_some(index));

        match position.and_then(|p| outlets.get_mut(p)) {
            Some(Value::Object(entry)) => {
                entry.insert("switch".into(), state);
            }
            Some(other) => *other = json!({ "outlet": index, "switch": state }),
            None => outlets.push(json!({ "outlet": index, "switch": state })),
        }
        outlets
    }

    /// Record a command the device accepted.
    pub(crate) fn commit_param(&self, key: &str, value: Value) {
        self.params
            .write()
            .expect("params lock poisoned")
            .insert(key.to_owned(), value);
    }

    // ── LAN location ─────────────────────────────────────────────────

    pub fn location(&self) -> Option<SocketAddr> {
        *self.location.read().expect("location lock poisoned")
    }

    pub(crate) fn set_location(&self, location: Option<SocketAddr>) {
        *self.location.write().expect("location lock poisoned") = location;
    }

    /// `http://ip:port` once LAN discovery has resolved the device.
    pub fn control_url(&self) -> Option<Url> {
        let addr = self.location()?;
        Url::parse(&format!("http://{addr}")).ok()
    }

    /// Point-in-time view for display and serialization.
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            device_id: self.device_id.clone(),
            name: self.name.clone(),
            brand: self.brand.clone(),
            product_model: self.product_model.clone(),
            device_model: self.device_model.clone(),
            online: self.online,
            address: self.location().map(|a| a.to_string()),
            encrypted: self.client.is_encrypted(),
            outlets: self.switches.iter().map(Switch::get_state).collect(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}) {}",
            self.device_id, self.brand, self.name, self.product_model
        )
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("device_id", &self.device_id)
            .field("name", &self.name)
            .field("location", &self.location())
            .field("switches", &self.switches.len())
            .finish_non_exhaustive()
    }
}

/// Serializable device state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub device_id: String,
    pub name: String,
    pub brand: String,
    pub product_model: String,
    pub device_model: Option<String>,
    pub online: bool,
    pub address: Option<String>,
    pub encrypted: bool,
    pub outlets: Vec<bool>,
}

// ── Payload helpers ──────────────────────────────────────────────────

/// Interpret a switch value: `"on"`/`"off"`, or an object with a `switch`
/// field.
pub(crate) fn power_of(value: &Value) -> Option<bool> {
    match value {
        Value::String(s) => match s.as_str() {
            "on" => Some(true),
            "off" => Some(false),
            _ => None,
        },
        Value::Object(entry) => entry.get("switch").and_then(power_of),
        _ => None,
    }
}

fn outlet_of(entry: &Value) -> Option<usize> {
    entry
        .get("outlet")
        .and_then(Value::as_u64)
        .and_then(|o| usize::try_from(o).ok())
}

fn initial_states(params: &Map<String, Value>) -> Vec<bool> {
    if let Some(value) = params.get("switch") {
        return vec![power_of(value).unwrap_or(false)];
    }
    match params.get("switches") {
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|e| power_of(e).unwrap_or(false))
            .collect(),
        _ => Vec::new(),
    }
}
