// ── Wire models ──
//
// Serde shapes for the cloud device listing, the LAN control envelope and
// the outlet state entries shared by both directions of the LAN protocol.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::crypto;

/// Fixed `selfApikey` the LAN protocol expects in every envelope.
pub const SELF_API_KEY: &str = "123";

// ── Cloud device listing ─────────────────────────────────────────────

/// One device as returned by `GET /api/user/device`.
///
/// Only the fields the LAN stack needs are typed; everything else the cloud
/// sends is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePayload {
    #[serde(rename = "deviceid")]
    pub device_id: String,
    /// Per-device secret used to derive the LAN encryption key.
    #[serde(rename = "devicekey", default)]
    pub api_key: String,
    #[serde(rename = "brandName", default)]
    pub brand_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "productModel", default)]
    pub product_model: String,
    #[serde(default, deserialize_with = "bool_or_int")]
    pub online: bool,
    #[serde(default)]
    pub extra: Option<DeviceExtra>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl DevicePayload {
    /// Hardware model from `extra.extra.model`, when present.
    pub fn device_model(&self) -> Option<&str> {
        self.extra
            .as_ref()
            .and_then(|e| e.extra.as_ref())
            .and_then(|e| e.model.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceExtra {
    #[serde(default)]
    pub extra: Option<DeviceExtraInner>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceExtraInner {
    #[serde(default)]
    pub model: Option<String>,
}

/// The cloud reports `online` as a JSON bool; older payloads use `0`/`1`.
fn bool_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.as_str(), "true" | "1"),
        _ => false,
    })
}

// ── Outlet state ─────────────────────────────────────────────────────

/// Relay position as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// One entry of a multi-outlet `switches` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletState {
    pub outlet: usize,
    pub switch: PowerState,
}

// ── LAN control envelope ─────────────────────────────────────────────

/// Body POSTed to `/zeroconf/switch` and `/zeroconf/switches`.
///
/// `data` holds the JSON-encoded parameters, either verbatim or as base64
/// ciphertext when `encrypt` is set (with the IV in `iv`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sequence: String,
    #[serde(rename = "deviceid")]
    pub device_id: String,
    #[serde(rename = "selfApikey")]
    pub self_api_key: String,
    pub data: String,
    pub encrypt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
}

impl Envelope {
    /// Plaintext envelope: `data` is the JSON text of `params`.
    pub fn plain(sequence: String, device_id: &str, params: &Map<String, Value>) -> Self {
        Self {
            sequence,
            device_id: device_id.to_owned(),
            self_api_key: SELF_API_KEY.to_owned(),
            data: Value::Object(params.clone()).to_string(),
            encrypt: false,
            iv: None,
        }
    }

    /// Encrypted envelope: `data` is replaced by ciphertext and `iv` is added.
    pub fn encrypted(
        sequence: String,
        device_id: &str,
        params: &Map<String, Value>,
        api_key: &str,
    ) -> Self {
        let mut envelope = Self::plain(sequence, device_id, params);
        let sealed = crypto::encrypt(envelope.data.as_bytes(), api_key);
        envelope.data = sealed.data;
        envelope.iv = Some(sealed.iv);
        envelope.encrypt = true;
        envelope
    }
}

/// Response body of a LAN control call. `error == 0` means success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    #[serde(default)]
    pub error: Option<i64>,
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
