// ── Device client ──
//
// Bridge between one Device and its LAN peer. Outbound: builds and sends
// command envelopes, one at a time per device. Inbound: decodes the state
// pushes carried in service metadata and fans them out to the switches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use ewelink_api::lan::{SWITCH_PATH, SWITCHES_PATH, sequence_now};
use ewelink_api::{ControlResponse, Envelope, LanClient, OutletState, PowerState, crypto};

use crate::device::{Device, power_of};
use crate::error::CoreError;
use crate::push::PushMessage;
use crate::service::{ServiceListener, ServiceRecord};

/// LAN transport for a single device.
pub struct DeviceClient {
    device: Weak<Device>,
    lan: LanClient,
    /// At most one command in flight per device.
    send_lock: Mutex<()>,
    /// Mode of the last observed push; outbound commands follow it.
    encrypted: AtomicBool,
}

impl DeviceClient {
    pub(crate) fn new(device: Weak<Device>, lan: LanClient) -> Self {
        Self {
            device,
            lan,
            send_lock: Mutex::new(()),
            encrypted: AtomicBool::new(false),
        }
    }

    fn device(&self) -> Result<Arc<Device>, CoreError> {
        self.device
            .upgrade()
            .ok_or_else(|| CoreError::Internal("device client outlived its device".into()))
    }

    /// Whether commands are currently sent encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted.load(Ordering::Acquire)
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Send `params` to `path` on the device.
    ///
    /// A single attempt: fails with `DeviceUnavailable` when the device has
    /// no LAN address, and with the transport or protocol error otherwise.
    pub async fn send(
        &self,
        path: &str,
        params: &Map<String, Value>,
    ) -> Result<ControlResponse, CoreError> {
        let device = self.device()?;
        let _guard = self.send_lock.lock().await;
        self.send_locked(&device, path, params).await
    }

    /// Send a switch command, routed by outlet count. Returns whether the
    /// device accepted it.
    pub async fn send_switch_command(&self, params: &Map<String, Value>) -> bool {
        let Ok(device) = self.device() else {
            return false;
        };
        let path = if device.is_multi_switch_device() {
            SWITCHES_PATH
        } else {
            SWITCH_PATH
        };
        self.send(path, params).await.is_ok()
    }

    /// Command outlet `index` to `on`.
    ///
    /// For multi-outlet devices the whole `switches` array is read, mutated
    /// and committed back to the device params under the send lock, so
    /// concurrent commands to sibling outlets never overwrite each other.
    pub(crate) async fn send_switch_state(&self, index: usize, on: bool) -> Result<(), CoreError> {
        let device = self.device()?;
        let _guard = self.send_lock.lock().await;

        let mut params = Map::new();
        if device.is_multi_switch_device() {
            let outlets = Value::Array(device.outlets_with(index, on));
            params.insert("switches".into(), outlets.clone());
            self.send_locked(&device, SWITCHES_PATH, &params).await?;
            device.commit_param("switches", outlets);
        } else {
            let state = json!(PowerState::from(on).as_str());
            params.insert("switch".into(), state.clone());
            self.send_locked(&device, SWITCH_PATH, &params).await?;
            device.commit_param("switch", state);
        }
        Ok(())
    }

    async fn send_locked(
        &self,
        device: &Device,
        path: &str,
        params: &Map<String, Value>,
    ) -> Result<ControlResponse, CoreError> {
        let Some(url) = device.control_url() else {
            error!(device_id = %device.device_id(), "device does not have a local address");
            return Err(CoreError::DeviceUnavailable {
                device_id: device.device_id().to_owned(),
            });
        };

        let sequence = sequence_now();
        let envelope = if self.is_encrypted() {
            Envelope::encrypted(
                sequence,
                device.device_id(),
                params,
                device.api_key().expose_secret(),
            )
        } else {
            Envelope::plain(sequence, device.device_id(), params)
        };

        self.lan.send(&url, path, &envelope).await.map_err(|e| {
            error!(device_id = %device.device_id(), error = %e, "error while sending command to device");
            CoreError::from(e)
        })
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Apply a plaintext push: replace the params, then update switches.
    pub async fn handle_message(&self, raw: &[u8]) -> Result<(), CoreError> {
        let device = self.device()?;
        let params: Map<String, Value> =
            serde_json::from_slice(raw).map_err(|e| CoreError::Protocol {
                message: format!("invalid push payload: {e}"),
                code: None,
            })?;

        device.set_params(params.clone());

        if let Some(on) = params.get("switch").and_then(power_of) {
            if let Some(switch) = device.switch(0) {
                switch.update_state(on).await;
            }
        } else if let Some(Value::Array(entries)) = params.get("switches") {
            for entry in entries {
                let outlet = match OutletState::deserialize(entry) {
                    Ok(outlet) => outlet,
                    Err(e) => {
                        debug!(device_id = %device.device_id(), error = %e, "skipping malformed outlet entry");
                        continue;
                    }
                };
                match device.switch(outlet.outlet) {
                    Some(switch) => {
                        switch.update_state(outlet.switch.is_on()).await;
                    }
                    None => debug!(
                        device_id = %device.device_id(),
                        outlet = outlet.outlet,
                        "push references an outlet the device does not have"
                    ),
                }
            }
        }
        Ok(())
    }

    /// Decrypt a push, then apply it. A push that fails to decrypt changes
    /// nothing.
    pub async fn handle_encrypted_message(&self, data: &[u8], iv: &[u8]) -> Result<(), CoreError> {
        let device = self.device()?;
        let plain = crypto::decrypt(data, iv, device.api_key().expose_secret()).map_err(|e| {
            error!(device_id = %device.device_id(), error = %e, "error decrypting push");
            CoreError::from(e)
        })?;
        self.handle_message(&plain).await
    }

    /// Consume the state push carried by a service record and remember
    /// whether it was encrypted.
    pub async fn update_service(&self, record: &ServiceRecord) {
        let Some(push) = PushMessage::from_record(record) else {
            debug!(service = %record.name, "service record carries no state push");
            return;
        };

        let encrypted = push.is_encrypted();
        let result = match push {
            PushMessage::Plain(raw) => self.handle_message(&raw).await,
            PushMessage::Encrypted { data, iv } => self.handle_encrypted_message(&data, &iv).await,
        };
        self.encrypted.store(encrypted, Ordering::Release);

        if let Err(e) = result {
            warn!(service = %record.name, error = %e, "dropped push update");
        }
    }
}

#[async_trait]
impl ServiceListener for DeviceClient {
    async fn on_service_added(&self, record: &ServiceRecord) {
        self.update_service(record).await;
    }

    async fn on_service_updated(&self, record: &ServiceRecord) {
        self.update_service(record).await;
    }

    async fn on_service_removed(&self, name: &str) {
        debug!(service = %name, "device service went away");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::tests::device_with_params;
    use std::collections::HashMap;

    fn push_record(props: Vec<(&str, Vec<u8>)>) -> ServiceRecord {
        ServiceRecord {
            name: "eWeLink_a._ewelink._tcp.local.".into(),
            addresses: Vec::new(),
            port: 8081,
            properties: props
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn plain_push_updates_single_outlet() {
        let device = device_with_params("a", json!({ "switch": "off" }));
        device.client().handle_message(br#"{"switch":"on"}"#).await.unwrap();

        assert!(device.switch(0).unwrap().get_state());
        assert_eq!(device.params()["switch"], "on");
    }

    #[tokio::test]
    async fn push_replaces_params_wholesale() {
        let device = device_with_params("a", json!({ "switch": "off", "rssi": -40 }));
        device
            .client()
            .handle_message(br#"{"switch":"off","fwVersion":"3.6.0"}"#)
            .await
            .unwrap();

        let params = device.params();
        assert!(!params.contains_key("rssi"));
        assert_eq!(params["fwVersion"], "3.6.0");
    }

    #[tokio::test]
    async fn out_of_range_outlet_is_skipped() {
        let device = device_with_params(
            "b",
            json!({ "switches": [
                { "outlet": 0, "switch": "off" },
                { "outlet": 1, "switch": "off" }
            ] }),
        );
        device
            .client()
            .handle_message(
                br#"{"switches":[{"outlet":1,"switch":"on"},{"outlet":3,"switch":"on"}]}"#,
            )
            .await
            .unwrap();

        assert!(!device.switch(0).unwrap().get_state());
        assert!(device.switch(1).unwrap().get_state());
    }

    #[tokio::test]
    async fn invalid_json_push_is_an_error() {
        let device = device_with_params("a", json!({ "switch": "off" }));
        let result = device.client().handle_message(b"not json").await;
        assert!(matches!(result, Err(CoreError::Protocol { .. })));
        assert_eq!(device.params()["switch"], "off");
    }

    #[tokio::test]
    async fn encrypted_push_with_wrong_key_changes_nothing() {
        let device = device_with_params("a", json!({ "switch": "off" }));
        let sealed = crypto::encrypt(br#"{"switch":"on"}"#, "some-other-key");

        let result = device
            .client()
            .handle_encrypted_message(sealed.data.as_bytes(), sealed.iv.as_bytes())
            .await;

        assert!(matches!(result, Err(CoreError::Decryption { .. })));
        assert!(!device.switch(0).unwrap().get_state());
    }

    #[tokio::test]
    async fn update_service_tracks_encryption_mode() {
        let device = device_with_params("a", json!({ "switch": "off" }));
        let client = device.client();

        let sealed = crypto::encrypt(br#"{"switch":"on"}"#, "test-key");
        client
            .update_service(&push_record(vec![
                ("encrypt", b"true".to_vec()),
                ("iv", sealed.iv.into_bytes()),
                ("data1", sealed.data.into_bytes()),
            ]))
            .await;
        assert!(client.is_encrypted());
        assert!(device.switch(0).unwrap().get_state());

        client
            .update_service(&push_record(vec![("data1", br#"{"switch":"off"}"#.to_vec())]))
            .await;
        assert!(!client.is_encrypted());
        assert!(!device.switch(0).unwrap().get_state());
    }
}
