#![allow(clippy::unwrap_used)]
// End-to-end switch commands against a mock device endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ewelink_api::crypto;
use ewelink_core::{
    CoreError, Discovery, DiscoveryConfig, KnownDevice, LanEvent, ServiceRecord, StateCallback,
    Switch,
};

// ── Helpers ─────────────────────────────────────────────────────────

const DEVICE_KEY: &str = "0123456789abcdef";

fn known(switches: usize) -> KnownDevice {
    KnownDevice {
        api_key: SecretString::from(DEVICE_KEY.to_string()),
        brand_name: "SONOFF".into(),
        name: "Bench".into(),
        product_model: "4CHPROR3".into(),
        device_model: None,
        switches,
    }
}

fn service_name(device_id: &str) -> String {
    format!("eWeLink_{device_id}._ewelink._tcp.local.")
}

fn record(server: &MockServer, device_id: &str, props: Vec<(&str, Vec<u8>)>) -> ServiceRecord {
    ServiceRecord {
        name: service_name(device_id),
        addresses: vec![server.address().ip()],
        port: server.address().port(),
        properties: props.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
    }
}

/// Discovery with one known device, already resolved to the mock server.
async fn setup(device_id: &str, switches: usize) -> (MockServer, Discovery) {
    let server = MockServer::start().await;
    let config = DiscoveryConfig {
        lan_discovery: false,
        known_devices: HashMap::from([(device_id.to_owned(), known(switches))]),
        ..DiscoveryConfig::default()
    };
    let discovery = Discovery::new(config).unwrap();
    discovery.start().await.unwrap();
    discovery
        .handle_lan_event(LanEvent::Resolved(record(&server, device_id, Vec::new())))
        .await;
    (server, discovery)
}

async fn mount_ok(server: &MockServer, route: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": 0 })))
        .mount(server)
        .await;
}

/// Decoded `data` field of every request the device received.
async fn sent_params(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|req| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            serde_json::from_str(body["data"].as_str().unwrap()).unwrap()
        })
        .collect()
}

struct Counter(AtomicUsize);

#[async_trait]
impl StateCallback for Counter {
    async fn on_state_change(&self, _switch: &Switch, _new_state: bool) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Multi-outlet ────────────────────────────────────────────────────

#[tokio::test]
async fn multi_outlet_command_carries_full_array() {
    let (server, discovery) = setup("1000bbbbbb", 3).await;
    mount_ok(&server, "/zeroconf/switches").await;

    discovery.set_switch("1000bbbbbb", 1, true).await.unwrap();

    assert_eq!(
        sent_params(&server).await,
        vec![json!({ "switches": [
            { "outlet": 0, "switch": "off" },
            { "outlet": 1, "switch": "on" },
            { "outlet": 2, "switch": "off" }
        ] })]
    );
    let device = discovery.get_device("1000bbbbbb").unwrap();
    assert!(device.switch(1).unwrap().get_state());
    assert_eq!(device.params()["switches"][1]["switch"], "on");
}

#[tokio::test]
async fn concurrent_commands_on_sibling_outlets_both_land() {
    let (server, discovery) = setup("1000bbbbbb", 3).await;
    mount_ok(&server, "/zeroconf/switches").await;

    let (a, b) = tokio::join!(
        discovery.set_switch("1000bbbbbb", 0, true),
        discovery.set_switch("1000bbbbbb", 2, true),
    );
    a.unwrap();
    b.unwrap();

    let sent = sent_params(&server).await;
    assert_eq!(sent.len(), 2);
    // Whichever command went second must carry the first one's outlet too.
    assert_eq!(
        sent[1],
        json!({ "switches": [
            { "outlet": 0, "switch": "on" },
            { "outlet": 1, "switch": "off" },
            { "outlet": 2, "switch": "on" }
        ] })
    );

    let device = discovery.get_device("1000bbbbbb").unwrap();
    let states: Vec<bool> = device.switches().iter().map(Switch::get_state).collect();
    assert_eq!(states, [true, false, true]);
}

#[tokio::test]
async fn rejected_command_leaves_state_unchanged() {
    let (server, discovery) = setup("1000bbbbbb", 2).await;
    Mock::given(method("POST"))
        .and(path("/zeroconf/switches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": 400 })))
        .mount(&server)
        .await;

    let device = discovery.get_device("1000bbbbbb").unwrap();
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    device.switch(0).unwrap().add_state_callback("count", counter.clone());

    let result = discovery.set_switch("1000bbbbbb", 0, true).await;

    assert!(matches!(result, Err(CoreError::Protocol { code: Some(400), .. })));
    assert!(!device.switch(0).unwrap().get_state());
    assert_eq!(device.params()["switches"][0]["switch"], "off");
    assert_eq!(counter.0.load(Ordering::SeqCst), 0);
}

// ── Single outlet ───────────────────────────────────────────────────

#[tokio::test]
async fn single_outlet_command_uses_switch_path() {
    let (server, discovery) = setup("1000aaaaaa", 1).await;
    Mock::given(method("POST"))
        .and(path("/zeroconf/switch"))
        .and(body_partial_json(json!({
            "deviceid": "1000aaaaaa",
            "selfApikey": "123",
            "encrypt": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let device = discovery.get_device("1000aaaaaa").unwrap();
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    device.switch(0).unwrap().add_state_callback("count", counter.clone());

    discovery.set_switch("1000aaaaaa", 0, true).await.unwrap();
    // Already on: no second request.
    discovery.set_switch("1000aaaaaa", 0, true).await.unwrap();

    assert_eq!(sent_params(&server).await, vec![json!({ "switch": "on" })]);
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commands_follow_encrypted_push_mode() {
    let (server, discovery) = setup("1000aaaaaa", 1).await;
    mount_ok(&server, "/zeroconf/switch").await;

    let sealed = crypto::encrypt(br#"{"switch":"off"}"#, DEVICE_KEY);
    discovery
        .handle_lan_event(LanEvent::Resolved(record(
            &server,
            "1000aaaaaa",
            vec![
                ("encrypt", b"true".to_vec()),
                ("iv", sealed.iv.into_bytes()),
                ("data1", sealed.data.into_bytes()),
            ],
        )))
        .await;

    discovery.set_switch("1000aaaaaa", 0, true).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["encrypt"], true);
    let plain = crypto::decrypt(
        body["data"].as_str().unwrap(),
        body["iv"].as_str().unwrap(),
        DEVICE_KEY,
    )
    .unwrap();
    assert_eq!(plain, br#"{"switch":"on"}"#);
}

// ── Pushes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_push_turns_single_outlet_on_once() {
    let (server, discovery) = setup("1000aaaaaa", 1).await;
    let device = discovery.get_device("1000aaaaaa").unwrap();
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    device.switch(0).unwrap().add_state_callback("count", counter.clone());

    for _ in 0..2 {
        discovery
            .handle_lan_event(LanEvent::Resolved(record(
                &server,
                "1000aaaaaa",
                vec![("data1", br#"{"switch":"on"}"#.to_vec())],
            )))
            .await;
    }

    assert!(device.switch(0).unwrap().get_state());
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn undecryptable_push_is_dropped() {
    let (server, discovery) = setup("1000aaaaaa", 1).await;
    let sealed = crypto::encrypt(br#"{"switch":"on"}"#, "not-the-device-key");

    discovery
        .handle_lan_event(LanEvent::Resolved(record(
            &server,
            "1000aaaaaa",
            vec![
                ("encrypt", b"true".to_vec()),
                ("iv", sealed.iv.into_bytes()),
                ("data1", sealed.data.into_bytes()),
            ],
        )))
        .await;

    let device = discovery.get_device("1000aaaaaa").unwrap();
    assert!(!device.switch(0).unwrap().get_state());
    assert_eq!(device.params()["switch"], "off");
}
