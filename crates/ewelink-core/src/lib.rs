// ewelink-core: Device discovery, state synchronisation and LAN control

pub mod client;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod mdns;
pub mod push;
pub mod registry;
pub mod service;
pub mod switch;

pub use client::DeviceClient;
pub use config::{CloudConfig, DEFAULT_SERVICE_TYPE, DiscoveryConfig, KnownDevice};
pub use device::{Device, DeviceSnapshot};
pub use discovery::Discovery;
pub use error::CoreError;
pub use push::PushMessage;
pub use registry::DeviceRegistry;
pub use service::{LanEvent, ServiceListener, ServiceRecord};
pub use switch::{StateCallback, Switch};
