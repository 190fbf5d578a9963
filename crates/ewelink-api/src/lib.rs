// ewelink-api: Async Rust client for the eWeLink cloud directory and LAN protocol

pub mod auth;
pub mod cloud;
pub mod crypto;
pub mod error;
pub mod lan;
pub mod models;
pub mod transport;

pub use auth::{CloudSession, Region};
pub use cloud::CloudClient;
pub use error::Error;
pub use lan::LanClient;
pub use models::{ControlResponse, DevicePayload, Envelope, OutletState, PowerState};
