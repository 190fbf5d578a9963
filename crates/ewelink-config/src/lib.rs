//! Shared configuration for the eWeLink LAN tools.
//!
//! TOML file + environment loading, access-token resolution (env + keyring
//! + plaintext), and translation to `ewelink_core::DiscoveryConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use ewelink_api::Region;
use ewelink_core::{CloudConfig, DEFAULT_SERVICE_TYPE, DiscoveryConfig, KnownDevice};

const KEYRING_SERVICE: &str = "ewelink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no cloud access token configured for region '{region}'")]
    NoCredentials { region: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub cloud: CloudSection,

    #[serde(default)]
    pub lan: LanSection,

    /// Devices the cloud does not list, keyed by device id.
    #[serde(default)]
    pub known_devices: HashMap<String, KnownDeviceEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Seconds to wait for LAN resolution before giving up on a device.
    #[serde(default = "default_wait")]
    pub wait: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            wait: default_wait(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_wait() -> u64 {
    10
}

/// Cloud directory access.
#[derive(Debug, Deserialize, Serialize)]
pub struct CloudSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Account region: "eu", "us", "as" or "cn".
    #[serde(default = "default_region")]
    pub region: String,

    /// Override the region's API base URL.
    pub api_base: Option<String>,

    /// Access token (plaintext; the keyring and env var take precedence).
    pub access_token: Option<String>,

    /// Environment variable name containing the access token.
    pub access_token_env: Option<String>,
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            enabled: true,
            region: default_region(),
            api_base: None,
            access_token: None,
            access_token_env: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_region() -> String {
    "eu".into()
}

/// LAN discovery and control tuning.
#[derive(Debug, Deserialize, Serialize)]
pub struct LanSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Seconds before a LAN command is abandoned.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    /// Seconds between cloud resyncs. 0 disables.
    #[serde(default = "default_resync_interval")]
    pub resync_interval: u64,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for LanSection {
    fn default() -> Self {
        Self {
            enabled: true,
            service_type: default_service_type(),
            command_timeout: default_command_timeout(),
            resync_interval: default_resync_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.into()
}
fn default_command_timeout() -> u64 {
    5
}
fn default_resync_interval() -> u64 {
    60
}
fn default_event_buffer() -> usize {
    256
}

/// A `[known_devices.<id>]` table.
#[derive(Debug, Deserialize, Serialize)]
pub struct KnownDeviceEntry {
    pub api_key: String,
    #[serde(default)]
    pub brand_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub product_model: String,
    pub device_model: Option<String>,
    /// Outlet count.
    #[serde(default = "default_switches")]
    pub switches: usize,
}

fn default_switches() -> usize {
    1
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("cc", "ewelink", "ewelink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ewelink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered sources: defaults, then the TOML file, then `EWELINK_`
/// environment variables (`EWELINK_CLOUD__REGION=us`).
fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("EWELINK_").split("__"))
}

/// Load the full Config from `path` (or the default location) plus the
/// environment. A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    let config: Config = figment(&path).extract()?;
    Ok(config)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the cloud access token from the credential chain.
pub fn resolve_access_token(cloud: &CloudSection) -> Result<SecretString, ConfigError> {
    // 1. Configured env var
    if let Some(ref env_name) = cloud.access_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{}/access-token", cloud.region)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = cloud.access_token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        region: cloud.region.clone(),
    })
}

/// API base URL: explicit override, else the region default.
pub fn resolve_api_base(cloud: &CloudSection) -> Result<Url, ConfigError> {
    if let Some(ref base) = cloud.api_base {
        return base.parse().map_err(|_| ConfigError::Validation {
            field: "cloud.api_base".into(),
            reason: format!("invalid URL: {base}"),
        });
    }

    let region: Region = cloud.region.parse().map_err(|reason| ConfigError::Validation {
        field: "cloud.region".into(),
        reason,
    })?;
    Ok(region.api_base())
}

fn known_device(device_id: &str, entry: &KnownDeviceEntry) -> Result<KnownDevice, ConfigError> {
    if entry.api_key.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: format!("known_devices.{device_id}.api_key"),
            reason: "must not be empty".into(),
        });
    }

    Ok(KnownDevice {
        api_key: SecretString::from(entry.api_key.clone()),
        brand_name: entry.brand_name.clone(),
        name: entry.name.clone(),
        product_model: entry.product_model.clone(),
        device_model: entry.device_model.clone(),
        switches: entry.switches,
    })
}

/// Build a `DiscoveryConfig` from the loaded configuration.
///
/// With the cloud enabled, a missing access token is an error: setup does
/// not continue with a half-working configuration.
pub fn to_discovery_config(config: &Config) -> Result<DiscoveryConfig, ConfigError> {
    let cloud = if config.cloud.enabled {
        Some(CloudConfig {
            api_base: resolve_api_base(&config.cloud)?,
            access_token: resolve_access_token(&config.cloud)?,
        })
    } else {
        None
    };

    let known_devices = config
        .known_devices
        .iter()
        .map(|(id, entry)| Ok((id.clone(), known_device(id, entry)?)))
        .collect::<Result<HashMap<_, _>, ConfigError>>()?;

    if config.lan.command_timeout == 0 {
        return Err(ConfigError::Validation {
            field: "lan.command_timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    Ok(DiscoveryConfig {
        cloud,
        known_devices,
        command_timeout: Duration::from_secs(config.lan.command_timeout),
        resync_interval: Duration::from_secs(config.lan.resync_interval),
        lan_discovery: config.lan.enabled,
        service_type: config.lan.service_type.clone(),
        event_buffer: config.lan.event_buffer,
    })
}
