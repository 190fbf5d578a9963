//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ewelink_config::ConfigError;
use ewelink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const CONFIG: i32 = 78;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Setup ────────────────────────────────────────────────────────
    #[error("No cloud access token configured for region '{region}'")]
    #[diagnostic(
        code(ewelink::no_credentials),
        help(
            "Point cloud.access_token_env at a variable holding the token,\n\
             store it in the system keyring (service 'ewelink', entry '{region}/access-token'),\n\
             or run with --no-cloud to use known devices only."
        )
    )]
    NoCredentials { region: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(ewelink::config),
        help("Expected config file at: {path}")
    )]
    Config { message: String, path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ewelink::validation))]
    Validation { field: String, reason: String },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device '{device_id}' not found")]
    #[diagnostic(
        code(ewelink::not_found),
        help("Run: ewelink devices to see known devices")
    )]
    DeviceNotFound { device_id: String },

    #[error("Device '{device_id}' has no outlet {index}")]
    #[diagnostic(code(ewelink::no_outlet))]
    SwitchNotFound { device_id: String, index: usize },

    #[error("Device '{device_id}' did not announce itself on the LAN")]
    #[diagnostic(
        code(ewelink::unreachable),
        help(
            "Check the device is powered, in LAN mode and on this network segment.\n\
             Raise the resolution window with --wait <secs>."
        )
    )]
    DeviceUnreachable { device_id: String },

    // ── Protocol ─────────────────────────────────────────────────────
    #[error("Device rejected the command: {message}")]
    #[diagnostic(code(ewelink::rejected))]
    Rejected { message: String },

    #[error("Could not reach device: {message}")]
    #[diagnostic(code(ewelink::transport))]
    Transport { message: String },

    #[error("Cloud directory request failed: {message}")]
    #[diagnostic(
        code(ewelink::discovery),
        help("The access token may have expired. Refresh it or run with --no-cloud.")
    )]
    Discovery { message: String, code: Option<i64> },

    #[error("mDNS browsing failed: {message}")]
    #[diagnostic(
        code(ewelink::mdns),
        help("LAN discovery needs UDP port 5353 and multicast on the active interface.")
    )]
    Mdns { message: String },

    #[error("{0}")]
    #[diagnostic(code(ewelink::internal))]
    Internal(String),

    #[error(transparent)]
    #[diagnostic(code(ewelink::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoCredentials { .. }
            | Self::Discovery {
                code: Some(401 | 403),
                ..
            } => exit_code::AUTH,
            Self::Config { .. } => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            Self::DeviceNotFound { .. } | Self::SwitchNotFound { .. } => exit_code::NOT_FOUND,
            Self::DeviceUnreachable { .. } => exit_code::TIMEOUT,
            Self::Transport { .. } | Self::Mdns { .. } => exit_code::CONNECTION,
            Self::Rejected { .. } | Self::Discovery { .. } | Self::Internal(_) | Self::Io(_) => {
                exit_code::GENERAL
            }
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceNotFound { device_id } => Self::DeviceNotFound { device_id },
            CoreError::SwitchNotFound { device_id, index } => {
                Self::SwitchNotFound { device_id, index }
            }
            CoreError::DeviceUnavailable { device_id } => Self::DeviceUnreachable { device_id },
            CoreError::Transport { message } => Self::Transport { message },
            CoreError::Protocol { message, .. } | CoreError::Decryption { message } => {
                Self::Rejected { message }
            }
            CoreError::Discovery { message, code } => Self::Discovery { message, code },
            CoreError::Mdns { message } => Self::Mdns { message },
            CoreError::Configuration { message } => Self::Config {
                message,
                path: ewelink_config::config_path().display().to_string(),
            },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { region } => Self::NoCredentials { region },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Figment(e) => Self::Config {
                message: e.to_string(),
                path: ewelink_config::config_path().display().to_string(),
            },
        }
    }
}
