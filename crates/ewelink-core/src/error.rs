// ── Core error types ──
//
// Domain errors from ewelink-core. Callers never see HTTP status codes or
// JSON parse failures directly: the `From<ewelink_api::Error>` impl folds
// wire-level failures into the transport / protocol / decryption taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Device I/O ───────────────────────────────────────────────────
    /// Network failure or unreachable control URL.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The device answered, but not with `error == 0`.
    #[error("Protocol error: {message}")]
    Protocol { message: String, code: Option<i64> },

    /// A push could not be decrypted with the device key.
    #[error("Decryption failed: {message}")]
    Decryption { message: String },

    // ── Discovery ────────────────────────────────────────────────────
    /// The cloud directory was unreachable or returned an error.
    #[error("Cloud discovery failed: {message}")]
    Discovery { message: String, code: Option<i64> },

    /// The mDNS daemon could not be started or queried.
    #[error("mDNS error: {message}")]
    Mdns { message: String },

    // ── Lookup ───────────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Device {device_id} has no outlet {index}")]
    SwitchNotFound { device_id: String, index: usize },

    /// The device has no resolved LAN address.
    #[error("Device {device_id} is not reachable on the LAN")]
    DeviceUnavailable { device_id: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wrap a cloud directory failure as a discovery error.
    pub fn discovery(err: &ewelink_api::Error) -> Self {
        Self::Discovery {
            message: err.to_string(),
            code: err.api_error_code(),
        }
    }
}

// ── Conversion from wire-level errors ────────────────────────────────

impl From<ewelink_api::Error> for CoreError {
    fn from(err: ewelink_api::Error) -> Self {
        use ewelink_api::Error as Api;

        match err {
            Api::Transport(e) => CoreError::Transport {
                message: e.to_string(),
            },
            Api::Timeout { timeout_secs } => CoreError::Transport {
                message: format!("request timed out after {timeout_secs}s"),
            },
            Api::InvalidUrl(e) => CoreError::Internal(format!("invalid URL: {e}")),
            Api::InvalidCredentials { message } => CoreError::Configuration { message },
            ref e @ (Api::CloudHttp { .. } | Api::CloudApi { .. }) => CoreError::discovery(e),
            Api::LanProtocol { code } => CoreError::Protocol {
                message: format!("device returned error {code}"),
                code: Some(code),
            },
            Api::Decryption { message } => CoreError::Decryption { message },
            Api::Deserialization { message, .. } => CoreError::Protocol {
                message,
                code: None,
            },
        }
    }
}
