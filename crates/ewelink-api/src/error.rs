use thiserror::Error;

/// Top-level error type for the `ewelink-api` crate.
///
/// Covers every failure mode across both API surfaces: the cloud device
/// directory and the LAN control endpoint, plus the payload codec.
/// `ewelink-core` maps these into domain diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Cloud directory ─────────────────────────────────────────────
    /// Session material cannot be turned into request headers.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// Non-success HTTP status from the cloud directory.
    #[error("Cloud API returned HTTP {status}")]
    CloudHttp { status: u16 },

    /// Nonzero `error` field in a cloud response body.
    #[error("Cloud API error code {code}")]
    CloudApi { code: i64 },

    // ── LAN control ─────────────────────────────────────────────────
    /// Nonzero (or missing) `error` field in a LAN control response.
    #[error("Device rejected command (error {code})")]
    LanProtocol { code: i64 },

    // ── Codec ───────────────────────────────────────────────────────
    /// Payload could not be decrypted (wrong key, bad padding, corrupt data).
    #[error("Decryption failed: {message}")]
    Decryption { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::CloudHttp { status } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the cloud rejected the session credentials.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(
            self,
            Self::CloudHttp { status: 401 | 403 } | Self::CloudApi { code: 401 | 406 }
        )
    }

    /// The protocol-level error code, if the peer supplied one.
    pub fn api_error_code(&self) -> Option<i64> {
        match self {
            Self::CloudApi { code } | Self::LanProtocol { code } => Some(*code),
            _ => None,
        }
    }

    /// Build a `Deserialization` error with a bounded body preview.
    pub(crate) fn deserialization(err: &serde_json::Error, body: &str) -> Self {
        let preview: String = body.chars().take(200).collect();
        Self::Deserialization {
            message: format!("{err} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
    }
}
