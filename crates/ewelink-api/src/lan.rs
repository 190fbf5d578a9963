// LAN control HTTP client
//
// Posts command envelopes straight to a device's zeroconf endpoint. One call
// is one attempt: retries would race the device's own state pushes.

use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{ControlResponse, Envelope};
use crate::transport::{TransportConfig, map_send_error};

/// Path for single-outlet commands.
pub const SWITCH_PATH: &str = "/zeroconf/switch";
/// Path for multi-outlet commands.
pub const SWITCHES_PATH: &str = "/zeroconf/switches";

/// Unix time in seconds, as the `sequence` field of an envelope.
pub fn sequence_now() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// HTTP client for the device-local control endpoint.
///
/// Cheap to clone; a single instance is shared by every device client.
#[derive(Debug, Clone)]
pub struct LanClient {
    http: reqwest::Client,
    timeout_secs: u64,
}

impl LanClient {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Create a LAN client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout_secs: TransportConfig::default().timeout_secs(),
        }
    }

    /// POST `envelope` to `control_url + path`.
    ///
    /// Succeeds only when the device answers with `error == 0`. A missing
    /// `error` field is reported as `LanProtocol { code: -1 }`.
    pub async fn send(
        &self,
        control_url: &Url,
        path: &str,
        envelope: &Envelope,
    ) -> Result<ControlResponse, Error> {
        let url = control_url.join(path)?;
        debug!(device_id = %envelope.device_id, encrypt = envelope.encrypt, "POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?
            .error_for_status()
            .map_err(Error::Transport)?;

        let body = resp
            .text()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;
        trace!(body = %body, "control response");

        let parsed: ControlResponse =
            serde_json::from_str(&body).map_err(|e| Error::deserialization(&e, &body))?;

        match parsed.error {
            Some(0) => Ok(parsed),
            Some(code) => Err(Error::LanProtocol { code }),
            None => Err(Error::LanProtocol { code: -1 }),
        }
    }
}
