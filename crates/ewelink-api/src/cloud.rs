// Cloud directory HTTP client
//
// Lists the devices registered to the account. The directory answers with a
// bare JSON array on success and a `{"error": N}` object on failure, often
// with HTTP 200, so the body shape decides the outcome as much as the status.

use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::CloudSession;
use crate::error::Error;
use crate::models::DevicePayload;
use crate::transport::{TransportConfig, map_send_error};

const DEVICES_PATH: &str = "api/user/device";

/// Raw HTTP client for the cloud device directory.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    session: CloudSession,
    timeout_secs: u64,
}

impl CloudClient {
    /// Create a client for `session`.
    ///
    /// Fails early when the session's token cannot form an auth header.
    pub fn new(session: CloudSession, transport: &TransportConfig) -> Result<Self, Error> {
        session.auth_headers()?;
        let http = transport.build_client()?;
        Ok(Self {
            http,
            session,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, session: CloudSession) -> Self {
        Self {
            http,
            session,
            timeout_secs: TransportConfig::default().timeout_secs(),
        }
    }

    pub fn session(&self) -> &CloudSession {
        &self.session
    }

    /// `GET {api_base}/api/user/device`.
    ///
    /// Entries that fail to parse are logged and skipped rather than failing
    /// the whole listing.
    pub async fn list_devices(&self) -> Result<Vec<DevicePayload>, Error> {
        let url = self.session.endpoint(DEVICES_PATH)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .headers(self.session.auth_headers()?)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        if status != reqwest::StatusCode::OK {
            // Prefer the body's error code when the directory supplied one.
            if let Some(code) = error_code(&body) {
                return Err(Error::CloudApi { code });
            }
            return Err(Error::CloudHttp {
                status: status.as_u16(),
            });
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| Error::deserialization(&e, &body))?;

        match value {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<DevicePayload>(item) {
                    Ok(device) => Some(device),
                    Err(e) => {
                        warn!(error = %e, "skipping malformed device entry");
                        None
                    }
                })
                .collect()),
            Value::Object(ref obj) => match obj.get("error").and_then(Value::as_i64) {
                Some(code) if code != 0 => Err(Error::CloudApi { code }),
                _ => Err(Error::Deserialization {
                    message: "expected a JSON array of devices, got an object".into(),
                    body,
                }),
            },
            _ => Err(Error::Deserialization {
                message: "expected a JSON array of devices".into(),
                body,
            }),
        }
    }
}

fn error_code(body: &str) -> Option<i64> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_i64().filter(|code| *code != 0)
}
