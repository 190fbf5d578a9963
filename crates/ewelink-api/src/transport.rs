// Shared transport configuration for building reqwest::Client instances.
//
// The cloud directory client and the LAN control client share timeout and
// user-agent settings through this module. LAN commands get a much tighter
// timeout than cloud listing: a hung outlet must not stall the send lock.

use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("ewelink-lan/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total request timeout (connect + send + response body).
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Transport tuned for LAN control: both timeouts bounded by `timeout`.
    pub fn lan(timeout: Duration) -> Self {
        Self {
            timeout,
            connect_timeout: timeout,
        }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.builder().build().map_err(Error::Transport)
    }

    fn builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT)
    }

    /// Timeout in whole seconds, as reported in `Error::Timeout`.
    pub(crate) fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }
}

/// Map a reqwest failure, folding timeouts into `Error::Timeout`.
pub(crate) fn map_send_error(err: reqwest::Error, timeout_secs: u64) -> Error {
    if err.is_timeout() {
        Error::Timeout { timeout_secs }
    } else {
        Error::Transport(err)
    }
}
