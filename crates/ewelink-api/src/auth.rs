use std::fmt;
use std::str::FromStr;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;

/// Cloud region hosting the account.
///
/// Determines the default API base URL. Accounts live in exactly one region;
/// querying the wrong one yields an auth error, not an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Eu,
    Us,
    As,
    Cn,
}

impl Region {
    /// Default API base URL for this region.
    pub fn api_base(self) -> Url {
        let host = match self {
            Self::Eu => "https://eu-api.coolkit.cc:8080",
            Self::Us => "https://us-api.coolkit.cc:8080",
            Self::As => "https://as-api.coolkit.cc:8080",
            Self::Cn => "https://cn-api.coolkit.cn:8080",
        };
        // Static, known-good literals.
        Url::parse(host).expect("region base URL is valid")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eu => "eu",
            Self::Us => "us",
            Self::As => "as",
            Self::Cn => "cn",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eu" => Ok(Self::Eu),
            "us" => Ok(Self::Us),
            "as" => Ok(Self::As),
            "cn" => Ok(Self::Cn),
            other => Err(format!("expected one of eu, us, as, cn; got '{other}'")),
        }
    }
}

/// An authenticated cloud session: endpoint plus bearer token.
///
/// Obtaining the token (account login) happens outside this crate; the
/// session only knows how to address endpoints and sign requests.
#[derive(Debug, Clone)]
pub struct CloudSession {
    api_base: Url,
    access_token: SecretString,
}

impl CloudSession {
    pub fn new(api_base: Url, access_token: SecretString) -> Self {
        Self {
            api_base,
            access_token,
        }
    }

    /// Session against the default endpoint of `region`.
    pub fn for_region(region: Region, access_token: SecretString) -> Self {
        Self::new(region.api_base(), access_token)
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Resolve an API path (e.g. `api/user/device`) against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.api_base.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Headers every cloud request must carry.
    pub fn auth_headers(&self) -> Result<HeaderMap, Error> {
        let token = self.access_token.expose_secret();
        if token.trim().is_empty() {
            return Err(Error::InvalidCredentials {
                message: "access token is empty".into(),
            });
        }

        let mut value =
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                Error::InvalidCredentials {
                    message: "access token contains characters not allowed in a header".into(),
                }
            })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}
