//! Server endpoint parsing.
//!
//! Faktory clients conventionally locate the server with a URL such as
//! `tcp://:secret@jobs.internal:7419`. The password component is optional and
//! percent-decoded; the port falls back to [`DEFAULT_PORT`] when omitted.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

use crate::defaults::DEFAULT_PORT;

const TCP_SCHEME: &str = "tcp";
const TLS_SCHEME: &str = "tcp+tls";

/// Network location of a Faktory server.
///
/// The [`fmt::Display`] implementation never includes the password so the
/// endpoint can be logged safely; converting into a [`String`] keeps it so
/// configuration layers can round-trip the value.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerEndpoint {
    host: String,
    port: u16,
    password: Option<String>,
}

impl ServerEndpoint {
    /// Builds a plain TCP endpoint without a password.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    /// Attaches a password to the endpoint.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Host name or address of the server.
    #[must_use]
    pub const fn host(&self) -> &str {
        self.host.as_str()
    }

    /// TCP port of the server.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Password embedded in the URL, when present.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// `host:port`, with IPv6 literals bracketed.
    fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for ServerEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{TCP_SCHEME}://{}", self.authority())
    }
}

impl From<ServerEndpoint> for String {
    fn from(endpoint: ServerEndpoint) -> Self {
        match &endpoint.password {
            Some(password) => {
                let encoded = utf8_percent_encode(password, NON_ALPHANUMERIC);
                format!("{TCP_SCHEME}://:{encoded}@{}", endpoint.authority())
            }
            None => endpoint.to_string(),
        }
    }
}

impl TryFrom<String> for ServerEndpoint {
    type Error = ServerUrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for ServerEndpoint {
    type Err = ServerUrlError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            TCP_SCHEME => {}
            TLS_SCHEME => return Err(ServerUrlError::TlsUnsupported(redact(&url))),
            other => return Err(ServerUrlError::UnsupportedScheme(other.to_owned())),
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_owned(),
            Some(Host::Ipv4(address)) => address.to_string(),
            Some(Host::Ipv6(address)) => address.to_string(),
            _ => return Err(ServerUrlError::MissingHost(input.to_owned())),
        };
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let password = match url.password() {
            Some(raw) => Some(
                percent_decode_str(raw)
                    .decode_utf8()
                    .map_err(|_| ServerUrlError::InvalidPassword(redact(&url)))?
                    .into_owned(),
            ),
            None => None,
        };

        Ok(Self {
            host,
            port,
            password,
        })
    }
}

fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_password(None).map_or_else(
        |()| format!("{}://<redacted>", url.scheme()),
        |()| redacted.to_string(),
    )
}

/// Errors encountered while parsing a [`ServerEndpoint`] from text.
#[derive(Debug, Error)]
pub enum ServerUrlError {
    /// Scheme was not recognised.
    #[error("unsupported server scheme '{0}', expected 'tcp'")]
    UnsupportedScheme(String),
    /// TLS endpoints are recognised but not supported by this client.
    #[error("TLS server URLs are not supported: {0}")]
    TlsUnsupported(String),
    /// Host name was missing.
    #[error("missing server host in '{0}'")]
    MissingHost(String),
    /// The password component was not valid UTF-8 once decoded.
    #[error("server password in '{0}' is not valid UTF-8")]
    InvalidPassword(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
