//! Relay target endpoints.

use super::StreamDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ingest URL the agent pushes the relay to, e.g.
/// `rtmp://a.rtmp.example.com/live2/<stream-key>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelayTarget {
    url: String,
    scheme_len: usize,
    host_start: usize,
    host_end: usize,
    port: u16,
}

impl RelayTarget {
    /// Parses and validates a relay URL.
    ///
    /// # Errors
    ///
    /// Returns [`StreamDomainError::InvalidRelayTarget`] when the scheme or
    /// host is missing or the port is not a number.
    pub fn parse(value: impl Into<String>) -> Result<Self, StreamDomainError> {
        let url = value.into().trim().to_owned();
        let invalid = || StreamDomainError::InvalidRelayTarget(url.clone());

        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return Err(invalid());
        }
        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, default_port(scheme)),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let scheme_len = scheme.len();
        let host_start = scheme_len + "://".len();
        let host_end = host_start + host.len();
        Ok(Self {
            url,
            scheme_len,
            host_start,
            host_end,
            port,
        })
    }

    /// Returns the full URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Returns the lowercase scheme.
    #[must_use]
    pub fn scheme(&self) -> String {
        self.url
            .get(..self.scheme_len)
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    /// Returns the lowercase host.
    #[must_use]
    pub fn host(&self) -> String {
        self.url
            .get(self.host_start..self.host_end)
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    /// Returns the explicit or scheme-default port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the `scheme://host:port` key that circuit state is tracked
    /// under.
    #[must_use]
    pub fn endpoint_key(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host(), self.port)
    }

    /// Replaces the `from` prefix with `to`, keeping the remainder (usually
    /// the stream key) intact.
    ///
    /// Returns `None` when the URL does not start with `from` or the result
    /// does not parse.
    #[must_use]
    pub fn rebase(&self, from: &str, to: &str) -> Option<Self> {
        let remainder = self.url.strip_prefix(from)?;
        Self::parse(format!("{to}{remainder}")).ok()
    }
}

const fn default_port_for(scheme: &[u8]) -> u16 {
    match scheme {
        b"rtmps" | b"https" => 443,
        b"srt" => 9_000,
        b"http" => 80,
        _ => 1_935,
    }
}

fn default_port(scheme: &str) -> u16 {
    default_port_for(scheme.to_ascii_lowercase().as_bytes())
}

impl fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl TryFrom<String> for RelayTarget {
    type Error = StreamDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RelayTarget> for String {
    fn from(value: RelayTarget) -> Self {
        value.url
    }
}
