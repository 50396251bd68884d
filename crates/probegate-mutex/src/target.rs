//! Probe targets and their stable registry keys.
//!
//! A [`ProbeTarget`] is a validated, normalized probe URL. Normalization
//! folds only differences that cannot change what goes on the wire:
//!
//! - surrounding whitespace is trimmed
//! - scheme and host are lowercased (userinfo is left alone)
//! - a `#fragment` is dropped
//! - an empty path becomes `/`
//!
//! Path and query are kept byte-for-byte, so `/health` and `/health/` or
//! `?a=1&b=2` and `?b=2&a=1` are different targets.
//!
//! The [`TargetKey`] is the full SHA-256 of the normalized URL, hex encoded.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{MutexError, MutexResult};

/// Stable identifier for a probe destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TargetKey(String);

impl TargetKey {
    /// Hash an already-normalized URL.
    fn from_normalized(url: &str) -> Self {
        Self(hex::encode(Sha256::digest(url.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// A validated probe URL together with its [`TargetKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    url: String,
    key: TargetKey,
    scheme: Scheme,
    host: String,
    port: u16,
    path_and_query: String,
}

impl ProbeTarget {
    /// Validate and normalize `url`.
    pub fn parse(url: &str) -> MutexResult<Self> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(MutexError::EmptyUrl);
        }

        let (raw_scheme, rest) = trimmed
            .split_once("://")
            .filter(|(scheme, _)| !scheme.is_empty())
            .ok_or_else(|| MutexError::MissingScheme(trimmed.to_string()))?;
        let scheme = match raw_scheme.to_ascii_lowercase().as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(MutexError::UnsupportedScheme(other.to_string())),
        };

        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let split = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(split);

        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((user, hp)) => (Some(user), hp),
            None => (None, authority),
        };
        let host_port = host_port.to_ascii_lowercase();
        let (host, port) = split_host_port(&host_port)
            .map_err(|()| MutexError::InvalidPort(trimmed.to_string()))?;
        if host.is_empty() {
            return Err(MutexError::MissingHost(trimmed.to_string()));
        }
        if !is_valid_host(host) {
            return Err(MutexError::InvalidHost(trimmed.to_string()));
        }

        let path_and_query = if tail.is_empty() || tail.starts_with('?') {
            format!("/{tail}")
        } else {
            tail.to_string()
        };

        let authority = match userinfo {
            Some(user) => format!("{user}@{host_port}"),
            None => host_port.clone(),
        };
        let url = format!("{}://{authority}{path_and_query}", scheme.as_str());
        let key = TargetKey::from_normalized(&url);

        Ok(Self {
            url,
            key,
            scheme,
            host: host.to_string(),
            port: port.unwrap_or_else(|| scheme.default_port()),
            path_and_query,
        })
    }

    /// The normalized URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host as it appears in the URL (IPv6 literals keep their brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, or the scheme default.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, suitable for a TCP connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }
}

/// Split `host[:port]`, honoring bracketed IPv6 literals.
fn split_host_port(host_port: &str) -> Result<(&str, Option<u16>), ()> {
    let (host, port) = if host_port.starts_with('[') {
        match host_port.find(']') {
            Some(end) => {
                let (host, rest) = host_port.split_at(end + 1);
                match rest.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None if rest.is_empty() => (host, None),
                    None => return Err(()),
                }
            }
            None => return Err(()),
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };

    match port {
        Some(p) => p.parse::<u16>().map(|p| (host, Some(p))).map_err(|_| ()),
        None => Ok((host, None)),
    }
}

/// RFC 3986 host: a bracketed IP literal or a reg-name of unreserved,
/// percent-encoded and sub-delim characters.
fn is_valid_host(host: &str) -> bool {
    let unreserved = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~');
    let sub_delim = |c: char| "!$&'()*+,;=".contains(c);
    match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(literal) => {
            !literal.is_empty()
                && literal
                    .chars()
                    .all(|c| unreserved(c) || matches!(c, ':' | '%'))
        }
        None => host
            .chars()
            .all(|c| unreserved(c) || sub_delim(c) || c == '%'),
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl FromStr for ProbeTarget {
    type Err = MutexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
