// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Anonymous caller identity: a client-held correlation token when there is
// one, otherwise the caller's network address.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Proxy headers consulted for the client address, in order.
const ADDRESS_HEADERS: [&str; 6] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "cf-connecting-ip",
    "x-cluster-client-ip",
    "forwarded-for",
];

const LOOPBACK: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Token,
    Address,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Address => "address",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub key: String,
    pub kind: IdentityKind,
}

impl Identity {
    pub fn token(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: IdentityKind::Token,
        }
    }

    pub fn address(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: IdentityKind::Address,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.key)
    }
}

/// What the route layer knows about a caller.
#[derive(Debug, Clone, Default)]
pub struct CallerHints {
    pub token: Option<String>,
    /// Request headers; names are matched case-insensitively.
    pub headers: Vec<(String, String)>,
    /// Peer address of the connection, with or without a port.
    pub remote_addr: Option<String>,
}

impl CallerHints {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The token if present, else the best client address.
    pub fn resolve(&self) -> Identity {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Identity::token(token),
            _ => Identity::address(self.client_address()),
        }
    }

    /// First valid address among the proxy headers, then the peer address,
    /// then loopback.
    pub fn client_address(&self) -> String {
        for name in ADDRESS_HEADERS {
            let Some(value) = self.header(name) else {
                continue;
            };
            // Forwarded chains list the original client first.
            let first = value.split(',').next().unwrap_or_default();
            if let Some(ip) = parse_address(first) {
                return ip;
            }
        }
        self.remote_addr
            .as_deref()
            .and_then(parse_address)
            .unwrap_or_else(|| LOOPBACK.to_string())
    }
}

/// Normalise an address, accepting an optional port and the IPv4-mapped
/// IPv6 prefix.
fn parse_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("::ffff:").unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(ip.to_string());
    }
    raw.parse::<SocketAddr>().ok().map(|sock| sock.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(headers: &[(&str, &str)], remote: Option<&str>) -> CallerHints {
        CallerHints {
            token: None,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            remote_addr: remote.map(str::to_string),
        }
    }

    #[test]
    fn token_wins_over_address() {
        let mut h = hints(&[("X-Forwarded-For", "203.0.113.7")], None);
        h.token = Some("  anon-4f2a  ".into());
        assert_eq!(h.resolve(), Identity::token("anon-4f2a"));
    }

    #[test]
    fn blank_token_falls_back_to_address() {
        let mut h = hints(&[], Some("198.51.100.4:51234"));
        h.token = Some("   ".into());
        assert_eq!(h.resolve(), Identity::address("198.51.100.4"));
    }

    #[test]
    fn forwarded_chain_uses_first_hop() {
        let h = hints(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1, 10.0.0.2")], Some("10.0.0.2"));
        assert_eq!(h.client_address(), "203.0.113.7");
    }

    #[test]
    fn invalid_header_is_skipped() {
        let h = hints(
            &[("x-forwarded-for", "unknown"), ("X-Real-IP", "::ffff:192.0.2.10")],
            None,
        );
        assert_eq!(h.client_address(), "192.0.2.10");
    }

    #[test]
    fn ipv6_peer_and_loopback_default() {
        assert_eq!(hints(&[], Some("[2001:db8::1]:443")).client_address(), "2001:db8::1");
        assert_eq!(hints(&[], None).client_address(), "127.0.0.1");
    }

    #[test]
    fn display_names_the_kind() {
        assert_eq!(Identity::address("192.0.2.1").to_string(), "address:192.0.2.1");
    }
}
