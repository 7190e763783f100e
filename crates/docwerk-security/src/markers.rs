// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Protection markers: password-derived digests and the requested permissions,
// serialised into a single metadata string. A document carrying markers is NOT
// encrypted; the markers only let a cooperating reader check a password.

use chrono::{DateTime, Utc};
use docwerk_core::Permissions;

use crate::integrity::salted_digest;

const PRIMARY_SALT: &str = "docwerk_marker_salt_1";
const SECONDARY_SALT: &str = "docwerk_marker_salt_2";
const TAG: &str = "docwerk-protection";

/// Digests and permissions recorded by the metadata-only protection fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectionMarkers {
    pub primary: String,
    pub secondary: String,
    pub permissions: Permissions,
    pub protected_at: DateTime<Utc>,
}

impl ProtectionMarkers {
    pub fn derive(password: &str, permissions: Permissions, now: DateTime<Utc>) -> Self {
        Self {
            primary: salted_digest(password, PRIMARY_SALT),
            secondary: salted_digest(password, SECONDARY_SALT),
            permissions,
            protected_at: now,
        }
    }

    /// Whether `password` produces both recorded digests.
    pub fn matches(&self, password: &str) -> bool {
        salted_digest(password, PRIMARY_SALT) == self.primary
            && salted_digest(password, SECONDARY_SALT) == self.secondary
    }

    /// Encode as a `;`-separated `key=value` list suitable for a Keywords field.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let permissions = serde_json::to_string(&self.permissions)?;
        Ok(format!(
            "{TAG};permissions={permissions};m1={};m2={};at={}",
            self.primary,
            self.secondary,
            self.protected_at.to_rfc3339()
        ))
    }

    /// Parse a string produced by [`encode`](Self::encode). Returns `None`
    /// when the tag or any field is missing.
    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split(';');
        if parts.next()? != TAG {
            return None;
        }

        let mut permissions = None;
        let mut primary = None;
        let mut secondary = None;
        let mut protected_at = None;
        for part in parts {
            let (key, value) = part.split_once('=')?;
            match key {
                "permissions" => permissions = serde_json::from_str(value).ok(),
                "m1" => primary = Some(value.to_owned()),
                "m2" => secondary = Some(value.to_owned()),
                "at" => {
                    protected_at = DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                }
                _ => {}
            }
        }

        Some(Self {
            primary: primary?,
            secondary: secondary?,
            permissions: permissions?,
            protected_at: protected_at?,
        })
    }

    /// Locate an encoded marker string anywhere inside `haystack`.
    pub fn find_in(haystack: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(haystack);
        let start = text.find(TAG)?;
        let tail = &text[start..];
        let end = tail
            .find(|c: char| c == ')' || c == '\n' || c == '\r')
            .unwrap_or(tail.len());
        Self::decode(&tail[..end])
    }
}
