// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SHA-256 digests for file identity and password markers.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Fingerprint of a submitted file: SHA-256 over the content followed by the
/// file name. The same bytes under a different name count as a different file.
pub fn file_fingerprint(content: &[u8], file_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.update(file_name.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 of `secret` concatenated with `salt`.
pub fn salted_digest(secret: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}
