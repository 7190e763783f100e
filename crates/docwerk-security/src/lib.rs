// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! docwerk-security — hashing and encryption primitives.
//!
//! Fingerprints identify files for the usage ledger, protection markers record
//! a password-derived digest inside documents that could not be encrypted, and
//! the passphrase envelope seals whole files for the seal and unseal operations.

pub mod envelope;
pub mod integrity;
pub mod markers;

pub use envelope::PassphraseEnvelope;
pub use integrity::{file_fingerprint, hash_bytes};
pub use markers::ProtectionMarkers;
