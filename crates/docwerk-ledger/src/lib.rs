// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! docwerk-ledger — metering for callers who have not signed in.
//!
//! The ledger is owned by the caller and passed around by reference; nothing
//! here is process-global. Records and sessions live in an arena with a key
//! index and are evicted explicitly by time.

pub mod arena;
pub mod identity;
pub mod ledger;
pub mod sessions;
pub mod store;

pub use arena::ExpiringArena;
pub use identity::{CallerHints, Identity, IdentityKind};
pub use ledger::{
    Conversion, ConversionStats, LimitState, ProcessedFile, SoftLimitHit, UsageLedger, UsageOutcome,
    UsageRecord, UsageStatus,
};
pub use sessions::{SessionId, SessionStore};
pub use store::LedgerStore;
