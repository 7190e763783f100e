// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Optional usage metering for the CLI. The ledger and the visit sessions are
// loaded from their SQLite snapshot, updated, and written back on every call.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use docwerk_core::config::LedgerConfig;
use docwerk_core::error::Result;
use docwerk_ledger::{
    CallerHints, ConversionStats, Identity, LedgerStore, SessionId, SessionStore, UsageLedger, UsageOutcome,
    UsageStatus,
};
use docwerk_security::file_fingerprint;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One caller's run of related invocations, grouped by `--session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub identity: Identity,
    /// Tools used during the visit, oldest first.
    pub tools: Vec<String>,
}

pub struct Meter {
    store: LedgerStore,
    ledger: UsageLedger,
    sessions: SessionStore<Visit>,
}

/// Local callers are identified by token when one is supplied, else as the
/// loopback address.
pub fn local_identity(token: Option<&str>) -> Identity {
    CallerHints {
        token: token.map(str::to_string),
        ..CallerHints::default()
    }
    .resolve()
}

impl Meter {
    pub fn open(path: &Path, policy: LedgerConfig) -> Result<Self> {
        let store = LedgerStore::open(path)?;
        let sessions = store.load_sessions(session_ttl(&policy), Utc::now())?;
        let ledger = store.load(policy)?;
        Ok(Self {
            store,
            ledger,
            sessions,
        })
    }

    #[cfg(test)]
    fn in_memory(policy: LedgerConfig) -> Result<Self> {
        Ok(Self {
            store: LedgerStore::open_in_memory()?,
            sessions: SessionStore::new(session_ttl(&policy)),
            ledger: UsageLedger::new(policy),
        })
    }

    /// Count one submission of `input` to `tool` and add it to the caller's
    /// visit. Returns the visit's session id, which is new when `session`
    /// is absent, expired, or belongs to someone else.
    pub fn record(
        &mut self,
        identity: &Identity,
        tool: &str,
        input: &[u8],
        file_name: &str,
        session: Option<SessionId>,
    ) -> Result<(UsageOutcome, SessionId)> {
        let now = Utc::now();
        self.ledger.evict_expired(now);
        self.sessions.evict_expired(now);
        let hash = file_fingerprint(input, file_name);
        let outcome = self
            .ledger
            .record_use_at(identity, tool, &hash, input.len() as u64, now);
        let session = self.track_visit(session, identity, tool, now);
        self.store.save(&self.ledger)?;
        self.store.save_sessions(&self.sessions)?;

        if outcome.state == docwerk_ledger::LimitState::Limited {
            warn!(
                count = outcome.usage_count,
                limit = self.ledger.policy().soft_limit,
                "free usage limit reached; sign in to keep your history"
            );
        }
        Ok((outcome, session))
    }

    fn track_visit(
        &mut self,
        session: Option<SessionId>,
        identity: &Identity,
        tool: &str,
        now: DateTime<Utc>,
    ) -> SessionId {
        if let Some(id) = session {
            if let Some(visit) = self.sessions.get_mut(&id, now) {
                if visit.identity == *identity {
                    visit.tools.push(tool.to_string());
                    return id;
                }
            }
            debug!(session = %id, "session unknown or expired, starting a new one");
        }
        self.sessions.create(
            Visit {
                identity: identity.clone(),
                tools: vec![tool.to_string()],
            },
            now,
        )
    }

    /// The live visit for `session`, if any.
    pub fn visit(&self, session: &SessionId) -> Option<&Visit> {
        self.sessions.get(session, Utc::now())
    }

    pub fn attribute(&mut self, identity: &Identity, account_id: &str) -> Result<bool> {
        let linked = self.ledger.attribute_signup(identity, account_id, Utc::now());
        if linked {
            self.store.save(&self.ledger)?;
            info!(%identity, account_id, "signup linked to usage record");
        }
        Ok(linked)
    }

    pub fn status(&self, identity: &Identity) -> UsageStatus {
        self.ledger.status(identity)
    }

    pub fn stats(&self) -> ConversionStats {
        self.ledger.conversion_stats()
    }
}

fn session_ttl(policy: &LedgerConfig) -> Duration {
    Duration::minutes(policy.session_ttl_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwerk_ledger::{IdentityKind, LimitState};

    #[test]
    fn local_identity_prefers_token() {
        assert_eq!(local_identity(Some("anon-1")), Identity::token("anon-1"));
        let fallback = local_identity(None);
        assert_eq!(fallback.kind, IdentityKind::Address);
        assert_eq!(fallback.key, "127.0.0.1");
    }

    #[test]
    fn repeated_file_is_not_counted_twice() {
        let mut meter = Meter::in_memory(LedgerConfig::default()).expect("meter");
        let who = local_identity(None);
        meter.record(&who, "compress", b"%PDF-1.4", "a.pdf", None).expect("record");
        let (again, _) = meter.record(&who, "compress", b"%PDF-1.4", "a.pdf", None).expect("record");
        assert!(again.duplicate);
        assert_eq!(meter.status(&who).count, 1);

        let (second, _) = meter.record(&who, "convert", b"%PDF-1.4", "a.pdf", None).expect("record");
        assert_eq!(second.state, LimitState::Limited);
        assert!(meter.attribute(&who, "acct-1").expect("attribute"));
        assert_eq!(meter.stats().conversions, 1);
    }

    #[test]
    fn meter_persists_between_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("usage.db");
        let who = local_identity(Some("anon-9"));

        let (_, session) = Meter::open(&path, LedgerConfig::default())
            .expect("open")
            .record(&who, "protect", b"doc", "doc.pdf", None)
            .expect("record");

        let mut meter = Meter::open(&path, LedgerConfig::default()).expect("reopen");
        assert_eq!(meter.status(&who).count, 1);

        let (_, same) = meter
            .record(&who, "compress", b"other", "other.pdf", Some(session))
            .expect("record");
        assert_eq!(same, session);
        let visit = meter.visit(&session).expect("live visit");
        assert_eq!(visit.tools, ["protect", "compress"]);
    }

    #[test]
    fn foreign_or_unknown_session_starts_a_new_visit() {
        let mut meter = Meter::in_memory(LedgerConfig::default()).expect("meter");
        let alice = local_identity(Some("anon-a"));
        let bob = local_identity(Some("anon-b"));

        let (_, alices) = meter.record(&alice, "compress", b"a", "a.pdf", None).expect("record");
        let (_, bobs) = meter.record(&bob, "convert", b"b", "b.pdf", Some(alices)).expect("record");
        assert_ne!(bobs, alices);
        assert_eq!(meter.visit(&alices).map(|v| v.tools.len()), Some(1));

        let stranger = SessionId::new();
        let (_, fresh) = meter.record(&alice, "protect", b"c", "c.pdf", Some(stranger)).expect("record");
        assert_ne!(fresh, stranger);
        assert!(meter.visit(&stranger).is_none());
    }

    #[test]
    fn session_lifetime_follows_configuration() {
        let policy = LedgerConfig {
            session_ttl_minutes: 5,
            ..LedgerConfig::default()
        };
        assert_eq!(session_ttl(&policy), Duration::minutes(5));
    }
}
