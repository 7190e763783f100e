// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite snapshots of the usage ledger.
//
// Schema:
//   usage_records(
//     identity   TEXT PRIMARY KEY,   -- "kind:key"
//     last_seen  TEXT NOT NULL,      -- RFC 3339
//     record     TEXT NOT NULL       -- JSON-encoded UsageRecord
//   )
//   sessions(
//     id         TEXT PRIMARY KEY,   -- SessionId
//     touched_at TEXT NOT NULL,      -- RFC 3339
//     state      TEXT NOT NULL       -- JSON-encoded session state
//   )

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use docwerk_core::config::LedgerConfig;
use docwerk_core::error::{DocwerkError, Result};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::ledger::{UsageLedger, UsageRecord};
use crate::sessions::{SessionId, SessionStore};

fn db_err(e: rusqlite::Error) -> DocwerkError {
    DocwerkError::Database(e.to_string())
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS usage_records (
    identity  TEXT PRIMARY KEY,
    last_seen TEXT NOT NULL,
    record    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sessions (
    id         TEXT PRIMARY KEY,
    touched_at TEXT NOT NULL,
    state      TEXT NOT NULL
);";

pub struct LedgerStore {
    conn: Connection,
}

impl LedgerStore {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("ledger store opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn })
    }

    /// Replace the stored snapshot with the ledger's current records.
    #[instrument(skip_all, fields(records = ledger.len()))]
    pub fn save(&self, ledger: &UsageLedger) -> Result<()> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        tx.execute("DELETE FROM usage_records", []).map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO usage_records (identity, last_seen, record)
                     VALUES (?1, ?2, ?3)",
                )
                .map_err(db_err)?;
            for record in ledger.records() {
                let json = serde_json::to_string(record)?;
                stmt.execute(params![
                    record.identity.to_string(),
                    record.last_seen.to_rfc3339(),
                    json
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        info!("ledger snapshot saved");
        Ok(())
    }

    /// Rebuild a ledger from the stored snapshot under `policy`.
    pub fn load(&self, policy: LedgerConfig) -> Result<UsageLedger> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM usage_records ORDER BY last_seen ASC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let json = row.map_err(db_err)?;
            let record: UsageRecord = serde_json::from_str(&json)?;
            records.push(record);
        }

        let mut ledger = UsageLedger::new(policy);
        ledger.restore(records);
        debug!(records = ledger.len(), "ledger snapshot loaded");
        Ok(ledger)
    }

    /// Replace the stored sessions with the ones in `sessions`.
    #[instrument(skip_all, fields(sessions = sessions.len()))]
    pub fn save_sessions<S: Serialize>(&self, sessions: &SessionStore<S>) -> Result<()> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        tx.execute("DELETE FROM sessions", []).map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO sessions (id, touched_at, state) VALUES (?1, ?2, ?3)")
                .map_err(db_err)?;
            for (id, state, touched) in sessions.entries() {
                let json = serde_json::to_string(state)?;
                stmt.execute(params![id.to_string(), touched.to_rfc3339(), json])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        debug!("sessions saved");
        Ok(())
    }

    /// Rebuild a session store with lifetime `ttl`. Sessions already past
    /// their lifetime at `now` are dropped.
    pub fn load_sessions<S: DeserializeOwned>(&self, ttl: Duration, now: DateTime<Utc>) -> Result<SessionStore<S>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, touched_at, state FROM sessions")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut sessions = SessionStore::new(ttl);
        for row in rows {
            let (id, touched, json) = row.map_err(db_err)?;
            let id: SessionId = id
                .parse()
                .map_err(|e| DocwerkError::Database(format!("bad session id {id}: {e}")))?;
            let touched = DateTime::parse_from_rfc3339(&touched)
                .map_err(|e| DocwerkError::Database(format!("bad session timestamp: {e}")))?
                .with_timezone(&Utc);
            sessions.restore(id, serde_json::from_str(&json)?, touched);
        }
        let expired = sessions.evict_expired(now);
        debug!(sessions = sessions.len(), expired, "sessions loaded");
        Ok(sessions)
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM usage_records", [], |row| row.get(0))
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use chrono::{Duration, TimeZone, Utc};

    fn populated() -> UsageLedger {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let mut ledger = UsageLedger::new(LedgerConfig::default());
        let converted = Identity::token("anon-7");
        ledger.record_use_at(&converted, "compress", "a", 10, t0);
        ledger.record_use_at(&converted, "convert", "b", 20, t0);
        ledger.attribute_signup(&converted, "acct-7", t0 + Duration::hours(2));
        ledger.record_use_at(&Identity::address("203.0.113.9"), "protect", "c", 30, t0);
        ledger
    }

    #[test]
    fn snapshot_survives_a_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.db");

        let ledger = populated();
        LedgerStore::open(&path).expect("open").save(&ledger).expect("save");

        let store = LedgerStore::open(&path).expect("reopen");
        assert_eq!(store.count().expect("count"), 2);
        let restored = store.load(LedgerConfig::default()).expect("load");

        let record = restored.record(&Identity::token("anon-7")).expect("record");
        assert_eq!(record.usage_count, 2);
        assert_eq!(record.converted.as_ref().map(|c| c.account_id.as_str()), Some("acct-7"));
        assert!(record.soft_limit_hit());
        assert_eq!(restored.conversion_stats(), ledger.conversion_stats());
    }

    #[test]
    fn sessions_survive_a_reopen_until_they_expire() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.db");
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();

        let mut sessions = SessionStore::new(Duration::minutes(30));
        let fresh = sessions.create(vec!["compress".to_string()], t0 + Duration::minutes(20));
        let stale = sessions.create(vec!["convert".to_string()], t0);
        LedgerStore::open(&path)
            .expect("open")
            .save_sessions(&sessions)
            .expect("save");

        let store = LedgerStore::open(&path).expect("reopen");
        let now = t0 + Duration::minutes(40);
        let loaded: SessionStore<Vec<String>> = store.load_sessions(Duration::minutes(30), now).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&fresh, now).map(|tools| tools[0].as_str()), Some("compress"));
        assert!(loaded.get(&stale, now).is_none());
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let store = LedgerStore::open_in_memory().expect("open");
        store.save(&populated()).expect("save");
        store
            .save(&UsageLedger::new(LedgerConfig::default()))
            .expect("save empty");
        assert_eq!(store.count().expect("count"), 0);
        assert!(store.load(LedgerConfig::default()).expect("load").is_empty());
    }
}
