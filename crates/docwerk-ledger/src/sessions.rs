// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Short-lived per-visitor sessions keyed by an opaque random id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::arena::ExpiringArena;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Sessions expire `ttl` after they were last touched.
pub struct SessionStore<S> {
    ttl: Duration,
    sessions: ExpiringArena<SessionId, S>,
}

impl<S> SessionStore<S> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: ExpiringArena::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn create(&mut self, state: S, now: DateTime<Utc>) -> SessionId {
        let id = SessionId::new();
        self.sessions.insert(id, state, now);
        id
    }

    fn live(&self, id: &SessionId, now: DateTime<Utc>) -> bool {
        self.sessions
            .touched_at(id)
            .is_some_and(|touched| now - touched <= self.ttl)
    }

    /// Read a session without extending it. Expired sessions read as absent.
    pub fn get(&self, id: &SessionId, now: DateTime<Utc>) -> Option<&S> {
        if !self.live(id, now) {
            return None;
        }
        self.sessions.get(id)
    }

    /// Mutable access; extends the session's lifetime.
    pub fn get_mut(&mut self, id: &SessionId, now: DateTime<Utc>) -> Option<&mut S> {
        if !self.live(id, now) {
            return None;
        }
        self.sessions.get_mut(id, now)
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<S> {
        self.sessions.remove(id)
    }

    /// Every session with the time it was last touched.
    pub fn entries(&self) -> impl Iterator<Item = (SessionId, &S, DateTime<Utc>)> {
        self.sessions.iter_touched().map(|(id, state, touched)| (*id, state, touched))
    }

    /// Put back a session read from a snapshot, keeping its id and age.
    pub fn restore(&mut self, id: SessionId, state: S, touched: DateTime<Utc>) {
        self.sessions.insert(id, state, touched);
    }

    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let evicted = self.sessions.evict_where(|_, _, touched| now - touched > ttl);
        if evicted > 0 {
            debug!(evicted, "expired sessions evicted");
        }
        evicted
    }
}
