// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Anonymous usage ledger.
//
// Counts operations per identity, suppresses duplicate submissions of the
// same file to the same tool, and tracks an advisory soft limit. Reaching the
// limit only changes what `status` reports; nothing is ever blocked here.
// Signup attribution is bookkeeping for analytics and grants nothing.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use docwerk_core::config::LedgerConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::arena::ExpiringArena;
use crate::identity::Identity;

/// One file seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub tool: String,
    pub file_hash: String,
    pub size: u64,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftLimitHit {
    pub at: DateTime<Utc>,
    /// Tool whose use pushed the count to the limit.
    pub tool: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub account_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub identity: Identity,
    pub usage_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Most recent files, oldest first.
    pub recent_files: VecDeque<ProcessedFile>,
    /// Counted uses per tool.
    pub tools: BTreeMap<String, u32>,
    /// Set once, when the count first reaches the limit.
    pub soft_limit: Option<SoftLimitHit>,
    pub converted: Option<Conversion>,
}

impl UsageRecord {
    fn new(identity: Identity, now: DateTime<Utc>) -> Self {
        Self {
            identity,
            usage_count: 0,
            first_seen: now,
            last_seen: now,
            recent_files: VecDeque::new(),
            tools: BTreeMap::new(),
            soft_limit: None,
            converted: None,
        }
    }

    pub fn soft_limit_hit(&self) -> bool {
        self.soft_limit.is_some()
    }

    fn has_processed(&self, tool: &str, file_hash: &str) -> bool {
        self.recent_files
            .iter()
            .any(|f| f.tool == tool && f.file_hash == file_hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitState {
    /// No counted use yet.
    Fresh,
    Active,
    /// At or past the soft limit.
    Limited,
}

impl LimitState {
    pub fn for_count(count: u32, limit: u32) -> Self {
        if count == 0 {
            Self::Fresh
        } else if count < limit {
            Self::Active
        } else {
            Self::Limited
        }
    }
}

/// Result of [`UsageLedger::record_use`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageOutcome {
    pub usage_count: u32,
    pub duplicate: bool,
    pub state: LimitState,
    /// True only on the call that moved the record into `Limited`.
    pub reached_limit: bool,
}

/// Read-only view for deciding whether to prompt for sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageStatus {
    pub count: u32,
    pub limit: u32,
    pub state: LimitState,
    pub should_prompt: bool,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionStats {
    pub total_identities: usize,
    pub soft_limit_hits: usize,
    pub conversions: usize,
    pub average_usage: f64,
    pub total_tool_uses: u64,
    /// Conversions as a percentage of soft-limit hits.
    pub conversion_rate: f64,
    /// Soft-limit hits as a percentage of identities.
    pub soft_limit_rate: f64,
}

pub struct UsageLedger {
    policy: LedgerConfig,
    records: ExpiringArena<Identity, UsageRecord>,
}

impl UsageLedger {
    pub fn new(policy: LedgerConfig) -> Self {
        Self {
            policy,
            records: ExpiringArena::new(),
        }
    }

    pub fn policy(&self) -> &LedgerConfig {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, identity: &Identity) -> Option<&UsageRecord> {
        self.records.get(identity)
    }

    pub fn records(&self) -> impl Iterator<Item = &UsageRecord> {
        self.records.values()
    }

    // -- Accounting -----------------------------------------------------------

    pub fn record_use(&mut self, identity: &Identity, tool: &str, file_hash: &str, size: u64) -> UsageOutcome {
        self.record_use_at(identity, tool, file_hash, size, Utc::now())
    }

    /// Count one use of `tool` on the file with `file_hash`, unless that
    /// exact (tool, file) pair is among this identity's recent files.
    #[instrument(skip(self, identity, file_hash, now), fields(identity = %identity))]
    pub fn record_use_at(
        &mut self,
        identity: &Identity,
        tool: &str,
        file_hash: &str,
        size: u64,
        now: DateTime<Utc>,
    ) -> UsageOutcome {
        let limit = self.policy.soft_limit;
        let keep = self.policy.recent_files.max(1);
        let record = self
            .records
            .get_or_insert_with(identity.clone(), now, || UsageRecord::new(identity.clone(), now));
        record.last_seen = now;

        if record.has_processed(tool, file_hash) {
            debug!(count = record.usage_count, "duplicate submission, not counted");
            return UsageOutcome {
                usage_count: record.usage_count,
                duplicate: true,
                state: LimitState::for_count(record.usage_count, limit),
                reached_limit: false,
            };
        }

        record.usage_count = record.usage_count.saturating_add(1);
        *record.tools.entry(tool.to_string()).or_insert(0) += 1;
        record.recent_files.push_back(ProcessedFile {
            tool: tool.to_string(),
            file_hash: file_hash.to_string(),
            size,
            processed_at: now,
        });
        while record.recent_files.len() > keep {
            record.recent_files.pop_front();
        }

        let mut reached_limit = false;
        if record.usage_count >= limit && record.soft_limit.is_none() {
            record.soft_limit = Some(SoftLimitHit {
                at: now,
                tool: tool.to_string(),
            });
            reached_limit = true;
            info!(count = record.usage_count, limit, "soft limit reached");
        }

        UsageOutcome {
            usage_count: record.usage_count,
            duplicate: false,
            state: LimitState::for_count(record.usage_count, limit),
            reached_limit,
        }
    }

    /// Current standing of `identity`. Unknown identities are fresh.
    pub fn status(&self, identity: &Identity) -> UsageStatus {
        let limit = self.policy.soft_limit;
        let (count, hit) = self
            .records
            .get(identity)
            .map(|r| (r.usage_count, r.soft_limit_hit()))
            .unwrap_or((0, false));
        let state = if hit {
            LimitState::Limited
        } else {
            LimitState::for_count(count, limit)
        };
        UsageStatus {
            count,
            limit,
            state,
            should_prompt: state == LimitState::Limited,
            remaining: limit.saturating_sub(count),
        }
    }

    // -- Attribution ----------------------------------------------------------

    /// Link `account_id` to `identity` when the account was created within
    /// the attribution window after the identity reached its soft limit.
    /// Returns whether a link was made; a record is only ever linked once.
    #[instrument(skip(self, identity, now), fields(identity = %identity))]
    pub fn attribute_signup(&mut self, identity: &Identity, account_id: &str, now: DateTime<Utc>) -> bool {
        let window = Duration::hours(self.policy.attribution_window_hours);
        let Some(record) = self.records.get_mut(identity, now) else {
            return false;
        };
        if record.converted.is_some() {
            return false;
        }
        let Some(hit) = &record.soft_limit else {
            return false;
        };
        let since = now - hit.at;
        if since < Duration::zero() || since > window {
            debug!(hours = since.num_hours(), "signup outside attribution window");
            return false;
        }

        record.converted = Some(Conversion {
            account_id: account_id.to_string(),
            at: now,
        });
        info!(account_id, "signup attributed");
        true
    }

    // -- Retention ------------------------------------------------------------

    /// Drop records idle for longer than the retention window. Converted
    /// records are kept for analytics.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(self.policy.retention_days);
        let evicted = self
            .records
            .evict_where(|_, record, _| record.converted.is_none() && record.last_seen < cutoff);
        if evicted > 0 {
            info!(evicted, remaining = self.records.len(), "expired usage records evicted");
        }
        evicted
    }

    /// Replace the ledger contents with `records`, e.g. from a snapshot.
    pub fn restore(&mut self, records: Vec<UsageRecord>) {
        self.records = ExpiringArena::new();
        for record in records {
            let touched = record.last_seen;
            self.records.insert(record.identity.clone(), record, touched);
        }
    }

    // -- Analytics ------------------------------------------------------------

    pub fn conversion_stats(&self) -> ConversionStats {
        let total = self.records.len();
        let mut hits = 0usize;
        let mut conversions = 0usize;
        let mut usage_sum = 0u64;
        let mut tool_uses = 0u64;
        for record in self.records.values() {
            if record.soft_limit_hit() {
                hits += 1;
            }
            if record.converted.is_some() {
                conversions += 1;
            }
            usage_sum += u64::from(record.usage_count);
            tool_uses += record.tools.values().map(|&n| u64::from(n)).sum::<u64>();
        }

        let pct = |num: usize, den: usize| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64 * 100.0
            }
        };
        ConversionStats {
            total_identities: total,
            soft_limit_hits: hits,
            conversions,
            average_usage: if total == 0 {
                0.0
            } else {
                usage_sum as f64 / total as f64
            },
            total_tool_uses: tool_uses,
            conversion_rate: pct(conversions, hits),
            soft_limit_rate: pct(hits, total),
        }
    }

    /// Tools used by identities that later converted, most used first.
    pub fn tools_before_signup(&self) -> Vec<(String, u32)> {
        let mut totals: BTreeMap<&str, u32> = BTreeMap::new();
        for record in self.records.values().filter(|r| r.converted.is_some()) {
            for (tool, count) in &record.tools {
                *totals.entry(tool.as_str()).or_insert(0) += count;
            }
        }
        let mut ranked: Vec<(String, u32)> = totals
            .into_iter()
            .map(|(tool, count)| (tool.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use docwerk_security::file_fingerprint;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, 14, 0, 0).unwrap()
    }

    fn ledger() -> UsageLedger {
        UsageLedger::new(LedgerConfig::default())
    }

    fn visitor() -> Identity {
        Identity::token("anon-1")
    }

    #[test]
    fn duplicate_file_is_counted_once() {
        let mut ledger = ledger();
        let hash = file_fingerprint(b"%PDF-1.4 contents", "invoice.pdf");

        let first = ledger.record_use_at(&visitor(), "compress", &hash, 17, t0());
        assert_eq!((first.usage_count, first.duplicate), (1, false));

        let again = ledger.record_use_at(&visitor(), "compress", &hash, 17, t0() + Duration::minutes(1));
        assert_eq!((again.usage_count, again.duplicate), (1, true));

        // Same file, different tool: a new use.
        let other = ledger.record_use_at(&visitor(), "protect", &hash, 17, t0() + Duration::minutes(2));
        assert_eq!((other.usage_count, other.duplicate), (2, false));
    }

    #[test]
    fn same_bytes_under_another_name_is_a_new_file() {
        let mut ledger = ledger();
        let a = file_fingerprint(b"same", "a.pdf");
        let b = file_fingerprint(b"same", "b.pdf");
        ledger.record_use_at(&visitor(), "compress", &a, 4, t0());
        let out = ledger.record_use_at(&visitor(), "compress", &b, 4, t0());
        assert_eq!(out.usage_count, 2);
    }

    #[test]
    fn soft_limit_flips_exactly_at_limit_and_stays() {
        let mut ledger = ledger();
        assert_eq!(ledger.status(&visitor()).state, LimitState::Fresh);

        let one = ledger.record_use_at(&visitor(), "compress", "h1", 1, t0());
        assert_eq!(one.state, LimitState::Active);
        assert!(!ledger.status(&visitor()).should_prompt);
        assert_eq!(ledger.status(&visitor()).remaining, 1);

        let two = ledger.record_use_at(&visitor(), "convert", "h2", 1, t0());
        assert!(two.reached_limit);
        assert_eq!(two.state, LimitState::Limited);
        let status = ledger.status(&visitor());
        assert!(status.should_prompt);
        assert_eq!(status.remaining, 0);

        // Still permitted, still counted, flag does not move again.
        let three = ledger.record_use_at(&visitor(), "compress", "h3", 1, t0() + Duration::hours(1));
        assert_eq!(three.usage_count, 3);
        assert!(!three.reached_limit);
        let hit = ledger.record(&visitor()).and_then(|r| r.soft_limit.clone()).expect("hit");
        assert_eq!(hit.at, t0());
        assert_eq!(hit.tool, "convert");
    }

    #[test]
    fn recent_files_are_capped() {
        let mut ledger = ledger();
        for i in 0..25 {
            ledger.record_use_at(&visitor(), "compress", &format!("hash-{i}"), 1, t0());
        }
        let record = ledger.record(&visitor()).expect("record");
        assert_eq!(record.recent_files.len(), 20);
        assert_eq!(record.recent_files.front().map(|f| f.file_hash.as_str()), Some("hash-5"));

        // An evicted fingerprint no longer counts as a duplicate.
        let out = ledger.record_use_at(&visitor(), "compress", "hash-0", 1, t0());
        assert!(!out.duplicate);
    }

    #[test]
    fn signup_attribution_window() {
        let mut ledger = ledger();
        let late = Identity::address("198.51.100.7");
        for who in [visitor(), late.clone()] {
            ledger.record_use_at(&who, "compress", "h1", 1, t0());
            ledger.record_use_at(&who, "compress", "h2", 1, t0());
        }

        assert!(ledger.attribute_signup(&visitor(), "acct-42", t0() + Duration::hours(3)));
        // Linked once; a second signup does not relink.
        assert!(!ledger.attribute_signup(&visitor(), "acct-43", t0() + Duration::hours(4)));
        assert_eq!(
            ledger
                .record(&visitor())
                .and_then(|r| r.converted.as_ref())
                .map(|c| c.account_id.as_str()),
            Some("acct-42")
        );

        assert!(!ledger.attribute_signup(&late, "acct-44", t0() + Duration::hours(25)));
        assert!(!ledger.attribute_signup(&Identity::token("never-seen"), "acct-45", t0()));
    }

    #[test]
    fn attribution_requires_reaching_the_limit() {
        let mut ledger = ledger();
        ledger.record_use_at(&visitor(), "compress", "h1", 1, t0());
        assert!(!ledger.attribute_signup(&visitor(), "acct-1", t0() + Duration::minutes(5)));
        // Access is unaffected either way.
        assert_eq!(ledger.status(&visitor()).count, 1);
    }

    #[test]
    fn eviction_keeps_converted_records() {
        let mut ledger = ledger();
        let idle = Identity::address("192.0.2.1");
        let converted = Identity::address("192.0.2.2");
        let active = Identity::address("192.0.2.3");

        ledger.record_use_at(&idle, "compress", "a", 1, t0());
        ledger.record_use_at(&converted, "compress", "a", 1, t0());
        ledger.record_use_at(&converted, "compress", "b", 1, t0());
        ledger.attribute_signup(&converted, "acct-9", t0() + Duration::hours(1));
        ledger.record_use_at(&active, "compress", "a", 1, t0() + Duration::days(6));

        let evicted = ledger.evict_expired(t0() + Duration::days(8));
        assert_eq!(evicted, 1);
        assert!(ledger.record(&idle).is_none());
        assert!(ledger.record(&converted).is_some());
        assert!(ledger.record(&active).is_some());
    }

    #[test]
    fn conversion_stats_and_tool_ranking() {
        let mut ledger = ledger();
        let a = Identity::token("a");
        let b = Identity::token("b");
        let c = Identity::token("c");
        ledger.record_use_at(&a, "compress", "1", 1, t0());
        ledger.record_use_at(&a, "convert", "2", 1, t0());
        ledger.record_use_at(&a, "convert", "3", 1, t0());
        ledger.record_use_at(&b, "protect", "1", 1, t0());
        ledger.record_use_at(&b, "protect", "2", 1, t0());
        ledger.record_use_at(&c, "compress", "1", 1, t0());
        ledger.attribute_signup(&a, "acct-a", t0() + Duration::hours(2));

        let stats = ledger.conversion_stats();
        assert_eq!(stats.total_identities, 3);
        assert_eq!(stats.soft_limit_hits, 2);
        assert_eq!(stats.conversions, 1);
        assert_eq!(stats.total_tool_uses, 6);
        assert_eq!(stats.conversion_rate, 50.0);
        assert!((stats.soft_limit_rate - 66.666).abs() < 0.01);
        assert_eq!(stats.average_usage, 2.0);

        assert_eq!(
            ledger.tools_before_signup(),
            vec![("convert".to_string(), 2), ("compress".to_string(), 1)]
        );
    }

    #[test]
    fn restore_replaces_contents() {
        let mut source = ledger();
        source.record_use_at(&visitor(), "compress", "h", 1, t0());
        let snapshot: Vec<UsageRecord> = source.records().cloned().collect();

        let mut target = ledger();
        target.record_use_at(&Identity::token("other"), "compress", "h", 1, t0());
        target.restore(snapshot);
        assert_eq!(target.len(), 1);
        assert_eq!(target.status(&visitor()).count, 1);
    }
}
