// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for ledger accounting.

use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use docwerk_core::config::LedgerConfig;
use docwerk_ledger::{Identity, UsageLedger};
use docwerk_security::file_fingerprint;

fn bench_record_use(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
    let hashes: Vec<String> = (0..64)
        .map(|i| file_fingerprint(format!("document {i}").as_bytes(), "bench.pdf"))
        .collect();
    let identities: Vec<Identity> = (0..1_000)
        .map(|i| Identity::address(format!("10.0.{}.{}", i / 256, i % 256)))
        .collect();

    c.bench_function("record_use 1k identities", |b| {
        b.iter(|| {
            let mut ledger = UsageLedger::new(LedgerConfig::default());
            for (i, who) in identities.iter().enumerate() {
                let hash = &hashes[i % hashes.len()];
                black_box(ledger.record_use_at(who, "compress", hash, 1024, now));
            }
            ledger
        });
    });

    let mut ledger = UsageLedger::new(LedgerConfig::default());
    for (i, who) in identities.iter().enumerate() {
        ledger.record_use_at(who, "convert", &hashes[i % hashes.len()], 1024, now);
    }
    c.bench_function("duplicate lookup", |b| {
        b.iter(|| black_box(ledger.record_use_at(&identities[500], "convert", &hashes[500 % 64], 1024, now)));
    });
    c.bench_function("status + stats", |b| {
        b.iter(|| {
            black_box(ledger.status(black_box(&identities[42])));
            black_box(ledger.conversion_stats());
        });
    });

    c.bench_function("evict_expired (none due)", |b| {
        b.iter(|| black_box(ledger.evict_expired(now + Duration::days(1))));
    });
}

criterion_group!(benches, bench_record_use);
criterion_main!(benches);
