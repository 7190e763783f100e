// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for engine argument construction.

use std::path::Path;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use docwerk_core::{DocumentFormat, Permissions, QualityTier};
use docwerk_ops::compression::{ghostscript_args, qpdf_args};
use docwerk_ops::conversion::office_args;
use docwerk_ops::protection::{ghostscript_encrypt_args, pdf_permission_bits, qpdf_encrypt_args};
use docwerk_ops::TierProfile;

fn bench_compression_args(c: &mut Criterion) {
    let input = Path::new("/tmp/docwerk-bench/input.pdf");
    let output = Path::new("/tmp/docwerk-bench/output.pdf");

    let mut group = c.benchmark_group("compression_args");
    for tier in QualityTier::ALL {
        let profile = TierProfile::for_tier(tier);
        group.bench_function(tier.as_str(), |b| {
            b.iter(|| {
                black_box(ghostscript_args(black_box(&profile), input, output));
                black_box(qpdf_args(black_box(&profile), input, output));
            });
        });
    }
    group.finish();
}

fn bench_protection_args(c: &mut Criterion) {
    let permissions = Permissions::default();
    let input = Path::new("in.pdf");
    let output = Path::new("out.pdf");

    c.bench_function("permission bits", |b| {
        b.iter(|| black_box(pdf_permission_bits(black_box(&permissions))));
    });
    c.bench_function("encryption argv (qpdf + gs)", |b| {
        b.iter(|| {
            black_box(qpdf_encrypt_args("correct horse", &permissions, input, output));
            black_box(ghostscript_encrypt_args("correct horse", &permissions, input, output));
        });
    });
}

fn bench_office_args(c: &mut Criterion) {
    c.bench_function("office argv pdf->docx", |b| {
        b.iter(|| {
            black_box(office_args(
                DocumentFormat::Pdf,
                DocumentFormat::Docx,
                Path::new("/w/input.pdf"),
                Path::new("/w/out"),
                Path::new("/w/profile"),
            ))
        });
    });
}

criterion_group!(benches, bench_compression_args, bench_protection_args, bench_office_args);
criterion_main!(benches);
