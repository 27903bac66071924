//! Benchmarks for pattern generation and digests.
//!
//! Run with: cargo bench -p flashcheck-core

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flashcheck_core::digest::{digest, digest_reader, DigestAlgorithm};
use flashcheck_core::pattern::{generate, TestPattern};
use flashcheck_core::volume::{MemoryVolume, Volume};
use flashcheck_core::{CapacityMode, CapacityVerifier, TestConfig};
use std::hint::black_box;
use std::io::{Cursor, Write};

/// Pattern generation at the integrity and capacity block sizes
fn bench_patterns(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern");

    let sizes = [(1024 * 1024, "1MB"), (10 * 1024 * 1024, "10MB")];

    for (size, size_name) in sizes {
        group.throughput(Throughput::Bytes(size as u64));
        for &pattern in TestPattern::all() {
            group.bench_with_input(
                BenchmarkId::new(pattern.name(), size_name),
                &size,
                |b, &size| b.iter(|| generate(black_box(pattern), black_box(size))),
            );
        }
    }

    group.finish();
}

/// Digest throughput per algorithm
fn bench_digests(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");

    let sizes = [
        (64 * 1024, "64KB"),
        (1024 * 1024, "1MB"),
        (16 * 1024 * 1024, "16MB"),
    ];

    for (size, size_name) in sizes {
        let data = generate(TestPattern::Random, size);
        group.throughput(Throughput::Bytes(size as u64));

        for algorithm in [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512] {
            group.bench_with_input(
                BenchmarkId::new(algorithm.name(), size_name),
                &data,
                |b, data| b.iter(|| digest(black_box(algorithm), black_box(data))),
            );
        }

        group.bench_with_input(
            BenchmarkId::new("SHA-256 streamed", size_name),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut cursor = Cursor::new(data);
                    digest_reader(DigestAlgorithm::Sha256, black_box(&mut cursor), 64 * 1024)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

/// Capacity write and verify against the in-memory volume
fn bench_capacity_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("capacity");
    let free = 160 * 1024 * 1024;
    group.throughput(Throughput::Bytes(free / 10));

    group.bench_function("fast_16MB", |b| {
        b.iter(|| {
            let vol = MemoryVolume::new("/mnt/bench", free);
            let config = TestConfig::new().fast_block_size(1024 * 1024);
            CapacityVerifier::new(&vol, config, CapacityMode::Fast).run()
        });
    });

    group.bench_function("memory_volume_write_16MB", |b| {
        let block = generate(TestPattern::Incremental, 1024 * 1024);
        b.iter(|| {
            let vol = MemoryVolume::new("/mnt/bench", free);
            let mut file = vol.create_file(&vol.root().join("bench.tmp")).unwrap();
            for _ in 0..16 {
                file.write_all(black_box(&block)).unwrap();
            }
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_patterns, bench_digests, bench_capacity_simulation
}
criterion_main!(benches);
