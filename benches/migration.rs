//! Benchmarks for store initialization and schema migration.
//!
//! Run with: `cargo bench`

use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion};
use entertainme::{Migrator, MigratorConfig, Repository, RepositoryConfig, StoreLocation};
use tempfile::tempdir;

/// Benchmark initializing an in-memory store at the latest version.
fn bench_init_in_memory(c: &mut Criterion) {
    c.bench_function("init_latest_in_memory", |b| {
        b.iter(|| {
            let repo = Repository::open(RepositoryConfig::in_memory()).unwrap();
            repo.close().unwrap();
        });
    });
}

/// Benchmark initializing a file-backed store at the latest version.
fn bench_init_file(c: &mut Criterion) {
    c.bench_function("init_latest_file", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;

            for _ in 0..iters {
                let dir = tempdir().unwrap();
                let location = StoreLocation::path(dir.path().join("bench.db"));
                let migrator = Migrator::new(MigratorConfig::default());

                let start = Instant::now();
                migrator.run(true, Some(&location), Some("00.06")).unwrap();
                total += start.elapsed();
            }

            total
        });
    });
}

/// Benchmark migrating a file-backed store from the first to the latest version.
fn bench_migrate_file(c: &mut Criterion) {
    c.bench_function("migrate_first_to_latest_file", |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;

            for _ in 0..iters {
                let dir = tempdir().unwrap();
                let location = StoreLocation::path(dir.path().join("bench.db"));
                let migrator = Migrator::new(MigratorConfig::default());
                migrator.run(true, Some(&location), Some("00.01")).unwrap();

                let start = Instant::now();
                migrator.run(false, Some(&location), Some("00.06")).unwrap();
                total += start.elapsed();
            }

            total
        });
    });
}

/// Benchmark opening an up-to-date store (migration is a no-op).
fn bench_open_current(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let location = StoreLocation::path(dir.path().join("bench.db"));
    Repository::open(RepositoryConfig::new(location.clone()))
        .unwrap()
        .close()
        .unwrap();

    c.bench_function("open_current_store", |b| {
        b.iter(|| {
            let repo = Repository::open(RepositoryConfig::new(location.clone())).unwrap();
            repo.close().unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_init_in_memory,
    bench_init_file,
    bench_migrate_file,
    bench_open_current
);
criterion_main!(benches);
