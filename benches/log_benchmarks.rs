//! Log Benchmarks - Append, Read, and Recovery Paths
//!
//! ## Benchmark Path Types
//!
//! - `append_*`: Log::append through the active segment (encode, write, index)
//! - `read_*`: Log::read through the offset index and forward scan
//! - `recovery_*`: Log::open over existing files (tail scan, index rebuild)
//!
//! ## Durability Modes
//!
//! Append benchmarks label their sync policy:
//! - `on_demand`: no fsync inside append
//! - `every_append`: fsync after every append
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench log_benchmarks
//! cargo bench --bench log_benchmarks -- "read_"  # specific group
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gregor::{Log, LogConfig, Record, SyncPolicy};
use tempfile::TempDir;

// =============================================================================
// Test Utilities - All allocation happens here, outside timed loops
// =============================================================================

fn record_of(size: usize) -> Record {
    Record::new(b"bench-key".to_vec(), vec![0x5A; size])
}

fn populated_log(count: u64, value_size: usize, config: LogConfig) -> (TempDir, Log) {
    let dir = TempDir::new().unwrap();
    let log = Log::open(dir.path(), config).unwrap();
    let record = record_of(value_size);
    for _ in 0..count {
        log.append(&record).unwrap();
    }
    log.flush().unwrap();
    (dir, log)
}

// =============================================================================
// Append
// =============================================================================

fn append_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_on_demand");
    for size in [64usize, 1024, 16 * 1024] {
        let record = record_of(size);
        group.throughput(Throughput::Bytes(record.encoded_len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &record, |b, record| {
            let dir = TempDir::new().unwrap();
            let log = Log::open(dir.path(), LogConfig::default()).unwrap();
            b.iter(|| black_box(log.append(record).unwrap()));
        });
    }
    group.finish();

    let mut group = c.benchmark_group("append_every_append");
    group.sample_size(20);
    let record = record_of(256);
    group.throughput(Throughput::Elements(1));
    group.bench_function("256", |b| {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::default().with_sync_policy(SyncPolicy::EveryAppend);
        let log = Log::open(dir.path(), config).unwrap();
        b.iter(|| black_box(log.append(&record).unwrap()));
    });
    group.finish();
}

// =============================================================================
// Read
// =============================================================================

fn read_benchmarks(c: &mut Criterion) {
    const COUNT: u64 = 50_000;

    let mut group = c.benchmark_group("read_batch");
    for interval in [1u64, 8, 64] {
        let (_dir, log) = populated_log(COUNT, 128, LogConfig::default().with_index_interval(interval));
        group.throughput(Throughput::Elements(100));
        group.bench_with_input(
            BenchmarkId::new("index_interval", interval),
            &log,
            |b, log| {
                let mut start = 0u64;
                b.iter(|| {
                    start = (start + 7_919) % (COUNT - 100);
                    black_box(log.read(start, 100).unwrap())
                });
            },
        );
    }
    group.finish();
}

// =============================================================================
// Recovery
// =============================================================================

fn recovery_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery_open");
    group.sample_size(10);
    for count in [1_000u64, 10_000] {
        let (dir, log) = populated_log(count, 128, LogConfig::default());
        log.close().unwrap();
        drop(log);

        group.bench_with_input(BenchmarkId::from_parameter(count), &dir, |b, dir| {
            b.iter(|| black_box(Log::open(dir.path(), LogConfig::default()).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    append_benchmarks,
    read_benchmarks,
    recovery_benchmarks
);
criterion_main!(benches);
