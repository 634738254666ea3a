//! Criterion benchmarks for the frame hot path.
//!
//! Key metrics:
//! - Request/fill/publish throughput through a pooled master
//! - Fan-out cost as slaves are added
//! - Cross-buffer reads through the frame cursor
//!
//! Run with: cargo bench --bench frame_pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rogue_core::stream::{FramePool, FramePtr, Master, Slave};
use rogue_core::PoolConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Sink(AtomicUsize);

impl Slave for Sink {
    fn accept_frame(&self, frame: FramePtr) {
        self.0.fetch_add(frame.payload(), Ordering::Relaxed);
    }
}

/// Request, fill and publish one frame per iteration.
fn publish_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    let sizes = [("1KB", 1024), ("16KB", 16 * 1024), ("256KB", 256 * 1024)];

    for (name, size) in sizes {
        let pool = Arc::new(FramePool::new(
            PoolConfig::fixed(4096).with_name("bench").with_cap(0, 256),
        ));
        let master = Master::new("bench");
        master.set_primary(pool.clone());
        master.add_slave(Arc::new(Sink::default()));
        let data = vec![0xA5u8; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("send_frame", name), &size, |b, &size| {
            b.iter(|| {
                let mut frame = master.req_frame(size, true).unwrap();
                frame.write(black_box(&data), 0).unwrap();
                master.send_frame(frame);
            });
        });
    }

    group.finish();
}

/// Publish a small frame to a growing number of slaves.
fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for slaves in [1usize, 4, 16] {
        let master = Master::new("fan_out");
        for _ in 0..slaves {
            master.add_slave(Arc::new(Sink::default()));
        }

        group.bench_with_input(BenchmarkId::from_parameter(slaves), &slaves, |b, _| {
            b.iter(|| {
                let mut frame = master.req_frame(64, true).unwrap();
                frame.write(&[1; 64], 0).unwrap();
                master.send_frame(black_box(frame));
            });
        });
    }

    group.finish();
}

/// Read a chained frame back through the cursor.
fn cursor_read(c: &mut Criterion) {
    let pool = FramePool::new(PoolConfig::fixed(1000).with_name("cursor"));
    let mut frame = pool.accept_req(64_000, true).unwrap();
    frame.write(&vec![7u8; 64_000], 0).unwrap();
    let mut out = vec![0u8; 64_000];

    let mut group = c.benchmark_group("cursor");
    group.throughput(Throughput::Bytes(64_000));
    group.bench_function("read_64_buffers", |b| {
        b.iter(|| {
            let mut iter = frame.iter();
            iter.read_bytes(black_box(&mut out)).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, publish_throughput, fan_out, cursor_read);
criterion_main!(benches);
