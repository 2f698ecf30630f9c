//! Benchmarks for cassette record, save and replay

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use wsvcr::cassette::{Cassette, Direction};
use wsvcr::transport::LoopbackSocket;
use wsvcr::{InterceptionClient, ReplayScheduling, Socket};

const FRAMES: usize = 1000;

fn seed(temp_dir: &TempDir) {
    let mut cassette = Cassette::open(temp_dir.path(), "bench").unwrap();
    for i in 0..FRAMES {
        cassette
            .record(Direction::Sent, format!("{{\"op\":\"get\",\"id\":{i}}}"))
            .unwrap();
        cassette
            .record(Direction::Received, format!("{{\"id\":{i},\"value\":\"ok\"}}"))
            .unwrap();
    }
    cassette.save().unwrap();
}

fn bench_record_and_save(c: &mut Criterion) {
    c.bench_function("record_and_save_1000", |b| {
        b.iter(|| {
            let temp_dir = TempDir::new().unwrap();
            seed(&temp_dir);
        });
    });
}

fn bench_load(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    seed(&temp_dir);

    c.bench_function("load_1000", |b| {
        b.iter(|| {
            let cassette = Cassette::open(temp_dir.path(), "bench").unwrap();
            black_box(cassette.len());
        });
    });
}

fn bench_replay(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    seed(&temp_dir);

    c.bench_function("replay_1000", |b| {
        b.iter(|| {
            let cassette = Arc::new(Mutex::new(
                Cassette::open(temp_dir.path(), "bench").unwrap(),
            ));
            let client = InterceptionClient::<LoopbackSocket>::replaying(
                cassette,
                ReplayScheduling::Lazy,
                false,
            )
            .unwrap();
            client.on_message(|payload| {
                black_box(payload.len());
            });
            black_box(client.deliver_all().unwrap());
        });
    });
}

criterion_group!(benches, bench_record_and_save, bench_load, bench_replay);
criterion_main!(benches);
