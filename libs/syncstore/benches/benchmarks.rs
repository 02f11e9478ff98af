//! Benchmarks for syncstore
//!
//! Run with: cargo bench -p syncstore

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use syncstore::registry::{IdentityKey, TargetId};
use syncstore::{store, with_default, BroadcastChannel, Emitter, MemoryStorage, Origin};

fn bench_emitter(c: &mut Criterion) {
    let emitter = Emitter::<u64>::new();
    let _subs: Vec<_> = (0..16)
        .map(|_| {
            emitter.subscribe(|value| {
                black_box(value);
            })
        })
        .collect();

    c.bench_function("emitter_emit_16_listeners", |b| {
        b.iter(|| emitter.emit(black_box(&42)))
    });
}

fn bench_store(c: &mut Criterion) {
    let counter = store::<i64>()
        .key("counter")
        .validator(with_default(0))
        .build(Arc::new(MemoryStorage::new()));

    c.bench_function("store_set", |b| {
        b.iter(|| counter.set(black_box(7)).unwrap())
    });
    c.bench_function("store_get", |b| b.iter(|| black_box(counter.get().unwrap())));
}

fn bench_cross_tab(c: &mut Criterion) {
    let origin = Origin::new("https://bench.local");
    let tab_a = origin.open_tab();
    let tab_b = origin.open_tab();
    let local_a = Arc::new(tab_a.local());
    let local_b = Arc::new(tab_b.local());

    let writer = store::<i64>()
        .key("counter")
        .validator(with_default(0))
        .broadcast(BroadcastChannel::new(local_a.clone()))
        .build(local_a);
    let _reader = store::<i64>()
        .key("counter")
        .validator(with_default(0))
        .broadcast(BroadcastChannel::new(local_b.clone()))
        .build(local_b);

    c.bench_function("store_update_with_broadcast", |b| {
        b.iter(|| writer.update(|n| n.wrapping_add(1)).unwrap())
    });
}

fn bench_identity(c: &mut Criterion) {
    let target = TargetId::fresh();
    let options = json!({
        "thresholds": [0.0, 0.25, 0.5, 0.75, 1.0],
        "root_margin": "0px",
        "root": null,
    });

    c.bench_function("identity_key_for_target", |b| {
        b.iter(|| IdentityKey::for_target(target, "intersection", black_box(&options)).unwrap())
    });
}

criterion_group!(benches, bench_emitter, bench_store, bench_cross_tab, bench_identity);
criterion_main!(benches);
