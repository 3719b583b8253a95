//! Benchmarks for the merge hot path.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use reqlens_core::events::{merge::deep_merge, AggregationStore, TelemetryEvent};
use reqlens_core::ingest::EventDecoder;
use serde_json::{json, Value};

fn sample_events(requests: usize, per_request: usize) -> Vec<TelemetryEvent> {
    let mut events = Vec::with_capacity(requests * per_request);
    for i in 0..per_request {
        for r in 0..requests {
            let id = format!("req-{}", r);
            let value = match i % 4 {
                0 => json!({"requestId": id, "type": "request", "method": "GET", "url": "/items", "status": 200}),
                1 => json!({"requestId": id, "type": "query", "sql": "SELECT * FROM items WHERE id = ?", "duration": 1.5}),
                2 => json!({"requestId": id, "type": "global", "key": "user", "value": {"id": r, "roles": ["a"]}}),
                _ => json!({"requestId": id, "type": "info", "message": "handled"}),
            };
            events.push(TelemetryEvent::from_value(value).unwrap());
        }
    }
    events
}

fn bench_store_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_merge");
    for requests in [10, 100, 1_000] {
        let events = sample_events(requests, 8);
        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(requests), &events, |b, events| {
            b.iter(|| {
                let mut store = AggregationStore::default();
                for event in events.iter().cloned() {
                    black_box(store.merge_event(event));
                }
                black_box(store.len())
            });
        });
    }
    group.finish();
}

fn bench_deep_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_merge");
    let base = json!({"user": {"id": 1, "name": "a", "prefs": {"theme": "dark", "lang": "en"}}, "env": "prod"});
    let patch = json!({"user": {"name": "b", "prefs": {"lang": "fr"}}, "tags": ["x", "y"]});
    group.bench_function("nested", |b| {
        b.iter(|| {
            let mut target = base.clone();
            deep_merge(&mut target, black_box(patch.clone()));
            black_box(target)
        });
    });
    group.finish();
}

fn bench_decoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoder");
    let batch: Vec<Value> = (0..100)
        .map(|i| json!({"requestId": format!("r{}", i % 10), "type": "query", "sql": "SELECT 1"}))
        .collect();
    let bytes = serde_json::to_vec(&batch).unwrap();
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("array_batch", |b| {
        b.iter(|| {
            let mut decoder = EventDecoder::new(1 << 20);
            black_box(decoder.push(black_box(&bytes)))
        });
    });
    group.bench_function("split_reads", |b| {
        b.iter(|| {
            let mut decoder = EventDecoder::new(1 << 20);
            let mut total = 0;
            for chunk in bytes.chunks(512) {
                total += decoder.push(chunk).len();
            }
            black_box(total)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_store_merge, bench_deep_merge, bench_decoder);
criterion_main!(benches);
