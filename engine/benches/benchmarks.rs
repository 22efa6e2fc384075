//! Performance benchmarks for tether-engine

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use tether_engine::{
    CallResult, MemoryStore, Method, OperationKey, PendingOperation, QueueStore, RequestOptions,
};

fn lead_body(fields: usize) -> Value {
    let mut body = serde_json::Map::new();
    for i in (0..fields).rev() {
        body.insert(format!("field_{}", i), json!({"value": i, "tags": ["a", "b"]}));
    }
    Value::Object(body)
}

fn bench_operation_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("operation_key");

    group.bench_function("no_body", |b| {
        b.iter(|| OperationKey::derive(Method::Get, black_box("/inventory"), None))
    });

    for size in [1, 10, 100].iter() {
        let body = lead_body(*size);
        group.bench_with_input(BenchmarkId::new("with_body", size), &body, |b, body| {
            b.iter(|| OperationKey::derive(Method::Post, black_box("/leads"), Some(body)))
        });
    }

    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("enqueue_overwrite", |b| {
        let queue = QueueStore::new(MemoryStore::new());
        let op = PendingOperation::new(
            "/attendance/clock-in",
            &RequestOptions::post(json!({"employeeId": "EMP001"})),
            Utc::now(),
        );
        b.iter(|| rt.block_on(queue.enqueue(black_box(&op))).unwrap())
    });

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("list", size), size, |b, &size| {
            let queue = QueueStore::new(MemoryStore::new());
            rt.block_on(async {
                for i in 0..size {
                    let op = PendingOperation::new(
                        &format!("/inventory/{}", i),
                        &RequestOptions::delete(),
                        Utc::now(),
                    );
                    queue.enqueue(&op).await.unwrap();
                }
            });
            b.iter(|| rt.block_on(queue.list()).unwrap())
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    let op = PendingOperation::new("/leads", &RequestOptions::post(lead_body(10)), Utc::now());
    let json = serde_json::to_string(&op).unwrap();

    group.bench_function("pending_to_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&op)).unwrap())
    });

    group.bench_function("pending_from_json", |b| {
        b.iter(|| serde_json::from_str::<PendingOperation>(black_box(&json)).unwrap())
    });

    group.bench_function("call_result_to_json", |b| {
        let result = CallResult::ok(lead_body(10));
        b.iter(|| serde_json::to_string(black_box(&result)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_operation_key,
    bench_queue,
    bench_serialization
);
criterion_main!(benches);
