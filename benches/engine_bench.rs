//! Benchmarks for the Eventide core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use eventide::query::{parse, planner, Executor, QueryRequest};
use eventide::{ColumnStore, Event, SecondaryIndex};
use std::sync::Arc;

fn make_events(count: usize) -> Vec<Event> {
    let regions = ["us", "eu", "apac"];
    (0..count)
        .map(|i| {
            Event::with_timestamp(1_000_000 + i as i64, format!("u{}", i % 100), "click")
                .prop("region", regions[i % regions.len()])
                .prop("price", ((i * 13) % 100).to_string())
        })
        .collect()
}

fn seeded_store(count: usize) -> Arc<ColumnStore> {
    let store = Arc::new(ColumnStore::new());
    store.append_batch(make_events(count));
    store
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for size in [1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("append_batch_{}", size), |b| {
            b.iter_batched(
                || (ColumnStore::new(), make_events(size)),
                |(store, events)| store.append_batch(black_box(events)),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    let store = seeded_store(100_000);

    group.throughput(Throughput::Elements(100_000));
    group.bench_function("full_scan", |b| {
        b.iter(|| store.scan(black_box("events"), i64::MIN, i64::MAX, None))
    });

    group.bench_function("time_bounded_scan", |b| {
        b.iter(|| store.scan(black_box("events"), 1_000_000, 1_010_000, None))
    });

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let store = seeded_store(100_000);
    let executor = Executor::new(Arc::clone(&store));

    let plans = [
        ("filter", "SELECT userId FROM events WHERE region = 'us'"),
        (
            "group_aggregate",
            "SELECT region, COUNT(*) AS c, AVG(price) AS a FROM events GROUP BY region",
        ),
        (
            "order_limit",
            "SELECT * FROM events ORDER BY ts DESC LIMIT 100",
        ),
    ]
    .map(|(name, sql)| {
        let statement = parse(sql).unwrap();
        let plan = planner::plan(&statement, &QueryRequest::new(sql)).unwrap();
        (name, plan)
    });

    for (name, plan) in &plans {
        group.bench_function(*name, |b| b.iter(|| executor.execute(black_box(plan)).unwrap()));
    }

    group.finish();
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    let store = seeded_store(100_000);
    let rows = store.scan("events", i64::MIN, i64::MAX, None);

    group.throughput(Throughput::Elements(rows.len() as u64));
    group.bench_function("bitmap_region", |b| {
        b.iter(|| {
            let mut index = SecondaryIndex::for_column("events", "region", "bench");
            index.build(black_box(&rows));
            index
        })
    });

    group.bench_function("btree_price", |b| {
        b.iter(|| {
            let mut index = SecondaryIndex::for_column("events", "price", "bench");
            index.build(black_box(&rows));
            index
        })
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_scan, bench_query, bench_index_build);
criterion_main!(benches);
