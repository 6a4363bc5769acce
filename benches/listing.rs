//! Benchmarks for the in-memory search, sort and pagination stages.
//!
//! Run with: cargo bench --bench listing

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mindcare::api::listing;
use mindcare::types::OrderDirection;
use serde_json::{json, Value};

const PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];

fn questions(n: usize) -> Vec<Value> {
  (0..n)
    .map(|i| {
      json!({
        "id": format!("q-{}", i),
        "question": format!("How do I cope with exam {} stress?", i),
        "response": if i % 2 == 0 { Value::Null } else { json!("Take regular breaks.") },
        "category": "academic-stress",
        "priority": PRIORITIES[i % 4],
        "views": (i * 7) % 101,
        "tags": ["exams", "sleep"],
        "createdAt": format!("2024-06-{:02}T09:00:00.000Z", i % 28 + 1),
      })
    })
    .collect()
}

fn bench_search(c: &mut Criterion) {
  let mut group = c.benchmark_group("search");
  for size in [100, 1000].iter() {
    let items = questions(*size);
    group.throughput(Throughput::Elements(*size as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
      b.iter(|| {
        black_box(listing::search(
          items.clone(),
          Some("BREAKS"),
          &["question", "response", "tags"],
        ))
      });
    });
  }
  group.finish();
}

fn bench_sort(c: &mut Criterion) {
  let mut group = c.benchmark_group("sort");
  let items = questions(1000);
  for field in ["createdAt", "priority", "views"] {
    group.bench_function(field, |b| {
      b.iter(|| {
        let mut items = items.clone();
        listing::sort(&mut items, field, OrderDirection::Desc);
        black_box(items)
      });
    });
  }
  group.finish();
}

fn bench_paginate(c: &mut Criterion) {
  let items = questions(1000);
  c.bench_function("paginate/page_10", |b| {
    b.iter(|| black_box(listing::paginate(items.clone(), Some(10), Some(20))))
  });
}

fn bench_trends(c: &mut Criterion) {
  let items = questions(1000);
  let now = Utc::now();
  c.bench_function("trends/1000", |b| {
    b.iter(|| black_box(listing::trends(&items, "createdAt", now)))
  });
}

criterion_group!(benches, bench_search, bench_sort, bench_paginate, bench_trends);
criterion_main!(benches);
