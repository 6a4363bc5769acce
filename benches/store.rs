//! Document store benchmarks for MindCare.
//!
//! Run with: cargo bench --bench store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mindcare::db::{DocumentStore, SqliteBackend};
use mindcare::types::FieldFilter;
use serde_json::json;
use tokio::runtime::Runtime;

fn create_runtime() -> Runtime {
  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap()
}

fn seeded_backend(rt: &Runtime, journals: usize) -> SqliteBackend {
  rt.block_on(async {
    let b = SqliteBackend::in_memory().await.unwrap();
    b.init_schema().await.unwrap();
    for i in 0..journals {
      b.insert(
        "journals",
        json!({
          "studentId": format!("student-{}", i % 20),
          "title": format!("Entry {}", i),
          "content": "Slept badly before the maths exam.",
          "status": if i % 3 == 0 { "flagged" } else { "pending" },
          "isFlagged": i % 3 == 0,
          "tags": ["sleep", "exams"],
          "createdAt": format!("2024-06-{:02}T09:00:00.000Z", i % 28 + 1),
        }),
      )
      .await
      .unwrap();
    }
    b
  })
}

fn bench_insert(c: &mut Criterion) {
  let rt = create_runtime();
  let backend = seeded_backend(&rt, 0);

  let mut group = c.benchmark_group("insert");
  group.throughput(Throughput::Elements(1));
  group.bench_function("appointment", |b| {
    b.iter(|| {
      rt.block_on(async {
        black_box(
          backend
            .insert(
              "appointments",
              json!({
                "studentId": "student-1",
                "counsellorId": "counsellor-1",
                "date": "2030-01-15T10:00:00.000Z",
                "time": "10:00",
                "reason": "Exam stress follow-up",
                "status": "pending",
                "priority": "medium",
              }),
            )
            .await
            .unwrap(),
        );
      });
    });
  });
  group.finish();
}

fn bench_list(c: &mut Criterion) {
  let rt = create_runtime();

  let mut group = c.benchmark_group("list");
  for size in [100, 1000].iter() {
    let backend = seeded_backend(&rt, *size);
    group.throughput(Throughput::Elements(*size as u64));

    group.bench_with_input(BenchmarkId::new("unfiltered", size), size, |b, _| {
      b.iter(|| rt.block_on(async { black_box(backend.list("journals", &[]).await.unwrap()) }));
    });

    let filters = [
      FieldFilter::eq("isFlagged", true),
      FieldFilter::gte("createdAt", "2024-06-10T00:00:00.000Z"),
      FieldFilter::contains("tags", "exams"),
    ];
    group.bench_with_input(BenchmarkId::new("filtered", size), size, |b, _| {
      b.iter(|| {
        rt.block_on(async { black_box(backend.list("journals", &filters).await.unwrap()) })
      });
    });
  }
  group.finish();
}

fn bench_counter(c: &mut Criterion) {
  let rt = create_runtime();
  let (backend, id) = rt.block_on(async {
    let b = SqliteBackend::in_memory().await.unwrap();
    b.init_schema().await.unwrap();
    let doc = b.insert("qna", json!({"views": 0})).await.unwrap();
    (b, doc.id)
  });

  let mut group = c.benchmark_group("transform");
  group.throughput(Throughput::Elements(1));
  group.bench_function("view_counter", |b| {
    b.iter(|| {
      rt.block_on(async {
        black_box(
          backend
            .transform(
              "qna",
              id,
              Box::new(|data| {
                let views = data["views"].as_u64().unwrap_or(0);
                data["views"] = json!(views + 1);
              }),
            )
            .await
            .unwrap(),
        );
      });
    });
  });
  group.finish();
}

criterion_group!(benches, bench_insert, bench_list, bench_counter);
criterion_main!(benches);
