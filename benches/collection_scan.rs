use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheet_store::storage::{DocumentStore, Filter, MemoryTransport};
use std::sync::Arc;

fn seeded(rows: usize) -> DocumentStore {
    let transport = MemoryTransport::new();
    let mut grid: Vec<Vec<String>> = vec![vec!["_id".into(), "name".into(), "category".into()]];
    for i in 0..rows {
        let category = if i % 3 == 0 { "Dance" } else { "Music" };
        grid.push(vec![i.to_string(), format!("event {}", i), category.to_string()]);
    }
    transport.seed("Events", grid);
    DocumentStore::new(Arc::new(transport))
}

fn criterion_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let dance = Filter::all().eq("category", "Dance");
    let pattern = Filter::all().pattern("name", "event 1", true).unwrap();

    let mut group = c.benchmark_group("find");
    for rows in [100usize, 500, 1000] {
        let store = seeded(rows);
        group.bench_with_input(BenchmarkId::new("equality", rows), &rows, |b, _| {
            b.iter(|| runtime.block_on(store.find("Events", black_box(&dance))).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("pattern", rows), &rows, |b, _| {
            b.iter(|| runtime.block_on(store.count_documents("Events", black_box(&pattern))).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
