use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sheet_store::storage::codec;
use sheet_store::Document;

fn criterion_benchmark(c: &mut Criterion) {
    let headers: Vec<String> = (0..20).map(|i| format!("field{}", i)).collect();
    let row: Vec<String> = (0..20).map(|i| format!("value {}", i)).collect();
    let document: Document = codec::decode(&headers, &row);

    c.bench_function("decode_20_fields", |b| {
        b.iter(|| codec::decode(black_box(&headers), black_box(&row)))
    });
    c.bench_function("encode_20_fields", |b| {
        b.iter(|| codec::encode(black_box(&headers), black_box(&document)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
