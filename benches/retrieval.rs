use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use table_rag::index::{EmbeddingMatrix, NeighborIndex};

const DOCUMENTS: usize = 2_000;
const DIMENSION: usize = 1_536;

/// Deterministic pseudo-random vectors so runs are comparable
fn vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            (0..DIMENSION)
                .map(|_| {
                    state = state
                        .wrapping_mul(6_364_136_223_846_793_005)
                        .wrapping_add(1_442_695_040_888_963_407);
                    ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
                })
                .collect()
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let matrix = EmbeddingMatrix::from_rows(vectors(DOCUMENTS, 7)).expect("valid matrix");
    let query = vectors(1, 42).remove(0);

    c.bench_function("fit", |b| {
        b.iter(|| NeighborIndex::fit(black_box(&matrix), 5))
    });

    let index = NeighborIndex::fit(&matrix, 5).expect("index fits");
    c.bench_function("search_top5", |b| {
        b.iter(|| index.search(black_box(&query), black_box(5)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
