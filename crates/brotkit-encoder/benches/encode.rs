//! Encoder benchmarks
//!
//! Run with:
//! ```bash
//! cargo bench --bench encode
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use brotkit_encoder::{EncoderStrategy, compress, encode};
use brotkit_format::FileParameters;
use brotkit_format::test_utils::Corpus;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.sample_size(20);
    let strategies = [
        ("literals-only", EncoderStrategy::literals_only()),
        ("greedy", EncoderStrategy::greedy()),
        ("lazy", EncoderStrategy::lazy()),
    ];
    for corpus in [Corpus::Text, Corpus::Records, Corpus::Noise] {
        let input = corpus.generate(256 * 1024, 42);
        group.throughput(Throughput::Bytes(input.len() as u64));
        for (name, strategy) in &strategies {
            group.bench_with_input(BenchmarkId::new(*name, format!("{corpus:?}")), &input, |b, input| {
                b.iter(|| encode(black_box(input), FileParameters::default(), strategy).expect("Failed to encode"));
            });
        }
    }
    group.finish();
}

fn bench_quality(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    group.sample_size(10);
    let input = Corpus::Text.generate(64 * 1024, 7);
    group.throughput(Throughput::Bytes(input.len() as u64));
    for level in [0, 1, 5, 9, 11] {
        let strategy = EncoderStrategy::quality(level).expect("Failed to build preset");
        group.bench_with_input(BenchmarkId::new("quality", level), &input, |b, input| {
            b.iter(|| compress(black_box(input), &strategy).expect("Failed to compress"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_strategies, bench_quality);
criterion_main!(benches);
