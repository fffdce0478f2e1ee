//! Coreset sampling benchmarks
//!
//! Run with: cargo bench --bench coreset

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use patchbank::{
    ApproximateGreedyCoresetSampler, CoresetSampler, FeatureBatch, GreedyCoresetSampler,
    SamplerConfig,
};

fn random_batch(n: usize, dim: usize, seed: u64) -> FeatureBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..n * dim).map(|_| rng.gen::<f32>() - 0.5).collect();
    FeatureBatch::new(data, n, dim).unwrap()
}

fn bench_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("coreset_exact");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    // Exact is O(N^2); keep N small.
    for n in [200, 500, 1000] {
        let batch = random_batch(n, 64, 1000 + n as u64);
        let sampler = GreedyCoresetSampler::new(SamplerConfig {
            percentage: 0.1,
            seed: Some(42),
            ..SamplerConfig::default()
        })
        .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(sampler.select(&batch).unwrap()))
        });
    }
    group.finish();
}

fn bench_approximate(c: &mut Criterion) {
    let mut group = c.benchmark_group("coreset_approximate");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    for n in [1000, 5000, 20000] {
        let batch = random_batch(n, 64, 2000 + n as u64);
        let sampler = ApproximateGreedyCoresetSampler::new(SamplerConfig {
            percentage: 0.01,
            seed: Some(42),
            ..SamplerConfig::default()
        })
        .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(sampler.select(&batch).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_exact, bench_approximate);
criterion_main!(benches);
