//! Property-style checks for the coreset samplers, driven by a seeded RNG
//! over random sizes, dimensions, and budgets.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use patchbank::{
    ApproximateGreedyCoresetSampler, CoresetSampler, FeatureBatch, GreedyCoresetSampler,
    SamplerConfig, l2_distance,
};

fn random_batch(rng: &mut StdRng, n: usize, dim: usize) -> FeatureBatch {
    let data: Vec<f32> = (0..n * dim).map(|_| rng.gen::<f32>() * 20.0 - 10.0).collect();
    FeatureBatch::new(data, n, dim).unwrap()
}

fn assert_valid_coreset(indices: &[usize], n: usize, percentage: f64) {
    assert_eq!(
        indices.len(),
        (n as f64 * percentage).floor() as usize,
        "count must be floor(N * p) for N={} p={}",
        n,
        percentage
    );
    let mut seen = vec![false; n];
    for &i in indices {
        assert!(i < n, "index {} out of range for N={}", i, n);
        assert!(!seen[i], "duplicate index {}", i);
        seen[i] = true;
    }
}

#[test]
fn coreset_size_uniqueness_and_range_hold_across_inputs() {
    let mut rng = StdRng::seed_from_u64(2024);

    for trial in 0..20 {
        let n = rng.gen_range(5..120);
        let dim = rng.gen_range(1..40);
        let percentage = rng.gen_range(0.05..=1.0);
        let batch = random_batch(&mut rng, n, dim);

        let exact = GreedyCoresetSampler::new(SamplerConfig {
            percentage,
            seed: Some(trial),
            ..SamplerConfig::default()
        })
        .unwrap()
        .select(&batch)
        .unwrap();
        assert_valid_coreset(&exact, n, percentage);

        let approx = ApproximateGreedyCoresetSampler::new(SamplerConfig {
            percentage,
            seed: Some(trial),
            ..SamplerConfig::default()
        })
        .unwrap()
        .select(&batch)
        .unwrap();
        assert_valid_coreset(&approx, n, percentage);
    }
}

#[test]
fn selected_subset_covers_the_set_better_than_random() {
    // Greedy k-center should beat a random subset of the same size on
    // coverage radius for a clustered input.
    let mut rng = StdRng::seed_from_u64(7);
    let n = 200;
    let batch = random_batch(&mut rng, n, 3);

    let coverage = |selected: &[usize]| -> f32 {
        (0..n)
            .filter(|i| !selected.contains(i))
            .map(|i| {
                selected
                    .iter()
                    .map(|&s| l2_distance(batch.row(i), batch.row(s)))
                    .fold(f32::MAX, f32::min)
            })
            .fold(0.0, f32::max)
    };

    let greedy = GreedyCoresetSampler::new(SamplerConfig {
        percentage: 0.1,
        seed: Some(7),
        ..SamplerConfig::default()
    })
    .unwrap()
    .select(&batch)
    .unwrap();

    let random: Vec<usize> = (0..greedy.len()).collect(); // first-k baseline

    assert!(
        coverage(&greedy) <= coverage(&random),
        "greedy coverage radius should not exceed the naive baseline"
    );
}

#[test]
fn projection_changes_nothing_about_validity() {
    // High-dimensional inputs go through the random projection; the
    // selection must remain a valid coreset.
    let mut rng = StdRng::seed_from_u64(31);
    let batch = random_batch(&mut rng, 60, 256);

    let indices = ApproximateGreedyCoresetSampler::new(SamplerConfig {
        percentage: 0.25,
        seed: Some(31),
        ..SamplerConfig::default()
    })
    .unwrap()
    .select(&batch)
    .unwrap();
    assert_valid_coreset(&indices, 60, 0.25);
}
