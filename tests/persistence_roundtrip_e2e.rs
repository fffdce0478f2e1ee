//! Save → load round trips across manager instances.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use patchbank::{FeatureBatch, MemoryBankManager, PatchShape};

fn random_batch(n: usize, dim: usize, seed: u64) -> FeatureBatch {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..n * dim).map(|_| rng.gen::<f32>() * 4.0 - 2.0).collect();
    FeatureBatch::new(data, n, dim).unwrap()
}

#[test]
fn predictions_identical_after_reload_in_new_instance() {
    let dir = tempdir().unwrap();
    let references = random_batch(64, 8, 100);
    let queries = random_batch(16, 8, 200);
    let shape = PatchShape::new(4, 4);

    let mut manager = MemoryBankManager::with_coreset_ratio(0.25, Some(5)).unwrap();
    manager.fill_memory_bank(&[references]).unwrap();
    let before = manager.predict(&queries, Some(shape)).unwrap();
    manager.save(dir.path(), shape).unwrap();

    // Fresh instance, no sampler needed for the load/predict path.
    let mut restored = MemoryBankManager::with_coreset_ratio(0.25, Some(999)).unwrap();
    restored.load(dir.path()).unwrap();

    // The shape record travels with the bank; no shape argument needed.
    let after = restored.predict(&queries, None).unwrap();
    assert_eq!(before, after);
    assert_eq!(restored.patch_shape(), Some(shape));
}

#[test]
fn save_then_reload_same_instance() {
    let dir = tempdir().unwrap();
    let references = random_batch(32, 4, 300);
    let queries = random_batch(8, 4, 400);
    let shape = PatchShape::new(2, 4);

    let mut manager = MemoryBankManager::with_coreset_ratio(0.5, Some(1)).unwrap();
    manager.fill_memory_bank(&[references]).unwrap();
    manager.save(dir.path(), shape).unwrap();
    let before = manager.predict(&queries, None).unwrap();

    manager.reset();
    assert!(manager.predict(&queries, Some(shape)).is_err());

    manager.load(dir.path()).unwrap();
    let after = manager.predict(&queries, None).unwrap();
    assert_eq!(before, after);
}

#[test]
fn artifacts_have_stable_names() {
    let dir = tempdir().unwrap();
    let mut manager = MemoryBankManager::with_coreset_ratio(0.5, Some(1)).unwrap();
    manager
        .fill_memory_bank(&[random_batch(16, 4, 500)])
        .unwrap();
    manager.save(dir.path(), PatchShape::new(4, 4)).unwrap();

    assert!(dir.path().join("nnscorer_index.pbank").exists());
    assert!(dir.path().join("patch_shape.json").exists());
}
