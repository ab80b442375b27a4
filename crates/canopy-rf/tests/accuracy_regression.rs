//! Accuracy regression tests for canopy-rf.
//!
//! These tests verify that algorithmic changes do not degrade classification
//! accuracy on a deterministic synthetic dataset shaped like real input:
//! continuous slots, a boolean band, and a trailing string slot.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

use canopy_rf::{
    AssociationConfig, AssociationRules, FeatureValue, RandomForest, RandomForestConfig, Record,
    SemiSupervised,
};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic classification dataset
// ---------------------------------------------------------------------------

/// Generate an `n_records` x 28-slot, 2-class dataset.
///
/// Slots 0-2 are informative (class * 3.0 + noise in [0, 0.5]).
/// Slots 3-7 are pure noise in [0, 0.5].
/// Slots 8-9 are booleans set with probability 0.9 for class 2, 0.1 for class 1.
/// Slots 10-26 are always false. Slot 27 is a constant string.
/// Records alternate between classes 1 and 2.
fn make_records(n_records: usize, seed: u64) -> Vec<Record> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n_records)
        .map(|i| {
            let class = i % 2 + 1;
            let mut features = Vec::with_capacity(28);
            for f in 0..8 {
                let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                features.push(FeatureValue::Float(base + rng.r#gen::<f64>() * 0.5));
            }
            let p_set = if class == 2 { 0.9 } else { 0.1 };
            for _ in 8..10 {
                features.push(FeatureValue::Bool(rng.r#gen::<f64>() < p_set));
            }
            for _ in 10..27 {
                features.push(FeatureValue::Bool(false));
            }
            features.push(FeatureValue::Str("tcp".to_string()));
            Record::new(format!("r{i}"), class, features)
        })
        .collect()
}

fn accuracy(forest: &RandomForest, records: &[Record]) -> f64 {
    forest.evaluate(records).accuracy()
}

// ---------------------------------------------------------------------------
// a) held_out_accuracy_above_threshold
// ---------------------------------------------------------------------------

/// Accuracy on 100 unseen records must exceed 0.80 with 50 trees.
#[test]
fn held_out_accuracy_above_threshold() {
    let train = make_records(200, 42);
    let test = make_records(100, 7);
    let result = RandomForestConfig::new(50, 2)
        .unwrap()
        .with_seed(42)
        .fit(&train)
        .unwrap();

    let acc = accuracy(result.forest(), &test);
    assert!(acc > 0.80, "held-out accuracy {acc} <= 0.80");
}

// ---------------------------------------------------------------------------
// b) oob_evaluation_covers_oob_indices
// ---------------------------------------------------------------------------

/// With few trees the out-of-bag set is non-empty and its evaluation is sane.
#[test]
fn oob_evaluation_covers_oob_indices() {
    let records = make_records(200, 42);
    let result = RandomForestConfig::new(3, 2)
        .unwrap()
        .with_seed(42)
        .fit(&records)
        .unwrap();

    let oob = result.oob_evaluation();
    assert!(!result.oob_indices().is_empty());
    assert_eq!(oob.total, result.oob_indices().len());
    assert!(
        oob.misclassification_rate() < 0.5,
        "oob misclassification rate {} >= 0.5",
        oob.misclassification_rate()
    );
    assert_eq!(result.metadata().n_features, 28);
}

// ---------------------------------------------------------------------------
// c) deterministic_predictions
// ---------------------------------------------------------------------------

/// Same config and seed must produce identical predictions across two independent runs.
#[test]
fn deterministic_predictions() {
    let records = make_records(200, 42);
    let config = RandomForestConfig::new(20, 2).unwrap().with_seed(42);

    let preds1 = config.fit(&records).unwrap().forest().classify_batch(&records);
    let preds2 = config.fit(&records).unwrap().forest().classify_batch(&records);

    assert_eq!(preds1, preds2, "predictions differ across runs with the same seed");
}

// ---------------------------------------------------------------------------
// d) persisted_forest_predicts_identically
// ---------------------------------------------------------------------------

/// Trees written to disk and read back vote exactly as the trained forest.
#[test]
fn persisted_forest_predicts_identically() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("forest_");
    let records = make_records(200, 42);
    let test = make_records(100, 7);
    let forest = RandomForestConfig::new(10, 2)
        .unwrap()
        .with_seed(42)
        .fit(&records)
        .unwrap()
        .into_forest();

    forest.save_trees(&base).unwrap();
    let loaded = RandomForest::load_trees(&base, 10, 2).unwrap();

    assert_eq!(loaded, forest);
    assert_eq!(loaded.classify_batch(&test), forest.classify_batch(&test));
}

// ---------------------------------------------------------------------------
// e) association_features_feed_training
// ---------------------------------------------------------------------------

/// The two correlated flags combine into a single rule; the derived slot is
/// appended to every record and the widened records still train well.
#[test]
fn association_features_feed_training() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("run_");
    let mut train = make_records(200, 42);
    let mut test = make_records(100, 7);

    let rules = AssociationConfig::new().find(&train);
    assert_eq!(rules.rules().to_vec(), vec![vec![8, 9]]);

    rules.save(&base).unwrap();
    let rules = AssociationRules::load(&base).unwrap();
    rules.apply(&mut train).unwrap();
    rules.apply(&mut test).unwrap();
    assert!(train.iter().all(|r| r.n_features() == 29));

    let result = RandomForestConfig::new(30, 2)
        .unwrap()
        .with_seed(42)
        .fit(&train)
        .unwrap();
    let acc = accuracy(result.forest(), &test);
    assert!(acc > 0.80, "held-out accuracy with rules {acc} <= 0.80");
}

// ---------------------------------------------------------------------------
// f) semi_supervised_labels_unlabeled_pool
// ---------------------------------------------------------------------------

/// One generation labels most of an unlabeled pool with its true class.
#[test]
fn semi_supervised_labels_unlabeled_pool() {
    let labeled = make_records(200, 42);
    let truth = make_records(60, 7);
    let unlabeled: Vec<Record> = truth
        .iter()
        .map(|r| Record::new(r.id.clone(), 0, r.features.clone()))
        .collect();

    let config = RandomForestConfig::new(20, 2).unwrap().with_seed(42);
    let outcome = SemiSupervised::new(config).run(labeled, unlabeled).unwrap();

    assert_eq!(outcome.n_newly_labeled, 60);
    assert_eq!(outcome.records.len(), 260);
    let correct = outcome.records[200..]
        .iter()
        .zip(&truth)
        .filter(|(got, want)| got.class_label == want.class_label)
        .count();
    assert!(correct > 48, "only {correct}/60 unlabeled records labeled correctly");
}
