//! Random Forest training with parallel tree construction, plus per-tree
//! file persistence.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::bagging;
use crate::config::{DEFAULT_FALLBACK_CLASS, RandomForestConfig};
use crate::error::RfError;
use crate::record::Record;
use crate::result::{RandomForestResult, TrainingMetadata};
use crate::serialize::{TreeReadMode, tree_path};
use crate::tree::{DecisionTree, validate_records};

/// A fitted Random Forest ensemble.
///
/// Trees are kept in insertion order; tree `i` is persisted as
/// `<out_base><i>.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_classes: usize,
    pub(crate) fallback_class: usize,
}

impl RandomForest {
    /// Assemble a forest from already built trees.
    ///
    /// The fallback class is 2, or 1 when `n_classes` is 1.
    #[must_use]
    pub fn from_trees(trees: Vec<DecisionTree>, n_classes: usize) -> Self {
        Self {
            trees,
            n_classes,
            fallback_class: DEFAULT_FALLBACK_CLASS.min(n_classes.max(1)),
        }
    }

    /// Replace the class voted by trees that cannot classify a record.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidFallbackClass`] if `fallback_class` is outside
    /// `[1, n_classes]`.
    pub fn with_fallback_class(mut self, fallback_class: usize) -> Result<Self, RfError> {
        if fallback_class == 0 || fallback_class > self.n_classes {
            return Err(RfError::InvalidFallbackClass {
                class_label: fallback_class,
                n_classes: self.n_classes,
            });
        }
        self.fallback_class = fallback_class;
        Ok(self)
    }

    /// Write every tree to `<out_base><i>.txt`.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::WriteTree`] for the first file that cannot be written.
    pub fn save_trees(&self, out_base: impl AsRef<Path>) -> Result<(), RfError> {
        self.save_trees_from(out_base, 0)
    }

    /// Write tree `i` to `<out_base><first_index + i>.txt`.
    ///
    /// Lets successive semi-supervised generations accumulate tree files
    /// under one base.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::WriteTree`] for the first file that cannot be written.
    #[instrument(skip_all, fields(out_base = %out_base.as_ref().display(), first_index = first_index, n_trees = self.trees.len()))]
    pub fn save_trees_from(
        &self,
        out_base: impl AsRef<Path>,
        first_index: usize,
    ) -> Result<(), RfError> {
        let out_base = out_base.as_ref();
        for (i, tree) in self.trees.iter().enumerate() {
            tree.save(tree_path(out_base, first_index + i))?;
        }
        info!("trees saved");
        Ok(())
    }

    /// Load `n_trees` trees from `<out_base>0.txt` through `<out_base><n_trees - 1>.txt`.
    ///
    /// Files are read in parallel; any failure aborts the load and no
    /// partial forest is returned.
    ///
    /// # Errors
    ///
    /// | Variant                         | When                                  |
    /// |---------------------------------|---------------------------------------|
    /// | [`RfError::InvalidTreeCount`]   | `n_trees` is zero                     |
    /// | [`RfError::InvalidClassCount`]  | `n_classes` is zero                   |
    /// | [`RfError::ReadTree`]           | a file is missing or unreadable       |
    /// | [`RfError::MalformedTreeLine`]  | a line does not parse, or a leaf label is outside `[1, n_classes]` |
    /// | [`RfError::TruncatedTree`]      | a file ends before its tree is whole  |
    #[instrument(skip_all, fields(out_base = %out_base.as_ref().display()))]
    pub fn load_trees(
        out_base: impl AsRef<Path>,
        n_trees: usize,
        n_classes: usize,
    ) -> Result<Self, RfError> {
        if n_trees == 0 {
            return Err(RfError::InvalidTreeCount { n_trees });
        }
        if n_classes == 0 {
            return Err(RfError::InvalidClassCount { n_classes });
        }
        let out_base = out_base.as_ref();
        let trees = (0..n_trees)
            .into_par_iter()
            .map(|i| {
                DecisionTree::load_with_classes(
                    tree_path(out_base, i),
                    TreeReadMode::Lenient,
                    n_classes,
                )
            })
            .collect::<Result<Vec<_>, RfError>>()?;
        info!(n_trees = trees.len(), "forest loaded");
        Ok(Self::from_trees(trees, n_classes))
    }
}

/// Logs training progress every tenth of the trees.
struct Progress {
    done: AtomicUsize,
    total: usize,
    step: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
            step: (total / 10).max(1),
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.step == 0 || done == self.total {
            info!(
                done,
                total = self.total,
                percent = done * 100 / self.total,
                "trees trained"
            );
        }
    }
}

/// Train the Random Forest ensemble.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_records = records.len()))]
pub(crate) fn train(
    config: &RandomForestConfig,
    records: &[Record],
) -> Result<RandomForestResult, RfError> {
    config.validate()?;
    let n_classes = config.n_classes();
    let refs: Vec<&Record> = records.iter().collect();
    let n_features = validate_records(&refs, n_classes)?;
    let n_records = records.len();

    info!(
        n_trees = config.n_trees,
        n_records,
        n_features,
        n_classes,
        "training random forest"
    );
    let start = Instant::now();

    // Bagging and per-tree seeds both come from the master RNG, in that order.
    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let bags = bagging::sample(n_records, config.n_trees, &mut master_rng);
    let tree_seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();
    debug!(n_oob = bags.oob.len(), "bootstrap samples drawn");

    let progress = Progress::new(config.n_trees);
    let template = &config.tree;

    let trees: Vec<DecisionTree> = bags
        .train
        .into_par_iter()
        .zip(tree_seeds.into_par_iter())
        .map(|(bag, seed)| {
            let sample: Vec<&Record> = bag.iter().map(|&i| &records[i]).collect();
            let tree = template.clone().with_seed(seed).fit(&sample)?;
            progress.tick();
            Ok::<_, RfError>(tree)
        })
        .collect::<Result<Vec<_>, RfError>>()?;

    let forest = RandomForest {
        trees,
        n_classes,
        fallback_class: config.fallback_class,
    };

    let elapsed = start.elapsed();
    info!(elapsed_secs = elapsed.as_secs_f64(), "tree training complete");

    let oob_evaluation = forest.evaluate_indices(records, &bags.oob);
    info!(
        n_oob = oob_evaluation.total,
        misclassified = oob_evaluation.misclassified,
        rate = oob_evaluation.misclassification_rate(),
        "out-of-bag evaluation complete"
    );

    let metadata = TrainingMetadata {
        n_trees: config.n_trees,
        n_features,
        n_classes,
        n_records,
        elapsed_secs: elapsed.as_secs_f64(),
    };

    Ok(RandomForestResult::new(
        forest,
        bags.oob,
        oob_evaluation,
        metadata,
    ))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::record::FeatureValue;
    use crate::tree::FeatureDrop;

    /// Two classes separated on slot 0; slot 1 is noise.
    fn make_separable_records() -> Vec<Record> {
        let mut records = Vec::new();
        for i in 0..30 {
            records.push(Record::new(
                format!("n{i}"),
                1,
                vec![
                    FeatureValue::Float(i as f64 * 0.1),
                    FeatureValue::Float((i % 4) as f64),
                ],
            ));
        }
        for i in 0..30 {
            records.push(Record::new(
                format!("a{i}"),
                2,
                vec![
                    FeatureValue::Float(10.0 + i as f64 * 0.1),
                    FeatureValue::Float((i % 4) as f64),
                ],
            ));
        }
        records
    }

    fn config(n_trees: usize) -> RandomForestConfig {
        RandomForestConfig::new(n_trees, 2)
            .unwrap()
            .with_feature_drop(FeatureDrop::None)
    }

    #[test]
    fn separable_training_accuracy() {
        let records = make_separable_records();
        let result = config(15)
            .with_purity_threshold(1.0)
            .with_seed(42)
            .fit(&records)
            .unwrap();
        let evaluation = result.forest().evaluate(&records);
        assert!(
            evaluation.accuracy() > 0.95,
            "accuracy = {}",
            evaluation.accuracy()
        );
        assert_eq!(result.forest().n_trees(), 15);
    }

    #[test]
    fn oob_indices_are_ascending_and_evaluated() {
        let records = make_separable_records();
        let result = config(2).with_seed(5).fit(&records).unwrap();
        let oob = result.oob_indices();
        assert!(oob.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(result.oob_evaluation().total, oob.len());
    }

    #[test]
    fn deterministic_with_same_seed() {
        let records = make_separable_records();
        let a = config(8).with_seed(99).fit(&records).unwrap();
        let b = config(8).with_seed(99).fit(&records).unwrap();
        assert_eq!(a.forest(), b.forest());
        assert_eq!(a.oob_indices(), b.oob_indices());
    }

    #[test]
    fn thread_count_does_not_change_the_forest() {
        let records = make_separable_records();
        let cfg = RandomForestConfig::new(6, 2).unwrap().with_seed(11);
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| cfg.fit(&records).unwrap());
        let many = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap()
            .install(|| cfg.fit(&records).unwrap());
        assert_eq!(single.forest(), many.forest());
    }

    #[test]
    fn empty_dataset_error() {
        let err = config(3).fit(&[]).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }

    #[test]
    fn invalid_label_error() {
        let mut records = make_separable_records();
        records[4].class_label = 0;
        let err = config(3).fit(&records).unwrap_err();
        assert!(matches!(
            err,
            RfError::InvalidClassLabel {
                record_index: 4,
                ..
            }
        ));
    }

    #[test]
    fn save_and_load_trees_round_trip() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("forest_");
        let records = make_separable_records();
        let forest = config(4).fit(&records).unwrap().into_forest();

        forest.save_trees(&base).unwrap();
        for i in 0..4 {
            assert!(tree_path(&base, i).exists());
        }

        let loaded = RandomForest::load_trees(&base, 4, 2).unwrap();
        assert_eq!(loaded.n_trees(), 4);
        for record in &records {
            assert_eq!(
                loaded.classify(&record.features),
                forest.classify(&record.features)
            );
        }
    }

    #[test]
    fn load_missing_tree_is_an_error() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("forest_");
        let records = make_separable_records();
        config(2).fit(&records).unwrap().forest().save_trees(&base).unwrap();

        let err = RandomForest::load_trees(&base, 3, 2).unwrap_err();
        assert!(matches!(err, RfError::ReadTree { .. }));
    }

    #[test]
    fn load_rejects_leaf_labels_outside_class_range() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("forest_");
        std::fs::write(tree_path(&base, 0), "true,0,0,2\n").unwrap();
        std::fs::write(tree_path(&base, 1), "false,0,0.5,0\ntrue,0,0,1\ntrue,0,0,3\n").unwrap();

        let err = RandomForest::load_trees(&base, 2, 2).unwrap_err();
        assert!(matches!(err, RfError::MalformedTreeLine { line: 3, .. }));
        assert_eq!(RandomForest::load_trees(&base, 2, 3).unwrap().n_trees(), 2);
    }

    #[test]
    fn fallback_class_is_validated() {
        let forest = RandomForest::from_trees(Vec::new(), 2);
        assert!(forest.clone().with_fallback_class(1).is_ok());
        assert!(matches!(
            forest.with_fallback_class(0),
            Err(RfError::InvalidFallbackClass { .. })
        ));
    }
}
