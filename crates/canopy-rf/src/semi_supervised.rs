//! One generation of train, label, merge, retrain.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::config::RandomForestConfig;
use crate::error::RfError;
use crate::eval::Evaluation;
use crate::forest::RandomForest;
use crate::record::Record;

/// Semi-supervised labeling driver.
///
/// Generation 0 trains a forest on the labeled pool. Generation `g > 0`
/// instead loads the `g * n_trees` tree files already under `out_base`, which
/// is what earlier generations leave behind when `write_trees` is set: the
/// final forest of generation `g` is written to tree indices
/// `g * n_trees .. (g + 1) * n_trees`.
///
/// # Defaults
///
/// | Parameter     | Default |
/// |---------------|---------|
/// | `generation`  | 0       |
/// | `out_base`    | `""`    |
/// | `write_trees` | `false` |
#[derive(Debug, Clone)]
pub struct SemiSupervised {
    forest: RandomForestConfig,
    generation: usize,
    out_base: PathBuf,
    write_trees: bool,
}

/// Result of one semi-supervised pass.
#[derive(Debug)]
pub struct SemiSupervisedOutcome {
    /// Forest trained on the combined pool.
    pub forest: RandomForest,
    /// Labeled records followed by the newly labeled ones, in input order.
    pub records: Vec<Record>,
    /// Number of records labeled in this pass.
    pub n_newly_labeled: usize,
    /// Out-of-bag evaluation of the final forest.
    pub oob_evaluation: Evaluation,
}

impl SemiSupervised {
    /// Create a driver that trains forests with `forest`.
    #[must_use]
    pub fn new(forest: RandomForestConfig) -> Self {
        Self {
            forest,
            generation: 0,
            out_base: PathBuf::new(),
            write_trees: false,
        }
    }

    /// Set the generation number.
    #[must_use]
    pub fn with_generation(mut self, generation: usize) -> Self {
        self.generation = generation;
        self
    }

    /// Set the base path for tree files.
    #[must_use]
    pub fn with_out_base(mut self, out_base: impl Into<PathBuf>) -> Self {
        self.out_base = out_base.into();
        self
    }

    /// Persist the final forest's trees under `out_base`.
    #[must_use]
    pub fn with_write_trees(mut self, write_trees: bool) -> Self {
        self.write_trees = write_trees;
        self
    }

    /// Return the generation number.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Return the tree-file base path.
    #[must_use]
    pub fn out_base(&self) -> &Path {
        &self.out_base
    }

    /// Label `unlabeled` by forest vote, merge it into `labeled`, and retrain.
    ///
    /// Incoming labels on `unlabeled` are ignored and overwritten. There is
    /// no convergence check; one call is one pass.
    ///
    /// # Errors
    ///
    /// Any error from [`RandomForestConfig::fit`] (on either training run) or
    /// from [`RandomForest::load_trees`] / [`RandomForest::save_trees_from`].
    #[instrument(skip_all, fields(
        generation = self.generation,
        n_labeled = labeled.len(),
        n_unlabeled = unlabeled.len()
    ))]
    pub fn run(
        &self,
        mut labeled: Vec<Record>,
        mut unlabeled: Vec<Record>,
    ) -> Result<SemiSupervisedOutcome, RfError> {
        let n_trees = self.forest.n_trees();
        let n_classes = self.forest.n_classes();

        let supervised = if self.generation == 0 {
            self.forest.fit(&labeled)?.into_forest()
        } else {
            RandomForest::load_trees(&self.out_base, self.generation * n_trees, n_classes)?
                .with_fallback_class(self.forest.fallback_class())?
        };

        let predicted = supervised.classify_batch(&unlabeled);
        for (record, label) in unlabeled.iter_mut().zip(predicted) {
            record.class_label = label;
        }
        let n_newly_labeled = unlabeled.len();
        info!(
            n_newly_labeled,
            n_voting_trees = supervised.n_trees(),
            "unlabeled records labeled"
        );

        labeled.append(&mut unlabeled);
        let result = self.forest.fit(&labeled)?;

        if self.write_trees {
            result
                .forest()
                .save_trees_from(&self.out_base, self.generation * n_trees)?;
        }

        let oob_evaluation = result.oob_evaluation().clone();
        Ok(SemiSupervisedOutcome {
            forest: result.into_forest(),
            records: labeled,
            n_newly_labeled,
            oob_evaluation,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::record::FeatureValue;
    use crate::serialize::tree_path;
    use crate::tree::FeatureDrop;

    fn rec(id: String, class_label: usize, x: f64) -> Record {
        Record::new(id, class_label, vec![FeatureValue::Float(x), FeatureValue::Float(0.5)])
    }

    fn labeled() -> Vec<Record> {
        (0..20)
            .map(|i| rec(format!("n{i}"), 1, i as f64 * 0.1))
            .chain((0..20).map(|i| rec(format!("a{i}"), 2, 10.0 + i as f64 * 0.1)))
            .collect()
    }

    fn unlabeled() -> Vec<Record> {
        vec![
            rec("u0".into(), 0, 0.05),
            rec("u1".into(), 0, 10.5),
            rec("u2".into(), 0, 0.8),
            rec("u3".into(), 0, 11.2),
        ]
    }

    fn config() -> RandomForestConfig {
        RandomForestConfig::new(5, 2)
            .unwrap()
            .with_feature_drop(FeatureDrop::None)
            .with_purity_threshold(1.0)
            .with_seed(3)
    }

    #[test]
    fn generation_zero_labels_and_merges() {
        let outcome = SemiSupervised::new(config())
            .run(labeled(), unlabeled())
            .unwrap();

        assert_eq!(outcome.n_newly_labeled, 4);
        assert_eq!(outcome.records.len(), 44);
        let labels: Vec<usize> = outcome.records[40..].iter().map(|r| r.class_label).collect();
        assert_eq!(labels, vec![1, 2, 1, 2]);
        assert_eq!(outcome.records[40].id, "u0");
        assert_eq!(outcome.forest.n_trees(), 5);
    }

    #[test]
    fn generations_accumulate_tree_files() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("ssl_");

        SemiSupervised::new(config())
            .with_out_base(&base)
            .with_write_trees(true)
            .run(labeled(), unlabeled())
            .unwrap();
        assert!(tree_path(&base, 4).exists());
        assert!(!tree_path(&base, 5).exists());

        let outcome = SemiSupervised::new(config())
            .with_generation(1)
            .with_out_base(&base)
            .with_write_trees(true)
            .run(labeled(), unlabeled())
            .unwrap();
        assert!(tree_path(&base, 9).exists());
        let labels: Vec<usize> = outcome.records[40..].iter().map(|r| r.class_label).collect();
        assert_eq!(labels, vec![1, 2, 1, 2]);
    }

    #[test]
    fn missing_generation_files_are_an_error() {
        let dir = TempDir::new().unwrap();
        let err = SemiSupervised::new(config())
            .with_generation(2)
            .with_out_base(dir.path().join("absent_"))
            .run(labeled(), unlabeled())
            .unwrap_err();
        assert!(matches!(err, RfError::ReadTree { .. }));
    }

    #[test]
    fn empty_unlabeled_just_retrains() {
        let outcome = SemiSupervised::new(config())
            .run(labeled(), Vec::new())
            .unwrap();
        assert_eq!(outcome.n_newly_labeled, 0);
        assert_eq!(outcome.records.len(), 40);
    }
}
