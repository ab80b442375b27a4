//! Configuration builder for Random Forest training.

use std::ops::Range;

use crate::error::RfError;
use crate::record::Record;
use crate::result::RandomForestResult;
use crate::stats::SpreadMode;
use crate::tree::{DecisionTreeConfig, FeatureDrop};

/// Class voted by a tree that cannot route a record (the anomalous class).
pub const DEFAULT_FALLBACK_CLASS: usize = 2;

/// Configuration for Random Forest training.
///
/// Construct via [`RandomForestConfig::new`], then chain `with_*` methods.
/// Per-tree settings are forwarded to every [`DecisionTreeConfig`] the
/// forest builds; each tree gets its own seed derived from `seed`.
///
/// # Defaults
///
/// | Parameter          | Default                               |
/// |--------------------|---------------------------------------|
/// | `purity_threshold` | 0.85                                  |
/// | `big_value`        | 1e11                                  |
/// | `feature_drop`     | `Random`                              |
/// | `boolean_band`     | `8..27`                               |
/// | `spread_mode`      | `Zero`                                |
/// | `max_depth`        | `None`                                |
/// | `fallback_class`   | 2 (1 when `n_classes` is 1)           |
/// | `seed`             | 42                                    |
#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) tree: DecisionTreeConfig,
    pub(crate) fallback_class: usize,
    pub(crate) seed: u64,
}

impl RandomForestConfig {
    /// Create a new config for `n_trees` trees over `n_classes` classes.
    ///
    /// # Errors
    ///
    /// | Variant                        | When                 |
    /// |--------------------------------|----------------------|
    /// | [`RfError::InvalidTreeCount`]  | `n_trees` is zero    |
    /// | [`RfError::InvalidClassCount`] | `n_classes` is zero  |
    pub fn new(n_trees: usize, n_classes: usize) -> Result<Self, RfError> {
        if n_trees == 0 {
            return Err(RfError::InvalidTreeCount { n_trees });
        }
        let tree = DecisionTreeConfig::new(n_classes)?;
        Ok(Self {
            n_trees,
            tree,
            fallback_class: DEFAULT_FALLBACK_CLASS.min(n_classes),
            seed: 42,
        })
    }

    // --- Setters ---

    /// Set the class share at which a node stops splitting.
    #[must_use]
    pub fn with_purity_threshold(mut self, purity_threshold: f64) -> Self {
        self.tree = self.tree.with_purity_threshold(purity_threshold);
        self
    }

    /// Set the sentinel score for features that may not be chosen.
    #[must_use]
    pub fn with_big_value(mut self, big_value: f64) -> Self {
        self.tree = self.tree.with_big_value(big_value);
        self
    }

    /// Set the root feature-exclusion strategy used by every tree.
    #[must_use]
    pub fn with_feature_drop(mut self, feature_drop: FeatureDrop) -> Self {
        self.tree = self.tree.with_feature_drop(feature_drop);
        self
    }

    /// Set the band of boolean-combination slots consumed once split on.
    #[must_use]
    pub fn with_boolean_band(mut self, boolean_band: Range<usize>) -> Self {
        self.tree = self.tree.with_boolean_band(boolean_band);
        self
    }

    /// Set how per-class spreads are computed.
    #[must_use]
    pub fn with_spread_mode(mut self, spread_mode: SpreadMode) -> Self {
        self.tree = self.tree.with_spread_mode(spread_mode);
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.tree = self.tree.with_max_depth(max_depth);
        self
    }

    /// Set the class voted by trees that cannot classify a record.
    #[must_use]
    pub fn with_fallback_class(mut self, fallback_class: usize) -> Self {
        self.fallback_class = fallback_class;
        self
    }

    /// Set the master seed for bagging and per-tree seeds.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.tree.n_classes()
    }

    /// Return the per-tree configuration template.
    #[must_use]
    pub fn tree_config(&self) -> &DecisionTreeConfig {
        &self.tree
    }

    /// Return the fallback class.
    #[must_use]
    pub fn fallback_class(&self) -> usize {
        self.fallback_class
    }

    /// Return the master seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn validate(&self) -> Result<(), RfError> {
        self.tree.validate()?;
        let n_classes = self.tree.n_classes();
        if self.fallback_class == 0 || self.fallback_class > n_classes {
            return Err(RfError::InvalidFallbackClass {
                class_label: self.fallback_class,
                n_classes,
            });
        }
        Ok(())
    }

    /// Train a Random Forest on `records` and evaluate it on the out-of-bag set.
    ///
    /// # Errors
    ///
    /// | Variant                              | When                                      |
    /// |--------------------------------------|-------------------------------------------|
    /// | [`RfError::EmptyDataset`]            | `records` is empty                        |
    /// | [`RfError::ZeroFeatures`]            | records have zero feature slots           |
    /// | [`RfError::FeatureCountMismatch`]    | records have inconsistent lengths         |
    /// | [`RfError::InvalidClassLabel`]       | a label is outside `[1, n_classes]`       |
    /// | [`RfError::InvalidPurityThreshold`]  | threshold is not in (0.0, 1.0]            |
    /// | [`RfError::InvalidMaxDepth`]         | `max_depth` is `Some(0)`                  |
    /// | [`RfError::InvalidFallbackClass`]    | fallback is outside `[1, n_classes]`      |
    pub fn fit(&self, records: &[Record]) -> Result<RandomForestResult, RfError> {
        crate::forest::train(self, records)
    }
}
