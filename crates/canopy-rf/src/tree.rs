use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    RfError,
    node::{Node, NodeIndex},
    pvalue::{PValueSource, informative_feature_filter},
    record::{FeatureValue, Record},
    split::{SplitOutcome, SplitParams, UsedFeatures, find_split, majority_class},
    stats::{ClassStatistics, SpreadMode},
};

/// Default sentinel score for features that may not be chosen.
pub const DEFAULT_BIG_VALUE: f64 = 100_000_000_000.0;

/// Default class share at which a node becomes a leaf.
pub const DEFAULT_PURITY_THRESHOLD: f64 = 0.85;

/// Default band of boolean-combination feature slots (indices 8 through 26).
pub const DEFAULT_BOOLEAN_BAND: Range<usize> = 8..27;

/// How feature slots are excluded at the root before a tree is grown.
#[derive(Clone, Default)]
pub enum FeatureDrop {
    /// Exclude nothing.
    None,
    /// Exclude `n_features / 4 + 1` slots drawn uniformly with replacement.
    #[default]
    Random,
    /// Exclude slots whose class-1-versus-rest p-value is above 0.2 or NaN.
    PValue(Arc<dyn PValueSource>),
}

impl fmt::Debug for FeatureDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureDrop::None => f.write_str("None"),
            FeatureDrop::Random => f.write_str("Random"),
            FeatureDrop::PValue(_) => f.write_str("PValue(..)"),
        }
    }
}

/// Configuration for a single purity-heuristic decision tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter          | Default              |
/// |--------------------|----------------------|
/// | `purity_threshold` | 0.85                 |
/// | `big_value`        | 1e11                 |
/// | `feature_drop`     | `Random`             |
/// | `boolean_band`     | `8..27`              |
/// | `spread_mode`      | `Zero`               |
/// | `max_depth`        | `None` (unlimited)   |
/// | `seed`             | 42                   |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) n_classes: usize,
    pub(crate) purity_threshold: f64,
    pub(crate) big_value: f64,
    pub(crate) feature_drop: FeatureDrop,
    pub(crate) boolean_band: Range<usize>,
    pub(crate) spread_mode: SpreadMode,
    pub(crate) max_depth: Option<usize>,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Create a new config for `n_classes` one-based classes.
    ///
    /// # Errors
    ///
    /// Returns [`RfError::InvalidClassCount`] if `n_classes` is zero.
    pub fn new(n_classes: usize) -> Result<Self, RfError> {
        if n_classes == 0 {
            return Err(RfError::InvalidClassCount { n_classes });
        }
        Ok(Self {
            n_classes,
            purity_threshold: DEFAULT_PURITY_THRESHOLD,
            big_value: DEFAULT_BIG_VALUE,
            feature_drop: FeatureDrop::Random,
            boolean_band: DEFAULT_BOOLEAN_BAND,
            spread_mode: SpreadMode::Zero,
            max_depth: None,
            seed: 42,
        })
    }

    /// Set the class share at which a node stops splitting.
    #[must_use]
    pub fn with_purity_threshold(mut self, purity_threshold: f64) -> Self {
        self.purity_threshold = purity_threshold;
        self
    }

    /// Set the sentinel score for features that may not be chosen.
    #[must_use]
    pub fn with_big_value(mut self, big_value: f64) -> Self {
        self.big_value = big_value;
        self
    }

    /// Set the root feature-exclusion strategy.
    #[must_use]
    pub fn with_feature_drop(mut self, feature_drop: FeatureDrop) -> Self {
        self.feature_drop = feature_drop;
        self
    }

    /// Set the band of boolean-combination slots consumed once split on.
    #[must_use]
    pub fn with_boolean_band(mut self, boolean_band: Range<usize>) -> Self {
        self.boolean_band = boolean_band;
        self
    }

    /// Set how per-class spreads are computed.
    #[must_use]
    pub fn with_spread_mode(mut self, spread_mode: SpreadMode) -> Self {
        self.spread_mode = spread_mode;
        self
    }

    /// Set the maximum tree depth. `None` grows until the purity threshold
    /// or a degenerate split stops every branch.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the random seed used for [`FeatureDrop::Random`].
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the purity threshold.
    #[must_use]
    pub fn purity_threshold(&self) -> f64 {
        self.purity_threshold
    }

    /// Return the root feature-exclusion strategy.
    #[must_use]
    pub fn feature_drop(&self) -> &FeatureDrop {
        &self.feature_drop
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn validate(&self) -> Result<(), RfError> {
        if !(self.purity_threshold > 0.0 && self.purity_threshold <= 1.0) {
            return Err(RfError::InvalidPurityThreshold {
                threshold: self.purity_threshold,
            });
        }
        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(RfError::InvalidMaxDepth { max_depth: 0 });
        }
        Ok(())
    }

    /// Grow a tree from borrowed training records.
    ///
    /// The tree is expanded depth-first with an explicit work stack: when a
    /// node splits, the right branch is deferred and the left branch is
    /// expanded immediately.
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
    #[instrument(skip_all, fields(n_records = records.len()))]
    pub fn fit(&self, records: &[&Record]) -> Result<DecisionTree, RfError> {
        self.validate()?;
        let n_features = validate_records(records, self.n_classes)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let root_used = self.root_exclusions(records, n_features, &mut rng);

        debug!(
            n_features,
            n_classes = self.n_classes,
            n_excluded = root_used.len(),
            "fitting decision tree"
        );

        let params = SplitParams {
            n_classes: self.n_classes,
            purity_threshold: self.purity_threshold,
            big_value: self.big_value,
            boolean_band: self.boolean_band.clone(),
        };
        let nodes = self.grow(records.to_vec(), root_used, &params);

        debug!(n_nodes = nodes.len(), "decision tree built");

        Ok(DecisionTree { nodes })
    }

    fn root_exclusions(
        &self,
        records: &[&Record],
        n_features: usize,
        rng: &mut ChaCha8Rng,
    ) -> UsedFeatures {
        match &self.feature_drop {
            FeatureDrop::None => UsedFeatures::new(),
            FeatureDrop::Random => (0..n_features / 4 + 1)
                .map(|_| rng.gen_range(0..n_features))
                .collect(),
            FeatureDrop::PValue(source) => {
                informative_feature_filter(records, n_features, source.as_ref())
            }
        }
    }

    fn grow<'a>(
        &self,
        records: Vec<&'a Record>,
        root_used: UsedFeatures,
        params: &SplitParams,
    ) -> Vec<Node> {
        // Slots are reserved as placeholder leaves and overwritten once decided.
        let mut arena = vec![Node::Leaf { class_label: 0 }];
        let mut stack: Vec<Pending<'a>> = Vec::new();
        let mut current = Some(Pending {
            slot: NodeIndex::new(0),
            records,
            used: root_used,
            depth: 0,
        });

        while let Some(pending) = current.take() {
            let depth_reached = self.max_depth.is_some_and(|d| pending.depth >= d);
            let outcome = if depth_reached {
                SplitOutcome::Leaf {
                    class_label: majority_class(&pending.records, self.n_classes),
                }
            } else {
                let stats =
                    ClassStatistics::summarize(&pending.records, self.n_classes, self.spread_mode);
                find_split(&pending.records, &stats, &pending.used, params)
            };

            match outcome {
                SplitOutcome::Leaf { class_label } => {
                    arena[pending.slot.index()] = Node::Leaf { class_label };
                    current = stack.pop();
                }
                SplitOutcome::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    child_used,
                } => {
                    let left_slot = NodeIndex::new(arena.len());
                    arena.push(Node::Leaf { class_label: 0 });
                    let right_slot = NodeIndex::new(arena.len());
                    arena.push(Node::Leaf { class_label: 0 });

                    arena[pending.slot.index()] = Node::Split {
                        feature,
                        threshold,
                        left: left_slot,
                        right: right_slot,
                    };

                    stack.push(Pending {
                        slot: right_slot,
                        records: right,
                        used: child_used.clone(),
                        depth: pending.depth + 1,
                    });
                    current = Some(Pending {
                        slot: left_slot,
                        records: left,
                        used: child_used,
                        depth: pending.depth + 1,
                    });
                }
            }
        }

        arena
    }
}

/// A subtree waiting to be expanded.
struct Pending<'a> {
    slot: NodeIndex,
    records: Vec<&'a Record>,
    used: UsedFeatures,
    depth: usize,
}

/// Check shape and labels of training records; return the feature count.
pub(crate) fn validate_records(records: &[&Record], n_classes: usize) -> Result<usize, RfError> {
    let first = records.first().ok_or(RfError::EmptyDataset)?;
    let n_features = first.features.len();
    if n_features == 0 {
        return Err(RfError::ZeroFeatures);
    }
    for (record_index, record) in records.iter().enumerate() {
        if record.features.len() != n_features {
            return Err(RfError::FeatureCountMismatch {
                expected: n_features,
                got: record.features.len(),
                record_index,
            });
        }
        if record.class_label == 0 || record.class_label > n_classes {
            return Err(RfError::InvalidClassLabel {
                class_label: record.class_label,
                n_classes,
                record_index,
            });
        }
    }
    Ok(n_features)
}

/// A fitted decision tree.
///
/// Stored as an arena-based `Vec<Node>` with index references; the root is
/// at index 0. Immutable once built or loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
}

impl DecisionTree {
    /// Classify a feature vector.
    ///
    /// At each split, goes left when the coerced value is `<= threshold`.
    /// Returns `None` when a split tests a slot the vector does not have;
    /// callers decide which class that maps to (see [`DecisionTree::classify_or`]).
    #[must_use]
    pub fn classify(&self, features: &[FeatureValue]) -> Option<usize> {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx)? {
                Node::Leaf { class_label } => return Some(*class_label),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(feature.index())?.as_f64();
                    idx = if value <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }

    /// Classify a feature vector, returning `fallback` when classification fails.
    #[must_use]
    pub fn classify_or(&self, features: &[FeatureValue], fallback: usize) -> usize {
        self.classify(features).unwrap_or(fallback)
    }

    /// Return the arena of nodes; the root is at index 0.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree.
    ///
    /// A single-node tree (just a root leaf) has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node_idx, d)) = stack.pop() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((right.index(), d + 1));
                    stack.push((left.index(), d + 1));
                }
            }
        }
        max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FeatureIndex;

    fn rec(class_label: usize, values: &[f64]) -> Record {
        Record::new(
            "r",
            class_label,
            values.iter().map(|&v| FeatureValue::Float(v)).collect(),
        )
    }

    fn refs(records: &[Record]) -> Vec<&Record> {
        records.iter().collect()
    }

    /// Feature 0 separates class 1 (`<= 0.5`) from class 2 (`> 0.5`);
    /// feature 1 carries no signal.
    fn separable() -> Vec<Record> {
        vec![
            rec(1, &[0.5, 0.5]),
            rec(1, &[0.5, 0.5]),
            rec(1, &[0.5, 0.5]),
            rec(1, &[0.5, 0.5]),
            rec(2, &[0.8, 0.5]),
            rec(2, &[0.9, 0.5]),
            rec(2, &[1.0, 0.5]),
            rec(2, &[1.1, 0.5]),
        ]
    }

    fn config() -> DecisionTreeConfig {
        DecisionTreeConfig::new(2)
            .unwrap()
            .with_feature_drop(FeatureDrop::None)
    }

    #[test]
    fn empty_dataset_error() {
        let err = config().fit(&[]).unwrap_err();
        assert!(matches!(err, RfError::EmptyDataset));
    }

    #[test]
    fn zero_class_count_error() {
        assert!(matches!(
            DecisionTreeConfig::new(0),
            Err(RfError::InvalidClassCount { n_classes: 0 })
        ));
    }

    #[test]
    fn pure_dataset_single_leaf() {
        let records = vec![rec(1, &[1.0, 2.0]), rec(1, &[3.0, 4.0])];
        let tree = config().fit(&refs(&records)).unwrap();
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.classify(&records[0].features), Some(1));
    }

    #[test]
    fn separable_data_single_split_two_pure_leaves() {
        let records = separable();
        let tree = config()
            .with_purity_threshold(0.85)
            .fit(&refs(&records))
            .unwrap();

        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.depth(), 1);
        match &tree.nodes()[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, FeatureIndex::new(0));
                assert!((threshold - 0.5).abs() < 1e-12);
            }
            Node::Leaf { .. } => panic!("root should split"),
        }
        for record in &records {
            assert_eq!(tree.classify(&record.features), Some(record.class_label));
        }
    }

    #[test]
    fn mixed_data_needs_more_than_one_split() {
        // Class 2 sits on both sides of class 1 along feature 0.
        let records = vec![
            rec(2, &[0.0]),
            rec(2, &[0.0]),
            rec(1, &[5.0]),
            rec(1, &[5.0]),
            rec(1, &[5.0]),
            rec(2, &[10.0]),
            rec(2, &[10.0]),
        ];
        let tree = config().fit(&refs(&records)).unwrap();
        assert!(tree.depth() >= 2, "depth = {}", tree.depth());
        for record in &records {
            assert_eq!(tree.classify(&record.features), Some(record.class_label));
        }
    }

    #[test]
    fn max_depth_limits_tree() {
        let records = vec![
            rec(2, &[0.0]),
            rec(2, &[0.0]),
            rec(1, &[5.0]),
            rec(1, &[5.0]),
            rec(1, &[5.0]),
            rec(2, &[10.0]),
            rec(2, &[10.0]),
        ];
        let tree = config()
            .with_max_depth(Some(1))
            .fit(&refs(&records))
            .unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn out_of_range_split_falls_back() {
        let records = separable();
        let tree = config().fit(&refs(&records)).unwrap();
        // A vector without slot 0 cannot be routed.
        assert_eq!(tree.classify(&[]), None);
        assert_eq!(tree.classify_or(&[], 2), 2);
    }

    #[test]
    fn string_slots_route_as_zero() {
        let records = separable();
        let tree = config().fit(&refs(&records)).unwrap();
        let features = vec![FeatureValue::from("9.9"), FeatureValue::Float(0.5)];
        // "9.9" coerces to 0.0 <= 0.5, so it goes left to class 1.
        assert_eq!(tree.classify(&features), Some(1));
    }

    #[test]
    fn random_drop_is_deterministic_with_same_seed() {
        let records: Vec<Record> = (0..40)
            .map(|i| {
                let class = i % 2 + 1;
                let values: Vec<f64> = (0..8).map(|f| (class * (f + 1) + i % 3) as f64).collect();
                rec(class, &values)
            })
            .collect();
        let c = DecisionTreeConfig::new(2).unwrap().with_seed(7);
        let a = c.fit(&refs(&records)).unwrap();
        let b = c.fit(&refs(&records)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn pvalue_drop_excludes_uninformative_features() {
        // Feature 0 separates; feature 1 is noise. The stub reports a large
        // p-value whenever the two groups share a mean.
        let records = vec![
            rec(1, &[0.0, 1.0]),
            rec(1, &[0.0, 0.0]),
            rec(2, &[1.0, 1.0]),
            rec(2, &[1.0, 0.0]),
        ];
        let stub = |a: &[f64], b: &[f64]| {
            let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
            if (mean(a) - mean(b)).abs() < 1e-9 { 0.9 } else { 0.01 }
        };
        let tree = DecisionTreeConfig::new(2)
            .unwrap()
            .with_feature_drop(FeatureDrop::PValue(Arc::new(stub)))
            .fit(&refs(&records))
            .unwrap();
        match &tree.nodes()[0] {
            Node::Split { feature, .. } => assert_eq!(feature.index(), 0),
            Node::Leaf { .. } => panic!("root should split"),
        }
    }

    #[test]
    fn nan_noise_slot_does_not_collapse_tree() {
        let mut records: Vec<Record> = (0..10)
            .map(|i| rec(1, &[0.1 * i as f64, (i % 2) as f64]))
            .chain((0..10).map(|i| rec(2, &[5.0 + 0.1 * i as f64, (i % 2) as f64])))
            .collect();
        records[4].features[1] = FeatureValue::Float(f64::NAN);

        let tree = config()
            .with_purity_threshold(0.85)
            .fit(&refs(&records))
            .unwrap();
        assert!(tree.n_nodes() >= 3, "n_nodes = {}", tree.n_nodes());
        match &tree.nodes()[0] {
            Node::Split { feature, .. } => assert_eq!(feature.index(), 0),
            Node::Leaf { .. } => panic!("root should split"),
        }
    }

    #[test]
    fn feature_count_mismatch_error() {
        let records = vec![rec(1, &[1.0, 2.0]), rec(2, &[3.0])];
        let err = config().fit(&refs(&records)).unwrap_err();
        assert!(matches!(
            err,
            RfError::FeatureCountMismatch {
                expected: 2,
                got: 1,
                record_index: 1
            }
        ));
    }

    #[test]
    fn invalid_class_label_error() {
        let records = vec![rec(1, &[1.0]), rec(0, &[3.0])];
        let err = config().fit(&refs(&records)).unwrap_err();
        assert!(matches!(err, RfError::InvalidClassLabel { class_label: 0, .. }));

        let records = vec![rec(3, &[1.0])];
        let err = config().fit(&refs(&records)).unwrap_err();
        assert!(matches!(err, RfError::InvalidClassLabel { class_label: 3, .. }));
    }

    #[test]
    fn invalid_purity_threshold_error() {
        let records = separable();
        let err = config()
            .with_purity_threshold(0.0)
            .fit(&refs(&records))
            .unwrap_err();
        assert!(matches!(err, RfError::InvalidPurityThreshold { .. }));
    }
}
