//! Random Forest classification over heterogeneous records.
//!
//! Trees are grown with a class-conditional purity heuristic: each class
//! proposes its feature mean as a threshold and the purest left partition
//! wins. Forests are bagged and trained in parallel via rayon, evaluated on
//! their out-of-bag records, and persisted one flat text file per tree.
//! Lift-based association rules synthesize derived features, and a
//! semi-supervised pass labels new records by forest vote.

mod associations;
pub mod bagging;
mod config;
mod confusion;
mod error;
mod eval;
mod forest;
mod node;
mod predict;
mod pvalue;
mod record;
mod result;
mod semi_supervised;
mod serialize;
mod split;
mod stats;
mod tree;

pub use associations::{
    AssociationConfig, AssociationRules, RULES_FILE_SUFFIX, RuleSelection, rules_path,
};
pub use bagging::BaggedSets;
pub use config::{DEFAULT_FALLBACK_CLASS, RandomForestConfig};
pub use confusion::{BinaryConfusion, ClassMetrics, ConfusionMatrix};
pub use error::RfError;
pub use eval::Evaluation;
pub use forest::RandomForest;
pub use node::{FeatureIndex, Node, NodeIndex};
pub use predict::majority_vote;
pub use pvalue::{INFORMATIVE_CUTOFF, NEUTRAL_P_VALUE, PValueSource, ProcessPValue};
pub use record::{FeatureValue, Record};
pub use result::{RandomForestResult, TrainingMetadata};
pub use semi_supervised::{SemiSupervised, SemiSupervisedOutcome};
pub use serialize::{TreeReadMode, tree_path};
pub use split::{
    SplitOutcome, SplitParams, UsedFeatures, find_entropy, find_split, majority_class,
    stopping_condition,
};
pub use stats::{ClassStatistics, SpreadMode};
pub use tree::{
    DEFAULT_BIG_VALUE, DEFAULT_BOOLEAN_BAND, DEFAULT_PURITY_THRESHOLD, DecisionTree,
    DecisionTreeConfig, FeatureDrop,
};
