//! Ensemble voting for the Random Forest.

use std::collections::BTreeMap;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::forest::RandomForest;
use crate::record::{FeatureValue, Record};
use crate::tree::DecisionTree;

/// Return the most frequent label in `votes`.
///
/// Ties go to the lowest label; an empty slice yields class 1.
#[must_use]
pub fn majority_vote(votes: &[usize]) -> usize {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &vote in votes {
        *counts.entry(vote).or_insert(0) += 1;
    }

    let mut best = (1usize, 0usize);
    for (label, count) in counts {
        if count > best.1 {
            best = (label, count);
        }
    }
    best.0
}

impl RandomForest {
    /// Collect one vote per tree. A tree that cannot route the vector votes
    /// the fallback class.
    #[must_use]
    pub fn votes(&self, features: &[FeatureValue]) -> Vec<usize> {
        self.trees
            .iter()
            .map(|tree| tree.classify_or(features, self.fallback_class))
            .collect()
    }

    /// Classify a feature vector by majority vote over all trees.
    #[must_use]
    pub fn classify(&self, features: &[FeatureValue]) -> usize {
        majority_vote(&self.votes(features))
    }

    /// Classify a batch of records in parallel, preserving input order.
    #[must_use]
    pub fn classify_batch(&self, records: &[Record]) -> Vec<usize> {
        records
            .par_iter()
            .map(|record| self.classify(&record.features))
            .collect()
    }

    /// Return the trees in insertion order.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the class voted by trees that cannot classify a record.
    #[must_use]
    pub fn fallback_class(&self) -> usize {
        self.fallback_class
    }
}
