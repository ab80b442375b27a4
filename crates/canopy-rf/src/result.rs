//! Training result types for Random Forest.

use serde::Serialize;

use crate::eval::Evaluation;
use crate::forest::RandomForest;

/// Metadata about the training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingMetadata {
    /// Number of trees trained.
    pub n_trees: usize,
    /// Number of feature slots per record.
    pub n_features: usize,
    /// Number of classes.
    pub n_classes: usize,
    /// Number of training records.
    pub n_records: usize,
    /// Wall-clock time spent growing the trees.
    pub elapsed_secs: f64,
}

/// Result of Random Forest training.
///
/// Contains the fitted forest, the pooled out-of-bag record indices, the
/// forest's evaluation on those records, and training metadata.
#[derive(Debug)]
pub struct RandomForestResult {
    forest: RandomForest,
    oob_indices: Vec<usize>,
    oob_evaluation: Evaluation,
    metadata: TrainingMetadata,
}

impl RandomForestResult {
    pub(crate) fn new(
        forest: RandomForest,
        oob_indices: Vec<usize>,
        oob_evaluation: Evaluation,
        metadata: TrainingMetadata,
    ) -> Self {
        Self {
            forest,
            oob_indices,
            oob_evaluation,
            metadata,
        }
    }

    /// Borrow the fitted forest.
    #[must_use]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Consume the result and return the fitted forest.
    #[must_use]
    pub fn into_forest(self) -> RandomForest {
        self.forest
    }

    /// Return the indices of records no tree was trained on, ascending.
    #[must_use]
    pub fn oob_indices(&self) -> &[usize] {
        &self.oob_indices
    }

    /// Return the evaluation on the out-of-bag records.
    ///
    /// Empty (`total == 0`) when every record was drawn by some tree.
    #[must_use]
    pub fn oob_evaluation(&self) -> &Evaluation {
        &self.oob_evaluation
    }

    /// Return training metadata.
    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }
}
