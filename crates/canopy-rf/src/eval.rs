//! Forest evaluation against labeled records.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use tracing::{info, instrument};

use crate::confusion::{BinaryConfusion, ConfusionMatrix};
use crate::forest::RandomForest;
use crate::record::Record;

/// Outcome of classifying a labeled set with a forest.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Records whose predicted class differs from their label.
    pub misclassified: usize,
    /// Records evaluated.
    pub total: usize,
    /// Confusion matrix of true versus predicted class.
    pub confusion: ConfusionMatrix,
}

impl Evaluation {
    pub(crate) fn from_labels(true_labels: &[usize], predicted: &[usize], n_classes: usize) -> Self {
        let misclassified = true_labels
            .iter()
            .zip(predicted)
            .filter(|(t, p)| t != p)
            .count();
        Self {
            misclassified,
            total: true_labels.len(),
            confusion: ConfusionMatrix::from_labels(true_labels, predicted, n_classes),
        }
    }

    /// Fraction of records misclassified; 0.0 for an empty set.
    #[must_use]
    pub fn misclassification_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.misclassified as f64 / self.total as f64
        }
    }

    /// Fraction of records classified correctly; 0.0 for an empty set.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            1.0 - self.misclassification_rate()
        }
    }

    /// Normal (class 1) versus anomalous (class 2) counts.
    #[must_use]
    pub fn binary(&self) -> BinaryConfusion {
        self.confusion.binary()
    }
}

impl RandomForest {
    /// Classify every record and compare with its label.
    #[instrument(skip_all, fields(n_records = records.len(), n_trees = self.trees.len()))]
    pub fn evaluate(&self, records: &[Record]) -> Evaluation {
        let predicted = self.classify_batch(records);
        let true_labels: Vec<usize> = records.iter().map(|r| r.class_label).collect();
        let evaluation = Evaluation::from_labels(&true_labels, &predicted, self.n_classes);
        info!(
            misclassified = evaluation.misclassified,
            total = evaluation.total,
            rate = evaluation.misclassification_rate(),
            "forest evaluated"
        );
        evaluation
    }

    /// Evaluate only the records at `indices`.
    pub(crate) fn evaluate_indices(&self, records: &[Record], indices: &[usize]) -> Evaluation {
        let predicted: Vec<usize> = indices
            .par_iter()
            .map(|&i| self.classify(&records[i].features))
            .collect();
        let true_labels: Vec<usize> = indices.iter().map(|&i| records[i].class_label).collect();
        Evaluation::from_labels(&true_labels, &predicted, self.n_classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::record::FeatureValue;
    use crate::tree::DecisionTree;

    fn constant_forest(class_label: usize) -> RandomForest {
        let tree = DecisionTree {
            nodes: vec![Node::Leaf { class_label }],
        };
        RandomForest::from_trees(vec![tree], 2)
    }

    fn labeled(labels: &[usize]) -> Vec<Record> {
        labels
            .iter()
            .map(|&l| Record::new("r", l, vec![FeatureValue::Float(0.0)]))
            .collect()
    }

    #[test]
    fn counts_misclassifications() {
        let records = labeled(&[1, 1, 2, 2, 2]);
        let evaluation = constant_forest(2).evaluate(&records);
        assert_eq!(evaluation.misclassified, 2);
        assert_eq!(evaluation.total, 5);
        assert!((evaluation.misclassification_rate() - 0.4).abs() < 1e-12);
        assert!((evaluation.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn binary_summary_for_read_forest_mode() {
        let records = labeled(&[1, 1, 2]);
        let binary = constant_forest(2).evaluate(&records).binary();
        assert_eq!(binary.true_positives, 1);
        assert_eq!(binary.false_positives, 2);
        assert_eq!(binary.true_negatives, 0);
        assert_eq!(binary.false_negatives, 0);
    }

    #[test]
    fn empty_set_has_zero_rates() {
        let evaluation = constant_forest(1).evaluate(&[]);
        assert_eq!(evaluation.total, 0);
        assert_eq!(evaluation.misclassification_rate(), 0.0);
        assert_eq!(evaluation.accuracy(), 0.0);
    }

    #[test]
    fn subset_evaluation_uses_only_listed_records() {
        let records = labeled(&[1, 2, 1, 2]);
        let evaluation = constant_forest(1).evaluate_indices(&records, &[0, 2]);
        assert_eq!(evaluation.total, 2);
        assert_eq!(evaluation.misclassified, 0);
    }
}
