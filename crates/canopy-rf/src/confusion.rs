//! Confusion matrices over one-based class labels.

use std::fmt;

use serde::Serialize;

/// A confusion matrix for multi-class classification.
///
/// Entry `matrix[t - 1][p - 1]` counts records with true class `t` that were
/// predicted as `p`. Pairs with a label outside `[1, n_classes]` are not
/// placed in the matrix; they are counted in [`ConfusionMatrix::n_unplaced`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
    n_unplaced: usize,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone, Serialize)]
pub struct ClassMetrics {
    /// The one-based class label.
    pub class: usize,
    /// Precision: TP / (TP + FP). 0.0 if no predictions for this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no true records for this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of true records in this class.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from paired true and predicted labels.
    #[must_use]
    pub fn from_labels(true_labels: &[usize], predicted: &[usize], n_classes: usize) -> Self {
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        let mut n_unplaced = 0usize;
        for (&t, &p) in true_labels.iter().zip(predicted) {
            let in_range = |c: usize| (1..=n_classes).contains(&c);
            if in_range(t) && in_range(p) {
                matrix[t - 1][p - 1] += 1;
            } else {
                n_unplaced += 1;
            }
        }
        Self {
            matrix,
            n_classes,
            n_unplaced,
        }
    }

    /// Number of records of class `true_class` predicted as `predicted`.
    #[must_use]
    pub fn count(&self, true_class: usize, predicted: usize) -> usize {
        if true_class == 0 || predicted == 0 {
            return 0;
        }
        self.matrix
            .get(true_class - 1)
            .and_then(|row| row.get(predicted - 1))
            .copied()
            .unwrap_or(0)
    }

    /// Per-class precision, recall, F1, and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        (0..self.n_classes)
            .map(|c| {
                let tp = self.matrix[c][c];
                let fp: usize = (0..self.n_classes)
                    .filter(|&i| i != c)
                    .map(|i| self.matrix[i][c])
                    .sum();
                let fn_: usize = (0..self.n_classes)
                    .filter(|&j| j != c)
                    .map(|j| self.matrix[c][j])
                    .sum();
                let support = tp + fn_;
                let precision = if tp + fp == 0 {
                    0.0
                } else {
                    tp as f64 / (tp + fp) as f64
                };
                let recall = if support == 0 {
                    0.0
                } else {
                    tp as f64 / support as f64
                };
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    class: c + 1,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Collapse to the normal (class 1) versus anomalous (class 2) view.
    #[must_use]
    pub fn binary(&self) -> BinaryConfusion {
        BinaryConfusion {
            true_positives: self.count(2, 2),
            true_negatives: self.count(1, 1),
            false_positives: self.count(1, 2),
            false_negatives: self.count(2, 1),
        }
    }

    /// Return the underlying matrix rows; row `i` is true class `i + 1`.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of pairs with a label outside `[1, n_classes]`.
    #[must_use]
    pub fn n_unplaced(&self) -> usize {
        self.n_unplaced
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 1..=self.n_classes {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f)?;

        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "true_{:>3}", i + 1)?;
            for val in row {
                write!(f, " {val:>7}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Two-class summary with class 2 (anomalous) as the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BinaryConfusion {
    /// Anomalous records predicted anomalous.
    pub true_positives: usize,
    /// Normal records predicted normal.
    pub true_negatives: usize,
    /// Normal records predicted anomalous.
    pub false_positives: usize,
    /// Anomalous records predicted normal.
    pub false_negatives: usize,
}

impl BinaryConfusion {
    /// Total records counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// Fraction of anomalous records that were detected. 0.0 when there are none.
    #[must_use]
    pub fn detection_rate(&self) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_negatives,
        )
    }

    /// Fraction of normal records flagged anomalous. 0.0 when there are none.
    #[must_use]
    pub fn false_positive_rate(&self) -> f64 {
        ratio(
            self.false_positives,
            self.false_positives + self.true_negatives,
        )
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let labels = vec![1, 1, 2, 2, 3, 3];
        let cm = ConfusionMatrix::from_labels(&labels, &labels, 3);
        assert_eq!(cm.n_unplaced(), 0);

        for m in cm.class_metrics() {
            assert!((m.precision - 1.0).abs() < f64::EPSILON);
            assert!((m.recall - 1.0).abs() < f64::EPSILON);
            assert!((m.f1 - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn known_confusion_matrix() {
        let true_labels = vec![1, 1, 1, 2, 2, 2, 3, 3, 3];
        let predicted = vec![1, 1, 2, 2, 2, 3, 3, 3, 1];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted, 3);

        let metrics = cm.class_metrics();
        assert_eq!(metrics[0].class, 1);
        assert!((metrics[0].precision - 2.0 / 3.0).abs() < 1e-10);
        assert!((metrics[0].recall - 2.0 / 3.0).abs() < 1e-10);
        assert_eq!(metrics[0].support, 3);
        assert!((metrics[2].f1 - 2.0 / 3.0).abs() < 1e-10);
        assert_eq!(cm.count(3, 1), 1);
    }

    #[test]
    fn out_of_range_labels_are_unplaced() {
        let cm = ConfusionMatrix::from_labels(&[1, 0, 2], &[1, 1, 5], 2);
        assert_eq!(cm.n_unplaced(), 2);
        assert_eq!(cm.as_rows().to_vec(), vec![vec![1, 0], vec![0, 0]]);
        assert_eq!(cm.count(0, 1), 0);
    }

    #[test]
    fn binary_view_treats_class_two_as_positive() {
        let true_labels = vec![1, 1, 1, 2, 2, 2, 2];
        let predicted = vec![1, 1, 2, 2, 2, 2, 1];
        let binary = ConfusionMatrix::from_labels(&true_labels, &predicted, 2).binary();
        assert_eq!(
            binary,
            BinaryConfusion {
                true_positives: 3,
                true_negatives: 2,
                false_positives: 1,
                false_negatives: 1,
            }
        );
        assert_eq!(binary.total(), 7);
        assert!((binary.detection_rate() - 0.75).abs() < 1e-12);
        assert!((binary.false_positive_rate() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_binary_rates_are_zero() {
        let binary = BinaryConfusion::default();
        assert_eq!(binary.detection_rate(), 0.0);
        assert_eq!(binary.false_positive_rate(), 0.0);
    }

    #[test]
    fn display_formatting() {
        let cm = ConfusionMatrix::from_labels(&[1, 2], &[1, 2], 2);
        let output = format!("{cm}");
        assert!(output.contains("pred_  1"));
        assert!(output.contains("true_  2"));
    }
}
