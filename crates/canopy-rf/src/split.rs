//! Split selection under the class-conditional purity heuristic.
//!
//! Candidate thresholds are not searched exhaustively: each class proposes
//! `mean + spread` of a feature, and the candidate whose left partition has
//! the lowest entropy-like score wins.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::node::FeatureIndex;
use crate::record::Record;
use crate::stats::ClassStatistics;

/// Feature slots that may no longer be chosen within a subtree.
pub type UsedFeatures = BTreeSet<usize>;

/// Parameters shared by every split decision in one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitParams {
    /// Number of classes; labels are in `[1, n_classes]`.
    pub n_classes: usize,
    /// Class share at which a node stops splitting.
    pub purity_threshold: f64,
    /// Sentinel score for features that cannot be chosen.
    pub big_value: f64,
    /// Boolean-combination slots consumed once chosen on a path.
    pub boolean_band: Range<usize>,
}

/// Result of examining one node.
#[derive(Debug)]
pub enum SplitOutcome<'a> {
    /// The node becomes a leaf predicting `class_label`.
    Leaf {
        /// Majority class of the node's records.
        class_label: usize,
    },
    /// The node splits on `feature` at `threshold`.
    Split {
        /// Winning feature slot.
        feature: FeatureIndex,
        /// Records with `value <= threshold` go left.
        threshold: f64,
        /// Records going left; never empty.
        left: Vec<&'a Record>,
        /// Records going right; never empty.
        right: Vec<&'a Record>,
        /// Used-feature set both children start from.
        child_used: UsedFeatures,
    },
}

/// Return `true` when any class holds at least `purity_threshold` of `records`.
#[must_use]
pub fn stopping_condition(records: &[&Record], purity_threshold: f64, n_classes: usize) -> bool {
    if records.is_empty() {
        return false;
    }
    let total = records.len() as f64;
    class_counts(records, n_classes)
        .iter()
        .any(|&count| count as f64 / total >= purity_threshold)
}

/// Return the most frequent class in `records`; ties go to the lowest class.
///
/// An empty slice yields class 1.
#[must_use]
pub fn majority_class(records: &[&Record], n_classes: usize) -> usize {
    let counts = class_counts(records, n_classes);
    let mut best = 0usize;
    for (i, &count) in counts.iter().enumerate().skip(1) {
        if count > counts[best] {
            best = i;
        }
    }
    best + 1
}

/// Score the partition `value <= mean + spread` on `feature`.
///
/// For each class, the share of `records` of that class falling on the left
/// is `w`; the score is `-Σ w·log2(w)` over classes with `w > 0`. Lower is
/// purer. The threshold is applied to every record regardless of which class
/// proposed it.
#[must_use]
pub fn find_entropy(
    feature: usize,
    n_classes: usize,
    mean: f64,
    spread: f64,
    records: &[&Record],
) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let threshold = mean + spread;
    let mut left_counts = vec![0usize; n_classes];
    for record in records {
        if record.features[feature].as_f64() <= threshold
            && let Some(slot) = record
                .class_label
                .checked_sub(1)
                .and_then(|c| left_counts.get_mut(c))
        {
            *slot += 1;
        }
    }

    let total = records.len() as f64;
    -left_counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let w = c as f64 / total;
            w * w.log2()
        })
        .sum::<f64>()
}

/// Choose the split for a node, or decide that it is a leaf.
///
/// `stats` must summarize exactly `records` (see [`ClassStatistics::summarize`]).
/// Features in `used` score `big_value` and are never chosen. When nothing is
/// eligible, or the winning threshold sends every record to one side, the
/// node becomes a leaf with the majority class.
#[must_use]
pub fn find_split<'a>(
    records: &[&'a Record],
    stats: &[ClassStatistics],
    used: &UsedFeatures,
    params: &SplitParams,
) -> SplitOutcome<'a> {
    let n_classes = params.n_classes;
    let leaf = || SplitOutcome::Leaf {
        class_label: majority_class(records, n_classes),
    };

    if records.is_empty() || stopping_condition(records, params.purity_threshold, n_classes) {
        return leaf();
    }

    let n_features = records[0].features.len();
    let mut best_feature = 0usize;
    let mut best_threshold = 0.0f64;
    let mut best_score = f64::INFINITY;

    for feature in 0..n_features {
        let (threshold, score) = if used.contains(&feature) {
            (0.0, params.big_value)
        } else {
            best_class_candidate(feature, records, stats, params)
        };
        if score < best_score {
            best_score = score;
            best_feature = feature;
            best_threshold = threshold;
        }
    }

    if best_score >= params.big_value {
        return leaf();
    }

    let (left, right): (Vec<&Record>, Vec<&Record>) = records
        .iter()
        .copied()
        .partition(|r| r.features[best_feature].as_f64() <= best_threshold);

    if left.is_empty() || right.is_empty() {
        return leaf();
    }

    let mut child_used = used.clone();
    if params.boolean_band.contains(&best_feature) {
        child_used.insert(best_feature);
    }

    SplitOutcome::Split {
        feature: FeatureIndex::new(best_feature),
        threshold: best_threshold,
        left,
        right,
        child_used,
    }
}

/// Lowest-scoring per-class candidate `(threshold, score)` for one feature.
///
/// Classes with no records, or whose threshold is not finite, propose nothing.
fn best_class_candidate(
    feature: usize,
    records: &[&Record],
    stats: &[ClassStatistics],
    params: &SplitParams,
) -> (f64, f64) {
    let mut best = (params.big_value, f64::INFINITY);
    for class in stats {
        if class.count == 0 {
            continue;
        }
        let mean = class.running_mean[feature];
        let spread = class.spread[feature];
        // A NaN threshold sends nothing left and would score a perfect 0.0.
        if !(mean + spread).is_finite() {
            continue;
        }
        let candidate = (
            mean + spread,
            find_entropy(feature, params.n_classes, mean, spread, records),
        );
        if candidate.1 < best.1 {
            best = candidate;
        }
    }
    best
}

fn class_counts(records: &[&Record], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for record in records {
        if let Some(slot) = record
            .class_label
            .checked_sub(1)
            .and_then(|c| counts.get_mut(c))
        {
            *slot += 1;
        }
    }
    counts
}
