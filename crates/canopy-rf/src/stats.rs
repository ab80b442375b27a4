//! Per-class running means and spreads over the records reaching one node.

use crate::record::Record;

/// How the per-feature spread added to each class mean is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpreadMode {
    /// Spread is always 0.0, so candidate thresholds are the plain class means.
    #[default]
    Zero,
    /// Population standard deviation of each feature within the class.
    StdDev,
}

/// Summary of one class over the records reaching a node.
///
/// A class with no records has empty `running_mean` and `spread`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassStatistics {
    /// Number of records of this class.
    pub count: usize,
    /// Running mean of each coerced feature slot.
    pub running_mean: Vec<f64>,
    /// Per-feature spread, see [`SpreadMode`].
    pub spread: Vec<f64>,
}

impl ClassStatistics {
    /// Summarize `records` per class.
    ///
    /// Returns one entry per class, index `c - 1` for class `c`. Labels
    /// outside `[1, n_classes]` are ignored; training input is validated
    /// before it reaches this point.
    #[must_use]
    pub fn summarize(records: &[&Record], n_classes: usize, mode: SpreadMode) -> Vec<Self> {
        let mut classes = vec![ClassStatistics::default(); n_classes];

        for record in records {
            let Some(class) = record
                .class_label
                .checked_sub(1)
                .and_then(|c| classes.get_mut(c))
            else {
                continue;
            };
            if class.running_mean.len() < record.features.len() {
                class.running_mean = vec![0.0; record.features.len()];
            }
            let n = class.count as f64;
            for (mean, value) in class.running_mean.iter_mut().zip(&record.features) {
                *mean = (*mean * n + value.as_f64()) / (n + 1.0);
            }
            class.count += 1;
        }

        for (c, class) in classes.iter_mut().enumerate() {
            if class.count == 0 {
                continue;
            }
            class.spread = match mode {
                SpreadMode::Zero => vec![0.0; class.running_mean.len()],
                SpreadMode::StdDev => std_devs(records, c + 1, &class.running_mean, class.count),
            };
        }

        classes
    }
}

fn std_devs(records: &[&Record], class_label: usize, means: &[f64], count: usize) -> Vec<f64> {
    let mut sum_sq = vec![0.0f64; means.len()];
    for record in records.iter().filter(|r| r.class_label == class_label) {
        for ((acc, mean), value) in sum_sq.iter_mut().zip(means).zip(&record.features) {
            let d = value.as_f64() - mean;
            *acc += d * d;
        }
    }
    sum_sq
        .into_iter()
        .map(|s| (s / count as f64).sqrt())
        .collect()
}
