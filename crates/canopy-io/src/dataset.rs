//! Dataset type produced by [`RecordReader`](crate::RecordReader).

use canopy_rf::Record;

/// Records read from one CSV file, with the header's feature column names.
///
/// `records[i].features[j]` belongs to column `feature_names[j]`.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Feature column names from the CSV header, after `id` and `label`.
    pub feature_names: Vec<String>,
    /// Records in file order.
    pub records: Vec<Record>,
}

impl Dataset {
    /// Return the number of records.
    #[must_use]
    pub fn n_records(&self) -> usize {
        self.records.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Return the largest class label present, or 0 when unlabeled.
    #[must_use]
    pub fn max_label(&self) -> usize {
        self.records.iter().map(|r| r.class_label).max().unwrap_or(0)
    }

    /// Consume the dataset, returning its records.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use canopy_rf::FeatureValue;

    use super::*;

    #[test]
    fn accessors() {
        let dataset = Dataset {
            feature_names: vec!["a".into(), "b".into()],
            records: vec![
                Record::new("x", 1, vec![FeatureValue::Float(0.0), FeatureValue::Bool(true)]),
                Record::new("y", 3, vec![FeatureValue::Float(1.0), FeatureValue::Bool(false)]),
            ],
        };
        assert_eq!(dataset.n_records(), 2);
        assert_eq!(dataset.n_features(), 2);
        assert_eq!(dataset.max_label(), 3);
        assert_eq!(dataset.into_records()[1].id, "y");
    }
}
