//! Heterogeneous feature slots and labeled records.

use std::fmt;

/// One typed feature slot of a [`Record`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum FeatureValue {
    /// A continuous value.
    Float(f64),
    /// A boolean flag.
    Bool(bool),
    /// A free-form string. Never compared numerically.
    Str(String),
}

impl FeatureValue {
    /// Coerce the slot to a float for splitting and scoring.
    ///
    /// Floats pass through, booleans become 1.0/0.0, and strings become 0.0.
    /// String slots therefore carry no information into any split.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            FeatureValue::Float(v) => *v,
            FeatureValue::Bool(true) => 1.0,
            FeatureValue::Bool(false) => 0.0,
            FeatureValue::Str(_) => 0.0,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Float(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Bool(value)
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Str(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Str(value.to_string())
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Float(v) => write!(f, "{v}"),
            FeatureValue::Bool(true) => f.write_str("True"),
            FeatureValue::Bool(false) => f.write_str("False"),
            FeatureValue::Str(s) => f.write_str(s),
        }
    }
}

/// A labeled (or yet-to-be-labeled) feature vector.
///
/// `class_label` is one-based: valid training labels lie in `[1, n_classes]`.
/// Unlabeled records carry `0` until the semi-supervised loop assigns them a
/// class.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Opaque identifier, carried through for reporting only.
    pub id: String,
    /// One-based class label.
    pub class_label: usize,
    /// Ordered feature slots; uniform in length and type across a run.
    pub features: Vec<FeatureValue>,
}

impl Record {
    /// Create a new record.
    #[must_use]
    pub fn new(id: impl Into<String>, class_label: usize, features: Vec<FeatureValue>) -> Self {
        Self {
            id: id.into(),
            class_label,
            features,
        }
    }

    /// Return the number of feature slots.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Return the coerced value of feature `index`, or `None` when out of range.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<f64> {
        self.features.get(index).map(FeatureValue::as_f64)
    }
}
