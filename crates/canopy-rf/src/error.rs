use std::path::PathBuf;

/// Errors from forest training, persistence, and feature synthesis.
#[derive(Debug, thiserror::Error)]
pub enum RfError {
    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when n_classes is zero.
    #[error("n_classes must be at least 1, got {n_classes}")]
    InvalidClassCount {
        /// The invalid n_classes value provided.
        n_classes: usize,
    },

    /// Returned when the purity threshold is not in (0.0, 1.0].
    #[error("purity threshold must be in (0.0, 1.0], got {threshold}")]
    InvalidPurityThreshold {
        /// The invalid threshold provided.
        threshold: f64,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when the fallback class is outside [1, n_classes].
    #[error("fallback class {class_label} is outside [1, {n_classes}]")]
    InvalidFallbackClass {
        /// The fallback class provided.
        class_label: usize,
        /// The number of classes.
        n_classes: usize,
    },

    /// Returned when the training set has zero records.
    #[error("training dataset has zero records")]
    EmptyDataset,

    /// Returned when the records have zero feature slots.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a record has a different number of features than expected.
    #[error("record {record_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the record.
        got: usize,
        /// The zero-based index of the offending record.
        record_index: usize,
    },

    /// Returned when a record's class label is outside [1, n_classes].
    #[error("record {record_index} has class label {class_label}, expected [1, {n_classes}]")]
    InvalidClassLabel {
        /// The offending class label.
        class_label: usize,
        /// The number of classes.
        n_classes: usize,
        /// The zero-based index of the offending record.
        record_index: usize,
    },

    /// Returned when writing a tree file fails.
    #[error("failed to write tree to {path}")]
    WriteTree {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading a tree file fails.
    #[error("failed to read tree from {path}")]
    ReadTree {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a persisted tree line cannot be decoded.
    #[error("malformed tree line {line} in {path}: {reason}")]
    MalformedTreeLine {
        /// Path of the tree file (empty for in-memory readers).
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// Returned when a tree file ends before every pending child was read.
    #[error("tree in {path} ended with {pending} node(s) still pending")]
    TruncatedTree {
        /// Path of the tree file (empty for in-memory readers).
        path: PathBuf,
        /// Number of nodes the decoder still expected.
        pending: usize,
    },

    /// Returned when writing the association-rule file fails.
    #[error("failed to write association rules to {path}")]
    WriteRules {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the association-rule file fails.
    #[error("failed to read association rules from {path}")]
    ReadRules {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when an association-rule line is not a list of indices.
    #[error("malformed association rule on line {line} in {path}: \"{raw}\"")]
    MalformedRuleLine {
        /// Path of the rule file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// The raw line content.
        raw: String,
    },

    /// Returned when a rule references a feature slot a record does not have.
    #[error("association rule uses feature {feature_index}, but record {record_index} has {n_features} features")]
    RuleIndexOutOfRange {
        /// The feature index named by the rule.
        feature_index: usize,
        /// The zero-based index of the offending record.
        record_index: usize,
        /// The number of features that record has.
        n_features: usize,
    },
}
