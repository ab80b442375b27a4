//! CSV record reader with full input validation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use canopy_rf::{FeatureValue, Record};
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::dataset::Dataset;

/// How the `label` column is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelMode {
    /// Every label must be an integer of at least 1.
    #[default]
    Labeled,
    /// Labels may be empty or `0`; empty cells are stored as 0.
    Unlabeled,
}

/// Reads labeled or unlabeled records from a CSV file.
///
/// Expected CSV format:
/// - Header row required: `id,label,<feature...>`
/// - One row per record, all rows must have the same number of columns
/// - Feature cells parse as a boolean (`true`/`false`, any case), then as a
///   float, and otherwise stay strings; `NaN` and `inf` are rejected
///
/// A column's type is decided per cell, so a mixed column yields mixed slots.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingColumns`] | Header has fewer than two columns |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::InvalidLabel`] | Label cell not valid for the [`LabelMode`] |
/// | [`IoError::NonFiniteValue`] | Numeric cell is NaN or infinite |
/// | [`IoError::DuplicateId`] | Same id appears twice |
pub struct RecordReader {
    path: PathBuf,
}

impl RecordReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read and validate the CSV file, returning a [`Dataset`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self, mode: LabelMode) -> Result<Dataset, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that InconsistentRowLength fires instead of CsvParse.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?;
        let expected_cols = header.len();
        if expected_cols < 2 {
            return Err(IoError::MissingColumns {
                path: self.path.clone(),
                got: expected_cols,
            });
        }
        let feature_names: Vec<String> = header.iter().skip(2).map(str::to_string).collect();
        debug!(expected_cols, "read CSV header");

        let mut records = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (row_index, result) in rdr.records().enumerate() {
            let row = result.map_err(|e| self.csv_error(e))?;
            let id = row.get(0).unwrap_or("").to_string();

            if row.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    id,
                    expected: expected_cols,
                    got: row.len(),
                });
            }

            if let Some(&first_row) = seen.get(&id) {
                return Err(IoError::DuplicateId {
                    path: self.path.clone(),
                    id,
                    first_row,
                    second_row: row_index,
                });
            }
            seen.insert(id.clone(), row_index);

            let raw_label = row.get(1).unwrap_or("");
            let class_label = parse_label(raw_label, mode).ok_or_else(|| IoError::InvalidLabel {
                path: self.path.clone(),
                row_index,
                id: id.clone(),
                raw: raw_label.to_string(),
            })?;

            let mut features = Vec::with_capacity(expected_cols - 2);
            for (col_index, raw) in row.iter().skip(2).enumerate() {
                let value = parse_cell(raw);
                if let FeatureValue::Float(v) = &value
                    && !v.is_finite()
                {
                    return Err(IoError::NonFiniteValue {
                        path: self.path.clone(),
                        row_index,
                        col_index,
                        raw: raw.to_string(),
                    });
                }
                features.push(value);
            }
            records.push(Record::new(id, class_label, features));
        }

        if records.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_records = records.len(),
            n_features = feature_names.len(),
            ?mode,
            "dataset loaded"
        );

        Ok(Dataset {
            feature_names,
            records,
        })
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}

fn parse_label(raw: &str, mode: LabelMode) -> Option<usize> {
    match mode {
        LabelMode::Labeled => raw.parse::<usize>().ok().filter(|&label| label >= 1),
        LabelMode::Unlabeled if raw.is_empty() => Some(0),
        LabelMode::Unlabeled => raw.parse::<usize>().ok(),
    }
}

/// Parse one feature cell: boolean first, then float, else string.
pub(crate) fn parse_cell(raw: &str) -> FeatureValue {
    if raw.eq_ignore_ascii_case("true") {
        FeatureValue::Bool(true)
    } else if raw.eq_ignore_ascii_case("false") {
        FeatureValue::Bool(false)
    } else if let Ok(value) = raw.parse::<f64>() {
        FeatureValue::Float(value)
    } else {
        FeatureValue::Str(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_mixed_cells() {
        let csv = "id,label,duration,proto,flag\nc1,1,0.5,tcp,True\nc2,2,12,udp,false\n";
        let f = write_csv(csv);
        let ds = RecordReader::new(f.path()).read(LabelMode::Labeled).unwrap();
        assert_eq!(ds.feature_names, vec!["duration", "proto", "flag"]);
        assert_eq!(ds.records.len(), 2);

        let first = &ds.records[0];
        assert_eq!(first.id, "c1");
        assert_eq!(first.class_label, 1);
        assert_eq!(
            first.features,
            vec![
                FeatureValue::Float(0.5),
                FeatureValue::Str("tcp".into()),
                FeatureValue::Bool(true),
            ]
        );
        assert_eq!(ds.records[1].features[0], FeatureValue::Float(12.0));
        assert_eq!(ds.records[1].features[2], FeatureValue::Bool(false));
    }

    #[test]
    fn cell_parsing_order() {
        assert_eq!(parse_cell("TRUE"), FeatureValue::Bool(true));
        assert_eq!(parse_cell("False"), FeatureValue::Bool(false));
        assert_eq!(parse_cell("1"), FeatureValue::Float(1.0));
        assert_eq!(parse_cell("-2.5e3"), FeatureValue::Float(-2500.0));
        assert_eq!(parse_cell("yes"), FeatureValue::Str("yes".into()));
        assert_eq!(parse_cell(""), FeatureValue::Str(String::new()));
    }

    #[test]
    fn insertion_order_preserved() {
        let csv = "id,label,x\nZZZ,1,1.0\nAAA,2,2.0\nMMM,1,3.0\n";
        let f = write_csv(csv);
        let ds = RecordReader::new(f.path()).read(LabelMode::Labeled).unwrap();
        let ids: Vec<&str> = ds.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ZZZ", "AAA", "MMM"]);
    }

    #[test]
    fn unlabeled_mode_accepts_empty_and_zero() {
        let csv = "id,label,x\na,,1.0\nb,0,2.0\nc,2,3.0\n";
        let f = write_csv(csv);
        let ds = RecordReader::new(f.path()).read(LabelMode::Unlabeled).unwrap();
        let labels: Vec<usize> = ds.records.iter().map(|r| r.class_label).collect();
        assert_eq!(labels, vec![0, 0, 2]);
    }

    #[test]
    fn labeled_mode_rejects_zero() {
        let csv = "id,label,x\na,1,1.0\nb,0,2.0\n";
        let f = write_csv(csv);
        let result = RecordReader::new(f.path()).read(LabelMode::Labeled);
        assert!(matches!(
            result,
            Err(IoError::InvalidLabel { row_index: 1, .. })
        ));
    }

    #[test]
    fn labeled_mode_rejects_text() {
        let csv = "id,label,x\na,normal,1.0\n";
        let f = write_csv(csv);
        let result = RecordReader::new(f.path()).read(LabelMode::Labeled);
        assert!(matches!(result, Err(IoError::InvalidLabel { .. })));
    }

    #[test]
    fn error_file_not_found() {
        let result = RecordReader::new("/nonexistent/file.csv").read(LabelMode::Labeled);
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }

    #[test]
    fn error_empty_dataset() {
        let f = write_csv("id,label,x,y\n");
        let result = RecordReader::new(f.path()).read(LabelMode::Labeled);
        assert!(matches!(result, Err(IoError::EmptyDataset { .. })));
    }

    #[test]
    fn error_missing_columns() {
        let f = write_csv("id\na\n");
        let result = RecordReader::new(f.path()).read(LabelMode::Labeled);
        assert!(matches!(result, Err(IoError::MissingColumns { got: 1, .. })));
    }

    #[test]
    fn error_inconsistent_row_length() {
        let csv = "id,label,x,y\na,1,1.0,2.0\nb,1,1.0\n";
        let f = write_csv(csv);
        let result = RecordReader::new(f.path()).read(LabelMode::Labeled);
        assert!(matches!(
            result,
            Err(IoError::InconsistentRowLength { row_index: 1, .. })
        ));
    }

    #[test]
    fn error_non_finite_nan() {
        let csv = "id,label,x,y\na,1,1.0,2.0\nb,2,NaN,2.0\n";
        let f = write_csv(csv);
        let result = RecordReader::new(f.path()).read(LabelMode::Labeled);
        assert!(matches!(
            result,
            Err(IoError::NonFiniteValue {
                row_index: 1,
                col_index: 0,
                ..
            })
        ));
    }

    #[test]
    fn error_non_finite_inf() {
        let csv = "id,label,x,y\na,,1.0,-inf\n";
        let f = write_csv(csv);
        let result = RecordReader::new(f.path()).read(LabelMode::Unlabeled);
        assert!(matches!(
            result,
            Err(IoError::NonFiniteValue { col_index: 1, .. })
        ));
    }

    #[test]
    fn error_duplicate_id() {
        let csv = "id,label,x\nB01,1,2.0\nB02,1,4.0\nB01,2,6.0\n";
        let f = write_csv(csv);
        let result = RecordReader::new(f.path()).read(LabelMode::Labeled);
        assert!(matches!(
            result,
            Err(IoError::DuplicateId {
                first_row: 0,
                second_row: 2,
                ..
            })
        ));
    }
}
