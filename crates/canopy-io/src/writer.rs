//! CSV prediction writer.

use std::fs;
use std::path::{Path, PathBuf};

use canopy_rf::Record;
use tracing::{debug, info, instrument};

use crate::IoError;

/// Writes one `prediction,id,<feature...>` row per record.
///
/// Floats are written at full round-trip precision, booleans as
/// `True`/`False`, and strings verbatim. The header row names the feature
/// columns as they were read.
pub struct PredictionWriter {
    path: PathBuf,
}

impl PredictionWriter {
    /// Create a writer for `path`, creating its parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn new(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| IoError::OutputDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
            debug!("output directory ready");
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Return the output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `records` paired with `predictions`, overwriting the file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::PredictionCountMismatch`] | `predictions.len() != records.len()` |
    /// | [`IoError::WriteFile`] | The file cannot be created or written |
    #[instrument(skip_all, fields(path = %self.path.display(), n_records = records.len()))]
    pub fn write(
        &self,
        feature_names: &[String],
        records: &[Record],
        predictions: &[usize],
    ) -> Result<(), IoError> {
        if records.len() != predictions.len() {
            return Err(IoError::PredictionCountMismatch {
                n_records: records.len(),
                n_predictions: predictions.len(),
            });
        }
        self.write_rows(feature_names, records, predictions)
            .map_err(|e| IoError::WriteFile {
                path: self.path.clone(),
                source: e,
            })?;
        info!("predictions written");
        Ok(())
    }

    fn write_rows(
        &self,
        feature_names: &[String],
        records: &[Record],
        predictions: &[usize],
    ) -> Result<(), csv::Error> {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;

        let mut header = vec!["prediction".to_string(), "id".to_string()];
        header.extend(feature_names.iter().cloned());
        wtr.write_record(&header)?;

        for (record, prediction) in records.iter().zip(predictions) {
            let mut row = Vec::with_capacity(record.n_features() + 2);
            row.push(prediction.to_string());
            row.push(record.id.clone());
            row.extend(record.features.iter().map(ToString::to_string));
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
