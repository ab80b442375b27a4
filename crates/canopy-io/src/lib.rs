//! CSV record reading and prediction writing for the canopy pipeline.

mod dataset;
mod error;
mod reader;
mod writer;

pub use dataset::Dataset;
pub use error::IoError;
pub use reader::{LabelMode, RecordReader};
pub use writer::PredictionWriter;
