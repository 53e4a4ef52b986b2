//! Stand-alone tools around the quiz blend: clamping a prediction file, combining
//! prediction files with fixed weights, and fitting such weights on the probe set.

pub mod bound;
pub mod combine;
pub mod probe;

use crate::config::ConfigError;
use crate::io::PredictionReadError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelperError {
    #[error(transparent)]
    PredictionRead(#[from] PredictionReadError),
    #[error("Line {line} of '{path}' must hold exactly one value, but found {found}.")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        found: usize,
    },
    #[error("Line {line} of '{path}' has no rating in column {column}.")]
    MissingRatingColumn {
        path: PathBuf,
        line: usize,
        column: usize,
    },
    #[error("Invalid rating bounds: {0}")]
    InvalidBounds(#[from] ConfigError),
    #[error("At least one {0} is required.")]
    NoInputs(&'static str),
    #[error("Weight for '{path}' must be finite, but was {weight}.")]
    NonFiniteWeight { path: PathBuf, weight: f64 },
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read combine plan '{path}': {source}")]
    PlanRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse combine plan '{path}': {source}")]
    PlanParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize combine plan: {0}")]
    PlanSerialize(#[from] toml::ser::Error),
    #[error("The least-squares fit on the probe set failed: {0}")]
    LeastSquares(#[from] ndarray_linalg::error::LinalgError),
}

impl HelperError {
    pub(crate) fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}
