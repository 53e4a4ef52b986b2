//! # Predictor Discovery
//!
//! Each predictor deposits one file into the blending directory, named
//! `<name><marker><rmse><extension>` (for example `svdpp_QRMSE_0.8792.dta`). The
//! quiz RMSE reported by the scoreboard is carried by the file name itself, so the
//! name is parsed strictly: anything that does not fit the scheme is a fatal error
//! rather than a predictor silently dropped from the blend.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to read the prediction directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to inspect prediction file '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Prediction file name '{file_name}' is malformed: {reason}.")]
    MalformedFilename {
        file_name: String,
        reason: &'static str,
    },
    #[error("Prediction file '{file_name}' reports an invalid quiz RMSE of {rmse}.")]
    InvalidRmse { file_name: String, rmse: f64 },
    #[error("No prediction files ending in '{extension}' were found in '{dir}'.")]
    NoPredictorsFound { dir: PathBuf, extension: String },
}

/// One predictor taking part in the blend.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorFile {
    pub name: String,
    /// RMSE of this predictor on the quiz subset.
    pub rmse: f64,
    pub path: PathBuf,
}

impl PredictorFile {
    pub fn mse(&self) -> f64 {
        self.rmse * self.rmse
    }
}

/// The structured content of a prediction file name.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFilename {
    pub name: String,
    pub rmse: f64,
}

/// Splits `file_name` into predictor name and quiz RMSE.
///
/// The name ends at the last occurrence of `marker`; the RMSE is everything between
/// the marker and the trailing `extension`.
pub fn parse_predictor_filename(
    file_name: &str,
    marker: &str,
    extension: &str,
) -> Result<ParsedFilename, DiscoveryError> {
    let malformed = |reason| DiscoveryError::MalformedFilename {
        file_name: file_name.to_string(),
        reason,
    };

    let stem = file_name
        .strip_suffix(extension)
        .ok_or_else(|| malformed("the prediction extension is missing"))?;
    let (name, rmse_text) = stem
        .rsplit_once(marker)
        .ok_or_else(|| malformed("the RMSE marker is missing"))?;

    if name.is_empty() {
        return Err(malformed("the predictor name is empty"));
    }
    let rmse: f64 = rmse_text
        .parse()
        .map_err(|_| malformed("the text after the RMSE marker is not a number"))?;
    if !rmse.is_finite() || rmse < 0.0 {
        return Err(DiscoveryError::InvalidRmse {
            file_name: file_name.to_string(),
            rmse,
        });
    }

    Ok(ParsedFilename {
        name: name.to_string(),
        rmse,
    })
}

/// Lists every predictor file in `dir`, sorted by path.
///
/// Only regular files whose names end in `extension` are considered, and hidden files
/// are skipped the same way a shell glob skips them. Symlinks are followed.
pub fn discover_predictors(
    dir: &Path,
    marker: &str,
    extension: &str,
) -> Result<Vec<PredictorFile>, DiscoveryError> {
    let read_dir_error = |source| DiscoveryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_error)? {
        let entry = entry.map_err(read_dir_error)?;
        let os_name = entry.file_name();
        let Some(file_name) = os_name.to_str() else {
            let lossy = os_name.to_string_lossy();
            if lossy.ends_with(extension) {
                return Err(DiscoveryError::MalformedFilename {
                    file_name: lossy.into_owned(),
                    reason: "the file name is not valid UTF-8",
                });
            }
            continue;
        };
        if file_name.starts_with('.') || !file_name.ends_with(extension) {
            continue;
        }
        // Symlinks count by their target; a dangling one is an error.
        let path = entry.path();
        let metadata = fs::metadata(&path).map_err(|source| DiscoveryError::Metadata {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            continue;
        }
        candidates.push(path);
    }
    candidates.sort();

    let mut predictors = Vec::with_capacity(candidates.len());
    for path in candidates {
        // Candidates were filtered on a UTF-8 file name above.
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let parsed = parse_predictor_filename(file_name, marker, extension)?;
        log::debug!(
            "Discovered predictor '{}' (quiz RMSE {}) at {}",
            parsed.name,
            parsed.rmse,
            path.display()
        );
        predictors.push(PredictorFile {
            name: parsed.name,
            rmse: parsed.rmse,
            path,
        });
    }

    if predictors.is_empty() {
        return Err(DiscoveryError::NoPredictorsFound {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }
    Ok(predictors)
}
