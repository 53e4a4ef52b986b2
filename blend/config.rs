//! # Blend Configuration
//!
//! Every constant the quiz blend depends on lives in [`BlendConfig`]. The defaults
//! reproduce the reference run over the full qual set; a TOML file may override any
//! subset of the fields, which is how tests and small datasets drive the solver.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding one prediction file per predictor.
pub const DEFAULT_PREDICTION_DIR: &str = "data/quiz_blend/";

/// Extension shared by all prediction files.
pub const DEFAULT_PREDICTION_EXTENSION: &str = ".dta";

/// Text that separates a predictor's name from its quiz RMSE in a file name.
pub const DEFAULT_RMSE_MARKER: &str = "_QRMSE_";

/// Ridge constant for the blending regression.
pub const DEFAULT_LAMBDA: f64 = 0.0014;

/// Number of ratings in the qual set (`N_L`).
pub const NUM_QUAL_RATINGS: usize = 2_749_898;

/// Mean rating of the quiz set.
pub const QUIZ_MEAN: f64 = 3.674;

/// Variance of the quiz ratings around [`QUIZ_MEAN`], i.e. `1/N_Q sum_u (y_u - mean)^2`.
pub const QUIZ_VARIANCE: f64 = 1.274;

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

/// Decimal digits written per blended prediction.
pub const DEFAULT_OUTPUT_PRECISION: usize = 3;

/// Condition numbers of the regularized Gram matrix above this value are logged.
pub const DEFAULT_CONDITION_WARNING: f64 = 1e8;

/// Condition numbers above this value abort the solve.
pub const DEFAULT_MAX_CONDITION_NUMBER: f64 = 1e12;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration field '{field}' must be finite, but was {value}.")]
    NonFinite { field: &'static str, value: f64 },
    #[error("The ridge constant lambda must be non-negative, but was {0}.")]
    NegativeLambda(f64),
    #[error("The quiz variance must be non-negative, but was {0}.")]
    NegativeVariance(f64),
    #[error("The qual set must contain at least one rating.")]
    EmptyQualSet,
    #[error("Rating bounds are inverted: min ({min}) must not exceed max ({max}).")]
    InvertedBounds { min: f64, max: f64 },
    #[error("Configuration field '{0}' must not be empty.")]
    EmptyField(&'static str),
    #[error(
        "The condition warning threshold ({warning}) must be positive and no larger than the hard limit ({limit})."
    )]
    InvalidConditionLimits { warning: f64, limit: f64 },
}

/// Closed interval of valid ratings. Every blended prediction is clipped into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatingBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for RatingBounds {
    fn default() -> Self {
        Self {
            min: MIN_RATING,
            max: MAX_RATING,
        }
    }
}

impl RatingBounds {
    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Both ends must be finite and `min` must not exceed `max`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("rating_bounds.min", self.min), ("rating_bounds.max", self.max)] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
        }
        if self.min > self.max {
            return Err(ConfigError::InvertedBounds {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// All tunables of a quiz blending run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlendConfig {
    pub prediction_dir: PathBuf,
    pub prediction_extension: String,
    pub rmse_marker: String,
    pub lambda: f64,
    pub num_qual_ratings: usize,
    pub quiz_mean: f64,
    pub quiz_variance: f64,
    pub rating_bounds: RatingBounds,
    pub output_precision: usize,
    pub condition_warning: f64,
    pub max_condition_number: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            prediction_dir: PathBuf::from(DEFAULT_PREDICTION_DIR),
            prediction_extension: DEFAULT_PREDICTION_EXTENSION.to_string(),
            rmse_marker: DEFAULT_RMSE_MARKER.to_string(),
            lambda: DEFAULT_LAMBDA,
            num_qual_ratings: NUM_QUAL_RATINGS,
            quiz_mean: QUIZ_MEAN,
            quiz_variance: QUIZ_VARIANCE,
            rating_bounds: RatingBounds::default(),
            output_precision: DEFAULT_OUTPUT_PRECISION,
            condition_warning: DEFAULT_CONDITION_WARNING,
            max_condition_number: DEFAULT_MAX_CONDITION_NUMBER,
        }
    }
}

impl BlendConfig {
    /// Reads a TOML file. Fields it omits keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite_fields = [
            ("lambda", self.lambda),
            ("quiz_mean", self.quiz_mean),
            ("quiz_variance", self.quiz_variance),
        ];
        for (field, value) in finite_fields {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
        }

        if self.lambda < 0.0 {
            return Err(ConfigError::NegativeLambda(self.lambda));
        }
        if self.quiz_variance < 0.0 {
            return Err(ConfigError::NegativeVariance(self.quiz_variance));
        }
        if self.num_qual_ratings == 0 {
            return Err(ConfigError::EmptyQualSet);
        }
        self.rating_bounds.validate()?;
        if self.prediction_extension.is_empty() {
            return Err(ConfigError::EmptyField("prediction_extension"));
        }
        if self.rmse_marker.is_empty() {
            return Err(ConfigError::EmptyField("rmse_marker"));
        }
        // NaN thresholds fail the comparison below as well.
        if !(self.condition_warning > 0.0 && self.condition_warning <= self.max_condition_number) {
            return Err(ConfigError::InvalidConditionLimits {
                warning: self.condition_warning,
                limit: self.max_condition_number,
            });
        }
        Ok(())
    }

    /// `sqrt(N_L)`, the scale applied during standardization.
    pub fn standardization_scale(&self) -> f64 {
        (self.num_qual_ratings as f64).sqrt()
    }
}
